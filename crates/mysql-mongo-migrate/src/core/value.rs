//! SQL value types for database-agnostic row handling.
//!
//! Values read from the relational source are fully owned: every row is
//! converted to BSON and shipped to the document store, so zero-copy
//! borrowing buys nothing here.

use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

/// A single relational column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean / BIT value.
    Bool(bool),

    /// Any integer type (tinyint through bigint).
    I64(i64),

    /// Any floating point type.
    F64(f64),

    /// Decimal value with arbitrary precision.
    Decimal(Decimal),

    /// Text data (char, varchar, text, enum, set, json).
    Text(String),

    /// Binary data (binary, varbinary, blob).
    Bytes(Vec<u8>),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

/// A primary-key component value.
///
/// Integer, text and temporal keys are supported for keyset pagination and
/// cross-store row lookup. Date keys are widened to midnight datetimes so
/// they round-trip through the document model, which has no date-only type;
/// datetimes are truncated to millisecond precision for the same reason.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    Int(i64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl KeyValue {
    /// Extract a key component from a column value.
    ///
    /// Returns `None` for value types that cannot serve as a primary key
    /// (floats, blobs, NULL).
    #[must_use]
    pub fn from_value(value: &SqlValue) -> Option<KeyValue> {
        match value {
            SqlValue::I64(v) => Some(KeyValue::Int(*v)),
            SqlValue::Bool(v) => Some(KeyValue::Int(i64::from(*v))),
            SqlValue::Text(s) => Some(KeyValue::Text(s.clone())),
            SqlValue::Date(d) => Some(KeyValue::DateTime(d.and_time(NaiveTime::MIN))),
            SqlValue::DateTime(dt) => Some(KeyValue::DateTime(truncate_to_millis(*dt))),
            _ => None,
        }
    }

    /// Render as a SQL literal for keyset WHERE clauses.
    #[must_use]
    pub fn to_sql_literal(&self) -> String {
        match self {
            KeyValue::Int(v) => v.to_string(),
            KeyValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            KeyValue::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S%.3f")),
        }
    }
}

/// Truncate a datetime to millisecond precision.
#[must_use]
pub fn truncate_to_millis(dt: NaiveDateTime) -> NaiveDateTime {
    chrono::DateTime::from_timestamp_millis(dt.and_utc().timestamp_millis())
        .map(|t| t.naive_utc())
        .unwrap_or(dt)
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(v) => write!(f, "{}", v),
            KeyValue::Text(s) => write!(f, "{}", s),
            KeyValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.3f")),
        }
    }
}

/// The primary-key value(s) identifying one row; composite keys hold one
/// component per key column, in key order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey(pub Vec<KeyValue>);

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

/// One chunk of a table, ordered by primary key ascending.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Column names, shared across batches of the same table.
    pub columns: Arc<Vec<String>>,

    /// Positions of the primary-key columns within `columns`, in key order.
    pub pk_indexes: Vec<usize>,

    /// Rows in this batch, each aligned with `columns`.
    pub rows: Vec<Vec<SqlValue>>,

    /// Whether this is the final batch for the table.
    pub is_last: bool,
}

impl Batch {
    /// Get the number of rows in this batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Extract the primary-key value of the row at `pos`.
    ///
    /// Returns `None` when `pos` is out of range or a key column holds a
    /// value type that cannot serve as a key.
    #[must_use]
    pub fn row_key(&self, pos: usize) -> Option<RowKey> {
        let row = self.rows.get(pos)?;
        let mut parts = Vec::with_capacity(self.pk_indexes.len());
        for &idx in &self.pk_indexes {
            parts.push(KeyValue::from_value(row.get(idx)?)?);
        }
        Some(RowKey(parts))
    }

    /// Primary key of the last row, for keyset continuation.
    #[must_use]
    pub fn last_key(&self) -> Option<RowKey> {
        if self.rows.is_empty() {
            None
        } else {
            self.row_key(self.rows.len() - 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(rows: Vec<Vec<SqlValue>>) -> Batch {
        Batch {
            columns: Arc::new(vec!["id".into(), "name".into()]),
            pk_indexes: vec![0],
            rows,
            is_last: true,
        }
    }

    #[test]
    fn test_row_key_extraction() {
        let b = batch(vec![
            vec![SqlValue::I64(1), SqlValue::Text("a".into())],
            vec![SqlValue::I64(2), SqlValue::Text("b".into())],
        ]);
        assert_eq!(b.row_key(0), Some(RowKey(vec![KeyValue::Int(1)])));
        assert_eq!(b.last_key(), Some(RowKey(vec![KeyValue::Int(2)])));
        assert_eq!(b.row_key(5), None);
    }

    #[test]
    fn test_row_key_rejects_unkeyable_types() {
        let b = batch(vec![vec![SqlValue::F64(1.5), SqlValue::Text("a".into())]]);
        assert_eq!(b.row_key(0), None);
    }

    #[test]
    fn test_composite_key_display() {
        let key = RowKey(vec![KeyValue::Int(7), KeyValue::Text("us".into())]);
        assert_eq!(key.to_string(), "7:us");
    }

    #[test]
    fn test_sql_literal_escaping() {
        assert_eq!(KeyValue::Int(42).to_sql_literal(), "42");
        assert_eq!(
            KeyValue::Text("o'brien".into()).to_sql_literal(),
            "'o''brien'"
        );
    }
}
