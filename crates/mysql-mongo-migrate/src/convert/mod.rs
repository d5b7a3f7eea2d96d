//! Relational-to-document type conversion.
//!
//! Maps each column value to its document-model representation according to
//! the declared relational type. Pure and deterministic: the validator
//! compares post-conversion values, so the same function drives both the
//! data-conversion phase and the expected side of a comparison.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use mongodb::bson::spec::BinarySubtype;
use mongodb::bson::{Binary, Bson, Document};
use std::collections::HashMap;

use crate::core::value::SqlValue;
use crate::error::{MigrateError, Result};

/// Document-model representation a declared relational type maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetKind {
    Int,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Date,
    Time,
    DateTime,
}

/// Classify a declared MySQL type. `None` means the type is unsupported.
fn target_kind(declared: &str) -> Option<TargetKind> {
    // Strip length/precision suffixes: "varchar(255)" -> "varchar"
    let base = declared
        .split('(')
        .next()
        .unwrap_or(declared)
        .trim()
        .to_lowercase();

    match base.as_str() {
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "year" => {
            Some(TargetKind::Int)
        }
        "float" | "double" | "real" => Some(TargetKind::Float),
        "decimal" | "numeric" => Some(TargetKind::Decimal),
        "bit" | "boolean" | "bool" => Some(TargetKind::Boolean),
        "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "enum" | "set"
        | "json" => Some(TargetKind::Text),
        "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" => {
            Some(TargetKind::Binary)
        }
        "date" => Some(TargetKind::Date),
        "time" => Some(TargetKind::Time),
        "datetime" | "timestamp" => Some(TargetKind::DateTime),
        _ => None,
    }
}

/// Convert one row to a document using the table's datatype map.
///
/// Columns missing from the datatype map fail with `UnsupportedType`, as do
/// declared types the converter does not understand.
pub fn convert_row(
    columns: &[String],
    row: &[SqlValue],
    datatypes: &HashMap<String, String>,
) -> Result<Document> {
    let mut document = Document::new();
    for (column, value) in columns.iter().zip(row) {
        let declared = datatypes.get(column).map(String::as_str).unwrap_or("");
        document.insert(column.clone(), convert_value(column, declared, value)?);
    }
    Ok(document)
}

/// Convert a single column value according to its declared type.
pub fn convert_value(column: &str, declared: &str, value: &SqlValue) -> Result<Bson> {
    let kind = target_kind(declared).ok_or_else(|| MigrateError::UnsupportedType {
        column: column.to_string(),
        data_type: declared.to_string(),
    })?;

    if value.is_null() {
        return Ok(Bson::Null);
    }

    Ok(match (kind, value) {
        (TargetKind::Int, SqlValue::I64(v)) => Bson::Int64(*v),
        (TargetKind::Int, SqlValue::Bool(v)) => Bson::Int64(i64::from(*v)),
        (TargetKind::Float, SqlValue::F64(v)) => Bson::Double(*v),
        (TargetKind::Decimal, SqlValue::Decimal(d)) => Bson::String(d.to_string()),
        (TargetKind::Boolean, SqlValue::Bool(v)) => Bson::Boolean(*v),
        // BIT columns sometimes decode as integers depending on width
        (TargetKind::Boolean, SqlValue::I64(v)) => Bson::Boolean(*v != 0),
        (TargetKind::Text, SqlValue::Text(s)) => Bson::String(s.clone()),
        (TargetKind::Binary, SqlValue::Bytes(b)) => binary(b.clone()),
        (TargetKind::Date, SqlValue::Date(d)) => date_to_bson(*d),
        (TargetKind::Time, SqlValue::Time(t)) => Bson::String(time_to_string(*t)),
        (TargetKind::DateTime, SqlValue::DateTime(dt)) => datetime_to_bson(*dt),
        // Declared type and decoded value disagree (driver quirks); fall
        // back to the value's own natural representation.
        (_, other) => value_to_bson(other),
    })
}

/// Natural document representation of a value, ignoring the declared type.
fn value_to_bson(value: &SqlValue) -> Bson {
    match value {
        SqlValue::Null => Bson::Null,
        SqlValue::Bool(v) => Bson::Boolean(*v),
        SqlValue::I64(v) => Bson::Int64(*v),
        SqlValue::F64(v) => Bson::Double(*v),
        SqlValue::Decimal(d) => Bson::String(d.to_string()),
        SqlValue::Text(s) => Bson::String(s.clone()),
        SqlValue::Bytes(b) => binary(b.clone()),
        SqlValue::Date(d) => date_to_bson(*d),
        SqlValue::Time(t) => Bson::String(time_to_string(*t)),
        SqlValue::DateTime(dt) => datetime_to_bson(*dt),
    }
}

fn binary(bytes: Vec<u8>) -> Bson {
    Bson::Binary(Binary {
        subtype: BinarySubtype::Generic,
        bytes,
    })
}

/// The document model has no date-only type; dates become midnight UTC.
fn date_to_bson(date: NaiveDate) -> Bson {
    datetime_to_bson(date.and_time(NaiveTime::MIN))
}

fn datetime_to_bson(dt: NaiveDateTime) -> Bson {
    Bson::DateTime(mongodb::bson::DateTime::from_millis(
        dt.and_utc().timestamp_millis(),
    ))
}

/// Time-of-day values become "HH:MM:SS" strings.
fn time_to_string(t: NaiveTime) -> String {
    t.format("%H:%M:%S").to_string()
}
