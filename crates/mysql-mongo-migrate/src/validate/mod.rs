//! Post-conversion row comparison.
//!
//! Verifies migrated data by comparing what the converter would produce for
//! a source row against the document actually stored in the target. Both
//! sides pass through the same conversion, so a mismatch means the stored
//! data diverged, not that the encoding differs.

use std::collections::HashMap;

use mongodb::bson::{Bson, Document};
use tracing::debug;

use crate::convert::convert_row;
use crate::core::value::{Batch, RowKey};
use crate::error::{MigrateError, Result};

/// Field added by the document store; never part of the comparison.
const TARGET_ID_FIELD: &str = "_id";

/// Compare source and target row counts for a table.
///
/// A mismatch is a validation-flow error: the caller logs it and moves on to
/// the next table rather than aborting the run.
pub fn compare_total_rows(table: &str, source: i64, target: i64) -> Result<()> {
    if source != target {
        return Err(MigrateError::RowCountMismatch {
            table: table.to_string(),
            source_count: source,
            target_count: target,
        });
    }
    Ok(())
}

/// Compare sampled rows of a batch against their stored documents.
///
/// `positions` are row indexes into `batch` (the sampler's output);
/// `target_docs` maps row keys to the documents fetched from the target.
/// Returns the keys of rows that are missing from the target or whose
/// stored document differs from the expected conversion. Conversion failures
/// propagate as errors since they indicate a schema problem, not a data
/// mismatch.
pub fn find_false_indexes(
    batch: &Batch,
    positions: &[usize],
    datatypes: &HashMap<String, String>,
    target_docs: &HashMap<RowKey, Document>,
) -> Result<Vec<RowKey>> {
    let mut false_keys = Vec::new();

    for &pos in positions {
        let row = match batch.rows.get(pos) {
            Some(row) => row,
            None => continue,
        };
        let key = match batch.row_key(pos) {
            Some(key) => key,
            None => continue,
        };

        let expected = convert_row(&batch.columns, row, datatypes)?;

        match target_docs.get(&key) {
            Some(stored) => {
                if !documents_match(&expected, stored) {
                    debug!("Row {} differs from stored document", key);
                    false_keys.push(key);
                }
            }
            None => {
                debug!("Row {} missing from target", key);
                false_keys.push(key);
            }
        }
    }

    Ok(false_keys)
}

/// Field-wise document comparison.
///
/// The target-generated `_id` is ignored. A NULL field and an absent field
/// are equivalent: drivers and dump tools disagree on whether NULL columns
/// materialize, and either form stores the same information.
fn documents_match(expected: &Document, stored: &Document) -> bool {
    for (field, want) in expected {
        let got = stored.get(field);
        if !bson_eq(Some(want), got) {
            return false;
        }
    }

    // Fields present only in the stored document (other than _id) are also
    // mismatches, unless they are null.
    for (field, got) in stored {
        if field == TARGET_ID_FIELD || expected.contains_key(field) {
            continue;
        }
        if !bson_eq(None, Some(got)) {
            return false;
        }
    }

    true
}

/// Value equality with NULL/absent equivalence and cross-width integers.
///
/// Stored documents may hold Int32 where the converter produces Int64 (for
/// example when another tool wrote the collection); numeric identity is what
/// matters.
fn bson_eq(a: Option<&Bson>, b: Option<&Bson>) -> bool {
    let a = a.filter(|v| !matches!(v, Bson::Null));
    let b = b.filter(|v| !matches!(v, Bson::Null));

    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => match (x, y) {
            (Bson::Int32(l), Bson::Int64(r)) | (Bson::Int64(r), Bson::Int32(l)) => {
                i64::from(*l) == *r
            }
            _ => x == y,
        },
        _ => false,
    }
}
