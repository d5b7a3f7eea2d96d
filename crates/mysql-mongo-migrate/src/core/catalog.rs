//! Schema catalog built from the document store's imported schema metadata.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// Declared type of one relational column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column name.
    pub name: String,
    /// Declared relational data type (e.g. "int", "varchar", "datetime").
    pub data_type: String,
}

/// Imported schema metadata for one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name (also the target collection name).
    pub name: String,
    /// Columns in ordinal order.
    pub columns: Vec<ColumnSchema>,
    /// Primary-key column names, in key order.
    #[serde(default)]
    pub primary_keys: Vec<String>,
}

impl TableSchema {
    /// Column names in ordinal order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Declared types aligned with [`column_names`](Self::column_names).
    #[must_use]
    pub fn column_types(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.data_type.clone()).collect()
    }

    /// Map from column name to declared type.
    #[must_use]
    pub fn datatype_map(&self) -> HashMap<String, String> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.data_type.clone()))
            .collect()
    }

    /// Positions of the primary-key columns within the column list.
    ///
    /// Fails with `NoPrimaryKey` when the table declares no key or a key
    /// column is missing from the column list.
    pub fn pk_indexes(&self) -> Result<Vec<usize>> {
        if self.primary_keys.is_empty() {
            return Err(MigrateError::NoPrimaryKey(self.name.clone()));
        }
        self.primary_keys
            .iter()
            .map(|pk| {
                self.columns
                    .iter()
                    .position(|c| &c.name == pk)
                    .ok_or_else(|| MigrateError::NoPrimaryKey(self.name.clone()))
            })
            .collect()
    }
}

/// Per-database map from table name to column datatypes and primary keys.
///
/// Built once from the document store's imported schema metadata and
/// immutable for the duration of a task.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    database: String,
    tables: BTreeMap<String, TableSchema>,
}

impl SchemaCatalog {
    /// Build a catalog from imported table schemas.
    ///
    /// Fails with `SchemaUnavailable` when no schema metadata exists,
    /// i.e. schema conversion was never run for this database.
    pub fn from_tables(database: &str, tables: Vec<TableSchema>) -> Result<Self> {
        if tables.is_empty() {
            return Err(MigrateError::SchemaUnavailable(database.to_string()));
        }
        Ok(Self {
            database: database.to_string(),
            tables: tables.into_iter().map(|t| (t.name.clone(), t)).collect(),
        })
    }

    /// Database this catalog was built for.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Table names in deterministic (sorted) order.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Look up one table's schema.
    pub fn table(&self, name: &str) -> Result<&TableSchema> {
        self.tables.get(name).ok_or_else(|| {
            MigrateError::Config(format!(
                "table {} not present in schema metadata for {}",
                name, self.database
            ))
        })
    }
}
