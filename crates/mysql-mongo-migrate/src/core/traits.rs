//! Core traits for the migration pipeline.
//!
//! [`SourceReader`] and [`TargetStore`] are the seams between the
//! orchestrator and the real databases; the validation state machine is
//! tested against in-memory implementations of both.

use std::collections::HashMap;

use async_trait::async_trait;
use mongodb::bson::Document;

use crate::core::catalog::{SchemaCatalog, TableSchema};
use crate::core::value::{Batch, RowKey};
use crate::error::Result;

/// Options for reading one table in chunks.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Database name.
    pub database: String,
    /// Table name.
    pub table: String,
    /// Columns to read, in ordinal order.
    pub columns: Vec<String>,
    /// Declared column types aligned with `columns`.
    pub col_types: Vec<String>,
    /// Positions of the primary-key columns within `columns`.
    pub pk_indexes: Vec<usize>,
    /// Maximum rows per chunk.
    pub chunk_size: usize,
}

impl ReadOptions {
    /// Build read options for a table from catalog metadata.
    pub fn for_table(database: &str, schema: &TableSchema, chunk_size: usize) -> Result<Self> {
        Ok(Self {
            database: database.to_string(),
            table: schema.name.clone(),
            columns: schema.column_names(),
            col_types: schema.column_types(),
            pk_indexes: schema.pk_indexes()?,
            chunk_size,
        })
    }

    /// Primary-key column names, in key order.
    #[must_use]
    pub fn pk_columns(&self) -> Vec<String> {
        self.pk_indexes
            .iter()
            .filter_map(|&i| self.columns.get(i).cloned())
            .collect()
    }
}

/// Read row counts and primary-key-ordered chunks from the relational source.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Total row count for a table.
    async fn row_count(&self, database: &str, table: &str) -> Result<i64>;

    /// Fetch the next chunk of a table, ordered by primary key ascending.
    ///
    /// `after` is the last primary key of the previous chunk; `None` starts
    /// from the beginning. The returned batch holds at most
    /// `opts.chunk_size` rows and flags `is_last` when the table is
    /// exhausted. A failure aborts the containing table's pass; there is no
    /// partial resume within a pass.
    async fn fetch_chunk(&self, opts: &ReadOptions, after: Option<&RowKey>) -> Result<Batch>;

    /// Close the connection pool.
    async fn close(&self);
}

/// Read and write document collections in the target store.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Build the schema catalog from imported schema metadata.
    ///
    /// Fails with `SchemaUnavailable` when schema conversion was never run
    /// for this database.
    async fn load_catalog(&self, database: &str) -> Result<SchemaCatalog>;

    /// Load a generated schema description into the store's catalog
    /// metadata, replacing any previous import.
    async fn import_schema(&self, database: &str, tables: Vec<TableSchema>) -> Result<()>;

    /// Drop the whole database if it exists.
    async fn drop_database_if_exists(&self, database: &str) -> Result<()>;

    /// Insert a converted batch into a collection. Returns rows written.
    async fn insert_batch(
        &self,
        database: &str,
        collection: &str,
        docs: Vec<Document>,
    ) -> Result<u64>;

    /// Fetch the documents matching the given primary keys, keyed by row key.
    ///
    /// Missing rows are simply absent from the result map.
    async fn fetch_by_keys(
        &self,
        database: &str,
        collection: &str,
        pk_columns: &[String],
        keys: &[RowKey],
    ) -> Result<HashMap<RowKey, Document>>;

    /// Total document count for a collection.
    async fn row_count(&self, database: &str, collection: &str) -> Result<i64>;
}
