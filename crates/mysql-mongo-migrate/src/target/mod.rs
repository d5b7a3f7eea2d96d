//! MongoDB target store.
//!
//! One collection per migrated table, plus a metadata collection holding the
//! imported relational schema the catalog is built from.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::Client;
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::core::catalog::{SchemaCatalog, TableSchema};
use crate::core::traits::TargetStore;
use crate::core::value::{KeyValue, RowKey};
use crate::error::Result;

/// Collection holding the imported schema metadata for a database.
const SCHEMA_COLLECTION: &str = "_schema";

/// MongoDB target store.
pub struct MongoStore {
    client: Client,
}

impl MongoStore {
    /// Create a new store from configuration and verify connectivity.
    pub async fn connect(config: &TargetConfig) -> Result<Self> {
        let client = Client::with_uri_str(&config.uri).await?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;

        info!("Connected to MongoDB target");
        Ok(Self { client })
    }

    /// Encode a key component the same way the converter stores it.
    fn key_to_bson(value: &KeyValue) -> Bson {
        match value {
            KeyValue::Int(v) => Bson::Int64(*v),
            KeyValue::Text(s) => Bson::String(s.clone()),
            KeyValue::DateTime(dt) => Bson::DateTime(mongodb::bson::DateTime::from_millis(
                dt.and_utc().timestamp_millis(),
            )),
        }
    }

    /// Recover a key component from a stored document field.
    fn bson_to_key(value: &Bson) -> Option<KeyValue> {
        match value {
            Bson::Int32(v) => Some(KeyValue::Int(i64::from(*v))),
            Bson::Int64(v) => Some(KeyValue::Int(*v)),
            Bson::String(s) => Some(KeyValue::Text(s.clone())),
            Bson::DateTime(dt) => chrono::DateTime::from_timestamp_millis(dt.timestamp_millis())
                .map(|t| KeyValue::DateTime(t.naive_utc())),
            _ => None,
        }
    }

    /// Extract the row key of a stored document.
    fn doc_key(document: &Document, pk_columns: &[String]) -> Option<RowKey> {
        let mut parts = Vec::with_capacity(pk_columns.len());
        for col in pk_columns {
            parts.push(Self::bson_to_key(document.get(col)?)?);
        }
        Some(RowKey(parts))
    }
}

#[async_trait]
impl TargetStore for MongoStore {
    async fn load_catalog(&self, database: &str) -> Result<SchemaCatalog> {
        let coll = self
            .client
            .database(database)
            .collection::<Document>(SCHEMA_COLLECTION);

        let cursor = coll.find(doc! {}).await?;
        let docs: Vec<Document> = cursor.try_collect().await?;

        let mut tables = Vec::with_capacity(docs.len());
        for document in docs {
            match mongodb::bson::from_document::<TableSchema>(document) {
                Ok(table) => tables.push(table),
                Err(e) => warn!("Skipping malformed schema metadata entry: {}", e),
            }
        }

        SchemaCatalog::from_tables(database, tables)
    }

    async fn import_schema(&self, database: &str, tables: Vec<TableSchema>) -> Result<()> {
        let coll = self
            .client
            .database(database)
            .collection::<Document>(SCHEMA_COLLECTION);

        coll.drop().await?;

        let mut docs = Vec::with_capacity(tables.len());
        for table in &tables {
            let doc = mongodb::bson::to_document(table).map_err(mongodb::error::Error::from)?;
            docs.push(doc);
        }
        if !docs.is_empty() {
            coll.insert_many(docs).await?;
        }

        info!(
            "Imported schema metadata for {} tables into {}",
            tables.len(),
            database
        );
        Ok(())
    }

    async fn drop_database_if_exists(&self, database: &str) -> Result<()> {
        self.client.database(database).drop().await?;
        debug!("Dropped database {}", database);
        Ok(())
    }

    async fn insert_batch(
        &self,
        database: &str,
        collection: &str,
        docs: Vec<Document>,
    ) -> Result<u64> {
        if docs.is_empty() {
            return Ok(0);
        }

        let count = docs.len() as u64;
        self.client
            .database(database)
            .collection::<Document>(collection)
            .insert_many(docs)
            .await?;

        Ok(count)
    }

    async fn fetch_by_keys(
        &self,
        database: &str,
        collection: &str,
        pk_columns: &[String],
        keys: &[RowKey],
    ) -> Result<HashMap<RowKey, Document>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let clauses: Vec<Document> = keys
            .iter()
            .map(|key| {
                let mut clause = Document::new();
                for (col, part) in pk_columns.iter().zip(&key.0) {
                    clause.insert(col.clone(), Self::key_to_bson(part));
                }
                clause
            })
            .collect();

        let coll = self
            .client
            .database(database)
            .collection::<Document>(collection);

        let mut cursor = coll.find(doc! { "$or": clauses }).await?;
        let mut found = HashMap::with_capacity(keys.len());

        while let Some(document) = cursor.try_next().await? {
            match Self::doc_key(&document, pk_columns) {
                Some(key) => {
                    found.insert(key, document);
                }
                None => warn!(
                    "Document in {}.{} has no extractable primary key",
                    database, collection
                ),
            }
        }

        Ok(found)
    }

    async fn row_count(&self, database: &str, collection: &str) -> Result<i64> {
        let count = self
            .client
            .database(database)
            .collection::<Document>(collection)
            .count_documents(doc! {})
            .await?;

        Ok(count as i64)
    }
}
