//! Task orchestration.
//!
//! Drives the pipeline tasks (prepare, schema conversion, data conversion,
//! validation, report export, upload) over the source/target/cache/log
//! seams. Tasks log a stable error code at their boundary before
//! propagating, so operators can grep runs by failure site.
//!
//! Validation isolates partial failure: a table that fails a row-count check
//! or sample comparison is logged and flagged, and the run continues with
//! the remaining tables. Only infrastructure errors abort the whole task.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::cache::{MismatchCache, RedisCache};
use crate::config::Config;
use crate::convert::convert_row;
use crate::core::catalog::{SchemaCatalog, TableSchema};
use crate::core::traits::{ReadOptions, SourceReader, TargetStore};
use crate::error::{codes, MigrateError, Result};
use crate::files;
use crate::sample::{sample_positions, SamplerConfig};
use crate::source::{stream_batches, MysqlSource};
use crate::target::MongoStore;
use crate::validate::{compare_total_rows, find_false_indexes};
use crate::vlog::{render_csv, NewLogEntry, PgValidatorLog, ValidatorLogStore};

/// Outcome of one table's validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    /// Row counts matched and every sampled row compared equal.
    Ok,
    /// The table was flagged; details are in the validator log.
    Flagged,
}

/// Per-table validation result.
#[derive(Debug, Clone)]
pub struct TableValidation {
    pub table: String,
    pub status: TableStatus,
    /// Rows actually compared (sampled rows, or all rows for small tables).
    pub rows_checked: u64,
}

/// Result of a full validation run.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub database: String,
    pub tables: Vec<TableValidation>,
}

impl ValidationReport {
    /// Names of tables that did not validate cleanly.
    #[must_use]
    pub fn flagged_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| t.status == TableStatus::Flagged)
            .map(|t| t.table.as_str())
            .collect()
    }
}

/// Per-table conversion result.
#[derive(Debug, Clone)]
pub struct TableConversion {
    pub table: String,
    pub rows: u64,
}

/// Result of a full data-conversion run.
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub database: String,
    pub tables: Vec<TableConversion>,
    pub total_rows: u64,
}

/// Pipeline driver over the source, target, cache and log seams.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetStore>,
    cache: Arc<dyn MismatchCache>,
    log: Arc<dyn ValidatorLogStore>,
    cancel: watch::Receiver<bool>,
}

impl Orchestrator {
    /// Connect every backing service and build an orchestrator.
    pub async fn connect(config: Config, cancel: watch::Receiver<bool>) -> Result<Self> {
        let source = Arc::new(MysqlSource::connect(&config.source).await?);
        let target = Arc::new(MongoStore::connect(&config.target).await?);
        let cache = Arc::new(RedisCache::connect(&config.cache).await?);
        let log = Arc::new(PgValidatorLog::connect(&config.log_db).await?);

        Ok(Self {
            config,
            source,
            target,
            cache,
            log,
            cancel,
        })
    }

    /// Build an orchestrator over explicit components.
    pub fn with_components(
        config: Config,
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetStore>,
        cache: Arc<dyn MismatchCache>,
        log: Arc<dyn ValidatorLogStore>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            source,
            target,
            cache,
            log,
            cancel,
        }
    }

    /// Close the source connection pool.
    pub async fn shutdown(&self) {
        self.source.close().await;
    }

    fn check_cancelled(&self) -> Result<()> {
        if *self.cancel.borrow() {
            return Err(MigrateError::Cancelled);
        }
        Ok(())
    }

    fn platform(&self) -> Result<&crate::config::PlatformConfig> {
        self.config
            .platform
            .as_ref()
            .ok_or_else(|| MigrateError::Config("no platform configured".to_string()))
    }

    /// Cache namespace for one resource/package pair.
    #[must_use]
    pub fn cache_prefix(resource_id: &str, package_id: &str) -> String {
        format!("{}_{}_", resource_id, package_id)
    }

    /// Cache key holding the flagged row keys of one table.
    #[must_use]
    pub fn false_indexes_key(prefix: &str, table: &str) -> String {
        format!("{}false_indexes:{}", prefix, table)
    }

    /// Download the hosted dump file into the resource working directory.
    pub async fn prepare_data(
        &self,
        resource_id: &str,
        url: &str,
        file_name: &str,
    ) -> Result<PathBuf> {
        let result = self.prepare_data_inner(resource_id, url, file_name).await;
        if let Err(e) = &result {
            error!(code = codes::TASK_PREPARE_DATA_ERROR, "{}", e.format_detailed());
        }
        result
    }

    async fn prepare_data_inner(
        &self,
        resource_id: &str,
        url: &str,
        file_name: &str,
    ) -> Result<PathBuf> {
        files::check_file_extension(file_name)?;

        let platform = self.platform()?;
        let dir = files::resource_cache_dir(platform, resource_id);
        files::create_temp_dir(&dir).await?;

        let dest = dir.join(file_name);
        let client = reqwest::Client::new();
        files::download_file(&client, platform, url, &dest).await?;

        info!("Prepared dump file {}", dest.display());
        Ok(dest)
    }

    /// Import a generated schema description into the target.
    ///
    /// Drops any previous copy of the database first, so re-running a
    /// migration starts from a clean slate.
    pub async fn convert_schema(&self, database: &str, schema_file: &Path) -> Result<usize> {
        let result = self.convert_schema_inner(database, schema_file).await;
        if let Err(e) = &result {
            error!(code = codes::TASK_CONVERT_SCHEMA_ERROR, "{}", e.format_detailed());
        }
        result
    }

    async fn convert_schema_inner(&self, database: &str, schema_file: &Path) -> Result<usize> {
        let raw = tokio::fs::read_to_string(schema_file).await?;
        let tables: Vec<TableSchema> = serde_json::from_str(&raw)?;
        let count = tables.len();

        self.target.drop_database_if_exists(database).await?;
        self.target.import_schema(database, tables).await?;

        info!("Converted schema for {} tables into {}", count, database);
        Ok(count)
    }

    /// Convert every table's data, one primary-key-ordered chunk at a time.
    pub async fn convert_data(&self, database: &str) -> Result<ConversionReport> {
        let result = self.convert_data_inner(database).await;
        if let Err(e) = &result {
            error!(code = codes::TASK_CONVERT_DATA_ERROR, "{}", e.format_detailed());
        }
        result
    }

    async fn convert_data_inner(&self, database: &str) -> Result<ConversionReport> {
        let catalog = self.target.load_catalog(database).await?;
        let chunk_size = self.config.validation.chunk_size;

        let mut report = ConversionReport {
            database: database.to_string(),
            tables: Vec::new(),
            total_rows: 0,
        };

        for table in catalog.table_names() {
            self.check_cancelled()?;
            let rows = self.convert_table(&catalog, &table, chunk_size).await?;
            info!("Converted {} rows of {}.{}", rows, database, table);
            report.total_rows += rows;
            report.tables.push(TableConversion { table, rows });
        }

        info!(
            "Data conversion finished: {} rows across {} tables",
            report.total_rows,
            report.tables.len()
        );
        Ok(report)
    }

    async fn convert_table(
        &self,
        catalog: &SchemaCatalog,
        table: &str,
        chunk_size: usize,
    ) -> Result<u64> {
        let schema = catalog.table(table)?;
        let opts = ReadOptions::for_table(catalog.database(), schema, chunk_size)?;
        let datatypes = schema.datatype_map();

        let mut written = 0;
        let mut after = None;
        loop {
            self.check_cancelled()?;

            let batch = self.source.fetch_chunk(&opts, after.as_ref()).await?;
            after = batch.last_key();
            // Without a continuation key the next fetch would re-read the
            // same chunk and duplicate every row.
            if !batch.is_last && after.is_none() {
                return Err(MigrateError::UnkeyablePrimaryKey(table.to_string()));
            }

            let mut docs = Vec::with_capacity(batch.len());
            for row in &batch.rows {
                docs.push(convert_row(&batch.columns, row, &datatypes)?);
            }
            written += self
                .target
                .insert_batch(catalog.database(), table, docs)
                .await?;

            if batch.is_last {
                break;
            }
        }

        Ok(written)
    }

    /// Validate every table of a converted database.
    ///
    /// Tables that fail validation are flagged in the validator log; the run
    /// continues with the remaining tables. The mismatch cache namespace for
    /// this resource/package pair is empty when the task returns.
    pub async fn validate_data(
        &self,
        resource_id: &str,
        package_id: &str,
        database: &str,
    ) -> Result<ValidationReport> {
        let result = self
            .validate_data_inner(resource_id, package_id, database)
            .await;
        if let Err(e) = &result {
            error!(code = codes::TASK_VALIDATE_DATA_ERROR, "{}", e.format_detailed());
        }
        result
    }

    async fn validate_data_inner(
        &self,
        resource_id: &str,
        package_id: &str,
        database: &str,
    ) -> Result<ValidationReport> {
        let catalog = self.target.load_catalog(database).await?;
        let prefix = Self::cache_prefix(resource_id, package_id);

        let mut rng = match self.config.validation.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        let mut report = ValidationReport {
            database: database.to_string(),
            tables: Vec::new(),
        };

        for table in catalog.table_names() {
            self.check_cancelled()?;

            let key = Self::false_indexes_key(&prefix, &table);
            // A previous run may have died mid-table; start from a clean key
            // so stale entries never pollute this pass.
            self.cache.clear_prefix(&key).await?;

            match self.validate_table(&catalog, &table, &key, &mut rng).await {
                Ok(rows_checked) => {
                    debug!("{}.{}: COMPARED -> OK", database, table);
                    report.tables.push(TableValidation {
                        table,
                        status: TableStatus::Ok,
                        rows_checked,
                    });
                }
                Err(e) if e.is_validation_flow() => {
                    warn!("{}.{} flagged: {}", database, table, e);
                    self.log
                        .write(NewLogEntry {
                            resource_id,
                            package_id,
                            database,
                            table: &table,
                            description: &e.to_string(),
                        })
                        .await?;
                    self.cache.clear_prefix(&key).await?;
                    report.tables.push(TableValidation {
                        table,
                        status: TableStatus::Flagged,
                        rows_checked: 0,
                    });
                }
                Err(e) => {
                    // Leave no in-flight entries behind; a retry starts clean.
                    let _ = self.cache.clear_prefix(&key).await;
                    return Err(e);
                }
            }
        }

        self.cache.clear_prefix(&prefix).await?;

        let flagged = report.flagged_tables();
        if flagged.is_empty() {
            info!("Validation finished: all {} tables OK", report.tables.len());
        } else {
            warn!(
                "Validation finished: {}/{} tables flagged ({})",
                flagged.len(),
                report.tables.len(),
                flagged.join(", ")
            );
        }
        Ok(report)
    }

    /// One table's validation pass. Returns the number of rows compared.
    async fn validate_table(
        &self,
        catalog: &SchemaCatalog,
        table: &str,
        cache_key: &str,
        rng: &mut SmallRng,
    ) -> Result<u64> {
        let database = catalog.database();
        let schema = catalog.table(table)?;
        let opts = ReadOptions::for_table(database, schema, self.config.validation.chunk_size)?;
        let datatypes = schema.datatype_map();
        let pk_columns = opts.pk_columns();

        debug!("{}.{}: PENDING", database, table);

        let source_count = self.source.row_count(database, table).await?;
        let target_count = self.target.row_count(database, table).await?;
        compare_total_rows(table, source_count, target_count)?;
        debug!("{}.{}: ROW_COUNT_CHECKED ({} rows)", database, table, source_count);

        let sampler = SamplerConfig {
            chunk_size: self.config.validation.chunk_size,
            sample_percentage: self.config.validation.sample_percentage,
        };

        let mut rows_checked = 0;
        let mut rx = stream_batches(self.source.clone(), opts);
        while let Some(batch) = rx.recv().await {
            self.check_cancelled()?;
            let batch = batch?;

            let positions = sample_positions(&batch, &sampler, rng);
            debug!(
                "{}.{}: SAMPLING {} of {} rows",
                database,
                table,
                positions.len(),
                batch.len()
            );

            let keys: Vec<_> = positions
                .iter()
                .filter_map(|&pos| batch.row_key(pos))
                .collect();
            let target_docs = self
                .target
                .fetch_by_keys(database, table, &pk_columns, &keys)
                .await?;

            let false_keys = find_false_indexes(&batch, &positions, &datatypes, &target_docs)?;
            rows_checked += positions.len() as u64;

            if !false_keys.is_empty() {
                let rendered: Vec<String> =
                    false_keys.iter().map(|k| k.to_string()).collect();
                self.cache.append(cache_key, &rendered).await?;
            }
        }

        let false_indexes = self.cache.list_length(cache_key).await?;
        debug!("{}.{}: COMPARED", database, table);
        if false_indexes != 0 {
            return Err(MigrateError::ValidationIncomplete {
                table: table.to_string(),
                false_indexes,
            });
        }

        Ok(rows_checked)
    }

    /// Dump the converted database to a gzipped archive.
    ///
    /// Shells out to `mongodump`; the archive is what the upload step ships
    /// back to the hosting platform.
    pub async fn dump_data(&self, database: &str, out_dir: &Path) -> Result<PathBuf> {
        let result = self.dump_data_inner(database, out_dir).await;
        if let Err(e) = &result {
            error!(code = codes::TASK_DUMP_DATA_ERROR, "{}", e.format_detailed());
        }
        result
    }

    async fn dump_data_inner(&self, database: &str, out_dir: &Path) -> Result<PathBuf> {
        files::create_temp_dir(out_dir).await?;
        let archive = out_dir.join(format!("{}.dump.gz", database));

        let args = Self::dump_args(&self.config.target.uri, database, &archive);
        let status = tokio::process::Command::new("mongodump")
            .args(&args)
            .status()
            .await?;

        if !status.success() {
            return Err(MigrateError::DumpFailed(format!(
                "mongodump exited with {}",
                status
            )));
        }

        info!("Dumped {} to {}", database, archive.display());
        Ok(archive)
    }

    fn dump_args(uri: &str, database: &str, archive: &Path) -> Vec<String> {
        vec![
            format!("--uri={}", uri),
            format!("--db={}", database),
            "--gzip".to_string(),
            format!("--archive={}", archive.display()),
        ]
    }

    /// Export the validator log for one resource/package pair as CSV.
    pub async fn export_validator_report(
        &self,
        resource_id: &str,
        package_id: &str,
        out_dir: &Path,
    ) -> Result<PathBuf> {
        let result = self
            .export_report_inner(resource_id, package_id, out_dir)
            .await;
        if let Err(e) = &result {
            error!(
                code = codes::TASK_EXPORT_VALIDATOR_REPORT_ERROR,
                "{}",
                e.format_detailed()
            );
        }
        result
    }

    async fn export_report_inner(
        &self,
        resource_id: &str,
        package_id: &str,
        out_dir: &Path,
    ) -> Result<PathBuf> {
        let entries = self.log.fetch(resource_id, package_id).await?;
        let csv = render_csv(&entries);

        files::create_temp_dir(out_dir).await?;
        let path = out_dir.join(format!("validator_report_{}.csv", resource_id));
        tokio::fs::write(&path, csv).await?;

        info!(
            "Exported {} log entries to {}",
            entries.len(),
            path.display()
        );
        Ok(path)
    }

    /// Upload a local file back to the hosting platform.
    pub async fn upload_file(&self, resource_id: &str, path: &Path) -> Result<()> {
        let result = self.upload_file_inner(resource_id, path).await;
        if let Err(e) = &result {
            error!(code = codes::TASK_UPLOAD_DATA_ERROR, "{}", e.format_detailed());
        }
        result
    }

    async fn upload_file_inner(&self, resource_id: &str, path: &Path) -> Result<()> {
        let platform = self.platform()?;
        let client = reqwest::Client::new();
        files::upload_file(&client, platform, resource_id, path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::{
        CacheConfig, LogDbConfig, SourceConfig, TargetConfig, ValidationConfig,
    };
    use crate::core::catalog::ColumnSchema;
    use crate::core::value::{Batch, KeyValue, RowKey, SqlValue};
    use crate::vlog::MemoryValidatorLog;
    use async_trait::async_trait;
    use mongodb::bson::{Bson, Document};
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    fn test_config(chunk_size: usize) -> Config {
        Config {
            source: SourceConfig {
                host: "localhost".into(),
                port: 3306,
                user: "u".into(),
                password: "p".into(),
                max_connections: 1,
            },
            target: TargetConfig {
                uri: "mongodb://localhost".into(),
            },
            cache: CacheConfig {
                url: "redis://localhost".into(),
            },
            log_db: LogDbConfig { url: String::new() },
            platform: None,
            validation: ValidationConfig {
                chunk_size,
                sample_percentage: 0.2,
                seed: Some(7),
            },
        }
    }

    fn int_table(name: &str) -> TableSchema {
        TableSchema {
            name: name.into(),
            columns: vec![
                ColumnSchema {
                    name: "id".into(),
                    data_type: "int".into(),
                },
                ColumnSchema {
                    name: "name".into(),
                    data_type: "varchar(50)".into(),
                },
            ],
            primary_keys: vec!["id".into()],
        }
    }

    fn int_rows(n: usize) -> Vec<Vec<SqlValue>> {
        (0..n)
            .map(|i| {
                vec![
                    SqlValue::I64(i as i64),
                    SqlValue::Text(format!("row-{}", i)),
                ]
            })
            .collect()
    }

    /// In-memory source serving fixed rows, sorted by primary key.
    struct FakeSource {
        tables: HashMap<String, Vec<Vec<SqlValue>>>,
        /// Rows the source reports but which were never stored; simulates a
        /// conversion that silently dropped data.
        phantom_rows: HashMap<String, i64>,
    }

    impl FakeSource {
        fn new(tables: Vec<(&str, Vec<Vec<SqlValue>>)>) -> Self {
            Self {
                tables: tables
                    .into_iter()
                    .map(|(name, rows)| (name.to_string(), rows))
                    .collect(),
                phantom_rows: HashMap::new(),
            }
        }
    }

    #[async_trait]
    impl SourceReader for FakeSource {
        async fn row_count(&self, _database: &str, table: &str) -> Result<i64> {
            let real = self.tables.get(table).map(|r| r.len() as i64).unwrap_or(0);
            Ok(real + self.phantom_rows.get(table).copied().unwrap_or(0))
        }

        async fn fetch_chunk(&self, opts: &ReadOptions, after: Option<&RowKey>) -> Result<Batch> {
            let rows = self.tables.get(&opts.table).cloned().unwrap_or_default();

            let probe = Batch {
                columns: Arc::new(opts.columns.clone()),
                pk_indexes: opts.pk_indexes.clone(),
                rows,
                is_last: false,
            };

            let mut keyed: Vec<(RowKey, Vec<SqlValue>)> = (0..probe.len())
                .filter_map(|pos| probe.row_key(pos).map(|k| (k, probe.rows[pos].clone())))
                .collect();
            keyed.sort_by(|a, b| a.0.cmp(&b.0));

            let selected: Vec<Vec<SqlValue>> = keyed
                .into_iter()
                .filter(|(k, _)| after.map(|a| k > a).unwrap_or(true))
                .take(opts.chunk_size)
                .map(|(_, row)| row)
                .collect();

            let is_last = selected.len() < opts.chunk_size;
            Ok(Batch {
                columns: Arc::new(opts.columns.clone()),
                pk_indexes: opts.pk_indexes.clone(),
                rows: selected,
                is_last,
            })
        }

        async fn close(&self) {}
    }

    /// In-memory target with schema metadata and per-collection documents.
    #[derive(Default)]
    struct FakeTarget {
        schemas: Mutex<HashMap<String, Vec<TableSchema>>>,
        collections: Mutex<HashMap<String, Vec<Document>>>,
        dropped: Mutex<Vec<String>>,
    }

    impl FakeTarget {
        fn coll_key(database: &str, collection: &str) -> String {
            format!("{}.{}", database, collection)
        }

        async fn seed_schema(&self, database: &str, tables: Vec<TableSchema>) {
            self.schemas
                .lock()
                .await
                .insert(database.to_string(), tables);
        }

        async fn docs(&self, database: &str, collection: &str) -> Vec<Document> {
            self.collections
                .lock()
                .await
                .get(&Self::coll_key(database, collection))
                .cloned()
                .unwrap_or_default()
        }

        async fn tamper(&self, database: &str, collection: &str, pos: usize, field: &str) {
            let mut colls = self.collections.lock().await;
            let docs = colls
                .get_mut(&Self::coll_key(database, collection))
                .expect("collection exists");
            docs[pos].insert(field, Bson::String("corrupted".into()));
        }

        fn bson_key(value: &Bson) -> Option<KeyValue> {
            match value {
                Bson::Int32(v) => Some(KeyValue::Int(i64::from(*v))),
                Bson::Int64(v) => Some(KeyValue::Int(*v)),
                Bson::String(s) => Some(KeyValue::Text(s.clone())),
                Bson::DateTime(dt) => {
                    chrono::DateTime::from_timestamp_millis(dt.timestamp_millis())
                        .map(|t| KeyValue::DateTime(t.naive_utc()))
                }
                _ => None,
            }
        }

        fn doc_key(document: &Document, pk_columns: &[String]) -> Option<RowKey> {
            let mut parts = Vec::new();
            for col in pk_columns {
                parts.push(Self::bson_key(document.get(col)?)?);
            }
            Some(RowKey(parts))
        }
    }

    #[async_trait]
    impl TargetStore for FakeTarget {
        async fn load_catalog(&self, database: &str) -> Result<SchemaCatalog> {
            let tables = self
                .schemas
                .lock()
                .await
                .get(database)
                .cloned()
                .unwrap_or_default();
            SchemaCatalog::from_tables(database, tables)
        }

        async fn import_schema(&self, database: &str, tables: Vec<TableSchema>) -> Result<()> {
            self.seed_schema(database, tables).await;
            Ok(())
        }

        async fn drop_database_if_exists(&self, database: &str) -> Result<()> {
            self.dropped.lock().await.push(database.to_string());
            let key_prefix = format!("{}.", database);
            self.collections
                .lock()
                .await
                .retain(|key, _| !key.starts_with(&key_prefix));
            Ok(())
        }

        async fn insert_batch(
            &self,
            database: &str,
            collection: &str,
            docs: Vec<Document>,
        ) -> Result<u64> {
            let count = docs.len() as u64;
            self.collections
                .lock()
                .await
                .entry(Self::coll_key(database, collection))
                .or_default()
                .extend(docs);
            Ok(count)
        }

        async fn fetch_by_keys(
            &self,
            database: &str,
            collection: &str,
            pk_columns: &[String],
            keys: &[RowKey],
        ) -> Result<HashMap<RowKey, Document>> {
            let docs = self.docs(database, collection).await;
            let mut found = HashMap::new();
            for document in docs {
                if let Some(key) = Self::doc_key(&document, pk_columns) {
                    if keys.contains(&key) {
                        found.insert(key, document);
                    }
                }
            }
            Ok(found)
        }

        async fn row_count(&self, database: &str, collection: &str) -> Result<i64> {
            Ok(self.docs(database, collection).await.len() as i64)
        }
    }

    struct Fixture {
        orch: Orchestrator,
        target: Arc<FakeTarget>,
        cache: Arc<MemoryCache>,
        log: Arc<MemoryValidatorLog>,
    }

    fn fixture(source: FakeSource, target: FakeTarget, chunk_size: usize) -> Fixture {
        let target = Arc::new(target);
        let cache = Arc::new(MemoryCache::new());
        let log = Arc::new(MemoryValidatorLog::new());
        let (_tx, rx) = watch::channel(false);

        let orch = Orchestrator::with_components(
            test_config(chunk_size),
            Arc::new(source),
            target.clone(),
            cache.clone(),
            log.clone(),
            rx,
        );
        Fixture {
            orch,
            target,
            cache,
            log,
        }
    }

    #[test]
    fn test_dump_command_arguments() {
        let args = Orchestrator::dump_args(
            "mongodb://localhost:27017",
            "shop",
            Path::new("/tmp/out/shop.dump.gz"),
        );
        assert_eq!(
            args,
            vec![
                "--uri=mongodb://localhost:27017",
                "--db=shop",
                "--gzip",
                "--archive=/tmp/out/shop.dump.gz",
            ]
        );
    }

    #[test]
    fn test_cache_key_layout() {
        let prefix = Orchestrator::cache_prefix("res-1", "pkg-9");
        assert_eq!(prefix, "res-1_pkg-9_");
        assert_eq!(
            Orchestrator::false_indexes_key(&prefix, "orders"),
            "res-1_pkg-9_false_indexes:orders"
        );
    }

    #[tokio::test]
    async fn test_convert_data_moves_every_row() {
        let source = FakeSource::new(vec![("users", int_rows(25)), ("orders", int_rows(7))]);
        let target = FakeTarget::default();
        target
            .seed_schema("shop", vec![int_table("orders"), int_table("users")])
            .await;

        let f = fixture(source, target, 10);
        let report = f.orch.convert_data("shop").await.unwrap();

        assert_eq!(report.total_rows, 32);
        assert_eq!(f.target.docs("shop", "users").await.len(), 25);
        assert_eq!(f.target.docs("shop", "orders").await.len(), 7);

        // Converted documents hold the declared-type representation.
        let doc = &f.target.docs("shop", "orders").await[0];
        assert_eq!(doc.get("id"), Some(&Bson::Int64(0)));
        assert_eq!(doc.get("name"), Some(&Bson::String("row-0".into())));
    }

    #[tokio::test]
    async fn test_convert_schema_replaces_previous_import() {
        let source = FakeSource::new(vec![]);
        let target = FakeTarget::default();
        let f = fixture(source, target, 10);

        let dir = tempfile::tempdir().unwrap();
        let schema_file = dir.path().join("schema.json");
        let tables = vec![int_table("users")];
        std::fs::write(&schema_file, serde_json::to_string(&tables).unwrap()).unwrap();

        let count = f.orch.convert_schema("shop", &schema_file).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(f.target.dropped.lock().await.as_slice(), &["shop"]);

        let catalog = f.target.load_catalog("shop").await.unwrap();
        assert_eq!(catalog.table_names(), vec!["users".to_string()]);
    }

    #[tokio::test]
    async fn test_validation_passes_after_clean_conversion() {
        let source = FakeSource::new(vec![("users", int_rows(50))]);
        let target = FakeTarget::default();
        target.seed_schema("shop", vec![int_table("users")]).await;

        let f = fixture(source, target, 10);
        f.orch.convert_data("shop").await.unwrap();

        let report = f.orch.validate_data("res-1", "pkg-1", "shop").await.unwrap();
        assert_eq!(report.tables.len(), 1);
        assert_eq!(report.tables[0].status, TableStatus::Ok);
        assert!(report.tables[0].rows_checked > 0);

        assert!(f.log.all().await.is_empty());
        assert!(f.cache.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_row_count_mismatch_flags_only_that_table() {
        let mut source = FakeSource::new(vec![
            ("alpha", int_rows(12)),
            ("orders", int_rows(999)),
            ("zeta", int_rows(12)),
        ]);
        // orders reports 1000 source rows but only 999 exist in the target.
        source.phantom_rows.insert("orders".into(), 1);

        let target = FakeTarget::default();
        target
            .seed_schema(
                "shop",
                vec![int_table("alpha"), int_table("orders"), int_table("zeta")],
            )
            .await;

        let f = fixture(source, target, 10);
        f.orch.convert_data("shop").await.unwrap();

        let report = f.orch.validate_data("res-1", "pkg-1", "shop").await.unwrap();
        assert_eq!(report.flagged_tables(), vec!["orders"]);
        assert_eq!(
            report
                .tables
                .iter()
                .filter(|t| t.status == TableStatus::Ok)
                .count(),
            2
        );

        let entries = f.log.all().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].table, "orders");
        assert_eq!(entries[0].database, "shop");
        assert!(entries[0].description.contains("source=1000"));
        assert!(entries[0].description.contains("target=999"));

        assert!(f.cache.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupted_row_is_flagged_and_cache_cleared() {
        // 9 rows with chunk size 10: below the sampling threshold, so every
        // row is compared and the corruption is found deterministically.
        let source = FakeSource::new(vec![("users", int_rows(9))]);
        let target = FakeTarget::default();
        target.seed_schema("shop", vec![int_table("users")]).await;

        let f = fixture(source, target, 10);
        f.orch.convert_data("shop").await.unwrap();
        // Corrupt one stored document after conversion.
        f.target.tamper("shop", "users", 4, "name").await;

        let report = f.orch.validate_data("res-1", "pkg-1", "shop").await.unwrap();
        assert_eq!(report.flagged_tables(), vec!["users"]);

        let entries = f.log.all().await;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].description.contains("Validation incomplete"));

        assert!(f.cache.keys().await.is_empty());
    }

    /// Source whose primary-key column decodes to floats; every chunk is
    /// full and no continuation key can be extracted.
    struct FloatKeySource;

    #[async_trait]
    impl SourceReader for FloatKeySource {
        async fn row_count(&self, _database: &str, _table: &str) -> Result<i64> {
            Ok(1_000)
        }

        async fn fetch_chunk(&self, opts: &ReadOptions, _after: Option<&RowKey>) -> Result<Batch> {
            let rows = (0..opts.chunk_size)
                .map(|i| {
                    vec![
                        SqlValue::F64(i as f64),
                        SqlValue::Text(format!("row-{}", i)),
                    ]
                })
                .collect();
            Ok(Batch {
                columns: Arc::new(opts.columns.clone()),
                pk_indexes: opts.pk_indexes.clone(),
                rows,
                is_last: false,
            })
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn test_conversion_aborts_instead_of_duplicating_rows() {
        let target = FakeTarget::default();
        let mut schema = int_table("readings");
        schema.columns[0].data_type = "double".into();
        target.seed_schema("shop", vec![schema]).await;

        let target = Arc::new(target);
        let cache = Arc::new(MemoryCache::new());
        let log = Arc::new(MemoryValidatorLog::new());
        let (_tx, rx) = watch::channel(false);

        let orch = Orchestrator::with_components(
            test_config(10),
            Arc::new(FloatKeySource),
            target.clone(),
            cache,
            log,
            rx,
        );

        let err = orch.convert_data("shop").await.unwrap_err();
        assert!(matches!(err, MigrateError::UnkeyablePrimaryKey(t) if t == "readings"));

        // The guard trips before any chunk is written; no duplicates land.
        assert!(target.docs("shop", "readings").await.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_aborts_validation() {
        let source = FakeSource::new(vec![("users", int_rows(10))]);
        let target = FakeTarget::default();
        target.seed_schema("shop", vec![int_table("users")]).await;

        let target = Arc::new(target);
        let cache = Arc::new(MemoryCache::new());
        let log = Arc::new(MemoryValidatorLog::new());
        let (tx, rx) = watch::channel(false);

        let orch = Orchestrator::with_components(
            test_config(10),
            Arc::new(source),
            target.clone(),
            cache.clone(),
            log,
            rx,
        );
        orch.convert_data("shop").await.unwrap();

        tx.send(true).unwrap();
        let err = orch.validate_data("r", "p", "shop").await.unwrap_err();
        assert!(matches!(err, MigrateError::Cancelled));
    }

    #[tokio::test]
    async fn test_export_report_writes_csv() {
        let source = FakeSource::new(vec![]);
        let target = FakeTarget::default();
        let f = fixture(source, target, 10);

        f.log
            .write(NewLogEntry {
                resource_id: "res-1",
                package_id: "pkg-1",
                database: "shop",
                table: "users",
                description: "Row count mismatch for table users: source=2 target=1",
            })
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = f
            .orch
            .export_validator_report("res-1", "pkg-1", dir.path())
            .await
            .unwrap();

        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "validator_report_res-1.csv"
        );
        let csv = std::fs::read_to_string(&path).unwrap();
        assert!(csv.starts_with("log_id,resource_id,package_id,"));
        assert!(csv.contains("users"));
    }

    #[tokio::test]
    async fn test_missing_schema_metadata_aborts() {
        let source = FakeSource::new(vec![]);
        let target = FakeTarget::default();
        let f = fixture(source, target, 10);

        let err = f.orch.convert_data("nowhere").await.unwrap_err();
        assert!(matches!(err, MigrateError::SchemaUnavailable(_)));
    }
}
