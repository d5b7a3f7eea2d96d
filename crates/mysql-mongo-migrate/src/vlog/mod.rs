//! Validator log store.
//!
//! Validation outcomes that flag a table are durable: they go to a
//! `validator_logs` table in Postgres so operators can review historic
//! findings and export them per resource.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::config::LogDbConfig;
use crate::error::{MigrateError, Result};

/// One persisted validation finding.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub log_id: String,
    pub resource_id: String,
    pub package_id: String,
    pub database: String,
    pub table: String,
    pub description: String,
    pub created_time: DateTime<Utc>,
}

/// A finding about to be written; the store assigns `log_id` and timestamp.
#[derive(Debug, Clone)]
pub struct NewLogEntry<'a> {
    pub resource_id: &'a str,
    pub package_id: &'a str,
    pub database: &'a str,
    pub table: &'a str,
    pub description: &'a str,
}

/// Durable store for validation findings.
#[async_trait]
pub trait ValidatorLogStore: Send + Sync {
    /// Persist a finding; returns the assigned log id.
    async fn write(&self, entry: NewLogEntry<'_>) -> Result<String>;

    /// All findings for one resource/package pair, newest first.
    async fn fetch(&self, resource_id: &str, package_id: &str) -> Result<Vec<LogEntry>>;
}

/// Postgres-backed validator log.
pub struct PgValidatorLog {
    pool: PgPool,
}

impl PgValidatorLog {
    /// Connect to the log database and verify connectivity.
    pub async fn connect(config: &LogDbConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&config.url)
            .await
            .map_err(|e| MigrateError::log_store("connect", e.to_string()))?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| MigrateError::log_store("connect", e.to_string()))?;

        info!("Connected to validator log database");
        Ok(Self { pool })
    }

    /// Decode one row, treating any column decode failure as a store error.
    ///
    /// `created_time` is a timestamp without time zone in the table, so it
    /// decodes as a naive datetime and is interpreted as UTC.
    fn row_to_entry(row: &PgRow) -> Result<LogEntry> {
        let decode = |e: sqlx::Error| MigrateError::log_store("fetch", e.to_string());
        let created: NaiveDateTime = row.try_get("created_time").map_err(decode)?;
        Ok(LogEntry {
            log_id: row.try_get("log_id").map_err(decode)?,
            resource_id: row.try_get("resource_id").map_err(decode)?,
            package_id: row.try_get("package_id").map_err(decode)?,
            database: row.try_get("database").map_err(decode)?,
            table: row.try_get("table").map_err(decode)?,
            description: row.try_get("description").map_err(decode)?,
            created_time: created.and_utc(),
        })
    }
}

#[async_trait]
impl ValidatorLogStore for PgValidatorLog {
    async fn write(&self, entry: NewLogEntry<'_>) -> Result<String> {
        let log_id = Uuid::new_v4().to_string();

        // "database" and "table" are reserved words, hence the quoting.
        sqlx::query(
            r#"INSERT INTO validator_logs
               (log_id, resource_id, package_id, "database", "table", description, created_time)
               VALUES ($1, $2, $3, $4, $5, $6, NOW())"#,
        )
        .bind(&log_id)
        .bind(entry.resource_id)
        .bind(entry.package_id)
        .bind(entry.database)
        .bind(entry.table)
        .bind(entry.description)
        .execute(&self.pool)
        .await
        .map_err(|e| MigrateError::log_store("write", e.to_string()))?;

        Ok(log_id)
    }

    async fn fetch(&self, resource_id: &str, package_id: &str) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query(
            r#"SELECT log_id, resource_id, package_id, "database", "table",
                      description, created_time
               FROM validator_logs
               WHERE resource_id = $1 AND package_id = $2
               ORDER BY created_time DESC"#,
        )
        .bind(resource_id)
        .bind(package_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MigrateError::log_store("fetch", e.to_string()))?;

        rows.iter().map(Self::row_to_entry).collect()
    }
}

/// In-memory log store used by tests.
#[derive(Default)]
pub struct MemoryValidatorLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryValidatorLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far, in write order.
    pub async fn all(&self) -> Vec<LogEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl ValidatorLogStore for MemoryValidatorLog {
    async fn write(&self, entry: NewLogEntry<'_>) -> Result<String> {
        let log_id = Uuid::new_v4().to_string();
        self.entries.lock().await.push(LogEntry {
            log_id: log_id.clone(),
            resource_id: entry.resource_id.to_string(),
            package_id: entry.package_id.to_string(),
            database: entry.database.to_string(),
            table: entry.table.to_string(),
            description: entry.description.to_string(),
            created_time: Utc::now(),
        });
        Ok(log_id)
    }

    async fn fetch(&self, resource_id: &str, package_id: &str) -> Result<Vec<LogEntry>> {
        let mut entries: Vec<LogEntry> = self
            .entries
            .lock()
            .await
            .iter()
            .filter(|e| e.resource_id == resource_id && e.package_id == package_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_time.cmp(&a.created_time));
        Ok(entries)
    }
}

/// Render log entries as CSV with a header row.
#[must_use]
pub fn render_csv(entries: &[LogEntry]) -> String {
    let mut out = String::from(
        "log_id,resource_id,package_id,database,table,description,created_time\n",
    );
    for entry in entries {
        let fields = [
            entry.log_id.as_str(),
            entry.resource_id.as_str(),
            entry.package_id.as_str(),
            entry.database.as_str(),
            entry.table.as_str(),
            entry.description.as_str(),
        ];
        for field in fields {
            out.push_str(&csv_field(field));
            out.push(',');
        }
        out.push_str(&entry.created_time.to_rfc3339());
        out.push('\n');
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
