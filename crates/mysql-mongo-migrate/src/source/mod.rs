//! MySQL source reader.
//!
//! Streams tables in primary-key-ordered chunks via keyset pagination.
//! Uses SQLx for connection pooling and async query execution.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::{Row, ValueRef};
use tokio::sync::mpsc;
use tracing::info;

use crate::config::SourceConfig;
use crate::core::traits::{ReadOptions, SourceReader};
use crate::core::value::{Batch, RowKey, SqlValue};
use crate::error::{MigrateError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// MySQL source reader over a SQLx pool.
pub struct MysqlSource {
    pool: MySqlPool,
}

impl MysqlSource {
    /// Create a new MySQL source from configuration.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(MySqlSslMode::Preferred);

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await?;

        // Test connection
        sqlx::query("SELECT 1").fetch_one(&pool).await?;

        info!(
            "Connected to MySQL source: {}:{}",
            config.host, config.port
        );

        Ok(Self { pool })
    }

    /// Quote a MySQL identifier.
    fn quote_ident(name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    /// Build the SELECT for one chunk, ordered by primary key ascending.
    ///
    /// Keyset continuation uses a row-constructor comparison so composite
    /// keys paginate correctly: `WHERE (a, b) > (x, y)`.
    fn build_chunk_query(opts: &ReadOptions, after: Option<&RowKey>) -> String {
        let col_list = opts
            .columns
            .iter()
            .map(|c| Self::quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let pk_cols = opts
            .pk_columns()
            .iter()
            .map(|c| Self::quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let mut query = format!(
            "SELECT {} FROM {}.{}",
            col_list,
            Self::quote_ident(&opts.database),
            Self::quote_ident(&opts.table)
        );

        if let Some(key) = after {
            let literals = key
                .0
                .iter()
                .map(|v| v.to_sql_literal())
                .collect::<Vec<_>>()
                .join(", ");
            query.push_str(&format!(" WHERE ({}) > ({})", pk_cols, literals));
        }

        query.push_str(&format!(" ORDER BY {} LIMIT {}", pk_cols, opts.chunk_size));
        query
    }

    /// Base declared type: length/precision suffix stripped, lowercased.
    /// "INT(11)" -> "int", "decimal(10,2)" -> "decimal".
    fn base_type(declared: &str) -> String {
        declared
            .split('(')
            .next()
            .unwrap_or(declared)
            .trim()
            .to_lowercase()
    }

    /// Convert a MySQL row to a SqlValue vector using declared column types.
    ///
    /// A decode failure is a data error and propagates; it must never
    /// silently become NULL.
    fn row_to_values(row: &MySqlRow, col_types: &[String]) -> Result<Vec<SqlValue>> {
        col_types
            .iter()
            .enumerate()
            .map(|(i, declared)| {
                let data_type = Self::base_type(declared);

                let is_null: bool = row.try_get_raw(i).map(|r| r.is_null()).unwrap_or(true);
                if is_null {
                    return Ok(SqlValue::Null);
                }

                let value = match data_type.as_str() {
                    // Integer types
                    "tinyint" => SqlValue::I64(i64::from(row.try_get::<i8, _>(i)?)),
                    "smallint" => SqlValue::I64(i64::from(row.try_get::<i16, _>(i)?)),
                    "mediumint" | "int" | "integer" => {
                        SqlValue::I64(i64::from(row.try_get::<i32, _>(i)?))
                    }
                    "bigint" => SqlValue::I64(row.try_get::<i64, _>(i)?),
                    "year" => SqlValue::I64(i64::from(row.try_get::<u16, _>(i)?)),

                    // Floating point
                    "float" => SqlValue::F64(f64::from(row.try_get::<f32, _>(i)?)),
                    "double" | "real" => SqlValue::F64(row.try_get::<f64, _>(i)?),

                    // Decimal
                    "decimal" | "numeric" => {
                        SqlValue::Decimal(row.try_get::<rust_decimal::Decimal, _>(i)?)
                    }

                    // Boolean
                    "bit" | "boolean" | "bool" => SqlValue::Bool(row.try_get::<bool, _>(i)?),

                    // Binary types
                    "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" => {
                        SqlValue::Bytes(row.try_get::<Vec<u8>, _>(i)?)
                    }

                    // Date/Time types
                    "date" => SqlValue::Date(row.try_get::<chrono::NaiveDate, _>(i)?),
                    "time" => SqlValue::Time(row.try_get::<chrono::NaiveTime, _>(i)?),
                    "datetime" | "timestamp" => {
                        SqlValue::DateTime(row.try_get::<chrono::NaiveDateTime, _>(i)?)
                    }

                    // Text types and everything MySQL renders as a string
                    // (char, varchar, text, enum, set, json, ...)
                    _ => SqlValue::Text(row.try_get::<String, _>(i)?),
                };
                Ok(value)
            })
            .collect()
    }
}

#[async_trait]
impl SourceReader for MysqlSource {
    async fn row_count(&self, database: &str, table: &str) -> Result<i64> {
        let query = format!(
            "SELECT COUNT(*) AS cnt FROM {}.{}",
            Self::quote_ident(database),
            Self::quote_ident(table)
        );

        let row: MySqlRow = sqlx::query(&query).fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>("cnt")?)
    }

    async fn fetch_chunk(&self, opts: &ReadOptions, after: Option<&RowKey>) -> Result<Batch> {
        let query = Self::build_chunk_query(opts, after);

        let rows: Vec<MySqlRow> = sqlx::query(&query).fetch_all(&self.pool).await?;

        let batch_rows: Vec<Vec<SqlValue>> = rows
            .iter()
            .map(|row| Self::row_to_values(row, &opts.col_types))
            .collect::<Result<_>>()?;

        let is_last = batch_rows.len() < opts.chunk_size;
        Ok(Batch {
            columns: Arc::new(opts.columns.clone()),
            pk_indexes: opts.pk_indexes.clone(),
            rows: batch_rows,
            is_last,
        })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Stream a table as a lazy sequence of primary-key-ordered batches.
///
/// Spawns a reader task that pulls chunks one at a time and sends them over
/// a bounded channel; the channel capacity of 1 keeps the reader at most one
/// chunk ahead of the consumer.
pub fn stream_batches(
    source: Arc<dyn SourceReader>,
    opts: ReadOptions,
) -> mpsc::Receiver<Result<Batch>> {
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let mut after: Option<RowKey> = None;
        loop {
            match source.fetch_chunk(&opts, after.as_ref()).await {
                Ok(batch) => {
                    let is_last = batch.is_last;
                    after = batch.last_key();
                    // A missing continuation key on a non-final chunk would
                    // refetch the same rows forever.
                    if !is_last && after.is_none() {
                        let _ = tx
                            .send(Err(MigrateError::UnkeyablePrimaryKey(opts.table.clone())))
                            .await;
                        break;
                    }
                    if tx.send(Ok(batch)).await.is_err() {
                        break; // Receiver dropped
                    }
                    if is_last {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }
        }
    });

    rx
}
