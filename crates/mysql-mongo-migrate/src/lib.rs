//! # mysql-mongo-migrate
//!
//! MySQL to MongoDB migration library with sampled validation.
//!
//! This library converts relational databases into document collections and
//! verifies the result without re-reading every row:
//!
//! - **Schema import** from a generated schema description
//! - **Chunked conversion** streaming primary-key-ordered chunks
//! - **Type mapping** from declared MySQL types to BSON
//! - **Lightweight-coreset sampling** so validation cost scales with the
//!   sample, not the table
//! - **Partial-failure isolation**: a flagged table is logged and the run
//!   continues
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql_mongo_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> mysql_mongo_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let (_cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
//!     let orchestrator = Orchestrator::connect(config, cancel_rx).await?;
//!     let report = orchestrator.validate_data("res-1", "pkg-1", "sakila").await?;
//!     println!("Flagged tables: {:?}", report.flagged_tables());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod convert;
pub mod core;
pub mod error;
pub mod files;
pub mod orchestrator;
pub mod sample;
pub mod source;
pub mod target;
pub mod validate;
pub mod vlog;

// Re-exports for convenient access
pub use cache::{MemoryCache, MismatchCache, RedisCache};
pub use config::{Config, SourceConfig, TargetConfig, ValidationConfig};
pub use crate::core::catalog::{ColumnSchema, SchemaCatalog, TableSchema};
pub use crate::core::traits::{ReadOptions, SourceReader, TargetStore};
pub use crate::core::value::{Batch, KeyValue, RowKey, SqlValue};
pub use error::{MigrateError, Result};
pub use orchestrator::{
    ConversionReport, Orchestrator, TableStatus, TableValidation, ValidationReport,
};
pub use source::MysqlSource;
pub use target::MongoStore;
pub use vlog::{LogEntry, MemoryValidatorLog, PgValidatorLog, ValidatorLogStore};
