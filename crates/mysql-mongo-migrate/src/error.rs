//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source database connection or query error
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// Target document store error
    #[error("Target store error: {0}")]
    Target(#[from] mongodb::error::Error),

    /// Mismatch cache service error
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// Validator log store error with context
    #[error("Validator log error: {message}\n  Context: {context}")]
    LogStore { message: String, context: String },

    /// No imported schema metadata exists for the database
    #[error("No schema metadata found for database {0} - run schema conversion first")]
    SchemaUnavailable(String),

    /// Column has a declared type the converter does not understand
    #[error("Unsupported type {data_type} for column {column}")]
    UnsupportedType { column: String, data_type: String },

    /// Table has no primary key (required for chunked streaming)
    #[error("Table {0} has no primary key - chunked streaming requires primary keys")]
    NoPrimaryKey(String),

    /// A primary-key value has a type keyset pagination cannot continue from
    /// (float, blob or NULL key columns)
    #[error("Table {0} has a primary key value unusable for keyset pagination")]
    UnkeyablePrimaryKey(String),

    /// Source and target row counts disagree for a table
    #[error("Row count mismatch for table {table}: source={source_count} target={target_count}")]
    RowCountMismatch {
        table: String,
        source_count: i64,
        target_count: i64,
    },

    /// Sampled rows disagree between source and target
    #[error("Validation incomplete for table {table}: {false_indexes} mismatched indexes")]
    ValidationIncomplete { table: String, false_indexes: u64 },

    /// Input dump file has the wrong extension
    #[error("Invalid backup file extension: {0}")]
    InvalidFileExtension(String),

    /// Download from the hosting platform failed
    #[error("Cannot download resource: {0}")]
    UnavailableResource(String),

    /// Upload to the hosting platform failed
    #[error("Cannot upload resource: {0}")]
    UploadResource(String),

    /// Temporary directory could not be created
    #[error("Cannot create temporary directory: {0}")]
    TempDirNotCreated(String),

    /// Dumping the converted database to an archive failed
    #[error("Cannot dump converted data: {0}")]
    DumpFailed(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Task was cancelled (SIGINT, etc.)
    #[error("Task cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a LogStore error with context about where it occurred
    pub fn log_store(message: impl Into<String>, context: impl Into<String>) -> Self {
        MigrateError::LogStore {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Whether this error is a recognized validation-flow signal.
    ///
    /// Validation-flow errors are recoverable at per-table granularity:
    /// the orchestrator logs them and continues with the next table.
    /// Everything else is an infrastructure or data error and aborts the task.
    #[must_use]
    pub fn is_validation_flow(&self) -> bool {
        matches!(
            self,
            MigrateError::RowCountMismatch { .. } | MigrateError::ValidationIncomplete { .. }
        )
    }

    /// Process exit code for this error, used by the CLI.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) => 2,
            MigrateError::RowCountMismatch { .. } | MigrateError::ValidationIncomplete { .. } => 3,
            MigrateError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

/// Error codes logged at task boundaries before re-raising.
pub mod codes {
    pub const TASK_PREPARE_DATA_ERROR: &str = "task_prepare_data_error";
    pub const TASK_CONVERT_SCHEMA_ERROR: &str = "task_convert_schema_error";
    pub const TASK_CONVERT_DATA_ERROR: &str = "task_convert_data_error";
    pub const TASK_VALIDATE_DATA_ERROR: &str = "task_validate_data_error";
    pub const TASK_DUMP_DATA_ERROR: &str = "task_dump_data_error";
    pub const TASK_EXPORT_VALIDATOR_REPORT_ERROR: &str = "task_export_validator_report_error";
    pub const TASK_UPLOAD_DATA_ERROR: &str = "task_upload_data_error";
    pub const TASK_UPLOAD_REPORT_ERROR: &str = "task_upload_report_error";
    pub const INPUT_FILE_EXTENSION_ERROR: &str = "input_file_extension_error";
    pub const CREATE_TEMP_DIR_ERROR: &str = "create_temp_dir_error";
    pub const DOWNLOAD_RESOURCE_ERROR: &str = "download_resource_error";
    pub const UPLOAD_RESOURCE_ERROR: &str = "upload_resource_error";
}
