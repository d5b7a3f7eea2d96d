//! Configuration type definitions.

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MySQL).
    pub source: SourceConfig,

    /// Target document store configuration (MongoDB).
    pub target: TargetConfig,

    /// Mismatch cache configuration (Redis).
    pub cache: CacheConfig,

    /// Validator log database configuration (PostgreSQL).
    pub log_db: LogDbConfig,

    /// Hosting platform for dump download / report upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<PlatformConfig>,

    /// Validation behavior configuration.
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Source database (MySQL) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Maximum pool connections (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Target document store (MongoDB) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// MongoDB connection string.
    pub uri: String,
}

/// Mismatch cache (Redis) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Redis connection URL.
    pub url: String,
}

/// Validator log database (PostgreSQL) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogDbConfig {
    /// PostgreSQL connection URL.
    pub url: String,
}

/// Hosting platform configuration for file transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Endpoint for registering uploaded resources.
    pub upload_url: String,

    /// API key sent with every request.
    pub api_key: String,

    /// Local cache directory for downloads and reports
    /// (default: "dataconv_cache").
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
}

/// Validation behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Rows per streamed chunk; also the threshold below which a batch is
    /// validated in full instead of sampled (default: 10000).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Fraction of each full-size chunk to sample (default: 0.2).
    #[serde(default = "default_sample_percentage")]
    pub sample_percentage: f64,

    /// Seed for the sampling RNG. Unset means seeded from entropy;
    /// set for reproducible runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            sample_percentage: default_sample_percentage(),
            seed: None,
        }
    }
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_max_connections() -> u32 {
    4
}

fn default_cache_dir() -> String {
    "dataconv_cache".to_string()
}

fn default_chunk_size() -> usize {
    10_000
}

fn default_sample_percentage() -> f64 {
    0.2
}
