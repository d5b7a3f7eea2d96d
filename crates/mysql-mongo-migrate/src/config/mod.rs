//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml_with_defaults() {
        let yaml = r#"
source:
  host: localhost
  user: root
  password: secret
target:
  uri: mongodb://localhost:27017
cache:
  url: redis://127.0.0.1:6379
log_db:
  url: postgres://postgres:pw@localhost/validator
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.source.port, 3306);
        assert_eq!(config.validation.chunk_size, 10_000);
        assert!((config.validation.sample_percentage - 0.2).abs() < f64::EPSILON);
        assert!(config.validation.seed.is_none());
        assert!(config.platform.is_none());
    }

    #[test]
    fn test_from_yaml_rejects_invalid() {
        let yaml = r#"
source:
  host: ""
  user: root
  password: secret
target:
  uri: mongodb://localhost:27017
cache:
  url: redis://127.0.0.1:6379
log_db:
  url: postgres://postgres:pw@localhost/validator
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }
}
