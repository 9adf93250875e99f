//! Parser configuration types

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors raised while loading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {message}")]
    Read { path: String, message: String },
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Installation-wide parser settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ParserConfig {
    /// Language used when a record root carries no `xml:lang`
    pub default_language: Option<String>,
    /// Delete persisted records of the same source that were not seen in a full parse
    pub prune_missing_records: bool,
    /// Maximum number of error messages kept in a report digest
    pub max_reported_errors: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            default_language: None,
            prune_missing_records: false,
            max_reported_errors: 100,
        }
    }
}

impl ParserConfig {
    /// Create a new parser config
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the installation default language
    pub fn with_default_language(mut self, code: impl Into<String>) -> Self {
        self.default_language = Some(code.into().to_lowercase());
        self
    }

    /// Enable pruning of records missing from a re-parsed source
    pub fn with_prune_missing_records(mut self, prune: bool) -> Self {
        self.prune_missing_records = prune;
        self
    }

    /// Set the error digest cap
    pub fn with_max_reported_errors(mut self, max: usize) -> Self {
        self.max_reported_errors = max;
        self
    }

    /// Parse a config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: ParserConfig = toml::from_str(content)?;
        config.default_language = config.default_language.map(|code| code.to_lowercase());
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Check the settings for obvious mistakes
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(code) = &self.default_language
            && code.trim().is_empty()
        {
            return Err(ConfigError::Invalid(
                "default-language must not be empty".to_string(),
            ));
        }
        if self.max_reported_errors == 0 {
            return Err(ConfigError::Invalid(
                "max-reported-errors must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ParserConfig::default();
        assert_eq!(config.default_language, None);
        assert!(!config.prune_missing_records);
        assert_eq!(config.max_reported_errors, 100);
    }

    #[test]
    fn test_builder() {
        let config = ParserConfig::new()
            .with_default_language("EN")
            .with_prune_missing_records(true)
            .with_max_reported_errors(5);
        assert_eq!(config.default_language.as_deref(), Some("en"));
        assert!(config.prune_missing_records);
        assert_eq!(config.max_reported_errors, 5);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = ParserConfig::from_toml_str("default-language = \"FR\"\n").unwrap();
        assert_eq!(config.default_language.as_deref(), Some("fr"));
        assert_eq!(config.max_reported_errors, 100);
    }

    #[test]
    fn test_from_toml_rejects_zero_cap() {
        let result = ParserConfig::from_toml_str("max-reported-errors = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "prune-missing-records = true").unwrap();
        let config = ParserConfig::from_file(file.path()).unwrap();
        assert!(config.prune_missing_records);
    }

    #[test]
    fn test_from_missing_file() {
        let result = ParserConfig::from_file("/nonexistent/parser.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
