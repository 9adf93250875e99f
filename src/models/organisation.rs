//! Organisation record root

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::codelists::Code;

static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[/:]").unwrap());
static DROPPED: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[\s'"]"#).unwrap());

/// Normalize a natural key for URL-safe lookups
///
/// `/` and `:` become `-`; whitespace and quotes are removed.
pub fn normalize_identifier(identifier: &str) -> String {
    let replaced = SEPARATORS.replace_all(identifier.trim(), "-");
    DROPPED.replace_all(&replaced, "").into_owned()
}

/// Primary entity of an organisation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organisation {
    pub identifier: String,
    pub normalized_identifier: String,
    pub primary_name: Option<String>,
    pub last_updated_datetime: Option<DateTime<Utc>>,
    pub default_language: Option<Code>,
    pub default_currency: Option<Code>,
    /// Schema version the record was parsed with
    pub version: String,
    /// Reference of the source document
    pub source: String,
}

impl Organisation {
    pub fn new(identifier: impl Into<String>, version: impl Into<String>, source: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self {
            normalized_identifier: normalize_identifier(&identifier),
            identifier,
            primary_name: None,
            last_updated_datetime: None,
            default_language: None,
            default_currency: None,
            version: version.into(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(normalize_identifier(" XM-DAC-1 "), "XM-DAC-1");
        assert_eq!(normalize_identifier("GB-COH/123:4"), "GB-COH-123-4");
        assert_eq!(normalize_identifier("NL-KVK 'x y'"), "NL-KVKxy");
    }

    #[test]
    fn test_new_sets_normalized_identifier() {
        let org = Organisation::new("GB/1", "2.02", "test-org");
        assert_eq!(org.normalized_identifier, "GB-1");
        assert_eq!(org.primary_name, None);
    }
}
