//! Codelists and reference resolution
//!
//! Codelists are closed vocabularies (currency, language, country, ...) that
//! the parser looks codes up in but never extends. [`ReferenceResolver`]
//! wraps a [`CodelistStore`] together with the persisted-record lookup so
//! handlers have one read-only entry point for every kind of reference.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{ParseError, ParseResult};
use crate::models::RecordKind;
use crate::storage::RecordLookup;

/// The codelists the parser resolves codes against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodelistType {
    Country,
    Region,
    Currency,
    Language,
    OrganisationType,
    OrganisationRole,
    DocumentCategory,
    FileFormat,
    BudgetStatus,
    BudgetType,
    RegionVocabulary,
    DescriptionType,
}

impl CodelistType {
    /// Codelist name as used in codelist files
    pub fn name(&self) -> &'static str {
        match self {
            CodelistType::Country => "country",
            CodelistType::Region => "region",
            CodelistType::Currency => "currency",
            CodelistType::Language => "language",
            CodelistType::OrganisationType => "organisation-type",
            CodelistType::OrganisationRole => "organisation-role",
            CodelistType::DocumentCategory => "document-category",
            CodelistType::FileFormat => "file-format",
            CodelistType::BudgetStatus => "budget-status",
            CodelistType::BudgetType => "budget-type",
            CodelistType::RegionVocabulary => "region-vocabulary",
            CodelistType::DescriptionType => "description-type",
        }
    }
}

impl fmt::Display for CodelistType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A resolved codelist entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Code {
    pub list: CodelistType,
    pub code: String,
}

impl Code {
    pub fn new(list: CodelistType, code: impl Into<String>) -> Self {
        Self {
            list,
            code: code.into(),
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.list, self.code)
    }
}

/// Errors raised while loading codelist files
#[derive(Debug, thiserror::Error)]
pub enum CodelistError {
    #[error("Failed to read codelists {path}: {message}")]
    Read { path: String, message: String },
    #[error("Invalid codelist YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Read-only code lookup per codelist
pub trait CodelistStore {
    /// Look a code up, returning the canonical entry when it exists
    fn lookup(&self, list: CodelistType, code: &str) -> Option<Code>;
}

#[derive(Debug, Clone, Deserialize)]
struct CodelistEntry {
    code: String,
    #[serde(default)]
    name: Option<String>,
}

/// Codelists held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCodelists {
    lists: HashMap<CodelistType, HashMap<String, Option<String>>>,
}

impl InMemoryCodelists {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add codes without display names
    pub fn with_codes(mut self, list: CodelistType, codes: &[&str]) -> Self {
        for code in codes {
            self.insert(list, *code, None);
        }
        self
    }

    /// Add or replace one entry
    pub fn insert(&mut self, list: CodelistType, code: impl Into<String>, name: Option<String>) {
        self.lists.entry(list).or_default().insert(code.into(), name);
    }

    /// Display name of an entry, if one was loaded
    pub fn name_of(&self, list: CodelistType, code: &str) -> Option<&str> {
        self.lists.get(&list)?.get(code)?.as_deref()
    }

    /// Total number of entries across all codelists
    pub fn len(&self) -> usize {
        self.lists.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load codelists from YAML
    ///
    /// The document maps codelist names to lists of entries:
    ///
    /// ```yaml
    /// currency:
    ///   - code: USD
    ///     name: US Dollar
    /// language:
    ///   - code: en
    /// ```
    pub fn from_yaml_str(content: &str) -> Result<Self, CodelistError> {
        let parsed: HashMap<CodelistType, Vec<CodelistEntry>> = serde_yaml::from_str(content)?;
        let mut codelists = Self::new();
        for (list, entries) in parsed {
            for entry in entries {
                codelists.insert(list, entry.code, entry.name);
            }
        }
        Ok(codelists)
    }

    /// Load codelists from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CodelistError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| CodelistError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml_str(&content)
    }
}

impl CodelistStore for InMemoryCodelists {
    fn lookup(&self, list: CodelistType, code: &str) -> Option<Code> {
        self.lists
            .get(&list)
            .filter(|codes| codes.contains_key(code))
            .map(|_| Code::new(list, code))
    }
}

/// Resolves codes and cross-record references for one record
///
/// Pure lookup: nothing is created or mutated through the resolver.
pub struct ReferenceResolver<'a> {
    codelists: &'a dyn CodelistStore,
    records: &'a dyn RecordLookup,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(codelists: &'a dyn CodelistStore, records: &'a dyn RecordLookup) -> Self {
        Self { codelists, records }
    }

    /// Resolve an optional code; absent or unknown codes yield `None`
    pub fn resolve_optional(&self, list: CodelistType, code: Option<&str>) -> Option<Code> {
        let code = code.map(str::trim).filter(|c| !c.is_empty())?;
        self.codelists.lookup(list, code)
    }

    /// Resolve a mandatory code
    ///
    /// An absent code is a `RequiredField` error; a present code missing from
    /// the codelist is a `FieldValidation` error citing that code.
    pub fn resolve_required(
        &self,
        list: CodelistType,
        code: Option<&str>,
        context: &str,
        field: &str,
    ) -> ParseResult<Code> {
        let code = code
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ParseError::required(context, field, "required attribute missing"))?;
        self.codelists.lookup(list, code).ok_or_else(|| {
            ParseError::invalid_value(
                context,
                field,
                format!("not found on the accompanying {list} codelist"),
                code,
            )
        })
    }

    /// Best-effort lookup of a persisted organisation by identifier
    pub fn find_organisation(&self, identifier: Option<&str>) -> Option<Uuid> {
        self.find_record(RecordKind::Organisation, identifier)
    }

    /// Best-effort lookup of a persisted activity by identifier
    pub fn find_activity(&self, identifier: Option<&str>) -> Option<Uuid> {
        self.find_record(RecordKind::Activity, identifier)
    }

    /// Persisted record a newly parsed record will replace
    ///
    /// Unlike the best-effort lookups, storage failures propagate.
    pub fn existing_record(&self, kind: RecordKind, identifier: &str) -> ParseResult<Option<Uuid>> {
        Ok(self.records.find_record(kind, identifier)?)
    }

    fn find_record(&self, kind: RecordKind, identifier: Option<&str>) -> Option<Uuid> {
        let identifier = identifier.map(str::trim).filter(|i| !i.is_empty())?;
        match self.records.find_record(kind, identifier) {
            Ok(found) => found,
            Err(e) => {
                debug!(%kind, identifier, error = %e, "Cross-record lookup failed, leaving reference unresolved");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryBackend;

    fn codelists() -> InMemoryCodelists {
        InMemoryCodelists::new()
            .with_codes(CodelistType::Currency, &["USD", "EUR"])
            .with_codes(CodelistType::Language, &["en", "fr"])
    }

    #[test]
    fn test_resolve_optional() {
        let lists = codelists();
        let backend = InMemoryBackend::new();
        let resolver = ReferenceResolver::new(&lists, &backend);

        assert_eq!(
            resolver.resolve_optional(CodelistType::Currency, Some("USD")),
            Some(Code::new(CodelistType::Currency, "USD"))
        );
        assert_eq!(resolver.resolve_optional(CodelistType::Currency, Some("XXX")), None);
        assert_eq!(resolver.resolve_optional(CodelistType::Currency, None), None);
        assert_eq!(resolver.resolve_optional(CodelistType::Currency, Some("  ")), None);
    }

    #[test]
    fn test_resolve_required_missing_vs_unknown() {
        let lists = codelists();
        let backend = InMemoryBackend::new();
        let resolver = ReferenceResolver::new(&lists, &backend);

        let missing = resolver
            .resolve_required(CodelistType::Currency, None, "budget/value", "currency")
            .unwrap_err();
        assert_eq!(missing.kind(), "RequiredFieldError");

        let unknown = resolver
            .resolve_required(CodelistType::Currency, Some("XXX"), "budget/value", "currency")
            .unwrap_err();
        assert!(matches!(
            unknown,
            ParseError::FieldValidation { value: Some(ref v), .. } if v == "XXX"
        ));
    }

    #[test]
    fn test_unknown_cross_record_reference_is_none() {
        let lists = codelists();
        let backend = InMemoryBackend::new();
        let resolver = ReferenceResolver::new(&lists, &backend);
        assert_eq!(resolver.find_organisation(Some("XM-DAC-404")), None);
        assert_eq!(resolver.find_activity(None), None);
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
currency:
  - code: USD
    name: US Dollar
organisation-type:
  - code: "10"
  - code: "40"
"#;
        let lists = InMemoryCodelists::from_yaml_str(yaml).unwrap();
        assert_eq!(lists.len(), 3);
        assert!(lists.lookup(CodelistType::OrganisationType, "40").is_some());
        assert_eq!(lists.name_of(CodelistType::Currency, "USD"), Some("US Dollar"));
    }

    #[test]
    fn test_from_yaml_rejects_unknown_list() {
        let result = InMemoryCodelists::from_yaml_str("flavour:\n  - code: x\n");
        assert!(matches!(result, Err(CodelistError::Yaml(_))));
    }

    #[test]
    fn test_from_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "language:\n  - code: en").unwrap();
        let lists = InMemoryCodelists::from_file(file.path()).unwrap();
        assert!(lists.lookup(CodelistType::Language, "en").is_some());
    }
}
