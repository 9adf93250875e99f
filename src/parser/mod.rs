//! Record parser
//!
//! Selects the handler table for a document's kind and schema version, walks
//! every record through the [`PathDispatcher`] and commits each record as one
//! unit of work. A failing record is reported and skipped; it never aborts
//! the rest of the document.

pub mod activity;
pub mod defaults;
pub mod dispatch;
pub(crate) mod document_link;
pub mod organisation;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::codelists::{CodelistStore, ReferenceResolver};
use crate::config::ParserConfig;
use crate::document::{Document, Element};
use crate::error::{DocumentError, ParseError, ParseResult};
use crate::hooks::{CommittedRecord, HookRegistry, PostCommitHook};
use crate::models::{EntityRef, RecordKind};
use crate::storage::PersistenceBackend;
use crate::store::{ModelStore, StoreKey};
use dispatch::{HandlerTable, PathDispatcher, RecordContext};

/// Schema generation a handler table covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Generation {
    /// Schema 1.0x, also used for unrecognised versions
    V1,
    /// Schema 2.01 to 2.03
    V2,
}

/// Map a declared schema version onto a handler table generation
pub fn select_generation(version: Option<&str>) -> Generation {
    match version.map(str::trim) {
        Some("2.01" | "2.02" | "2.03") => Generation::V2,
        _ => Generation::V1,
    }
}

/// The handler table for a record kind and generation
pub fn handler_table(kind: RecordKind, generation: Generation) -> &'static HandlerTable {
    match (kind, generation) {
        (RecordKind::Organisation, Generation::V2) => &*organisation::V2_TABLE,
        (RecordKind::Organisation, Generation::V1) => &*organisation::V1_TABLE,
        (RecordKind::Activity, Generation::V2) => &*activity::V2_TABLE,
        (RecordKind::Activity, Generation::V1) => &*activity::V1_TABLE,
    }
}

/// What the caller knows about a document before parsing it
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMetadata {
    pub kind: RecordKind,
    /// Reference of the source the document came from
    pub source_ref: String,
    /// Version announced by the source; wins over the root's `@version`
    pub declared_version: Option<String>,
}

impl SourceMetadata {
    pub fn new(kind: RecordKind, source_ref: impl Into<String>) -> Self {
        Self {
            kind,
            source_ref: source_ref.into(),
            declared_version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.declared_version = Some(version.into());
        self
    }
}

/// Result of parsing one record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RecordOutcome {
    Committed(CommittedRecord),
    Failed {
        identifier: Option<String>,
        /// Byte offset of the record element in the document
        position: u64,
        error: ParseError,
    },
}

impl RecordOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, RecordOutcome::Committed(_))
    }
}

/// Summary of a `parse_all` run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseReport {
    pub source: String,
    pub kind: RecordKind,
    /// Schema version the document was parsed with
    pub version: Option<String>,
    /// Name of the handler table used
    pub table: &'static str,
    pub sha512: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One outcome per record, in document order
    pub outcomes: Vec<RecordOutcome>,
    /// Number of records that failed
    pub errors_count: usize,
    /// Failure messages (limited to the configured maximum)
    pub errors: Vec<String>,
    /// Identifiers of records removed because the document no longer contains them
    pub pruned: Vec<String>,
    /// Number of post-commit hook failures
    pub hook_failures: usize,
    #[serde(skip)]
    max_errors: usize,
}

impl ParseReport {
    fn new(meta: &SourceMetadata, version: Option<String>, table: &'static str, sha512: &str, max_errors: usize) -> Self {
        let now = Utc::now();
        Self {
            source: meta.source_ref.clone(),
            kind: meta.kind,
            version,
            table,
            sha512: sha512.to_string(),
            started_at: now,
            finished_at: now,
            outcomes: Vec::new(),
            errors_count: 0,
            errors: Vec::new(),
            pruned: Vec::new(),
            hook_failures: 0,
            max_errors,
        }
    }

    /// Add an error (limited to the configured maximum)
    pub fn add_error(&mut self, error: String) {
        self.errors_count += 1;
        if self.errors.len() < self.max_errors {
            self.errors.push(error);
        }
    }

    /// Number of committed records
    pub fn committed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_committed()).count()
    }

    /// Number of failed records
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.committed()
    }

    /// Number of records encountered
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// The committed records, in document order
    pub fn committed_records(&self) -> impl Iterator<Item = &CommittedRecord> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            RecordOutcome::Committed(record) => Some(record),
            RecordOutcome::Failed { .. } => None,
        })
    }

    /// Export report to pretty JSON
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Format duration as human-readable string
    pub fn duration_string(&self) -> String {
        let secs = (self.finished_at - self.started_at).num_seconds().max(0);
        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else {
            format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
    }
}

/// Parses documents of one installation into a persistence backend
pub struct IatiParser<B: PersistenceBackend> {
    codelists: Box<dyn CodelistStore + Send + Sync>,
    backend: B,
    hooks: HookRegistry,
    config: ParserConfig,
}

impl<B: PersistenceBackend> IatiParser<B> {
    pub fn new(codelists: impl CodelistStore + Send + Sync + 'static, backend: B) -> Self {
        Self {
            codelists: Box::new(codelists),
            backend,
            hooks: HookRegistry::new(),
            config: ParserConfig::default(),
        }
    }

    /// Builder: replace the configuration
    pub fn with_config(mut self, config: ParserConfig) -> Self {
        self.config = config;
        self
    }

    /// Builder: add a post-commit hook
    pub fn with_hook(mut self, hook: impl PostCommitHook + 'static) -> Self {
        self.hooks.register(hook);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Parse and commit every record of a document
    ///
    /// Only document-level problems fail the call; record failures end up in
    /// the report's outcomes.
    pub fn parse_all(&self, document: &Document, meta: &SourceMetadata) -> Result<ParseReport, DocumentError> {
        let kind = meta.kind;
        check_root(document, kind)?;

        let version = resolve_version(document, meta);
        let table = handler_table(kind, select_generation(version));
        let records: Vec<&Element> = document.records(kind.record_tag()).collect();
        info!(
            source = %meta.source_ref,
            %kind,
            version = version.unwrap_or("unknown"),
            table = table.name(),
            records = records.len(),
            "Parsing document"
        );

        let mut report = ParseReport::new(
            meta,
            version.map(str::to_string),
            table.name(),
            document.sha512(),
            self.config.max_reported_errors,
        );
        let mut store = ModelStore::new();
        // Records still present in the document survive pruning even when they fail
        let seen: HashSet<String> = records
            .iter()
            .filter_map(|record| record.child_text(table.identifier_tag()))
            .map(str::to_string)
            .collect();

        for record in records {
            let identifier = record.child_text(table.identifier_tag()).map(str::to_string);
            match self.parse_record(&mut store, table, meta, version.unwrap_or_default(), record) {
                Ok(committed) => {
                    report.hook_failures += self.hooks.run(&committed);
                    report.outcomes.push(RecordOutcome::Committed(committed));
                }
                Err(error) => {
                    let label = identifier.as_deref().unwrap_or("<unidentified>");
                    warn!(source = %meta.source_ref, record = label, error = %error, "Record failed");
                    report.add_error(format!("{label}: {error}"));
                    report.outcomes.push(RecordOutcome::Failed {
                        identifier,
                        position: record.position(),
                        error,
                    });
                }
            }
        }

        if self.config.prune_missing_records {
            match self.backend.prune_records(kind, &meta.source_ref, &seen) {
                Ok(pruned) => report.pruned = pruned,
                Err(e) => warn!(source = %meta.source_ref, error = %e, "Pruning removed records failed"),
            }
        }

        report.finished_at = Utc::now();
        Ok(report)
    }

    /// Parse and commit the single record with the given identifier
    ///
    /// Errors are returned to the caller instead of being collected. A document
    /// of the wrong kind is reported as a [`ParseError::Parser`].
    pub fn parse_one(&self, document: &Document, meta: &SourceMetadata, identifier: &str) -> ParseResult<CommittedRecord> {
        let kind = meta.kind;
        check_root(document, kind)
            .map_err(|e| ParseError::parser(kind.document_tag(), document.root().tag(), e.to_string()))?;
        let version = resolve_version(document, meta);
        let table = handler_table(kind, select_generation(version));

        let mut matches = document
            .records(kind.record_tag())
            .filter(|record| record.child_text(table.identifier_tag()) == Some(identifier.trim()));
        let record = match (matches.next(), matches.next()) {
            (Some(record), None) => record,
            (None, _) => return Err(ParseError::not_found(kind.record_tag(), identifier)),
            (Some(_), Some(_)) => {
                return Err(ParseError::not_found(
                    kind.record_tag(),
                    format!("{identifier} (identifier is not unique)"),
                ));
            }
        };

        let mut store = ModelStore::new();
        let committed = self.parse_record(&mut store, table, meta, version.unwrap_or_default(), record)?;
        self.hooks.run(&committed);
        Ok(committed)
    }

    fn parse_record(
        &self,
        store: &mut ModelStore,
        table: &HandlerTable,
        meta: &SourceMetadata,
        version: &str,
        record: &Element,
    ) -> ParseResult<CommittedRecord> {
        store.reset();
        let walked = {
            let resolver = ReferenceResolver::new(self.codelists.as_ref(), &self.backend);
            let mut ctx = RecordContext::new(store, resolver, version, &meta.source_ref)
                .with_fallback_language(self.config.default_language.as_deref());
            PathDispatcher::new(table).walk(&mut ctx, record).map(|()| ctx.replaces)
        };
        let result = walked.and_then(|replaces| self.commit(meta, store, replaces));
        store.reset();
        result
    }

    /// Persist a fully walked record as one unit of work
    fn commit(&self, meta: &SourceMetadata, store: &ModelStore, replaces: Option<Uuid>) -> ParseResult<CommittedRecord> {
        let mut tx = self.backend.begin()?;
        match self.stage(&mut tx, meta, store, replaces) {
            Ok(committed) => {
                self.backend.commit(tx)?;
                Ok(committed)
            }
            Err(e) => {
                if let Err(rollback) = self.backend.rollback(tx) {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    fn stage(
        &self,
        tx: &mut B::Transaction,
        meta: &SourceMetadata,
        store: &ModelStore,
        replaces: Option<Uuid>,
    ) -> ParseResult<CommittedRecord> {
        let kind = meta.kind;
        let root_kind = kind.root_entity();
        let root = store.get(root_kind, Some(0))?;
        let identifier = root
            .identifier()
            .ok_or_else(|| ParseError::parser(kind.record_tag(), root.variant_name(), "is not a record root"))?;

        if let Some(existing) = replaces {
            self.backend.delete_children(tx, existing)?;
        }
        let record_id = self.backend.save_root(tx, kind, replaces, &meta.source_ref, root)?;

        let mut ids: HashMap<EntityRef, Uuid> = HashMap::new();
        ids.insert(EntityRef::new(root_kind, 0), record_id);
        let mut child_count = 0;

        for (key, index, entity) in store.staged() {
            if key == StoreKey::Entity(root_kind) {
                continue;
            }
            let parent = entity
                .parent()
                .ok_or_else(|| ParseError::parser(key.to_string(), entity.variant_name(), "has no parent"))?;
            let parent_id = ids.get(&parent).copied().ok_or_else(|| {
                ParseError::parser(key.to_string(), parent.to_string(), "dangling entity: parent was never staged")
            })?;
            let id = self.backend.insert(tx, record_id, parent_id, key, entity)?;
            if let StoreKey::Entity(entity_kind) = key {
                ids.insert(EntityRef::new(entity_kind, index), id);
            }
            child_count += 1;
        }

        Ok(CommittedRecord {
            id: record_id,
            kind,
            identifier: identifier.to_string(),
            replaced: replaces.is_some(),
            child_count,
            root: root.clone(),
        })
    }
}

fn check_root(document: &Document, kind: RecordKind) -> Result<(), DocumentError> {
    let found = document.root().tag();
    if found != kind.document_tag() {
        return Err(DocumentError::UnexpectedRoot {
            expected: kind.document_tag().to_string(),
            found: found.to_string(),
        });
    }
    Ok(())
}

fn resolve_version<'a>(document: &'a Document, meta: &'a SourceMetadata) -> Option<&'a str> {
    meta.declared_version
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| document.version())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codelists::{CodelistType, InMemoryCodelists};
    use crate::models::{Entity, EntityKind, Organisation};
    use crate::storage::InMemoryBackend;

    #[test]
    fn test_select_generation() {
        assert_eq!(select_generation(Some("2.03")), Generation::V2);
        assert_eq!(select_generation(Some(" 2.01 ")), Generation::V2);
        assert_eq!(select_generation(Some("1.05")), Generation::V1);
        assert_eq!(select_generation(Some("3.0")), Generation::V1);
        assert_eq!(select_generation(None), Generation::V1);
    }

    #[test]
    fn test_handler_table_selection() {
        assert_eq!(handler_table(RecordKind::Organisation, Generation::V2).name(), "organisation-2");
        assert_eq!(handler_table(RecordKind::Activity, Generation::V1).name(), "activity-1");
    }

    #[test]
    fn test_declared_version_wins() {
        let document = Document::from_root(Element::new("iati-organisations").with_attribute("version", "1.05"));
        let meta = SourceMetadata::new(RecordKind::Organisation, "test").with_version("2.03");
        assert_eq!(resolve_version(&document, &meta), Some("2.03"));

        let meta = SourceMetadata::new(RecordKind::Organisation, "test");
        assert_eq!(resolve_version(&document, &meta), Some("1.05"));
    }

    #[test]
    fn test_report_caps_error_messages() {
        let meta = SourceMetadata::new(RecordKind::Activity, "test");
        let mut report = ParseReport::new(&meta, None, "activity-1", "", 2);
        for i in 0..5 {
            report.add_error(format!("error {i}"));
        }
        assert_eq!(report.errors_count, 5);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.duration_string(), "0s");
    }

    #[test]
    fn test_dangling_child_is_parser_error() {
        let codelists = InMemoryCodelists::new().with_codes(CodelistType::Language, &["en"]);
        let parser = IatiParser::new(codelists, InMemoryBackend::new());
        let meta = SourceMetadata::new(RecordKind::Organisation, "test");

        let mut store = ModelStore::new();
        store.register(EntityKind::Organisation, Organisation::new("XM-DAC-1", "2.03", "test"));
        store.register(
            EntityKind::OrganisationName,
            Entity::TextBlock(crate::models::TextBlock {
                parent: EntityRef::new(EntityKind::OrganisationReportingOrg, 0),
            }),
        );

        let err = parser.commit(&meta, &store, None).unwrap_err();
        assert_eq!(err.kind(), "ParserError");
        assert_eq!(parser.backend().record_count(), 0);
    }
}
