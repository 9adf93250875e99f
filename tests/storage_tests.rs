//! Persistence and commit protocol tests

use std::collections::HashSet;
use std::sync::Mutex;

use uuid::Uuid;

use iati_ingest::codelists::{CodelistType, InMemoryCodelists};
use iati_ingest::document::Document;
use iati_ingest::error::ParseError;
use iati_ingest::models::{Entity, RecordKind};
use iati_ingest::parser::{IatiParser, RecordOutcome, SourceMetadata};
use iati_ingest::storage::{
    InMemoryBackend, InMemoryTransaction, PersistenceBackend, RecordLookup, StorageError, record_id,
};
use iati_ingest::store::StoreKey;

/// Delegates to an in-memory backend but refuses inserts of one entity type
#[derive(Default)]
struct FailingBackend {
    inner: InMemoryBackend,
    fail_on: Mutex<Option<String>>,
}

impl FailingBackend {
    fn fail_on(&self, type_name: Option<&str>) {
        *self.fail_on.lock().unwrap() = type_name.map(str::to_string);
    }
}

impl RecordLookup for FailingBackend {
    fn find_record(&self, kind: RecordKind, identifier: &str) -> Result<Option<Uuid>, StorageError> {
        self.inner.find_record(kind, identifier)
    }
}

impl PersistenceBackend for FailingBackend {
    type Transaction = InMemoryTransaction;

    fn begin(&self) -> Result<InMemoryTransaction, StorageError> {
        self.inner.begin()
    }

    fn delete_children(&self, tx: &mut InMemoryTransaction, record_id: Uuid) -> Result<(), StorageError> {
        self.inner.delete_children(tx, record_id)
    }

    fn save_root(
        &self,
        tx: &mut InMemoryTransaction,
        kind: RecordKind,
        existing: Option<Uuid>,
        source: &str,
        root: &Entity,
    ) -> Result<Uuid, StorageError> {
        self.inner.save_root(tx, kind, existing, source, root)
    }

    fn insert(
        &self,
        tx: &mut InMemoryTransaction,
        record_id: Uuid,
        parent_id: Uuid,
        key: StoreKey,
        entity: &Entity,
    ) -> Result<Uuid, StorageError> {
        let fail = self
            .fail_on
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?
            .as_deref()
            == Some(key.to_string().as_str());
        if fail {
            return Err(StorageError::Backend(format!("cannot store {key}")));
        }
        self.inner.insert(tx, record_id, parent_id, key, entity)
    }

    fn commit(&self, tx: InMemoryTransaction) -> Result<(), StorageError> {
        self.inner.commit(tx)
    }

    fn rollback(&self, tx: InMemoryTransaction) -> Result<(), StorageError> {
        self.inner.rollback(tx)
    }

    fn prune_records(
        &self,
        kind: RecordKind,
        source: &str,
        keep: &HashSet<String>,
    ) -> Result<Vec<String>, StorageError> {
        self.inner.prune_records(kind, source, keep)
    }
}

fn codelists() -> InMemoryCodelists {
    InMemoryCodelists::new()
        .with_codes(CodelistType::Language, &["en"])
        .with_codes(CodelistType::Currency, &["USD"])
}

fn meta() -> SourceMetadata {
    SourceMetadata::new(RecordKind::Organisation, "test-source")
}

fn document(budget: &str) -> Document {
    Document::parse(&format!(
        r#"<iati-organisations version="2.02">
            <iati-organisation xml:lang="en" default-currency="USD">
                <organisation-identifier>XM-DAC-1</organisation-identifier>
                <name><narrative>Example Org</narrative></name>
                <total-budget><value>{budget}</value></total-budget>
            </iati-organisation>
        </iati-organisations>"#
    ))
    .unwrap()
}

mod rollback_tests {
    use super::*;

    #[test]
    fn test_failed_insert_leaves_nothing_behind() {
        let parser = IatiParser::new(codelists(), FailingBackend::default());
        parser.backend().fail_on(Some("TotalBudget"));

        let report = parser.parse_all(&document("1000"), &meta()).unwrap();
        assert_eq!(report.committed(), 0);
        match &report.outcomes[0] {
            RecordOutcome::Failed { error, .. } => {
                assert_eq!(error.kind(), "StorageError");
                assert!(matches!(error, ParseError::Storage { source: StorageError::Backend(_) }));
            }
            RecordOutcome::Committed(_) => panic!("record should have failed"),
        }
        assert_eq!(parser.backend().inner.record_count(), 0);
        assert_eq!(parser.backend().inner.entity_count(), 0);
    }

    #[test]
    fn test_failed_replace_keeps_previous_version() {
        let parser = IatiParser::new(codelists(), FailingBackend::default());
        parser.parse_all(&document("1000"), &meta()).unwrap();

        let record = parser.backend().inner.record(RecordKind::Organisation, "XM-DAC-1").unwrap();
        let before = parser.backend().inner.children(record.id);

        parser.backend().fail_on(Some("TotalBudget"));
        let report = parser.parse_all(&document("2000"), &meta()).unwrap();
        assert_eq!(report.failed(), 1);

        assert_eq!(parser.backend().inner.children(record.id), before);
        let budget = parser.backend().inner.children_of_type(record.id, "TotalBudget");
        let Entity::Budget(budget) = &budget[0].entity else {
            panic!("expected a budget");
        };
        assert_eq!(budget.value.as_ref().unwrap().amount, "1000");

        parser.backend().fail_on(None);
        let report = parser.parse_all(&document("2000"), &meta()).unwrap();
        assert_eq!(report.committed(), 1);
    }

    #[test]
    fn test_parse_one_surfaces_storage_error() {
        let parser = IatiParser::new(codelists(), FailingBackend::default());
        parser.backend().fail_on(Some("OrganisationNameNarrative"));
        let err = parser.parse_one(&document("1"), &meta(), "XM-DAC-1").unwrap_err();
        assert!(matches!(err, ParseError::Storage { .. }));
    }
}

mod persisted_shape_tests {
    use super::*;

    #[test]
    fn test_children_follow_parent_before_child_order() {
        let parser = IatiParser::new(codelists(), InMemoryBackend::new());
        parser.parse_all(&document("1000"), &meta()).unwrap();

        let record = parser.backend().record(RecordKind::Organisation, "XM-DAC-1").unwrap();
        let children = parser.backend().children(record.id);
        let types: Vec<&str> = children.iter().map(|c| c.type_name.as_str()).collect();
        assert_eq!(types, vec!["OrganisationName", "OrganisationNameNarrative", "TotalBudget"]);

        let name = &children[0];
        assert_eq!(name.parent_id, record.id);
        assert_eq!(children[1].parent_id, name.id);
    }

    #[test]
    fn test_record_ids_are_deterministic() {
        let first = IatiParser::new(codelists(), InMemoryBackend::new());
        let second = IatiParser::new(codelists(), InMemoryBackend::new());
        let a = first.parse_one(&document("1"), &meta(), "XM-DAC-1").unwrap();
        let b = second.parse_one(&document("1"), &meta(), "XM-DAC-1").unwrap();

        assert_eq!(a.id, b.id);
        assert_eq!(a.id, record_id(RecordKind::Organisation, "XM-DAC-1"));
        assert_eq!(
            first.backend().children(a.id).iter().map(|c| c.id).collect::<Vec<_>>(),
            second.backend().children(b.id).iter().map(|c| c.id).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_same_identifier_different_kinds_do_not_collide() {
        assert_ne!(
            record_id(RecordKind::Organisation, "XM-DAC-1"),
            record_id(RecordKind::Activity, "XM-DAC-1")
        );
    }
}
