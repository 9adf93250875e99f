//! In-memory persistence backend
//!
//! Keeps persisted records behind an `RwLock`. Transactions stage their
//! operations privately and apply them in one write-locked step on commit,
//! so a failed record leaves no trace.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use super::{
    PersistedEntity, PersistedRecord, PersistenceBackend, RecordLookup, StorageError, entity_id,
    record_id,
};
use crate::models::{Entity, RecordKind};
use crate::store::StoreKey;

#[derive(Debug, Default)]
struct BackendState {
    records: HashMap<Uuid, PersistedRecord>,
    entities: Vec<PersistedEntity>,
}

/// Pending operations of one unit of work
#[derive(Debug)]
pub struct InMemoryTransaction {
    id: Uuid,
    deleted_records: Vec<Uuid>,
    roots: Vec<PersistedRecord>,
    inserts: Vec<PersistedEntity>,
    ordinals: HashMap<(Uuid, StoreKey), usize>,
}

impl InMemoryTransaction {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            deleted_records: Vec::new(),
            roots: Vec::new(),
            inserts: Vec::new(),
            ordinals: HashMap::new(),
        }
    }

    /// Transaction id, for diagnostics
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Number of staged child inserts
    pub fn pending_inserts(&self) -> usize {
        self.inserts.len()
    }

    fn knows(&self, id: Uuid) -> bool {
        self.roots.iter().any(|r| r.id == id) || self.inserts.iter().any(|e| e.id == id)
    }
}

/// Transactional backend held in process memory
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: RwLock<BackendState>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The persisted record with this natural key
    pub fn record(&self, kind: RecordKind, identifier: &str) -> Option<PersistedRecord> {
        let state = self.state.read().ok()?;
        state
            .records
            .values()
            .find(|r| r.kind == kind && r.identifier == identifier)
            .cloned()
    }

    /// All persisted records of a kind, ordered by identifier
    pub fn records(&self, kind: RecordKind) -> Vec<PersistedRecord> {
        let Ok(state) = self.state.read() else {
            return Vec::new();
        };
        let mut records: Vec<_> = state
            .records
            .values()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        records
    }

    /// Child entities of a record, in insertion order
    pub fn children(&self, record_id: Uuid) -> Vec<PersistedEntity> {
        let Ok(state) = self.state.read() else {
            return Vec::new();
        };
        state
            .entities
            .iter()
            .filter(|e| e.record_id == record_id)
            .cloned()
            .collect()
    }

    /// Child entities of a record with the given type name
    pub fn children_of_type(&self, record_id: Uuid, type_name: &str) -> Vec<PersistedEntity> {
        self.children(record_id)
            .into_iter()
            .filter(|e| e.type_name == type_name)
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.state.read().map(|s| s.records.len()).unwrap_or_default()
    }

    pub fn entity_count(&self) -> usize {
        self.state.read().map(|s| s.entities.len()).unwrap_or_default()
    }
}

impl RecordLookup for InMemoryBackend {
    fn find_record(&self, kind: RecordKind, identifier: &str) -> Result<Option<Uuid>, StorageError> {
        let state = self.state.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(state
            .records
            .values()
            .find(|r| r.kind == kind && r.identifier == identifier)
            .map(|r| r.id))
    }
}

impl PersistenceBackend for InMemoryBackend {
    type Transaction = InMemoryTransaction;

    fn begin(&self) -> Result<InMemoryTransaction, StorageError> {
        Ok(InMemoryTransaction::new())
    }

    fn delete_children(&self, tx: &mut InMemoryTransaction, record_id: Uuid) -> Result<(), StorageError> {
        let state = self.state.read().map_err(|_| StorageError::LockPoisoned)?;
        if !state.records.contains_key(&record_id) {
            return Err(StorageError::RecordNotFound(record_id.to_string()));
        }
        tx.deleted_records.push(record_id);
        Ok(())
    }

    fn save_root(
        &self,
        tx: &mut InMemoryTransaction,
        kind: RecordKind,
        existing: Option<Uuid>,
        source: &str,
        root: &Entity,
    ) -> Result<Uuid, StorageError> {
        let identifier = root
            .identifier()
            .ok_or_else(|| StorageError::Backend(format!("{} is not a record root", root.variant_name())))?;
        let id = existing.unwrap_or_else(|| record_id(kind, identifier));
        tx.roots.push(PersistedRecord {
            id,
            kind,
            identifier: identifier.to_string(),
            source: source.to_string(),
            root: root.clone(),
            updated_at: Utc::now(),
        });
        Ok(id)
    }

    fn insert(
        &self,
        tx: &mut InMemoryTransaction,
        record_id: Uuid,
        parent_id: Uuid,
        key: StoreKey,
        entity: &Entity,
    ) -> Result<Uuid, StorageError> {
        if !tx.knows(parent_id) {
            return Err(StorageError::MissingParent(parent_id));
        }
        let ordinal = tx.ordinals.entry((record_id, key)).or_default();
        let id = entity_id(record_id, key, *ordinal);
        *ordinal += 1;

        tx.inserts.push(PersistedEntity {
            id,
            record_id,
            parent_id,
            type_name: key.to_string(),
            entity: entity.clone(),
        });
        Ok(id)
    }

    fn commit(&self, tx: InMemoryTransaction) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| StorageError::LockPoisoned)?;
        let InMemoryTransaction {
            id,
            deleted_records,
            roots,
            inserts,
            ..
        } = tx;

        state.entities.retain(|e| !deleted_records.contains(&e.record_id));
        for root in roots {
            state.records.insert(root.id, root);
        }
        let inserted = inserts.len();
        state.entities.extend(inserts);

        debug!(transaction = %id, inserted, "Committed transaction");
        Ok(())
    }

    fn rollback(&self, tx: InMemoryTransaction) -> Result<(), StorageError> {
        debug!(transaction = %tx.id, discarded = tx.inserts.len(), "Rolled back transaction");
        Ok(())
    }

    fn prune_records(
        &self,
        kind: RecordKind,
        source: &str,
        keep: &HashSet<String>,
    ) -> Result<Vec<String>, StorageError> {
        let mut state = self.state.write().map_err(|_| StorageError::LockPoisoned)?;
        let doomed: Vec<(Uuid, String)> = state
            .records
            .values()
            .filter(|r| r.kind == kind && r.source == source && !keep.contains(&r.identifier))
            .map(|r| (r.id, r.identifier.clone()))
            .collect();

        let ids: HashSet<Uuid> = doomed.iter().map(|(id, _)| *id).collect();
        state.records.retain(|id, _| !ids.contains(id));
        state.entities.retain(|e| !ids.contains(&e.record_id));

        let mut removed: Vec<String> = doomed.into_iter().map(|(_, identifier)| identifier).collect();
        removed.sort();
        Ok(removed)
    }
}
