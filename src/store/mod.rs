//! Per-record model store
//!
//! Staging area for the entities of the record currently being parsed. Each
//! key maps to the instances registered under it, in registration order, and
//! the store also remembers the global registration order so a commit can
//! replay it parent-before-child.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};
use crate::models::{Entity, EntityKind, StoredEntity};

/// Key of one sequence in the store
///
/// Narratives are keyed by the kind of their parent, which yields the
/// `<Parent>Narrative` type names without a separate narrative kind per parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreKey {
    Entity(EntityKind),
    Narrative(EntityKind),
}

impl From<EntityKind> for StoreKey {
    fn from(kind: EntityKind) -> Self {
        StoreKey::Entity(kind)
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKey::Entity(kind) => write!(f, "{kind}"),
            StoreKey::Narrative(parent) => write!(f, "{parent}Narrative"),
        }
    }
}

/// Staged entities of one record
#[derive(Debug, Default)]
pub struct ModelStore {
    entries: HashMap<StoreKey, Vec<Entity>>,
    order: Vec<(StoreKey, usize)>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entity and return its 0-based position under `key`
    pub fn register(&mut self, key: impl Into<StoreKey>, entity: impl Into<Entity>) -> usize {
        let key = key.into();
        let instances = self.entries.entry(key).or_default();
        instances.push(entity.into());
        let index = instances.len() - 1;
        self.order.push((key, index));
        index
    }

    /// Instance at `index`, or the most recently registered one when `index` is `None`
    pub fn get(&self, key: impl Into<StoreKey>, index: Option<usize>) -> ParseResult<&Entity> {
        let key = key.into();
        let instances = self.entries.get(&key).filter(|i| !i.is_empty()).ok_or_else(|| {
            ParseError::not_found("entity", format!("{key} (not registered in this record)"))
        })?;
        let index = index.unwrap_or(instances.len() - 1);
        instances
            .get(index)
            .ok_or_else(|| ParseError::not_found("entity", format!("{key}[{index}]")))
    }

    /// Mutable access, with the same addressing as [`ModelStore::get`]
    pub fn get_mut(&mut self, key: impl Into<StoreKey>, index: Option<usize>) -> ParseResult<&mut Entity> {
        let key = key.into();
        let instances = self
            .entries
            .get_mut(&key)
            .filter(|i| !i.is_empty())
            .ok_or_else(|| {
                ParseError::not_found("entity", format!("{key} (not registered in this record)"))
            })?;
        let index = index.unwrap_or(instances.len() - 1);
        instances
            .get_mut(index)
            .ok_or_else(|| ParseError::not_found("entity", format!("{key}[{index}]")))
    }

    /// Typed variant of [`ModelStore::get`]
    pub fn get_as<T: StoredEntity>(&self, kind: EntityKind, index: Option<usize>) -> ParseResult<&T> {
        let entity = self.get(kind, index)?;
        T::from_entity(entity).ok_or_else(|| mismatch(kind, entity))
    }

    /// Typed variant of [`ModelStore::get_mut`]
    pub fn get_as_mut<T: StoredEntity>(
        &mut self,
        kind: EntityKind,
        index: Option<usize>,
    ) -> ParseResult<&mut T> {
        let entity = self.get_mut(kind, index)?;
        let variant = entity.variant_name();
        T::from_entity_mut(entity).ok_or_else(|| {
            ParseError::parser(kind.type_name(), variant, "stored under a mismatched entity kind")
        })
    }

    /// All instances registered under `key` so far (empty when none)
    pub fn get_all(&self, key: impl Into<StoreKey>) -> &[Entity] {
        self.entries
            .get(&key.into())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Number of instances under `key`
    pub fn count(&self, key: impl Into<StoreKey>) -> usize {
        self.get_all(key).len()
    }

    /// Every staged entity in registration order
    pub fn staged(&self) -> impl Iterator<Item = (StoreKey, usize, &Entity)> + '_ {
        self.order.iter().filter_map(|(key, index)| {
            self.entries
                .get(key)
                .and_then(|instances| instances.get(*index))
                .map(|entity| (*key, *index, entity))
        })
    }

    /// Total number of staged entities
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Drop everything staged for the current record
    pub fn reset(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

fn mismatch(kind: EntityKind, entity: &Entity) -> ParseError {
    ParseError::parser(
        kind.type_name(),
        entity.variant_name(),
        "stored under a mismatched entity kind",
    )
}
