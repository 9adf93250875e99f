//! Path dispatch
//!
//! A [`HandlerTable`] maps the canonical path of an element (tag names from
//! the record root down to the element, hyphens replaced by underscores,
//! joined with `__`) to the handler that builds or updates entities for it.
//! [`PathDispatcher`] walks a record subtree parent-before-children and calls
//! the handler registered for each path. Elements without a handler are
//! skipped, but their children are still visited.
//!
//! Handlers address "the current X" through [`RecordContext`], which lives
//! exactly as long as one record's parse.

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use crate::codelists::{CodelistType, Code, ReferenceResolver};
use crate::document::Element;
use crate::error::{ParseError, ParseResult};
use crate::models::{EntityKind, EntityRef, StoredEntity};
use crate::parser::defaults::RecordDefaults;
use crate::store::{ModelStore, StoreKey};

/// Separator between path segments
pub const PATH_SEPARATOR: &str = "__";

/// What the dispatcher does after a handler ran
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Visit {
    /// Visit the element's own children
    #[default]
    Descend,
    /// Visit the children of a replacement element instead
    Redirect(Element),
    /// Do not visit any children
    SkipChildren,
}

/// Signature of an element handler
pub type Handler = Box<dyn Fn(&mut RecordContext<'_>, &Element) -> ParseResult<Visit> + Send + Sync>;

/// Normalize one tag name into a path segment
pub fn normalize_segment(tag: &str) -> String {
    tag.replace('-', "_")
}

/// Canonical path from a sequence of tag names
pub fn canonical_path<'a>(tags: impl IntoIterator<Item = &'a str>) -> String {
    tags.into_iter()
        .map(normalize_segment)
        .collect::<Vec<_>>()
        .join(PATH_SEPARATOR)
}

/// Path-to-handler mapping for one schema generation
pub struct HandlerTable {
    name: &'static str,
    record_tag: &'static str,
    identifier_tag: &'static str,
    handlers: HashMap<String, Handler>,
}

impl HandlerTable {
    pub fn new(name: &'static str, record_tag: &'static str, identifier_tag: &'static str) -> Self {
        Self {
            name,
            record_tag,
            identifier_tag,
            handlers: HashMap::new(),
        }
    }

    /// Table name, e.g. `organisation-2`
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Tag of the record root element
    pub fn record_tag(&self) -> &'static str {
        self.record_tag
    }

    /// Tag of the element holding the record's natural key
    pub fn identifier_tag(&self) -> &'static str {
        self.identifier_tag
    }

    /// Register a handler for a slash-separated path relative to the record root
    ///
    /// An empty path addresses the record root itself.
    pub fn register<F>(&mut self, relative: &str, handler: F)
    where
        F: Fn(&mut RecordContext<'_>, &Element) -> ParseResult<Visit> + Send + Sync + 'static,
    {
        let path = canonical_path(
            std::iter::once(self.record_tag).chain(relative.split('/').filter(|s| !s.is_empty())),
        );
        self.handlers.insert(path, Box::new(handler));
    }

    pub fn get(&self, path: &str) -> Option<&Handler> {
        self.handlers.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.handlers.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered paths, sorted
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerTable")
            .field("name", &self.name)
            .field("record_tag", &self.record_tag)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// State scoped to the parse of one record
///
/// Created when a record starts and dropped when it ends, so nothing here
/// can leak into the next record.
pub struct RecordContext<'a> {
    store: &'a mut ModelStore,
    resolver: ReferenceResolver<'a>,
    /// Record-level defaults declared on the record root
    pub defaults: RecordDefaults,
    /// Installation default used when the root declares no language
    pub fallback_language: Option<&'a str>,
    /// Schema version the record is parsed with
    pub version: &'a str,
    /// Reference of the source document
    pub source: &'a str,
    /// Persisted record this parse replaces, found by the root handler
    pub replaces: Option<Uuid>,
    current: HashMap<EntityKind, usize>,
}

impl<'a> RecordContext<'a> {
    pub fn new(
        store: &'a mut ModelStore,
        resolver: ReferenceResolver<'a>,
        version: &'a str,
        source: &'a str,
    ) -> Self {
        Self {
            store,
            resolver,
            defaults: RecordDefaults::default(),
            fallback_language: None,
            version,
            source,
            replaces: None,
            current: HashMap::new(),
        }
    }

    /// Builder: set the installation default language
    pub fn with_fallback_language(mut self, language: Option<&'a str>) -> Self {
        self.fallback_language = language;
        self
    }

    pub fn resolver(&self) -> &ReferenceResolver<'a> {
        &self.resolver
    }

    pub fn store(&self) -> &ModelStore {
        &*self.store
    }

    /// Shorthand for [`ReferenceResolver::resolve_optional`]
    pub fn code(&self, list: CodelistType, code: Option<&str>) -> Option<Code> {
        self.resolver.resolve_optional(list, code)
    }

    /// Shorthand for [`ReferenceResolver::resolve_required`]
    pub fn required_code(
        &self,
        list: CodelistType,
        code: Option<&str>,
        context: &str,
        field: &str,
    ) -> ParseResult<Code> {
        self.resolver.resolve_required(list, code, context, field)
    }

    /// Register an entity and make it the current one of its kind
    pub fn register(&mut self, kind: EntityKind, entity: impl StoredEntity) -> usize {
        let index = self.store.register(kind, entity.into_entity());
        self.current.insert(kind, index);
        index
    }

    /// Register a narrative under its parent's narrative key
    pub fn register_narrative(&mut self, parent: EntityKind, entity: impl StoredEntity) -> usize {
        self.store.register(StoreKey::Narrative(parent), entity.into_entity())
    }

    /// Index of the current entity of a kind
    pub fn current(&self, kind: EntityKind) -> Option<usize> {
        self.current.get(&kind).copied()
    }

    /// Ownership link to the current entity of a kind
    pub fn parent_ref(&self, kind: EntityKind) -> ParseResult<EntityRef> {
        self.current(kind)
            .map(|index| EntityRef::new(kind, index))
            .ok_or_else(|| ParseError::not_found("entity", format!("{kind} (no current instance)")))
    }

    /// The current entity of a kind
    pub fn entity<T: StoredEntity>(&self, kind: EntityKind) -> ParseResult<&T> {
        let index = self.parent_ref(kind)?.index;
        self.store.get_as(kind, Some(index))
    }

    /// The current entity of a kind, mutably
    pub fn entity_mut<T: StoredEntity>(&mut self, kind: EntityKind) -> ParseResult<&mut T> {
        let index = self.parent_ref(kind)?.index;
        self.store.get_as_mut(kind, Some(index))
    }

    /// Number of entities of a kind registered in this record
    pub fn count(&self, kind: EntityKind) -> usize {
        self.store.count(kind)
    }
}

/// Walks a record subtree and dispatches elements to a handler table
#[derive(Debug, Clone, Copy)]
pub struct PathDispatcher<'t> {
    table: &'t HandlerTable,
}

impl<'t> PathDispatcher<'t> {
    pub fn new(table: &'t HandlerTable) -> Self {
        Self { table }
    }

    /// Visit `record` and all its descendants in document order
    pub fn walk(&self, ctx: &mut RecordContext<'_>, record: &Element) -> ParseResult<()> {
        let mut path = Vec::new();
        self.visit(ctx, record, &mut path)
    }

    fn visit(&self, ctx: &mut RecordContext<'_>, element: &Element, path: &mut Vec<String>) -> ParseResult<()> {
        path.push(normalize_segment(element.tag()));
        let key = path.join(PATH_SEPARATOR);

        let visit = match self.table.get(&key) {
            Some(handler) => handler(ctx, element)?,
            None => {
                debug!(table = self.table.name(), path = %key, "No handler for path");
                Visit::Descend
            }
        };

        match visit {
            Visit::Descend => self.visit_children(ctx, element, path)?,
            Visit::Redirect(replacement) => self.visit_children(ctx, &replacement, path)?,
            Visit::SkipChildren => {}
        }

        path.pop();
        Ok(())
    }

    fn visit_children(&self, ctx: &mut RecordContext<'_>, element: &Element, path: &mut Vec<String>) -> ParseResult<()> {
        for child in element.children() {
            self.visit(ctx, child, path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codelists::InMemoryCodelists;
    use crate::models::{Organisation, TextBlock};
    use crate::storage::InMemoryBackend;
    use std::sync::{Arc, Mutex};

    fn record() -> Element {
        Element::new("iati-organisation")
            .with_child(Element::new("organisation-identifier").with_text("XM-DAC-1"))
            .with_child(
                Element::new("name")
                    .with_child(Element::new("narrative").with_text("A"))
                    .with_child(Element::new("narrative").with_text("B")),
            )
            .with_child(Element::new("unknown-extension").with_child(Element::new("name")))
    }

    fn tracing_table(seen: Arc<Mutex<Vec<String>>>) -> HandlerTable {
        let mut table = HandlerTable::new("test", "iati-organisation", "organisation-identifier");
        for path in ["", "organisation-identifier", "name", "name/narrative", "unknown-extension/name"] {
            let seen = Arc::clone(&seen);
            let label = if path.is_empty() { "root".to_string() } else { path.to_string() };
            table.register(path, move |_ctx, _element| {
                seen.lock().map_err(|_| ParseError::parser("test", "seen", "poisoned"))?.push(label.clone());
                Ok(Visit::Descend)
            });
        }
        table
    }

    fn run(table: &HandlerTable, element: &Element) -> ParseResult<ModelStore> {
        let codelists = InMemoryCodelists::new();
        let backend = InMemoryBackend::new();
        let mut store = ModelStore::new();
        {
            let mut ctx = RecordContext::new(
                &mut store,
                ReferenceResolver::new(&codelists, &backend),
                "2.02",
                "test",
            );
            PathDispatcher::new(table).walk(&mut ctx, element)?;
        }
        Ok(store)
    }

    #[test]
    fn test_canonical_path() {
        assert_eq!(
            canonical_path(["iati-organisation", "total-budget", "value"]),
            "iati_organisation__total_budget__value"
        );
    }

    #[test]
    fn test_register_normalizes_relative_paths() {
        let mut table = HandlerTable::new("test", "iati-organisation", "organisation-identifier");
        table.register("", |_, _| Ok(Visit::Descend));
        table.register("total-budget/budget-line/value", |_, _| Ok(Visit::Descend));
        assert!(table.contains("iati_organisation"));
        assert!(table.contains("iati_organisation__total_budget__budget_line__value"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_preorder_and_unknown_paths_descend() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let table = tracing_table(Arc::clone(&seen));
        run(&table, &record()).unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                "root",
                "organisation-identifier",
                "name",
                "name/narrative",
                "name/narrative",
                "unknown-extension/name",
            ]
        );
    }

    #[test]
    fn test_skip_children() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut table = tracing_table(Arc::clone(&seen));
        table.register("name", |_, _| Ok(Visit::SkipChildren));
        run(&table, &record()).unwrap();

        let seen = seen.lock().unwrap().clone();
        assert!(!seen.contains(&"name/narrative".to_string()));
    }

    #[test]
    fn test_redirect_visits_replacement_children() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut table = tracing_table(Arc::clone(&seen));
        table.register("name", |_, element| {
            let first = element.children().first().cloned().unwrap_or_default();
            Ok(Visit::Redirect(Element::new(element.tag()).with_child(first)))
        });
        run(&table, &record()).unwrap();

        let seen = seen.lock().unwrap().clone();
        let narratives = seen.iter().filter(|s| *s == "name/narrative").count();
        assert_eq!(narratives, 1);
    }

    #[test]
    fn test_handler_error_stops_walk() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut table = tracing_table(Arc::clone(&seen));
        table.register("name", |_, _| Err(ParseError::invalid("name", "name", "duplicate")));
        let result = run(&table, &record());
        assert!(matches!(result, Err(ParseError::FieldValidation { .. })));
        assert!(!seen.lock().unwrap().contains(&"name/narrative".to_string()));
    }

    #[test]
    fn test_context_tracks_current_entity() {
        let mut table = HandlerTable::new("test", "iati-organisation", "organisation-identifier");
        table.register("", |ctx, _| {
            ctx.register(EntityKind::Organisation, Organisation::new("XM-DAC-1", "2.02", "test"));
            Ok(Visit::Descend)
        });
        table.register("name", |ctx, _| {
            let parent = ctx.parent_ref(EntityKind::Organisation)?;
            ctx.register(EntityKind::OrganisationName, TextBlock { parent });
            Ok(Visit::Descend)
        });
        let store = run(&table, &record()).unwrap();
        let name: &TextBlock = store.get_as(EntityKind::OrganisationName, None).unwrap();
        assert_eq!(name.parent, EntityRef::new(EntityKind::Organisation, 0));
    }

    #[test]
    fn test_child_before_parent_is_not_found() {
        let mut table = HandlerTable::new("test", "iati-organisation", "organisation-identifier");
        table.register("name", |ctx, _| {
            ctx.parent_ref(EntityKind::Organisation)?;
            Ok(Visit::Descend)
        });
        let err = run(&table, &record()).unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }
}
