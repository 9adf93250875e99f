//! IATI ingest - versioned parser for IATI organisation and activity datasets
//!
//! Provides:
//! - An XML document tree with per-record lookup
//! - Handler tables per document kind and schema generation, dispatched by element path
//! - A per-record model store with narrative and currency defaulting
//! - Codelist and cross-record reference resolution
//! - Atomic per-record commit through a pluggable persistence backend
//! - Post-commit hooks

pub mod codelists;
pub mod config;
pub mod document;
pub mod error;
pub mod hooks;
pub mod models;
pub mod parser;
pub mod storage;
pub mod store;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export commonly used types
pub use codelists::{Code, CodelistStore, CodelistType, InMemoryCodelists, ReferenceResolver};
pub use config::{ConfigError, ParserConfig};
pub use document::{Document, Element};
pub use error::{DocumentError, ParseError, ParseResult};
pub use hooks::{CommittedRecord, HookError, PostCommitHook};
pub use models::{Entity, EntityKind, RecordKind};
pub use parser::{Generation, IatiParser, ParseReport, RecordOutcome, SourceMetadata};
pub use storage::{InMemoryBackend, PersistenceBackend, RecordLookup, StorageError};
pub use store::{ModelStore, StoreKey};
