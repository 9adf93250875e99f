//! Post-commit hooks
//!
//! Hooks run after a record's unit of work has committed (derived-field
//! population, search-index updates and the like). A failing hook is logged
//! and never rolls back the record.

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::models::{Entity, RecordKind};

/// Error type for hook failures
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Hook '{hook}' failed: {message}")]
    Failed { hook: String, message: String },
}

impl HookError {
    pub fn failed(hook: impl Into<String>, message: impl Into<String>) -> Self {
        HookError::Failed {
            hook: hook.into(),
            message: message.into(),
        }
    }
}

/// A record that has been committed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommittedRecord {
    pub id: Uuid,
    pub kind: RecordKind,
    pub identifier: String,
    /// Whether a previously persisted record was replaced
    pub replaced: bool,
    /// Number of child entities written
    pub child_count: usize,
    pub root: Entity,
}

/// Something to run after each successful commit
pub trait PostCommitHook: Send + Sync {
    fn name(&self) -> &str;

    fn after_commit(&self, record: &CommittedRecord) -> Result<(), HookError>;
}

/// Ordered collection of hooks
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Box<dyn PostCommitHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: impl PostCommitHook + 'static) {
        self.hooks.push(Box::new(hook));
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every hook in registration order; returns the number that failed
    pub fn run(&self, record: &CommittedRecord) -> usize {
        let mut failed = 0;
        for hook in &self.hooks {
            if let Err(e) = hook.after_commit(record) {
                warn!(hook = hook.name(), record = %record.identifier, error = %e, "Post-commit hook failed");
                failed += 1;
            }
        }
        failed
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|h| h.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Organisation;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<String>>);

    impl PostCommitHook for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn after_commit(&self, record: &CommittedRecord) -> Result<(), HookError> {
            self.0
                .lock()
                .map_err(|_| HookError::failed("recorder", "poisoned"))?
                .push(record.identifier.clone());
            Ok(())
        }
    }

    struct Broken;

    impl PostCommitHook for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn after_commit(&self, _record: &CommittedRecord) -> Result<(), HookError> {
            Err(HookError::failed("broken", "index unavailable"))
        }
    }

    fn committed() -> CommittedRecord {
        CommittedRecord {
            id: Uuid::nil(),
            kind: RecordKind::Organisation,
            identifier: "XM-DAC-1".to_string(),
            replaced: false,
            child_count: 0,
            root: Entity::Organisation(Organisation::new("XM-DAC-1", "2.02", "test")),
        }
    }

    #[test]
    fn test_failures_are_counted_not_fatal() {
        let mut hooks = HookRegistry::new();
        hooks.register(Broken);
        hooks.register(Recorder(Mutex::new(Vec::new())));
        assert_eq!(hooks.len(), 2);
        assert_eq!(hooks.run(&committed()), 1);
    }
}
