//! Duplicate-submission registry.
//!
//! Holds payload hashes already admitted to preflight. The registry is owned
//! by whoever drives the gates (a CLI invocation, a service session, a test),
//! and lives exactly as long as that owner. Entries are never pruned.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
pub struct SubmissionRegistry {
    seen: Mutex<HashSet<String>>,
}

impl SubmissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `hash`. Returns `false` when it was already present.
    /// The lookup and the insert happen under one lock.
    pub fn check_and_record(&self, hash: &str) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        seen.insert(hash.to_string())
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(hash)
    }

    pub fn len(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
