//! Per-process cache of activation lookups
//!
//! Frames ask for their activations on every navigation and for each
//! subresource of a document; the same `(origin, url)` pair comes back many
//! times in a row. The cache keeps the last few results per renderer
//! process, newest first.

use std::collections::{HashMap, VecDeque};

use crate::types::{ActivationsFound, ProcessKey};
use crate::url_info::Origin;

/// Default number of results kept per process.
pub const DEFAULT_ACTIVATION_CACHE_SIZE: usize = 4;

#[derive(Debug, Clone)]
struct CachedActivations {
    document_origin: Origin,
    url: String,
    found: ActivationsFound,
}

/// Bounded, insertion-ordered cache keyed by process.
#[derive(Debug)]
pub struct ActivationCache {
    capacity: usize,
    entries: HashMap<ProcessKey, VecDeque<CachedActivations>>,
}

impl Default for ActivationCache {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVATION_CACHE_SIZE)
    }
}

impl ActivationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
        }
    }

    /// Look up a previous result. Opaque origins match each other.
    pub fn get(&self, process: ProcessKey, document_origin: &Origin, url: &str) -> Option<ActivationsFound> {
        self.entries
            .get(&process)?
            .iter()
            .find(|entry| entry.url == url && &entry.document_origin == document_origin)
            .map(|entry| entry.found)
    }

    /// Store a result in front, dropping the oldest entry beyond capacity.
    pub fn insert(&mut self, process: ProcessKey, document_origin: Origin, url: String, found: ActivationsFound) {
        if self.capacity == 0 {
            return;
        }
        let entries = self.entries.entry(process).or_default();
        entries.push_front(CachedActivations {
            document_origin,
            url,
            found,
        });
        entries.truncate(self.capacity);
    }

    /// Forget everything cached for a process.
    pub fn remove_process(&mut self, process: ProcessKey) {
        self.entries.remove(&process);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of results cached for `process`.
    pub fn len_for(&self, process: ProcessKey) -> usize {
        self.entries.get(&process).map_or(0, VecDeque::len)
    }
}
