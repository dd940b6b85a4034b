//! Append-only per-instance transition log.

use crate::definition::StateKey;
use crate::event::ResultSymbol;
use crate::instance::ProcessKey;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// One completed transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Instance identity.
    pub key: ProcessKey,
    /// Sequence number, 1-based, strictly increasing per instance.
    pub seq: u64,
    /// Pre-transition state.
    pub from: StateKey,
    /// Event fired.
    pub event: String,
    /// Result returned by the event's handler.
    pub result: ResultSymbol,
    /// Post-transition state.
    pub to: StateKey,
    /// Timestamp (Unix millis).
    pub ts: i64,
}

/// Append-only history store. Appends for different instances may run
/// concurrently; appends for one instance are serialized by its actor.
#[derive(Default)]
pub struct HistoryStore {
    logs: DashMap<ProcessKey, Vec<HistoryEntry>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotently creates an empty log for a fresh instance.
    pub fn ensure_new(&self, key: &ProcessKey) {
        self.logs.entry(key.clone()).or_default();
    }

    /// Appends an entry to its instance's log.
    pub fn put(&self, entry: HistoryEntry) {
        self.logs.entry(entry.key.clone()).or_default().push(entry);
    }

    /// All entries for the given instance, in sequence order.
    pub fn get(&self, key: &ProcessKey) -> Vec<HistoryEntry> {
        self.logs
            .get(key)
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Number of instances with a log.
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}
