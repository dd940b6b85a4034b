//! Process registry: the single source of truth for which instances
//! are alive, keyed by `(definition, id)`.

use crate::actor::ActorHandle;
use crate::error::RuntimeError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use procflow_core::ProcessKey;

/// Concurrent map from process key to live actor handle.
///
/// Registration is insert-if-absent: when two starts race on the same
/// key, exactly one wins and the loser gets [`RuntimeError::AlreadyStarted`].
#[derive(Default)]
pub struct ProcessRegistry {
    inner: DashMap<ProcessKey, ActorHandle>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `handle.key()`. Fails without modifying the table when
    /// the key is already taken.
    pub fn register(&self, handle: ActorHandle) -> Result<(), RuntimeError> {
        match self.inner.entry(handle.key().clone()) {
            Entry::Occupied(occupied) => Err(RuntimeError::AlreadyStarted {
                key: occupied.key().clone(),
            }),
            Entry::Vacant(vacant) => {
                vacant.insert(handle);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, key: &ProcessKey) -> Option<ActorHandle> {
        self.inner.get(key).map(|entry| entry.value().clone())
    }

    /// Removes the key; called by the monitor task after the actor
    /// exits. Returns the handle that was registered, if any.
    pub fn deregister(&self, key: &ProcessKey) -> Option<ActorHandle> {
        self.inner.remove(key).map(|(_, handle)| handle)
    }

    /// Keys of every live instance, optionally filtered by definition.
    pub fn list(&self, definition: Option<&str>) -> Vec<ProcessKey> {
        let mut keys: Vec<ProcessKey> = self
            .inner
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| definition.map_or(true, |name| key.definition == name))
            .collect();
        keys.sort();
        keys
    }

    pub fn count(&self) -> usize {
        self.inner.len()
    }
}
