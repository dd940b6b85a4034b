//! Publish/subscribe fan-out for definition events.
//!
//! Unlike the registry, the dispatcher table allows duplicate keys: any
//! number of listeners may subscribe to the same `(definition, event)`
//! pair. Dispatch iterates a snapshot of the listener set so new
//! registrations are never blocked, and a failed listener never affects
//! the firing instance.

use dashmap::DashMap;
use procflow_core::{ProcessKey, ResultSymbol, StateKey};
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Subscription key: which definition's events, which event name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DispatchKey {
    pub definition: String,
    pub event: String,
}

impl DispatchKey {
    pub fn new(definition: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            definition: definition.into(),
            event: event.into(),
        }
    }
}

/// Notification delivered to listeners after an event fired somewhere.
#[derive(Debug, Clone)]
pub struct Notification {
    /// The instance that fired.
    pub key: ProcessKey,
    /// Event name.
    pub event: String,
    /// Handler result.
    pub result: ResultSymbol,
    /// Pre-transition state.
    pub from: StateKey,
    /// Post-transition state.
    pub to: StateKey,
    /// History sequence of the firing, 0 for custom emissions.
    pub seq: u64,
    /// Custom payload for `Action::Emit` notifications.
    pub payload: Value,
}

/// Opaque listener identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lsn-{}", self.0)
    }
}

type Listener = (ListenerId, mpsc::UnboundedSender<Notification>);

/// Duplicate-key pub/sub table.
#[derive(Default)]
pub struct EventDispatcher {
    table: DashMap<DispatchKey, Vec<Listener>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to a key; returns the listener id and a channel of
    /// notifications.
    pub fn register(
        &self,
        key: DispatchKey,
    ) -> (ListenerId, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.register_sender(key, tx);
        (id, rx)
    }

    /// Subscribes an existing channel sender to a key.
    pub fn register_sender(
        &self,
        key: DispatchKey,
        sender: mpsc::UnboundedSender<Notification>,
    ) -> ListenerId {
        let id = ListenerId(Uuid::new_v4());
        self.table.entry(key).or_default().push((id.clone(), sender));
        id
    }

    /// Removes one listener. Returns true if it was registered.
    pub fn unregister(&self, key: &DispatchKey, id: &ListenerId) -> bool {
        match self.table.get_mut(key) {
            Some(mut listeners) => {
                let before = listeners.len();
                listeners.retain(|(lid, _)| lid != id);
                listeners.len() != before
            }
            None => false,
        }
    }

    /// Delivers a notification to every listener currently registered
    /// for `(notification.key.definition, notification.event)`.
    pub fn dispatch(&self, notification: Notification) {
        let key = DispatchKey::new(&notification.key.definition, &notification.event);

        // Snapshot the listener set so sends run without holding the
        // shard lock against new registrations.
        let snapshot: Vec<Listener> = match self.table.get(&key) {
            Some(listeners) => listeners.clone(),
            None => return,
        };

        let mut dead = Vec::new();
        for (id, sender) in &snapshot {
            if sender.send(notification.clone()).is_err() {
                dead.push(id.clone());
            }
        }

        if !dead.is_empty() {
            if let Some(mut listeners) = self.table.get_mut(&key) {
                listeners.retain(|(id, _)| !dead.contains(id));
            }
        }
    }

    /// Listener ids registered for a key.
    pub fn lookup(&self, key: &DispatchKey) -> Vec<ListenerId> {
        self.table
            .get(key)
            .map(|listeners| listeners.iter().map(|(id, _)| id.clone()).collect())
            .unwrap_or_default()
    }

    /// All keys with at least one listener.
    pub fn keys(&self) -> Vec<DispatchKey> {
        let mut keys: Vec<DispatchKey> = self
            .table
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }
}
