//! Top-level runtime: owns the shared registry, history, dispatcher,
//! and telemetry, and hands out one [`ProcessManager`] per registered
//! definition.

use crate::actor::CallReply;
use crate::config::Config;
use crate::dispatcher::{DispatchKey, EventDispatcher, ListenerId, Notification};
use crate::error::RuntimeError;
use crate::manager::ProcessManager;
use crate::registry::ProcessRegistry;
use crate::telemetry::{attach_default_logger, Telemetry};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use procflow_core::{Definition, HistoryEntry, HistoryStore, ProcessKey, StateKey};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct Runtime {
    config: Config,
    registry: Arc<ProcessRegistry>,
    history: Arc<HistoryStore>,
    dispatcher: Arc<EventDispatcher>,
    telemetry: Arc<Telemetry>,
    managers: DashMap<String, Arc<ProcessManager>>,
    logger: Mutex<Option<JoinHandle<()>>>,
}

impl Runtime {
    pub fn new(config: Config) -> Self {
        let telemetry = Arc::new(Telemetry::new(config.telemetry_capacity));
        let logger = if config.telemetry_logger && tokio::runtime::Handle::try_current().is_ok() {
            Some(attach_default_logger(&telemetry))
        } else {
            None
        };
        Self {
            config,
            registry: Arc::new(ProcessRegistry::new()),
            history: Arc::new(HistoryStore::new()),
            dispatcher: Arc::new(EventDispatcher::new()),
            telemetry,
            managers: DashMap::new(),
            logger: Mutex::new(logger),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers a compiled definition and returns its manager.
    /// Definition names are unique per runtime.
    pub fn register(&self, definition: Definition) -> Result<Arc<ProcessManager>, RuntimeError> {
        match self.managers.entry(definition.name.clone()) {
            Entry::Occupied(_) => Err(RuntimeError::DefinitionRegistered {
                name: definition.name,
            }),
            Entry::Vacant(vacant) => {
                let manager = Arc::new(ProcessManager::new(
                    Arc::new(definition),
                    self.config.clone(),
                    self.registry.clone(),
                    self.history.clone(),
                    self.dispatcher.clone(),
                    self.telemetry.clone(),
                ));
                vacant.insert(manager.clone());
                Ok(manager)
            }
        }
    }

    pub fn manager(&self, definition: &str) -> Result<Arc<ProcessManager>, RuntimeError> {
        self.managers
            .get(definition)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RuntimeError::DefinitionNotRegistered {
                name: definition.to_string(),
            })
    }

    /// Starts an instance of a registered definition.
    pub fn start(
        &self,
        definition: &str,
        id: &str,
        args: Value,
    ) -> Result<ProcessKey, RuntimeError> {
        self.manager(definition)?.start_child(id, args)
    }

    /// Gracefully stops an instance.
    pub async fn stop(&self, definition: &str, id: &str) -> Result<(), RuntimeError> {
        self.manager(definition)?.stop_child(id).await
    }

    /// Fires an event and waits for the transition outcome.
    pub async fn call(
        &self,
        definition: &str,
        id: &str,
        event: &str,
        input: Value,
    ) -> Result<CallReply, RuntimeError> {
        self.manager(definition)?.child(id)?.call(event, input).await
    }

    /// Fires an event without waiting.
    pub fn cast(
        &self,
        definition: &str,
        id: &str,
        event: &str,
        input: Value,
    ) -> Result<(), RuntimeError> {
        self.manager(definition)?.child(id)?.cast(event, input)
    }

    /// Current state of a live instance.
    pub async fn state(&self, definition: &str, id: &str) -> Result<StateKey, RuntimeError> {
        self.manager(definition)?.child(id)?.state().await
    }

    /// Transition log for an instance, live or stopped.
    pub fn history(&self, key: &ProcessKey) -> Vec<HistoryEntry> {
        self.history.get(key)
    }

    /// Subscribes to completed transitions of `(definition, event)`.
    pub fn register_listener(
        &self,
        definition: &str,
        event: &str,
    ) -> (ListenerId, mpsc::UnboundedReceiver<Notification>) {
        self.dispatcher
            .register(DispatchKey::new(definition, event))
    }

    pub fn unregister_listener(&self, definition: &str, event: &str, id: &ListenerId) {
        self.dispatcher
            .unregister(&DispatchKey::new(definition, event), id);
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    /// Keys of all live instances.
    pub fn processes(&self) -> Vec<ProcessKey> {
        self.registry.list(None)
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if let Some(logger) = self.logger.lock().take() {
            logger.abort();
        }
    }
}
