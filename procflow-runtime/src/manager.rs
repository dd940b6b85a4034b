//! Per-definition supervisor: starts, stops, and monitors the actors
//! of one compiled definition. A faulted or panicked child never takes
//! its siblings down.

use crate::actor::{ActorExit, ActorHandle, ActorMessage, ProcessActor};
use crate::config::{Config, RestartPolicy};
use crate::dispatcher::EventDispatcher;
use crate::error::RuntimeError;
use crate::registry::ProcessRegistry;
use crate::telemetry::{Signal, Telemetry};
use dashmap::DashMap;
use procflow_core::{Definition, HistoryStore, ProcessKey};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Supervises all instances of a single definition.
pub struct ProcessManager {
    definition: Arc<Definition>,
    config: Config,
    registry: Arc<ProcessRegistry>,
    history: Arc<HistoryStore>,
    dispatcher: Arc<EventDispatcher>,
    telemetry: Arc<Telemetry>,
    restarts: DashMap<String, u32>,
}

impl std::fmt::Debug for ProcessManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessManager")
            .field("definition", &self.definition.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ProcessManager {
    pub fn new(
        definition: Arc<Definition>,
        config: Config,
        registry: Arc<ProcessRegistry>,
        history: Arc<HistoryStore>,
        dispatcher: Arc<EventDispatcher>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            definition,
            config,
            registry,
            history,
            dispatcher,
            telemetry,
            restarts: DashMap::new(),
        }
    }

    pub fn definition(&self) -> &Arc<Definition> {
        &self.definition
    }

    /// Starts one instance under this manager. The key is claimed in
    /// the registry before the actor task exists, so concurrent starts
    /// on the same id resolve to exactly one child.
    pub fn start_child(
        self: &Arc<Self>,
        id: &str,
        args: Value,
    ) -> Result<ProcessKey, RuntimeError> {
        let key = ProcessKey::new(self.definition.name.clone(), id);
        let (sender, mailbox) = mpsc::unbounded_channel();
        self.registry
            .register(ActorHandle::new(key.clone(), sender))?;
        self.spawn_monitored(key.clone(), args, mailbox);
        Ok(key)
    }

    fn spawn_monitored(
        self: &Arc<Self>,
        key: ProcessKey,
        args: Value,
        mailbox: mpsc::UnboundedReceiver<ActorMessage>,
    ) {
        let join = ProcessActor::spawn(
            key.clone(),
            self.definition.clone(),
            args.clone(),
            self.history.clone(),
            self.dispatcher.clone(),
            self.telemetry.clone(),
            mailbox,
        );
        let manager = self.clone();
        tokio::spawn(async move {
            let exit = match join.await {
                Ok(exit) => exit,
                Err(err) => {
                    // A panic in hook code reaches us as a JoinError.
                    tracing::error!(key = %key, error = %err, "child task panicked");
                    manager.telemetry.emit(Signal::TransitionFaulted {
                        key: key.clone(),
                        event: String::new(),
                        code: "PANIC",
                        message: err.to_string(),
                    });
                    ActorExit::Fault {
                        code: "PANIC",
                        message: err.to_string(),
                    }
                }
            };
            manager.registry.deregister(&key);
            if let ActorExit::Fault { code, .. } = exit {
                manager.consider_restart(key, args, code);
            }
        });
    }

    /// Restarts a faulted child when the policy allows. The new child
    /// begins from the start state with the original args; whatever was
    /// queued in the old mailbox is gone.
    fn consider_restart(self: &Arc<Self>, key: ProcessKey, args: Value, code: &'static str) {
        if self.config.restart != RestartPolicy::OnFault {
            return;
        }
        let mut count = self.restarts.entry(key.id.clone()).or_insert(0);
        if *count >= self.config.max_restarts {
            tracing::warn!(key = %key, code, "restart budget exhausted");
            return;
        }
        *count += 1;
        let attempt = *count;
        drop(count);

        let (sender, mailbox) = mpsc::unbounded_channel();
        if self
            .registry
            .register(ActorHandle::new(key.clone(), sender))
            .is_err()
        {
            // Someone re-claimed the id in between; their child wins.
            return;
        }
        tracing::info!(key = %key, code, attempt, "restarting faulted child");
        self.spawn_monitored(key, args, mailbox);
    }

    /// Gracefully stops one child and waits for it to exit.
    pub async fn stop_child(&self, id: &str) -> Result<(), RuntimeError> {
        let key = ProcessKey::new(self.definition.name.clone(), id);
        let handle = self
            .registry
            .lookup(&key)
            .ok_or(RuntimeError::NotFound { key })?;
        handle.stop().await
    }

    /// Mailbox handle for a live child.
    pub fn child(&self, id: &str) -> Result<ActorHandle, RuntimeError> {
        let key = ProcessKey::new(self.definition.name.clone(), id);
        self.registry
            .lookup(&key)
            .ok_or(RuntimeError::NotFound { key })
    }

    /// Keys of this manager's live children.
    pub fn children(&self) -> Vec<ProcessKey> {
        self.registry.list(Some(&self.definition.name))
    }

    pub fn restart_count(&self, id: &str) -> u32 {
        self.restarts.get(id).map(|count| *count).unwrap_or(0)
    }
}
