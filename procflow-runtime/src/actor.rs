//! The per-instance actor: one tokio task, one mailbox, strictly
//! serial event processing.

use crate::dispatcher::{EventDispatcher, Notification};
use crate::error::RuntimeError;
use crate::telemetry::{Signal, Telemetry};
use procflow_core::{
    Action, Definition, HistoryStore, Instance, ProcessKey, ResultSymbol, StateKey,
    TransitionEngine,
};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant, Sleep};

/// Reply to a synchronous `call`.
#[derive(Debug, Clone)]
pub struct CallReply {
    pub key: ProcessKey,
    pub from: StateKey,
    pub result: ResultSymbol,
    pub to: StateKey,
    pub seq: u64,
}

/// Mailbox messages.
pub enum ActorMessage {
    Call {
        event: String,
        input: Value,
        reply: oneshot::Sender<Result<CallReply, RuntimeError>>,
    },
    Cast {
        event: String,
        input: Value,
    },
    GetState {
        reply: oneshot::Sender<StateKey>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// Cheap, clonable handle to a live actor's mailbox.
#[derive(Clone)]
pub struct ActorHandle {
    key: ProcessKey,
    sender: mpsc::UnboundedSender<ActorMessage>,
}

impl ActorHandle {
    pub(crate) fn new(key: ProcessKey, sender: mpsc::UnboundedSender<ActorMessage>) -> Self {
        Self { key, sender }
    }

    pub fn key(&self) -> &ProcessKey {
        &self.key
    }

    /// Fires an event and blocks until the full transition completes.
    pub async fn call(&self, event: &str, input: Value) -> Result<CallReply, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ActorMessage::Call {
                event: event.to_string(),
                input,
                reply: tx,
            })
            .map_err(|_| RuntimeError::Stopped {
                key: self.key.clone(),
            })?;
        rx.await.map_err(|_| RuntimeError::Stopped {
            key: self.key.clone(),
        })?
    }

    /// Fires an event without waiting for the outcome. Failures are
    /// observable via telemetry only.
    pub fn cast(&self, event: &str, input: Value) -> Result<(), RuntimeError> {
        self.sender
            .send(ActorMessage::Cast {
                event: event.to_string(),
                input,
            })
            .map_err(|_| RuntimeError::Stopped {
                key: self.key.clone(),
            })
    }

    /// Snapshot of the current state key.
    pub async fn state(&self) -> Result<StateKey, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ActorMessage::GetState { reply: tx })
            .map_err(|_| RuntimeError::Stopped {
                key: self.key.clone(),
            })?;
        rx.await.map_err(|_| RuntimeError::Stopped {
            key: self.key.clone(),
        })
    }

    /// Requests a graceful stop and waits for the actor to acknowledge.
    /// Stopping an already-stopped actor is not an error.
    pub async fn stop(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(ActorMessage::Stop { reply: tx })
            .is_err()
        {
            return Ok(());
        }
        let _ = rx.await;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// How the actor task exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorExit {
    /// Stopped gracefully or all handles dropped.
    Normal,
    /// A defect terminated the instance.
    Fault { code: &'static str, message: String },
}

/// State owned exclusively by the actor task.
pub struct ProcessActor {
    instance: Instance,
    engine: TransitionEngine,
    dispatcher: Arc<EventDispatcher>,
    telemetry: Arc<Telemetry>,
}

/// Timer placeholder; reset whenever a state timeout is armed.
const NEVER: Duration = Duration::from_secs(86_400 * 365);

impl ProcessActor {
    /// Spawns the actor task over an already-created mailbox. The
    /// caller registers the matching [`ActorHandle`] before spawning so
    /// registration stays atomic.
    pub fn spawn(
        key: ProcessKey,
        definition: Arc<Definition>,
        args: Value,
        history: Arc<HistoryStore>,
        dispatcher: Arc<EventDispatcher>,
        telemetry: Arc<Telemetry>,
        mailbox: mpsc::UnboundedReceiver<ActorMessage>,
    ) -> JoinHandle<ActorExit> {
        let actor = Self {
            instance: Instance::new(key, definition, args),
            engine: TransitionEngine::new(history),
            dispatcher,
            telemetry,
        };
        tokio::spawn(actor.run(mailbox))
    }

    async fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<ActorMessage>) -> ActorExit {
        let timer = sleep(NEVER);
        tokio::pin!(timer);
        // The state a pending timeout was armed for, plus its event.
        let mut armed: Option<(StateKey, String)> = None;

        let initial = match self.init() {
            Ok(actions) => actions,
            Err(err) => {
                let exit = ActorExit::Fault {
                    code: err.error_code(),
                    message: err.to_string(),
                };
                self.finish(&exit);
                return exit;
            }
        };
        self.handle_actions(initial, &mut armed, timer.as_mut());

        let exit = loop {
            tokio::select! {
                maybe = mailbox.recv() => {
                    let Some(msg) = maybe else { break ActorExit::Normal };
                    match msg {
                        ActorMessage::Call { event, input, reply } => {
                            match self.apply(&event, &input) {
                                Ok((outcome, actions)) => {
                                    self.handle_actions(actions, &mut armed, timer.as_mut());
                                    let _ = reply.send(Ok(outcome));
                                }
                                Err(err) if err.is_recoverable() => {
                                    let _ = reply.send(Err(err));
                                }
                                Err(err) => {
                                    let exit = ActorExit::Fault {
                                        code: err.error_code(),
                                        message: err.to_string(),
                                    };
                                    let _ = reply.send(Err(err));
                                    break exit;
                                }
                            }
                        }
                        ActorMessage::Cast { event, input } => {
                            match self.apply(&event, &input) {
                                Ok((_, actions)) => {
                                    self.handle_actions(actions, &mut armed, timer.as_mut());
                                }
                                Err(err) if err.is_recoverable() => {
                                    tracing::debug!(
                                        key = %self.instance.key,
                                        %event,
                                        error = %err,
                                        "cast rejected"
                                    );
                                }
                                Err(err) => {
                                    break ActorExit::Fault {
                                        code: err.error_code(),
                                        message: err.to_string(),
                                    };
                                }
                            }
                        }
                        ActorMessage::GetState { reply } => {
                            let _ = reply.send(self.instance.current.clone());
                        }
                        ActorMessage::Stop { reply } => {
                            let _ = reply.send(());
                            break ActorExit::Normal;
                        }
                    }
                }
                _ = timer.as_mut(), if armed.is_some() => {
                    let Some((state, event)) = armed.take() else { continue };
                    if self.instance.current == state {
                        match self.apply(&event, &Value::Null) {
                            Ok((_, actions)) => {
                                self.handle_actions(actions, &mut armed, timer.as_mut());
                            }
                            Err(err) if err.is_recoverable() => {
                                tracing::debug!(
                                    key = %self.instance.key,
                                    %event,
                                    error = %err,
                                    "timeout event rejected"
                                );
                            }
                            Err(err) => {
                                break ActorExit::Fault {
                                    code: err.error_code(),
                                    message: err.to_string(),
                                };
                            }
                        }
                    }
                }
            }
        };

        self.finish(&exit);
        exit
    }

    /// Runs the definition's init hook and enters the start state.
    fn init(&mut self) -> Result<Vec<Action>, RuntimeError> {
        self.engine.history().ensure_new(&self.instance.key);

        let definition = self.instance.definition.clone();
        let start = definition.start().clone();
        let args = self.instance.ctx.clone();
        let mut actions = definition
            .process_hooks()
            .on_init(&mut self.instance.state_scope(&start), &args)?;

        // Arm any state-timeout edges owned by the start state.
        if let Some(node) = definition.state(&start) {
            for out in &node.outbound {
                if let Some(edge) = definition.event(out) {
                    if let Some(after) = edge.timeout() {
                        actions.push(Action::ArmTimeout {
                            state: start.clone(),
                            event: edge.name.clone(),
                            after,
                        });
                    }
                }
            }
        }

        self.instance.mark_running();
        self.telemetry.emit(Signal::InstanceStarted {
            key: self.instance.key.clone(),
            state: start,
        });
        Ok(actions)
    }

    /// Applies one event through the engine, emitting telemetry and
    /// dispatcher notifications on success and fault telemetry on
    /// defects.
    fn apply(
        &mut self,
        event: &str,
        input: &Value,
    ) -> Result<(CallReply, Vec<Action>), RuntimeError> {
        match self.engine.apply_event(&mut self.instance, event, input) {
            Ok(applied) => {
                self.telemetry.emit(Signal::TransitionApplied {
                    key: self.instance.key.clone(),
                    from: applied.from.clone(),
                    event: applied.event.clone(),
                    result: applied.result.clone(),
                    to: applied.to.clone(),
                    seq: applied.seq,
                });
                self.dispatcher.dispatch(Notification {
                    key: self.instance.key.clone(),
                    event: applied.event.clone(),
                    result: applied.result.clone(),
                    from: applied.from.clone(),
                    to: applied.to.clone(),
                    seq: applied.seq,
                    payload: Value::Null,
                });
                let reply = CallReply {
                    key: self.instance.key.clone(),
                    from: applied.from,
                    result: applied.result,
                    to: applied.to,
                    seq: applied.seq,
                };
                Ok((reply, applied.actions))
            }
            Err(err) => {
                if !err.is_recoverable() {
                    self.telemetry.emit(Signal::TransitionFaulted {
                        key: self.instance.key.clone(),
                        event: event.to_string(),
                        code: err.error_code(),
                        message: err.to_string(),
                    });
                    tracing::error!(
                        key = %self.instance.key,
                        %event,
                        code = err.error_code(),
                        error = %err,
                        "transition faulted"
                    );
                }
                Err(err.into())
            }
        }
    }

    /// Executes deferred actions: arms/re-arms the state timeout and
    /// publishes custom emissions. A timer armed for a state the
    /// instance has since left is invalidated.
    fn handle_actions(
        &mut self,
        actions: Vec<Action>,
        armed: &mut Option<(StateKey, String)>,
        mut timer: Pin<&mut Sleep>,
    ) {
        if let Some((state, _)) = armed {
            if *state != self.instance.current {
                *armed = None;
            }
        }
        for action in actions {
            match action {
                Action::ArmTimeout { state, event, after } => {
                    if state == self.instance.current {
                        timer.as_mut().reset(Instant::now() + after);
                        *armed = Some((state, event));
                    }
                }
                Action::Emit { event, payload } => {
                    self.dispatcher.dispatch(Notification {
                        key: self.instance.key.clone(),
                        event,
                        result: ResultSymbol::ok(),
                        from: self.instance.current.clone(),
                        to: self.instance.current.clone(),
                        seq: self.instance.counter,
                        payload,
                    });
                }
            }
        }
    }

    /// Terminate sequence: leave hooks on graceful stops, then the
    /// stopped signal either way. "Let it crash" fault exits skip the
    /// hooks deliberately.
    fn finish(&mut self, exit: &ActorExit) {
        if *exit == ActorExit::Normal && self.instance.is_running() {
            let definition = self.instance.definition.clone();
            let current = self.instance.current.clone();
            if let Some(node) = definition.state(&current) {
                if let Err(err) = node.hooks.on_leave(&mut self.instance.state_scope(&current)) {
                    tracing::warn!(key = %self.instance.key, error = %err, "leave hook failed during stop");
                }
            }
            if let Err(err) = definition
                .process_hooks()
                .on_terminate(&mut self.instance.state_scope(&current))
            {
                tracing::warn!(key = %self.instance.key, error = %err, "terminate hook failed");
            }
        }
        self.instance.mark_stopped();
        self.telemetry.emit(Signal::InstanceStopped {
            key: self.instance.key.clone(),
            state: self.instance.current.clone(),
        });
    }
}
