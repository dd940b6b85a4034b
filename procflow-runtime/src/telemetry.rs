//! Lifecycle telemetry: side-channel signals emitted by actors.
//!
//! Signals ride a broadcast channel; emitting never blocks the firing
//! instance and lagging subscribers lose oldest signals rather than
//! applying backpressure.

use procflow_core::{ProcessKey, ResultSymbol, StateKey};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// A lifecycle signal.
#[derive(Debug, Clone)]
pub enum Signal {
    /// An instance initialized and entered its start state.
    InstanceStarted { key: ProcessKey, state: StateKey },
    /// A transition completed.
    TransitionApplied {
        key: ProcessKey,
        from: StateKey,
        event: String,
        result: ResultSymbol,
        to: StateKey,
        seq: u64,
    },
    /// A firing faulted with a defect; the instance terminates.
    TransitionFaulted {
        key: ProcessKey,
        event: String,
        code: &'static str,
        message: String,
    },
    /// An instance stopped and deregistered.
    InstanceStopped { key: ProcessKey, state: StateKey },
}

/// Telemetry fan-out.
pub struct Telemetry {
    sender: broadcast::Sender<Signal>,
}

impl Telemetry {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribes to all signals from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.sender.subscribe()
    }

    /// Emits a signal. Never blocks; dropped if nobody listens.
    pub fn emit(&self, signal: Signal) {
        let _ = self.sender.send(signal);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Spawns a task logging every signal through `tracing`.
pub fn attach_default_logger(telemetry: &Telemetry) -> JoinHandle<()> {
    let mut rx = telemetry.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(Signal::InstanceStarted { key, state }) => {
                    tracing::info!(%key, %state, "instance started");
                }
                Ok(Signal::TransitionApplied {
                    key,
                    from,
                    event,
                    result,
                    to,
                    seq,
                }) => {
                    tracing::debug!(%key, %from, %event, %result, %to, seq, "transition applied");
                }
                Ok(Signal::TransitionFaulted {
                    key,
                    event,
                    code,
                    message,
                }) => {
                    tracing::error!(%key, %event, code, %message, "transition faulted");
                }
                Ok(Signal::InstanceStopped { key, state }) => {
                    tracing::info!(%key, %state, "instance stopped");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "telemetry logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_subscribe() {
        let telemetry = Telemetry::new(16);
        let mut rx = telemetry.subscribe();

        telemetry.emit(Signal::InstanceStarted {
            key: ProcessKey::new("review", "i-1"),
            state: "draft".into(),
        });

        match rx.recv().await.unwrap() {
            Signal::InstanceStarted { key, state } => {
                assert_eq!(key.to_string(), "review:i-1");
                assert_eq!(state.as_str(), "draft");
            }
            other => panic!("unexpected signal: {other:?}"),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_noop() {
        let telemetry = Telemetry::new(16);
        telemetry.emit(Signal::InstanceStopped {
            key: ProcessKey::new("review", "i-1"),
            state: "reviewed".into(),
        });
        assert_eq!(telemetry.receiver_count(), 0);
    }
}
