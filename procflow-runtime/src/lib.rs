//! procflow-runtime - Concurrent execution layer for procflow
//!
//! Runs compiled definitions as isolated actors: one tokio task and one
//! FIFO mailbox per instance, a registry enforcing key uniqueness, a
//! supervising manager per definition, a duplicate-key event dispatcher,
//! and a telemetry side-channel.

pub mod actor;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod manager;
pub mod registry;
pub mod runtime;
pub mod telemetry;

pub use actor::{ActorExit, ActorHandle, CallReply};
pub use config::{Config, ConfigError, RestartPolicy};
pub use dispatcher::{DispatchKey, EventDispatcher, ListenerId, Notification};
pub use error::RuntimeError;
pub use manager::ProcessManager;
pub use registry::ProcessRegistry;
pub use runtime::Runtime;
pub use telemetry::{attach_default_logger, Signal, Telemetry};

use tracing_subscriber::EnvFilter;

/// Initializes global logging from `RUST_LOG`, defaulting to `info`.
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}
