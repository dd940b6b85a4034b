//! procflow - Declarative process/workflow engine
//!
//! Definitions are directed graphs of states joined by events. Each
//! event declares the result symbols it may produce and where each one
//! routes; a definition compiles into an immutable, validated
//! [`Definition`] that the runtime executes as one actor per instance.
//!
//! ```no_run
//! use procflow::{Config, DefinitionBuilder, Runtime, StateType};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let definition = DefinitionBuilder::new("review")
//!     .state("draft", StateType::Start)
//!     .state("reviewing", StateType::Custom)
//!     .state("approved", StateType::End)
//!     .event("submit", "draft", "reviewing")
//!     .event("agree", "reviewing", "approved")
//!     .build()?;
//!
//! let runtime = Runtime::new(Config::default());
//! runtime.register(definition)?;
//! runtime.start("review", "r1", json!({}))?;
//! let reply = runtime.call("review", "r1", "submit", json!({})).await?;
//! assert_eq!(reply.to.as_str(), "reviewing");
//! # Ok(())
//! # }
//! ```

pub use procflow_core::{
    compile, compile_json, Action, Applied, CoreError, Definition, DefinitionBuilder,
    DefinitionSpec, EventEdge, EventHooks, EventSpec, HistoryEntry, HistoryStore, HookScope,
    Instance, Lifecycle, ProcessHooks, ProcessKey, ResultSymbol, StateHooks, StateKey, StateNode,
    StateSpec, StateType, TransitionEngine,
};
pub use procflow_core::dot;

pub use procflow_runtime::{
    attach_default_logger, init_logging, ActorExit, ActorHandle, CallReply, Config, ConfigError,
    DispatchKey, EventDispatcher, ListenerId, Notification, ProcessManager, ProcessRegistry,
    RestartPolicy, Runtime, RuntimeError, Signal, Telemetry,
};
