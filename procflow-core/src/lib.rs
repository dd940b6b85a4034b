//! # procflow-core
//!
//! Workflow engine core for procflow.
//!
//! This crate provides:
//! - Process definition construction and validation
//! - State and event behavior traits with built-in variants
//! - Transition execution (event + result -> state change)
//! - Append-only per-instance history
//! - Graphviz DOT export of definitions

pub mod context;
pub mod definition;
pub mod dot;
pub mod engine;
pub mod error;
pub mod event;
pub mod history;
pub mod instance;
pub mod state;

pub use context::HookScope;
pub use definition::{
    compile, compile_json, Definition, DefinitionBuilder, DefinitionSpec, EventEdge, EventSpec,
    ProcessHooks, StateKey, StateNode, StateSpec,
};
pub use engine::{Applied, TransitionEngine};
pub use error::CoreError;
pub use event::{EventHooks, ResultSymbol};
pub use history::{HistoryEntry, HistoryStore};
pub use instance::{Instance, Lifecycle, ProcessKey};
pub use state::{Action, StateHooks, StateType};
