//! Process instance state.

use crate::context::{self, HookScope};
use crate::definition::{Definition, StateKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Unique identity of a live process: definition name plus a
/// user-assigned instance id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessKey {
    pub definition: String,
    pub id: String,
}

impl ProcessKey {
    pub fn new(definition: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            definition: definition.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ProcessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.definition, self.id)
    }
}

/// Instance lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// Created but not yet initialized by its actor.
    #[default]
    Created,
    /// Processing events.
    Running,
    /// Stopped; the actor has terminated.
    Stopped,
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// A running realization of a [`Definition`].
///
/// Mutated only by its owning actor; the definition itself is shared
/// read-only, while each instance carries live copies of the per-state
/// and per-event contexts and options so they can diverge per instance.
pub struct Instance {
    /// Process identity.
    pub key: ProcessKey,

    /// The compiled definition this instance runs.
    pub definition: Arc<Definition>,

    /// Current state key.
    pub current: StateKey,

    /// Instance-wide mutable context.
    pub ctx: Value,

    /// Completed-transition counter; equals the last history sequence.
    pub counter: u64,

    /// Lifecycle stage.
    pub lifecycle: Lifecycle,

    /// Nested child process identities spawned by hooks.
    pub children: Vec<ProcessKey>,

    /// Creation timestamp (Unix millis).
    pub created_at: i64,

    /// Last update timestamp (Unix millis).
    pub updated_at: i64,

    /// Live per-state scoped contexts.
    state_ctx: HashMap<StateKey, Value>,

    /// Live per-event scoped contexts, keyed by edge key.
    event_ctx: HashMap<String, Value>,

    /// Per-instance option overrides, keyed by state key, merged over
    /// the definition's options on read.
    state_options: HashMap<StateKey, Map<String, Value>>,
}

impl Instance {
    /// Creates an instance resting at the definition's start state.
    pub fn new(key: ProcessKey, definition: Arc<Definition>, args: Value) -> Self {
        let now = now_millis();
        let state_ctx = definition
            .states()
            .map(|node| (node.key.clone(), node.ctx.clone()))
            .collect();
        let event_ctx = definition
            .events()
            .map(|edge| (edge.key.clone(), edge.ctx.clone()))
            .collect();
        Self {
            current: definition.start().clone(),
            key,
            definition,
            ctx: context::merge(&context::new(), &args),
            counter: 0,
            lifecycle: Lifecycle::Created,
            children: Vec::new(),
            created_at: now,
            updated_at: now,
            state_ctx,
            event_ctx,
            state_options: HashMap::new(),
        }
    }

    /// A hook scope over the instance context and one state's context.
    pub fn state_scope(&mut self, key: &StateKey) -> HookScope<'_> {
        let node_ctx = self
            .state_ctx
            .entry(key.clone())
            .or_insert_with(context::new);
        HookScope {
            process_ctx: &mut self.ctx,
            node_ctx,
        }
    }

    /// A hook scope over the instance context and one event's context.
    pub fn event_scope(&mut self, edge_key: &str) -> HookScope<'_> {
        let node_ctx = self
            .event_ctx
            .entry(edge_key.to_string())
            .or_insert_with(context::new);
        HookScope {
            process_ctx: &mut self.ctx,
            node_ctx,
        }
    }

    /// Reads a state option, preferring the per-instance override.
    pub fn state_option(&self, key: &StateKey, option: &str) -> Option<&Value> {
        if let Some(v) = self.state_options.get(key).and_then(|o| o.get(option)) {
            return Some(v);
        }
        self.definition
            .state(key)
            .and_then(|node| node.options.get(option))
    }

    /// Overrides a state option for this instance only.
    pub fn set_state_option(&mut self, key: &StateKey, option: impl Into<String>, value: Value) {
        self.state_options
            .entry(key.clone())
            .or_default()
            .insert(option.into(), value);
    }

    /// Moves the instance to a new resting state after a completed
    /// transition and bumps the counter.
    pub fn apply_transition(&mut self, to: StateKey) -> u64 {
        self.current = to;
        self.counter += 1;
        self.updated_at = now_millis();
        self.counter
    }

    pub fn mark_running(&mut self) {
        self.lifecycle = Lifecycle::Running;
        self.updated_at = now_millis();
    }

    pub fn mark_stopped(&mut self) {
        self.lifecycle = Lifecycle::Stopped;
        self.updated_at = now_millis();
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("key", &self.key)
            .field("current", &self.current)
            .field("counter", &self.counter)
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}
