//! Process definition types: the compiled, validated transition graph.
//!
//! A definition can be built fluently:
//!
//! ```
//! use procflow_core::definition::DefinitionBuilder;
//! use procflow_core::state::StateType;
//!
//! let def = DefinitionBuilder::new("review")
//!     .version("1.0.1")
//!     .state("draft", StateType::Start)
//!     .state("reviewing", StateType::Custom)
//!     .state("reviewed", StateType::End)
//!     .event("submit", "draft", "reviewing")
//!     .event("agree", "reviewing", "reviewed")
//!     .results(["foo"])
//!     .build()
//!     .unwrap();
//! assert_eq!(def.start().as_str(), "draft");
//! ```
//!
//! or compiled from a serde-friendly spec (JSON/YAML):
//!
//! ```json
//! {
//!   "name": "review",
//!   "states": [
//!     {"key": "draft", "type": "start"},
//!     {"key": "reviewing"},
//!     {"key": "reviewed", "type": "end"}
//!   ],
//!   "events": [
//!     {"name": "submit", "from": "draft", "to": "reviewing"},
//!     {"name": "agree", "from": "reviewing", "to": "reviewed", "results": ["foo"]}
//!   ]
//! }
//! ```

use crate::context::HookScope;
use crate::error::CoreError;
use crate::event::{Basic, EventHooks, ResultSymbol, StateTimeout};
use crate::state::{Action, Bypass, End, Plain, Start, StateHooks, StateType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A state key: the unique identifier of a node in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateKey(pub String);

impl StateKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StateKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StateKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hooks invoked at instance creation and termination.
pub trait ProcessHooks: Send + Sync {
    /// Populates initial context from the caller-supplied args.
    fn on_init(&self, scope: &mut HookScope<'_>, args: &Value) -> Result<Vec<Action>, CoreError> {
        let _ = (scope, args);
        Ok(Vec::new())
    }

    /// Invoked when the instance stops, after the current state's leave hook.
    fn on_terminate(&self, scope: &mut HookScope<'_>) -> Result<(), CoreError> {
        let _ = scope;
        Ok(())
    }
}

/// Default process behavior: no init or terminate logic.
pub struct DefaultProcessHooks;

impl ProcessHooks for DefaultProcessHooks {}

/// A node in the transition graph.
#[derive(Clone)]
pub struct StateNode {
    /// Unique key within the definition.
    pub key: StateKey,
    /// Display name.
    pub name: String,
    /// Node kind, consistent with `hooks.kind()`.
    pub kind: StateType,
    /// Keys of edges ending at this node, in declaration order.
    pub inbound: Vec<String>,
    /// Keys of edges starting at this node, in declaration order.
    pub outbound: Vec<String>,
    /// Free-form options.
    pub options: Map<String, Value>,
    /// Scoped context seeded into each instance's live copy.
    pub ctx: Value,
    /// Behavior implementation.
    pub hooks: Arc<dyn StateHooks>,
}

impl fmt::Debug for StateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateNode")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("inbound", &self.inbound)
            .field("outbound", &self.outbound)
            .finish()
    }
}

/// An edge in the transition graph.
#[derive(Clone)]
pub struct EventEdge {
    /// Unique key: the explicit alias, or `{name}_{from}`.
    pub key: String,
    /// Event name used by callers to fire this edge.
    pub name: String,
    /// Source state.
    pub from: StateKey,
    /// Default destination state.
    pub to: StateKey,
    /// Declared result symbols. Defaults to `{ok}`.
    pub results: Vec<ResultSymbol>,
    /// Per-result destinations overriding the default.
    pub routes: BTreeMap<ResultSymbol, StateKey>,
    /// Free-form options.
    pub options: Map<String, Value>,
    /// Scoped context seeded into each instance's live copy.
    pub ctx: Value,
    /// Behavior implementation.
    pub hooks: Arc<dyn EventHooks>,
}

impl EventEdge {
    /// The destination for a given result symbol.
    pub fn destination(&self, result: &ResultSymbol) -> &StateKey {
        self.routes.get(result).unwrap_or(&self.to)
    }

    /// True if `result` is in the declared result set.
    pub fn allows(&self, result: &ResultSymbol) -> bool {
        self.results.contains(result)
    }

    /// The state-timeout duration, if this is a timeout edge.
    pub fn timeout(&self) -> Option<Duration> {
        if !self.hooks.is_timeout() {
            return None;
        }
        self.options
            .get("timeout_ms")
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
    }
}

impl fmt::Debug for EventEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEdge")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("results", &self.results)
            .field("routes", &self.routes)
            .finish()
    }
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Raw state declaration as stored/transmitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSpec {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "StateSpec::default_type", rename = "type")]
    pub state_type: StateType,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

impl StateSpec {
    fn default_type() -> StateType {
        StateType::Custom
    }
}

/// Raw event declaration as stored/transmitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSpec {
    pub name: String,
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub routes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

/// Raw process definition as stored/transmitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionSpec {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub states: Vec<StateSpec>,
    pub events: Vec<EventSpec>,
}

/// Compiles a raw spec into a validated [`Definition`].
///
/// Spec-compiled definitions use the built-in behaviors; events whose
/// options carry `timeout_ms` become state-timeout events. Custom hook
/// implementations require [`DefinitionBuilder`].
pub fn compile(spec: DefinitionSpec) -> Result<Definition, CoreError> {
    let mut builder = DefinitionBuilder::new(&spec.name).version(&spec.version);
    for s in &spec.states {
        builder = builder.state(&s.key, s.state_type);
        if let Some(name) = &s.name {
            builder = builder.state_name(name);
        }
        for (k, v) in &s.options {
            builder = builder.state_option(k, v.clone());
        }
    }
    for e in &spec.events {
        builder = builder.event(&e.name, &e.from, &e.to);
        if let Some(alias) = &e.alias {
            builder = builder.alias(alias);
        }
        if !e.results.is_empty() {
            builder = builder.results(e.results.iter().map(String::as_str));
        }
        for (result, to) in &e.routes {
            builder = builder.route(result, to);
        }
        if e.options.contains_key("timeout_ms") {
            builder = builder.event_hooks(Arc::new(StateTimeout));
        }
        for (k, v) in &e.options {
            builder = builder.event_option(k, v.clone());
        }
    }
    builder.build()
}

/// Parses and compiles a definition from a JSON value.
pub fn compile_json(json: &Value) -> Result<Definition, CoreError> {
    let spec: DefinitionSpec = serde_json::from_value(json.clone())?;
    compile(spec)
}

struct StateDecl {
    key: StateKey,
    name: String,
    kind: StateType,
    options: Map<String, Value>,
    hooks: Arc<dyn StateHooks>,
}

struct EventDecl {
    name: String,
    from: StateKey,
    to: StateKey,
    alias: Option<String>,
    results: Vec<ResultSymbol>,
    routes: BTreeMap<ResultSymbol, StateKey>,
    options: Map<String, Value>,
    hooks: Arc<dyn EventHooks>,
}

/// Fluent construction API for definitions.
///
/// Modifier methods (`state_name`, `state_option`, `results`, `route`,
/// `alias`, `event_hooks`, `event_option`) apply to the most recently
/// declared state or event; calling one before any declaration is a
/// build-time error.
pub struct DefinitionBuilder {
    name: String,
    version: String,
    states: Vec<StateDecl>,
    events: Vec<EventDecl>,
    process_hooks: Arc<dyn ProcessHooks>,
    misuse: Vec<String>,
}

impl DefinitionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: default_version(),
            states: Vec::new(),
            events: Vec::new(),
            process_hooks: Arc::new(DefaultProcessHooks),
            misuse: Vec::new(),
        }
    }

    /// Sets the definition version tag.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Declares a state with the built-in behavior for its type.
    pub fn state(self, key: impl Into<String>, kind: StateType) -> Self {
        let hooks: Arc<dyn StateHooks> = match kind {
            StateType::Start => Arc::new(Start),
            StateType::End => Arc::new(End),
            StateType::Bypass => Arc::new(Bypass),
            StateType::Custom => Arc::new(Plain),
        };
        self.state_with(key, hooks)
    }

    /// Declares a state with a custom behavior implementation.
    pub fn state_with(mut self, key: impl Into<String>, hooks: Arc<dyn StateHooks>) -> Self {
        let key = StateKey::new(key);
        self.states.push(StateDecl {
            name: key.as_str().to_string(),
            kind: hooks.kind(),
            key,
            options: Map::new(),
            hooks,
        });
        self
    }

    /// Sets the display name of the last declared state.
    pub fn state_name(mut self, name: impl Into<String>) -> Self {
        match self.states.last_mut() {
            Some(s) => s.name = name.into(),
            None => self.misuse.push("state_name before any state".to_string()),
        }
        self
    }

    /// Sets an option on the last declared state.
    pub fn state_option(mut self, key: impl Into<String>, value: Value) -> Self {
        match self.states.last_mut() {
            Some(s) => {
                s.options.insert(key.into(), value);
            }
            None => self.misuse.push("state_option before any state".to_string()),
        }
        self
    }

    /// Declares an event edge with the default behavior and result set.
    pub fn event(
        self,
        name: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.event_with(name, from, to, Arc::new(Basic))
    }

    /// Declares an event edge with a custom behavior implementation.
    pub fn event_with(
        mut self,
        name: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        hooks: Arc<dyn EventHooks>,
    ) -> Self {
        self.events.push(EventDecl {
            name: name.into(),
            from: StateKey::new(from.into()),
            to: StateKey::new(to.into()),
            alias: None,
            results: vec![ResultSymbol::ok()],
            routes: BTreeMap::new(),
            options: Map::new(),
            hooks,
        });
        self
    }

    /// Declares a state-timeout event: armed when `from` is entered,
    /// self-fired after `after` if the state has not been left.
    pub fn timeout_event(
        self,
        name: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        after: Duration,
    ) -> Self {
        self.event_with(name, from, to, Arc::new(StateTimeout))
            .event_option("timeout_ms", Value::from(after.as_millis() as u64))
    }

    /// Replaces the declared result set of the last declared event.
    pub fn results<'a>(mut self, results: impl IntoIterator<Item = &'a str>) -> Self {
        match self.events.last_mut() {
            Some(e) => e.results = results.into_iter().map(ResultSymbol::from).collect(),
            None => self.misuse.push("results before any event".to_string()),
        }
        self
    }

    /// Routes one result of the last declared event to a destination
    /// other than its default.
    pub fn route(mut self, result: impl Into<String>, to: impl Into<String>) -> Self {
        match self.events.last_mut() {
            Some(e) => {
                e.routes
                    .insert(ResultSymbol::new(result.into()), StateKey::new(to.into()));
            }
            None => self.misuse.push("route before any event".to_string()),
        }
        self
    }

    /// Sets an explicit key for the last declared event, overriding the
    /// derived `{name}_{from}` key.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        match self.events.last_mut() {
            Some(e) => e.alias = Some(alias.into()),
            None => self.misuse.push("alias before any event".to_string()),
        }
        self
    }

    /// Replaces the behavior of the last declared event.
    pub fn event_hooks(mut self, hooks: Arc<dyn EventHooks>) -> Self {
        match self.events.last_mut() {
            Some(e) => e.hooks = hooks,
            None => self.misuse.push("event_hooks before any event".to_string()),
        }
        self
    }

    /// Sets an option on the last declared event.
    pub fn event_option(mut self, key: impl Into<String>, value: Value) -> Self {
        match self.events.last_mut() {
            Some(e) => {
                e.options.insert(key.into(), value);
            }
            None => self.misuse.push("event_option before any event".to_string()),
        }
        self
    }

    /// Sets the definition-level init/terminate hooks.
    pub fn process_hooks(mut self, hooks: Arc<dyn ProcessHooks>) -> Self {
        self.process_hooks = hooks;
        self
    }

    /// Validates the declarations and produces an immutable definition.
    pub fn build(self) -> Result<Definition, CoreError> {
        if let Some(reason) = self.misuse.into_iter().next() {
            return Err(CoreError::InvalidDefinition { reason });
        }
        if self.name.is_empty() {
            return Err(CoreError::InvalidDefinition {
                reason: "definition name is empty".to_string(),
            });
        }

        // Build state nodes, checking key uniqueness and type counts.
        let mut states: HashMap<StateKey, StateNode> = HashMap::new();
        let mut state_order = Vec::with_capacity(self.states.len());
        let mut start: Option<StateKey> = None;
        let mut has_end = false;
        for decl in self.states {
            if decl.key.as_str().is_empty() {
                return Err(CoreError::InvalidDefinition {
                    reason: "state key is empty".to_string(),
                });
            }
            if states.contains_key(&decl.key) {
                return Err(CoreError::InvalidDefinition {
                    reason: format!("duplicate state key '{}'", decl.key),
                });
            }
            match decl.kind {
                StateType::Start => {
                    if let Some(existing) = &start {
                        return Err(CoreError::InvalidDefinition {
                            reason: format!(
                                "multiple start states: '{}' and '{}'",
                                existing, decl.key
                            ),
                        });
                    }
                    start = Some(decl.key.clone());
                }
                StateType::End => has_end = true,
                _ => {}
            }
            state_order.push(decl.key.clone());
            states.insert(
                decl.key.clone(),
                StateNode {
                    key: decl.key,
                    name: decl.name,
                    kind: decl.kind,
                    inbound: Vec::new(),
                    outbound: Vec::new(),
                    options: decl.options,
                    ctx: crate::context::new(),
                    hooks: decl.hooks,
                },
            );
        }
        let start = start.ok_or_else(|| CoreError::InvalidDefinition {
            reason: "no start state declared".to_string(),
        })?;
        if !has_end {
            return Err(CoreError::InvalidDefinition {
                reason: "no end state declared".to_string(),
            });
        }

        // Build event edges, checking endpoint and key validity.
        let mut events: HashMap<String, EventEdge> = HashMap::new();
        let mut event_order = Vec::with_capacity(self.events.len());
        let mut transitions: HashMap<(StateKey, String), String> = HashMap::new();
        for decl in self.events {
            if decl.name.is_empty() {
                return Err(CoreError::InvalidDefinition {
                    reason: "event name is empty".to_string(),
                });
            }
            let key = decl
                .alias
                .clone()
                .unwrap_or_else(|| format!("{}_{}", decl.name, decl.from));
            if events.contains_key(&key) {
                return Err(CoreError::DuplicateEvent { key });
            }
            if !states.contains_key(&decl.from) {
                return Err(CoreError::InvalidDefinition {
                    reason: format!("event '{}' starts at undeclared state '{}'", key, decl.from),
                });
            }
            if decl.results.is_empty() {
                return Err(CoreError::InvalidDefinition {
                    reason: format!("event '{}' declares an empty result set", key),
                });
            }
            for dest in std::iter::once(&decl.to).chain(decl.routes.values()) {
                let node = states
                    .get(dest)
                    .ok_or_else(|| CoreError::InvalidDefinition {
                        reason: format!("event '{}' targets undeclared state '{}'", key, dest),
                    })?;
                if node.kind.is_start() {
                    return Err(CoreError::InvalidDefinition {
                        reason: format!("event '{}' targets start state '{}'", key, dest),
                    });
                }
            }
            for result in decl.routes.keys() {
                if !decl.results.contains(result) {
                    return Err(CoreError::InvalidDefinition {
                        reason: format!(
                            "event '{}' routes undeclared result '{}'",
                            key, result
                        ),
                    });
                }
            }
            let pair = (decl.from.clone(), decl.name.clone());
            if transitions.contains_key(&pair) {
                return Err(CoreError::DuplicateEvent {
                    key: format!("{}_{}", decl.name, decl.from),
                });
            }
            transitions.insert(pair, key.clone());
            event_order.push(key.clone());
            events.insert(
                key.clone(),
                EventEdge {
                    key,
                    name: decl.name,
                    from: decl.from,
                    to: decl.to,
                    results: decl.results,
                    routes: decl.routes,
                    options: decl.options,
                    ctx: crate::context::new(),
                    hooks: decl.hooks,
                },
            );
        }

        // Wire ordered inbound/outbound edge lists.
        for key in &event_order {
            let edge = &events[key];
            let (from, dests) = (
                edge.from.clone(),
                std::iter::once(edge.to.clone())
                    .chain(edge.routes.values().cloned())
                    .collect::<Vec<_>>(),
            );
            if let Some(node) = states.get_mut(&from) {
                node.outbound.push(key.clone());
            }
            let mut seen = HashSet::new();
            for dest in dests {
                if seen.insert(dest.clone()) {
                    if let Some(node) = states.get_mut(&dest) {
                        node.inbound.push(key.clone());
                    }
                }
            }
        }

        // Bypass arity: transparent pass-throughs need >= 1 inbound and
        // exactly 1 outbound edge.
        for key in &state_order {
            let node = &states[key];
            if node.kind.is_bypass() {
                if node.inbound.is_empty() {
                    return Err(CoreError::InvalidDefinition {
                        reason: format!("bypass state '{}' has no inbound edge", key),
                    });
                }
                if node.outbound.len() != 1 {
                    return Err(CoreError::InvalidDefinition {
                        reason: format!(
                            "bypass state '{}' has {} outbound edges, exactly 1 required",
                            key,
                            node.outbound.len()
                        ),
                    });
                }
            }
        }

        // Bypass chains must terminate: a cycle would make a firing
        // loop forever without reaching a resting state.
        for key in &state_order {
            if !states[key].kind.is_bypass() {
                continue;
            }
            let mut visited = HashSet::new();
            let mut cursor = key.clone();
            while states[&cursor].kind.is_bypass() {
                if !visited.insert(cursor.clone()) {
                    return Err(CoreError::InvalidDefinition {
                        reason: format!("bypass cycle through state '{}'", key),
                    });
                }
                let out = &states[&cursor].outbound[0];
                cursor = events[out].to.clone();
            }
        }

        // Every state must be reachable from the start state.
        let mut reachable = HashSet::new();
        let mut queue = vec![start.clone()];
        while let Some(key) = queue.pop() {
            if !reachable.insert(key.clone()) {
                continue;
            }
            for edge_key in &states[&key].outbound {
                let edge = &events[edge_key];
                for dest in std::iter::once(&edge.to).chain(edge.routes.values()) {
                    if !reachable.contains(dest) {
                        queue.push(dest.clone());
                    }
                }
            }
        }
        let mut unreachable: Vec<&StateKey> = state_order
            .iter()
            .filter(|k| !reachable.contains(*k))
            .collect();
        if !unreachable.is_empty() {
            unreachable.sort();
            return Err(CoreError::InvalidDefinition {
                reason: format!(
                    "unreachable states: {}",
                    unreachable
                        .iter()
                        .map(|k| k.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            });
        }

        // Raw form for storage/export plus a checksum of it.
        let raw = DefinitionSpec {
            name: self.name.clone(),
            version: self.version.clone(),
            states: state_order
                .iter()
                .map(|k| {
                    let node = &states[k];
                    StateSpec {
                        key: node.key.as_str().to_string(),
                        name: (node.name != node.key.as_str()).then(|| node.name.clone()),
                        state_type: node.kind,
                        options: node.options.clone(),
                    }
                })
                .collect(),
            events: event_order
                .iter()
                .map(|k| {
                    let edge = &events[k];
                    EventSpec {
                        name: edge.name.clone(),
                        from: edge.from.as_str().to_string(),
                        to: edge.to.as_str().to_string(),
                        alias: (edge.key != format!("{}_{}", edge.name, edge.from))
                            .then(|| edge.key.clone()),
                        results: edge.results.iter().map(|r| r.as_str().to_string()).collect(),
                        routes: edge
                            .routes
                            .iter()
                            .map(|(r, s)| (r.as_str().to_string(), s.as_str().to_string()))
                            .collect(),
                        options: edge.options.clone(),
                    }
                })
                .collect(),
        };
        let checksum = format!("{:08x}", crc32c::crc32c(&serde_json::to_vec(&raw)?));

        Ok(Definition {
            name: self.name,
            version: self.version,
            checksum,
            start,
            states,
            state_order,
            events,
            event_order,
            transitions,
            process_hooks: self.process_hooks,
            raw,
        })
    }
}

/// Validated and indexed process definition. Immutable after compile;
/// shared read-only by every instance of its process type.
#[derive(Clone)]
pub struct Definition {
    /// Definition name.
    pub name: String,
    /// Version tag.
    pub version: String,
    /// crc32c of the raw form, for integrity checks.
    pub checksum: String,
    start: StateKey,
    states: HashMap<StateKey, StateNode>,
    state_order: Vec<StateKey>,
    events: HashMap<String, EventEdge>,
    event_order: Vec<String>,
    /// (from-state, event-name) -> edge key.
    transitions: HashMap<(StateKey, String), String>,
    process_hooks: Arc<dyn ProcessHooks>,
    raw: DefinitionSpec,
}

impl Definition {
    /// The declared start state.
    pub fn start(&self) -> &StateKey {
        &self.start
    }

    /// Looks up a state node.
    pub fn state(&self, key: &StateKey) -> Option<&StateNode> {
        self.states.get(key)
    }

    /// Looks up an event edge by its key.
    pub fn event(&self, key: &str) -> Option<&EventEdge> {
        self.events.get(key)
    }

    /// Resolves the edge triggered by `event` from `state`, if any.
    pub fn resolve(&self, state: &StateKey, event: &str) -> Option<&EventEdge> {
        self.transitions
            .get(&(state.clone(), event.to_string()))
            .and_then(|key| self.events.get(key))
    }

    /// States in declaration order.
    pub fn states(&self) -> impl Iterator<Item = &StateNode> {
        self.state_order.iter().map(|k| &self.states[k])
    }

    /// Events in declaration order.
    pub fn events(&self) -> impl Iterator<Item = &EventEdge> {
        self.event_order.iter().map(|k| &self.events[k])
    }

    /// Event names fireable from the given state.
    pub fn events_from(&self, state: &StateKey) -> Vec<&str> {
        self.states
            .get(state)
            .map(|node| {
                node.outbound
                    .iter()
                    .map(|k| self.events[k].name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// The definition-level init/terminate hooks.
    pub fn process_hooks(&self) -> &Arc<dyn ProcessHooks> {
        &self.process_hooks
    }

    /// The raw form as JSON.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.raw).expect("raw spec serializes")
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("checksum", &self.checksum)
            .field("start", &self.start)
            .field("states", &self.state_order)
            .field("events", &self.event_order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn review_builder() -> DefinitionBuilder {
        DefinitionBuilder::new("review")
            .version("1.0.1")
            .state("draft", StateType::Start)
            .state("reviewing", StateType::Custom)
            .state("reviewed", StateType::End)
            .state("canceled", StateType::End)
            .event("submit", "draft", "reviewing")
            .event("agree", "reviewing", "reviewed")
            .results(["foo"])
            .event("cancel1", "draft", "canceled")
            .results(["foo"])
    }

    #[test]
    fn test_build_review() {
        let def = review_builder().build().unwrap();
        assert_eq!(def.name, "review");
        assert_eq!(def.version, "1.0.1");
        assert_eq!(def.start().as_str(), "draft");
        assert_eq!(def.state_count(), 4);
        assert!(!def.checksum.is_empty());

        let edge = def.resolve(&"draft".into(), "submit").unwrap();
        assert_eq!(edge.to.as_str(), "reviewing");
        assert_eq!(edge.results, vec![ResultSymbol::ok()]);

        let agree = def.resolve(&"reviewing".into(), "agree").unwrap();
        assert!(agree.allows(&"foo".into()));
        assert!(!agree.allows(&ResultSymbol::ok()));
    }

    #[test]
    fn test_edge_key_derivation_and_alias() {
        let def = DefinitionBuilder::new("t")
            .state("a", StateType::Start)
            .state("b", StateType::Custom)
            .state("c", StateType::End)
            .event("go", "a", "b")
            .event("go", "b", "c")
            .alias("go_again")
            .build()
            .unwrap();
        assert!(def.event("go_a").is_some());
        assert!(def.event("go_again").is_some());
        assert_eq!(def.resolve(&"b".into(), "go").unwrap().key, "go_again");
    }

    #[test]
    fn test_duplicate_event_key() {
        let result = DefinitionBuilder::new("t")
            .state("a", StateType::Start)
            .state("b", StateType::End)
            .event("go", "a", "b")
            .event("go", "a", "b")
            .build();
        assert!(matches!(result, Err(CoreError::DuplicateEvent { .. })));
    }

    #[test]
    fn test_alias_collision() {
        let result = DefinitionBuilder::new("t")
            .state("a", StateType::Start)
            .state("b", StateType::Custom)
            .state("c", StateType::End)
            .event("go", "a", "b")
            .event("leave", "b", "c")
            .alias("go_a")
            .build();
        assert!(matches!(result, Err(CoreError::DuplicateEvent { .. })));
    }

    #[test]
    fn test_multiple_start_states() {
        let result = DefinitionBuilder::new("t")
            .state("a", StateType::Start)
            .state("b", StateType::Start)
            .build();
        assert!(matches!(
            result,
            Err(CoreError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn test_missing_end_state() {
        let result = DefinitionBuilder::new("t")
            .state("a", StateType::Start)
            .state("b", StateType::Custom)
            .event("go", "a", "b")
            .build();
        assert!(matches!(
            result,
            Err(CoreError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn test_undeclared_target() {
        let result = DefinitionBuilder::new("t")
            .state("a", StateType::Start)
            .state("b", StateType::End)
            .event("go", "a", "nowhere")
            .build();
        assert!(matches!(
            result,
            Err(CoreError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn test_event_targeting_start_rejected() {
        let result = DefinitionBuilder::new("t")
            .state("a", StateType::Start)
            .state("b", StateType::End)
            .event("go", "a", "b")
            .event("back", "b", "a")
            .build();
        assert!(matches!(
            result,
            Err(CoreError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn test_unreachable_state_rejected() {
        let result = DefinitionBuilder::new("t")
            .state("a", StateType::Start)
            .state("b", StateType::End)
            .state("island", StateType::Custom)
            .event("go", "a", "b")
            .event("off", "island", "b")
            .build();
        let err = result.unwrap_err();
        assert!(err.to_string().contains("island"), "{err}");
    }

    #[test]
    fn test_bypass_arity() {
        // No outbound edge.
        let result = DefinitionBuilder::new("t")
            .state("a", StateType::Start)
            .state("skip", StateType::Bypass)
            .state("b", StateType::End)
            .event("go", "a", "skip")
            .build();
        assert!(matches!(
            result,
            Err(CoreError::InvalidDefinition { .. })
        ));

        // Two outbound edges.
        let result = DefinitionBuilder::new("t")
            .state("a", StateType::Start)
            .state("skip", StateType::Bypass)
            .state("b", StateType::End)
            .state("c", StateType::End)
            .event("go", "a", "skip")
            .event("out1", "skip", "b")
            .event("out2", "skip", "c")
            .build();
        assert!(matches!(
            result,
            Err(CoreError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn test_bypass_cycle_rejected() {
        let result = DefinitionBuilder::new("t")
            .state("a", StateType::Start)
            .state("x", StateType::Bypass)
            .state("y", StateType::Bypass)
            .state("end", StateType::End)
            .event("go", "a", "x")
            .event("hop1", "x", "y")
            .event("hop2", "y", "x")
            .event("unused", "a", "end")
            .build();
        let err = result.unwrap_err();
        assert!(err.to_string().contains("bypass cycle"), "{err}");
    }

    #[test]
    fn test_route_requires_declared_result() {
        let result = DefinitionBuilder::new("t")
            .state("a", StateType::Start)
            .state("b", StateType::End)
            .state("c", StateType::End)
            .event("go", "a", "b")
            .route("foo", "c")
            .build();
        assert!(matches!(
            result,
            Err(CoreError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn test_result_routing_destinations() {
        let def = DefinitionBuilder::new("t")
            .state("a", StateType::Start)
            .state("b", StateType::End)
            .state("c", StateType::End)
            .event("go", "a", "b")
            .results(["ok", "alt"])
            .route("alt", "c")
            .build()
            .unwrap();
        let edge = def.resolve(&"a".into(), "go").unwrap();
        assert_eq!(edge.destination(&ResultSymbol::ok()).as_str(), "b");
        assert_eq!(edge.destination(&"alt".into()).as_str(), "c");
    }

    #[test]
    fn test_compile_from_json() {
        let def = compile_json(&json!({
            "name": "review",
            "version": "2.0.0",
            "states": [
                {"key": "draft", "type": "start"},
                {"key": "reviewing"},
                {"key": "reviewed", "type": "end"}
            ],
            "events": [
                {"name": "submit", "from": "draft", "to": "reviewing"},
                {"name": "agree", "from": "reviewing", "to": "reviewed", "results": ["foo"]}
            ]
        }))
        .unwrap();
        assert_eq!(def.version, "2.0.0");
        assert!(def.resolve(&"draft".into(), "submit").is_some());
        assert!(def.resolve(&"draft".into(), "agree").is_none());
    }

    #[test]
    fn test_timeout_event_options() {
        let def = DefinitionBuilder::new("t")
            .state("a", StateType::Start)
            .state("b", StateType::Custom)
            .state("c", StateType::End)
            .event("go", "a", "b")
            .timeout_event("expire", "b", "c", Duration::from_millis(50))
            .build()
            .unwrap();
        let edge = def.resolve(&"b".into(), "expire").unwrap();
        assert_eq!(edge.timeout(), Some(Duration::from_millis(50)));
        let plain = def.resolve(&"a".into(), "go").unwrap();
        assert_eq!(plain.timeout(), None);
    }

    #[test]
    fn test_checksum_stable_across_rebuilds() {
        let a = review_builder().build().unwrap();
        let b = review_builder().build().unwrap();
        assert_eq!(a.checksum, b.checksum);
    }

    #[test]
    fn test_raw_roundtrip() {
        let def = review_builder().build().unwrap();
        let json = def.to_json();
        let recompiled = compile_json(&json).unwrap();
        assert_eq!(recompiled.checksum, def.checksum);
        assert_eq!(recompiled.start(), def.start());
    }

    proptest::proptest! {
        /// Linear chains of any length compile, and every hop resolves
        /// to exactly the declared destination.
        #[test]
        fn prop_linear_chain_routing(len in 2usize..24) {
            let mut builder = DefinitionBuilder::new("chain");
            for i in 0..len {
                let kind = if i == 0 {
                    StateType::Start
                } else if i == len - 1 {
                    StateType::End
                } else {
                    StateType::Custom
                };
                builder = builder.state(format!("s{i}"), kind);
            }
            for i in 0..len - 1 {
                builder = builder.event(format!("e{i}"), format!("s{i}"), format!("s{}", i + 1));
            }
            let def = builder.build().unwrap();
            for i in 0..len - 1 {
                let edge = def
                    .resolve(&StateKey::new(format!("s{i}")), &format!("e{i}"))
                    .unwrap();
                proptest::prop_assert_eq!(edge.to.as_str(), format!("s{}", i + 1));
            }
        }
    }

    #[test]
    fn test_events_from() {
        let def = review_builder().build().unwrap();
        let mut names = def.events_from(&"draft".into());
        names.sort();
        assert_eq!(names, vec!["cancel1", "submit"]);
        assert!(def.events_from(&"reviewed".into()).is_empty());
    }
}
