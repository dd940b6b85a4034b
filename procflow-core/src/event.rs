//! Event behavior: the polymorphic contract each event variant satisfies.

use crate::context::HookScope;
use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A result symbol returned by an event's handler. The symbol selects
/// which declared destination the transition routes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSymbol(pub String);

impl ResultSymbol {
    /// The implicit default result of every event.
    pub fn ok() -> Self {
        Self("ok".to_string())
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResultSymbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ResultSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hooks invoked while firing an event.
pub trait EventHooks: Send + Sync {
    /// Validates the caller-supplied input before any state is touched.
    ///
    /// Returning `Err(CoreError::InputRejected {..})` vetoes the event;
    /// the instance stays unchanged and no history is recorded.
    fn on_input(&self, scope: &mut HookScope<'_>, input: &Value) -> Result<(), CoreError> {
        let _ = (scope, input);
        Ok(())
    }

    /// Performs the event's work and returns a result symbol.
    ///
    /// The returned symbol must be in the edge's declared result set;
    /// anything else is a defect (`InvalidResult`), not a transition.
    fn on_fire(&self, scope: &mut HookScope<'_>, input: &Value) -> Result<ResultSymbol, CoreError> {
        let _ = (scope, input);
        Ok(ResultSymbol::ok())
    }

    /// True for self-firing state-timeout events.
    fn is_timeout(&self) -> bool {
        false
    }
}

/// Default event behavior: accepts any input, returns `ok`.
pub struct Basic;

impl EventHooks for Basic {}

/// A state-timeout event: armed when its source state is entered and
/// fired by the instance's own actor after the configured duration,
/// with no external caller. Handled identically to any other event
/// once fired; invalidated if the state is left first.
pub struct StateTimeout;

impl EventHooks for StateTimeout {
    fn is_timeout(&self) -> bool {
        true
    }
}
