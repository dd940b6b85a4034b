//! State behavior: the polymorphic contract each state variant satisfies.

use crate::context::HookScope;
use crate::definition::StateKey;
use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// The kind of a state node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateType {
    /// The single entry state of a definition.
    Start,
    /// A terminal state. A definition needs at least one.
    End,
    /// A zero-duration routing node, never a resting place.
    Bypass,
    /// A user-defined resting state.
    Custom,
}

impl StateType {
    pub fn is_start(&self) -> bool {
        matches!(self, StateType::Start)
    }

    pub fn is_end(&self) -> bool {
        matches!(self, StateType::End)
    }

    pub fn is_bypass(&self) -> bool {
        matches!(self, StateType::Bypass)
    }
}

/// A deferred side effect accumulated by hooks during a transition,
/// executed by the instance's actor after the transition completes.
#[derive(Debug, Clone)]
pub enum Action {
    /// Arm a state-timeout: fire `event` on the instance itself if it
    /// is still in `state` after `after` elapses.
    ArmTimeout {
        state: StateKey,
        event: String,
        after: Duration,
    },
    /// Publish a custom notification to dispatcher listeners.
    Emit { event: String, payload: Value },
}

/// Hooks invoked as an instance enters and leaves a state.
///
/// Implementations must be cheap and must not block; long-running work
/// belongs in event hooks or in listeners fed by [`Action::Emit`].
pub trait StateHooks: Send + Sync {
    /// The kind of state this behavior implements.
    fn kind(&self) -> StateType;

    /// Invoked when the instance comes to rest in this state.
    fn on_enter(&self, scope: &mut HookScope<'_>) -> Result<Vec<Action>, CoreError> {
        let _ = scope;
        Ok(Vec::new())
    }

    /// Invoked when the instance leaves this state.
    fn on_leave(&self, scope: &mut HookScope<'_>) -> Result<Vec<Action>, CoreError> {
        let _ = scope;
        Ok(Vec::new())
    }
}

/// Built-in behavior for `start` states.
pub struct Start;

impl StateHooks for Start {
    fn kind(&self) -> StateType {
        StateType::Start
    }
}

/// Built-in behavior for `end` states.
pub struct End;

impl StateHooks for End {
    fn kind(&self) -> StateType {
        StateType::End
    }
}

/// Built-in behavior for `bypass` states.
///
/// The engine never rests in a bypass state, so its enter/leave hooks
/// are never invoked as part of a firing.
pub struct Bypass;

impl StateHooks for Bypass {
    fn kind(&self) -> StateType {
        StateType::Bypass
    }
}

/// Built-in behavior for custom states with no hook logic.
pub struct Plain;

impl StateHooks for Plain {
    fn kind(&self) -> StateType {
        StateType::Custom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context;

    #[test]
    fn test_builtin_kinds() {
        assert_eq!(Start.kind(), StateType::Start);
        assert_eq!(End.kind(), StateType::End);
        assert_eq!(Bypass.kind(), StateType::Bypass);
        assert_eq!(Plain.kind(), StateType::Custom);
        assert!(StateType::Bypass.is_bypass());
        assert!(!StateType::Custom.is_start());
    }

    #[test]
    fn test_default_hooks_are_noops() {
        let mut process_ctx = context::new();
        let mut node_ctx = context::new();
        let mut scope = HookScope {
            process_ctx: &mut process_ctx,
            node_ctx: &mut node_ctx,
        };
        assert!(Start.on_enter(&mut scope).unwrap().is_empty());
        assert!(End.on_leave(&mut scope).unwrap().is_empty());
    }
}
