//! Transition execution: turns an incoming event plus a handler result
//! into a state change.

use crate::definition::StateKey;
use crate::error::CoreError;
use crate::event::ResultSymbol;
use crate::history::{HistoryEntry, HistoryStore};
use crate::instance::Instance;
use crate::state::Action;
use serde_json::Value;
use std::sync::Arc;

/// Outcome of a completed transition.
#[derive(Debug, Clone)]
pub struct Applied {
    /// Pre-transition state.
    pub from: StateKey,
    /// Event name fired.
    pub event: String,
    /// Key of the edge that matched.
    pub edge_key: String,
    /// Result returned by the event handler.
    pub result: ResultSymbol,
    /// Post-transition resting state.
    pub to: StateKey,
    /// History sequence number of this transition.
    pub seq: u64,
    /// Deferred side effects for the owning actor to execute.
    pub actions: Vec<Action>,
}

/// The transition engine. Stateless apart from the history store it
/// appends to; all instance mutation happens through the `&mut
/// Instance` handed in by the owning actor.
pub struct TransitionEngine {
    history: Arc<HistoryStore>,
}

impl TransitionEngine {
    pub fn new(history: Arc<HistoryStore>) -> Self {
        Self { history }
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Applies one event end-to-end.
    ///
    /// `UnknownEvent` and `InputRejected` leave the instance unchanged.
    /// `InvalidResult` and hook failures are defects: the instance may
    /// be left mid-transition and the caller owns reconciliation.
    pub fn apply_event(
        &self,
        instance: &mut Instance,
        event: &str,
        input: &Value,
    ) -> Result<Applied, CoreError> {
        let def = instance.definition.clone();
        let from = instance.current.clone();

        // 1. Resolve the edge valid from the current state.
        let edge = def
            .resolve(&from, event)
            .ok_or_else(|| CoreError::UnknownEvent {
                state: from.as_str().to_string(),
                event: event.to_string(),
            })?;

        // 2. Input validation may veto before any state is touched.
        {
            let saved = instance.ctx.clone();
            let mut scope = instance.event_scope(&edge.key);
            if let Err(err) = edge.hooks.on_input(&mut scope, input) {
                instance.ctx = saved;
                return Err(err);
            }
        }

        let mut actions = Vec::new();

        // 3. Leave the current state, then run the event's own effect.
        let from_node = def.state(&from).ok_or_else(|| CoreError::InvalidDefinition {
            reason: format!("current state '{from}' missing from definition"),
        })?;
        actions.extend(from_node.hooks.on_leave(&mut instance.state_scope(&from))?);

        let result = edge
            .hooks
            .on_fire(&mut instance.event_scope(&edge.key), input)?;

        // 4. An out-of-set result is a defect, not a transition. The
        // instance stays at the leave-applied intermediate position.
        if !edge.allows(&result) {
            return Err(CoreError::InvalidResult {
                event: event.to_string(),
                result: result.to_string(),
                allowed: edge
                    .results
                    .iter()
                    .map(|r| r.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        // 5. Route by result, then chain through bypass states: a
        // bypass node is a zero-duration router, never a resting place,
        // and fires no enter/leave hooks of its own.
        let mut dest = edge.destination(&result).clone();
        let mut hops = 0usize;
        loop {
            let node = def.state(&dest).ok_or_else(|| CoreError::InvalidDefinition {
                reason: format!("destination state '{dest}' missing from definition"),
            })?;
            if !node.kind.is_bypass() {
                break;
            }
            hops += 1;
            if hops > def.state_count() {
                // Unreachable after validation; guards a corrupted graph.
                return Err(CoreError::InvalidDefinition {
                    reason: format!("bypass chain from '{from}' exceeds state count"),
                });
            }
            let out = node.outbound[0].clone();
            dest = def
                .event(&out)
                .ok_or_else(|| CoreError::InvalidDefinition {
                    reason: format!("edge '{out}' missing from definition"),
                })?
                .to
                .clone();
        }

        // 6. Enter the destination; arm any state-timeout edges it owns.
        let dest_node = def.state(&dest).ok_or_else(|| CoreError::InvalidDefinition {
            reason: format!("destination state '{dest}' missing from definition"),
        })?;
        actions.extend(dest_node.hooks.on_enter(&mut instance.state_scope(&dest))?);
        for out in &dest_node.outbound {
            if let Some(timer) = def.event(out) {
                if let Some(after) = timer.timeout() {
                    actions.push(Action::ArmTimeout {
                        state: dest.clone(),
                        event: timer.name.clone(),
                        after,
                    });
                }
            }
        }

        // 7. Record and move.
        let seq = instance.apply_transition(dest.clone());
        self.history.put(HistoryEntry {
            key: instance.key.clone(),
            seq,
            from: from.clone(),
            event: event.to_string(),
            result: result.clone(),
            to: dest.clone(),
            ts: instance.updated_at,
        });

        tracing::debug!(
            key = %instance.key,
            %from,
            %event,
            %result,
            to = %dest,
            seq,
            "transition applied"
        );

        Ok(Applied {
            from,
            event: event.to_string(),
            edge_key: edge.key.clone(),
            result,
            to: dest,
            seq,
            actions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::HookScope;
    use crate::definition::{Definition, DefinitionBuilder};
    use crate::event::EventHooks;
    use crate::instance::ProcessKey;
    use crate::state::{StateHooks, StateType};
    use serde_json::json;

    fn engine() -> TransitionEngine {
        TransitionEngine::new(Arc::new(HistoryStore::new()))
    }

    fn instance_of(def: Definition, id: &str) -> Instance {
        let def = Arc::new(def);
        Instance::new(ProcessKey::new(&def.name, id), def, json!({}))
    }

    /// Event handler that echoes `input["result"]` as its result symbol.
    struct EchoResult;

    impl EventHooks for EchoResult {
        fn on_fire(
            &self,
            _scope: &mut HookScope<'_>,
            input: &Value,
        ) -> Result<ResultSymbol, CoreError> {
            Ok(input
                .get("result")
                .and_then(Value::as_str)
                .map(ResultSymbol::from)
                .unwrap_or_else(ResultSymbol::ok))
        }
    }

    /// Event handler that rejects input missing an `amount` field.
    struct RequireAmount;

    impl EventHooks for RequireAmount {
        fn on_input(&self, _scope: &mut HookScope<'_>, input: &Value) -> Result<(), CoreError> {
            if input.get("amount").is_none() {
                return Err(CoreError::InputRejected {
                    event: "pay".to_string(),
                    reason: "missing amount".to_string(),
                });
            }
            Ok(())
        }
    }

    /// State hooks that append enter/leave markers to the instance ctx.
    struct Tracing(&'static str);

    impl StateHooks for Tracing {
        fn kind(&self) -> StateType {
            StateType::Custom
        }

        fn on_enter(&self, scope: &mut HookScope<'_>) -> Result<Vec<Action>, CoreError> {
            push_marker(scope, format!("enter:{}", self.0));
            Ok(Vec::new())
        }

        fn on_leave(&self, scope: &mut HookScope<'_>) -> Result<Vec<Action>, CoreError> {
            push_marker(scope, format!("leave:{}", self.0));
            Ok(Vec::new())
        }
    }

    fn push_marker(scope: &mut HookScope<'_>, marker: String) {
        let log = scope
            .process_ctx
            .as_object_mut()
            .unwrap()
            .entry("log")
            .or_insert_with(|| json!([]));
        log.as_array_mut().unwrap().push(json!(marker));
    }

    fn review_definition() -> Definition {
        DefinitionBuilder::new("review")
            .state("draft", StateType::Start)
            .state("reviewing", StateType::Custom)
            .state("reviewed", StateType::End)
            .state("canceled", StateType::End)
            .event("submit", "draft", "reviewing")
            .event_with("agree", "reviewing", "reviewed", Arc::new(EchoResult))
            .results(["foo"])
            .event_with("cancel1", "draft", "canceled", Arc::new(EchoResult))
            .results(["foo"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_review_scenario() {
        let engine = engine();
        let mut instance = instance_of(review_definition(), "i-1");

        let applied = engine.apply_event(&mut instance, "submit", &json!({})).unwrap();
        assert_eq!(applied.from.as_str(), "draft");
        assert_eq!(applied.to.as_str(), "reviewing");
        assert_eq!(applied.result, ResultSymbol::ok());
        assert_eq!(applied.seq, 1);

        let applied = engine
            .apply_event(&mut instance, "agree", &json!({"result": "foo"}))
            .unwrap();
        assert_eq!(applied.to.as_str(), "reviewed");
        assert_eq!(applied.result.as_str(), "foo");

        let log = engine.history().get(&instance.key);
        assert_eq!(log.len(), 2);
        assert_eq!(
            (log[0].from.as_str(), log[0].event.as_str(), log[0].result.as_str(), log[0].to.as_str()),
            ("draft", "submit", "ok", "reviewing")
        );
        assert_eq!(
            (log[1].from.as_str(), log[1].event.as_str(), log[1].result.as_str(), log[1].to.as_str()),
            ("reviewing", "agree", "foo", "reviewed")
        );
    }

    #[test]
    fn test_unknown_event_leaves_instance_unchanged() {
        let engine = engine();
        let mut instance = instance_of(review_definition(), "i-1");

        let err = engine
            .apply_event(&mut instance, "agree", &json!({}))
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownEvent { .. }));
        assert!(err.is_recoverable());
        assert_eq!(instance.current.as_str(), "draft");
        assert_eq!(instance.counter, 0);
        assert!(engine.history().get(&instance.key).is_empty());
    }

    #[test]
    fn test_input_rejected_leaves_instance_unchanged() {
        let def = DefinitionBuilder::new("order")
            .state("created", StateType::Start)
            .state("paid", StateType::End)
            .event_with("pay", "created", "paid", Arc::new(RequireAmount))
            .build()
            .unwrap();
        let engine = engine();
        let mut instance = instance_of(def, "i-1");

        let err = engine.apply_event(&mut instance, "pay", &json!({})).unwrap_err();
        assert!(matches!(err, CoreError::InputRejected { .. }));
        assert_eq!(instance.current.as_str(), "created");
        assert!(engine.history().get(&instance.key).is_empty());

        engine
            .apply_event(&mut instance, "pay", &json!({"amount": 100}))
            .unwrap();
        assert_eq!(instance.current.as_str(), "paid");
    }

    #[test]
    fn test_invalid_result_is_a_defect() {
        let engine = engine();
        let mut instance = instance_of(review_definition(), "i-1");

        let err = engine
            .apply_event(&mut instance, "cancel1", &json!({"result": "bar"}))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidResult { .. }));
        assert!(!err.is_recoverable());
        // No history entry for the failed firing.
        assert!(engine.history().get(&instance.key).is_empty());
        assert_eq!(instance.counter, 0);
    }

    #[test]
    fn test_result_routing_selects_destination() {
        let def = DefinitionBuilder::new("triage")
            .state("incoming", StateType::Start)
            .state("accepted", StateType::End)
            .state("refused", StateType::End)
            .event_with("decide", "incoming", "accepted", Arc::new(EchoResult))
            .results(["ok", "deny"])
            .route("deny", "refused")
            .build()
            .unwrap();
        let engine = engine();

        let mut a = instance_of(def.clone(), "a");
        engine
            .apply_event(&mut a, "decide", &json!({"result": "ok"}))
            .unwrap();
        assert_eq!(a.current.as_str(), "accepted");

        let mut b = instance_of(def, "b");
        engine
            .apply_event(&mut b, "decide", &json!({"result": "deny"}))
            .unwrap();
        assert_eq!(b.current.as_str(), "refused");
    }

    #[test]
    fn test_bypass_chain_is_transparent() {
        let def = DefinitionBuilder::new("pipeline")
            .state("a", StateType::Start)
            .state("skip1", StateType::Bypass)
            .state("skip2", StateType::Bypass)
            .state_with("landing", Arc::new(Tracing("landing")))
            .state("done", StateType::End)
            .event("go", "a", "skip1")
            .event("hop1", "skip1", "skip2")
            .event("hop2", "skip2", "landing")
            .event("finish", "landing", "done")
            .build()
            .unwrap();
        let engine = engine();
        let mut instance = instance_of(def, "i-1");

        let applied = engine.apply_event(&mut instance, "go", &json!({})).unwrap();
        // Lands on the first non-bypass state, one history entry total.
        assert_eq!(applied.to.as_str(), "landing");
        assert_eq!(instance.current.as_str(), "landing");
        let log = engine.history().get(&instance.key);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].from.as_str(), "a");
        assert_eq!(log[0].to.as_str(), "landing");
        // The landing state's enter hook ran; bypass hops fired none.
        assert_eq!(instance.ctx["log"], json!(["enter:landing"]));
    }

    #[test]
    fn test_leave_then_enter_hook_order() {
        let def = DefinitionBuilder::new("walk")
            .state("start", StateType::Start)
            .state_with("mid", Arc::new(Tracing("mid")))
            .state_with("finish", Arc::new(Tracing("finish")))
            .state("done", StateType::End)
            .event("go", "start", "mid")
            .event("next", "mid", "finish")
            .event("end", "finish", "done")
            .build()
            .unwrap();
        let engine = engine();
        let mut instance = instance_of(def, "i-1");

        engine.apply_event(&mut instance, "go", &json!({})).unwrap();
        engine.apply_event(&mut instance, "next", &json!({})).unwrap();
        assert_eq!(
            instance.ctx["log"],
            json!(["enter:mid", "leave:mid", "enter:finish"])
        );
    }

    #[test]
    fn test_timeout_action_armed_on_enter() {
        let def = DefinitionBuilder::new("t")
            .state("a", StateType::Start)
            .state("waiting", StateType::Custom)
            .state("expired", StateType::End)
            .event("go", "a", "waiting")
            .timeout_event("expire", "waiting", "expired", std::time::Duration::from_millis(10))
            .build()
            .unwrap();
        let engine = engine();
        let mut instance = instance_of(def, "i-1");

        let applied = engine.apply_event(&mut instance, "go", &json!({})).unwrap();
        assert!(applied.actions.iter().any(|a| matches!(
            a,
            Action::ArmTimeout { state, event, .. }
                if state.as_str() == "waiting" && event == "expire"
        )));

        // The timeout event fires like any other once due.
        let applied = engine.apply_event(&mut instance, "expire", &json!({})).unwrap();
        assert_eq!(applied.to.as_str(), "expired");
    }

    #[test]
    fn test_event_counter_tracks_history() {
        let engine = engine();
        let mut instance = instance_of(review_definition(), "i-1");
        engine.apply_event(&mut instance, "submit", &json!({})).unwrap();
        engine
            .apply_event(&mut instance, "agree", &json!({"result": "foo"}))
            .unwrap();
        assert_eq!(instance.counter, 2);
        let log = engine.history().get(&instance.key);
        assert_eq!(log.last().unwrap().seq, instance.counter);
    }
}
