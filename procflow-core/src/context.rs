//! Mutable context maps shared with state and event hooks.

use serde_json::Value;

/// Creates an empty context.
pub fn new() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Merges `patch` into `ctx`, key by key. Non-object patches leave
/// `ctx` untouched.
pub fn merge(ctx: &Value, patch: &Value) -> Value {
    match (ctx, patch) {
        (Value::Object(ctx_map), Value::Object(patch_map)) => {
            let mut result = ctx_map.clone();
            for (k, v) in patch_map {
                result.insert(k.clone(), v.clone());
            }
            Value::Object(result)
        }
        _ => ctx.clone(),
    }
}

/// Mutable view handed to a hook: the instance-wide context plus the
/// scoped context of the state or event the hook belongs to.
pub struct HookScope<'a> {
    /// Instance-wide context.
    pub process_ctx: &'a mut Value,
    /// Context scoped to the state node or event edge being executed.
    pub node_ctx: &'a mut Value,
}

impl HookScope<'_> {
    /// Sets a field on the instance-wide context.
    pub fn set(&mut self, key: &str, value: Value) {
        if let Value::Object(map) = self.process_ctx {
            map.insert(key.to_string(), value);
        }
    }

    /// Reads a field from the instance-wide context.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.process_ctx.get(key)
    }
}
