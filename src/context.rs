//! Per-execution context
//!
//! One mapping per hook execution: variable bindings seeded by the
//! orchestrator (`nowISO`, the predicate context, `startedAt`), grown by
//! step output mappings, plus the append-only list of step outputs. Never
//! shared across executions.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

/// Variable bindings and output accumulation for one hook execution
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    vars: serde_json::Map<String, Value>,
    outputs: Vec<Value>,
    pub started_at: DateTime<Utc>,
}

impl ExecutionContext {
    /// Seed a fresh context; `now` becomes the only time value any template
    /// may observe
    pub fn new(now: DateTime<Utc>, predicate_context: Value) -> Self {
        let mut vars = serde_json::Map::new();
        vars.insert("nowISO".to_string(), Value::String(now.to_rfc3339()));
        vars.insert("startedAt".to_string(), Value::String(now.to_rfc3339()));
        if !predicate_context.is_null() {
            vars.insert("predicate".to_string(), predicate_context);
        }
        Self {
            vars,
            outputs: Vec::new(),
            started_at: now,
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn vars(&self) -> &serde_json::Map<String, Value> {
        &self.vars
    }

    /// Record a completed step's result value
    pub fn push_output(&mut self, output: Value) {
        self.outputs.push(output);
    }

    pub fn outputs(&self) -> &[Value] {
        &self.outputs
    }

    /// Apply an output mapping: for each `(variable, path)` pair, resolve
    /// `path` inside the step result and bind the variable. Unresolvable
    /// paths bind `null` rather than failing the step.
    pub fn apply_mapping(&mut self, step_result: &Value, mapping: &BTreeMap<String, String>) {
        for (variable, path) in mapping {
            let value = resolve_path(step_result, path).cloned().unwrap_or(Value::Null);
            self.vars.insert(variable.clone(), value);
        }
    }
}

/// Navigate a dot-separated JSON path; numeric segments index arrays
fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Some(root);
    }
    let mut current = root;
    for segment in trimmed.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde_json::json;

    fn context() -> ExecutionContext {
        ExecutionContext::new(Utc::now(), Value::Null)
    }

    #[test]
    fn test_seed_variables_present() {
        let ctx = ExecutionContext::new(Utc::now(), json!({"value": 3}));
        assert!(ctx.get("nowISO").is_some());
        assert!(ctx.get("startedAt").is_some());
        assert_eq!(ctx.get("predicate"), Some(&json!({"value": 3})));
    }

    #[test]
    fn test_set_and_get() {
        let mut ctx = context();
        ctx.set("answer", json!(42));
        assert_eq!(ctx.get("answer"), Some(&json!(42)));
        assert!(ctx.get("missing").is_none());
    }

    #[test]
    fn test_apply_mapping_navigates_paths() {
        let mut ctx = context();
        let result = json!({
            "data": [
                {"c": "10", "x": "a"},
                {"c": "20", "x": "b"}
            ],
            "rows": 2
        });
        let mapping: BTreeMap<String, String> = [
            ("first_count".to_string(), "data.0.c".to_string()),
            ("row_count".to_string(), "rows".to_string()),
            ("everything".to_string(), "".to_string()),
        ]
        .into();
        ctx.apply_mapping(&result, &mapping);

        assert_eq!(ctx.get("first_count"), Some(&json!("10")));
        assert_eq!(ctx.get("row_count"), Some(&json!(2)));
        assert_eq!(ctx.get("everything"), Some(&result));
    }

    #[test]
    fn test_unresolvable_path_binds_null() {
        let mut ctx = context();
        let mapping: BTreeMap<String, String> =
            [("missing".to_string(), "no.such.path".to_string())].into();
        ctx.apply_mapping(&json!({"a": 1}), &mapping);
        assert_eq!(ctx.get("missing"), Some(&Value::Null));
    }

    #[test]
    fn test_outputs_accumulate_in_order() {
        let mut ctx = context();
        ctx.push_output(json!({"step": 1}));
        ctx.push_output(json!({"step": 2}));
        assert_eq!(ctx.outputs().len(), 2);
        assert_eq!(ctx.outputs()[0], json!({"step": 1}));
    }
}
