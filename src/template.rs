//! Deterministic template rendering
//!
//! Tera with the non-deterministic builtins (`now`, `get_random`, `get_env`)
//! replaced by functions that refuse to run, so a template calling them
//! fails with an impurity error and receipts stay reproducible. Time values
//! reach templates only through pre-computed context variables (`nowISO`).

use serde_json::Value;
use std::collections::HashMap;
use tera::Tera;

/// Why a render failed
#[derive(Debug)]
pub struct RenderFailure {
    /// True when the template called a forbidden non-deterministic function
    pub impure: bool,
    pub message: String,
}

const IMPURITY_MARKER: &str = "non-deterministic function";

fn banned(
    name: &'static str,
) -> impl tera::Function {
    move |_: &HashMap<String, tera::Value>| -> tera::Result<tera::Value> {
        Err(tera::Error::msg(format!(
            "{} `{}` is not available; use a context variable instead",
            IMPURITY_MARKER, name
        )))
    }
}

/// Template renderer with the determinism guard installed
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut tera = Tera::default();
        tera.register_function("now", banned("now"));
        tera.register_function("get_random", banned("get_random"));
        tera.register_function("get_env", banned("get_env"));
        Self { tera }
    }

    /// Render a template body with the execution context variables as root
    pub fn render(
        &mut self,
        body: &str,
        vars: &serde_json::Map<String, Value>,
    ) -> Result<String, RenderFailure> {
        let context =
            tera::Context::from_value(Value::Object(vars.clone())).map_err(|e| RenderFailure {
                impure: false,
                message: format!("invalid template context: {}", e),
            })?;
        self.tera.render_str(body, &context).map_err(|e| {
            let message = error_chain(&e);
            RenderFailure {
                impure: message.contains(IMPURITY_MARKER),
                message,
            }
        })
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Flatten a tera error with its sources; the root cause carries the detail
fn error_chain(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_renders_context_variables() {
        let mut engine = TemplateEngine::new();
        let rendered = engine
            .render(
                "hello {{ name }}, count={{ count }}",
                &vars(&[("name", json!("world")), ("count", json!(3))]),
            )
            .expect("render");
        assert_eq!(rendered, "hello world, count=3");
    }

    #[test]
    fn test_filters_still_work() {
        let mut engine = TemplateEngine::new();
        let rendered = engine
            .render("{{ name | upper }}", &vars(&[("name", json!("quiet"))]))
            .expect("render");
        assert_eq!(rendered, "QUIET");
    }

    #[test]
    fn test_now_is_rejected_as_impure() {
        let mut engine = TemplateEngine::new();
        let failure = engine
            .render("generated at {{ now() }}", &vars(&[]))
            .expect_err("must fail");
        assert!(failure.impure, "message: {}", failure.message);
    }

    #[test]
    fn test_get_random_is_rejected_as_impure() {
        let mut engine = TemplateEngine::new();
        let failure = engine
            .render("{{ get_random(end=10) }}", &vars(&[]))
            .expect_err("must fail");
        assert!(failure.impure);
    }

    #[test]
    fn test_time_via_context_variable_is_fine() {
        let mut engine = TemplateEngine::new();
        let rendered = engine
            .render(
                "generated at {{ nowISO }}",
                &vars(&[("nowISO", json!("2026-08-01T00:00:00Z"))]),
            )
            .expect("render");
        assert_eq!(rendered, "generated at 2026-08-01T00:00:00Z");
    }

    #[test]
    fn test_syntax_error_is_not_impurity() {
        let mut engine = TemplateEngine::new();
        let failure = engine
            .render("{% if %}", &vars(&[]))
            .expect_err("must fail");
        assert!(!failure.impure);
    }

    #[test]
    fn test_undefined_variable_fails_cleanly() {
        let mut engine = TemplateEngine::new();
        let failure = engine
            .render("{{ missing_variable }}", &vars(&[]))
            .expect_err("must fail");
        assert!(!failure.impure);
    }
}
