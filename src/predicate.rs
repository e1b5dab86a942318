//! Predicate evaluation
//!
//! Turns one hook predicate plus the current (and optionally previous) graph
//! into a fired/not-fired verdict with a context fragment. Evaluation
//! failures are recorded on the outcome, never thrown: a failing predicate
//! simply does not fire.

use crate::canonical::result_hash;
use crate::error::{EngineError, EngineResult};
use crate::graph::{GraphStore, QueryOutcome};
use crate::hook::{Hook, Predicate};
use crate::shacl;
use serde_json::json;
use std::time::Instant;

/// Verdict of one predicate evaluation
#[derive(Debug, Clone)]
pub struct PredicateOutcome {
    pub hook_id: String,
    pub fired: bool,
    pub kind: &'static str,
    /// Seed values for the execution context of a triggered hook
    pub context: serde_json::Value,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Diagnostic complexity classification of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryComplexity {
    Low,
    Medium,
    High,
}

impl QueryComplexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Classify a query by counting its expensive constructs; diagnostic only,
/// never consulted for correctness
pub fn query_complexity(query: &str) -> QueryComplexity {
    let upper = query.to_uppercase();
    let count = |needle: &str| upper.matches(needle).count();
    let joins = upper.matches(" .").count().saturating_sub(1);
    let score = count("FILTER") + 2 * count("OPTIONAL") + 2 * count("UNION") + joins;
    match score {
        0..=1 => QueryComplexity::Low,
        2..=5 => QueryComplexity::Medium,
        _ => QueryComplexity::High,
    }
}

/// Evaluates hook predicates against graph stores
pub struct PredicateEvaluator;

impl PredicateEvaluator {
    /// Evaluate one hook's predicate
    pub fn evaluate(
        hook: &Hook,
        current: &GraphStore,
        previous: Option<&GraphStore>,
    ) -> PredicateOutcome {
        let started = Instant::now();
        let kind = hook.predicate.kind();

        if let Some(query) = predicate_query(&hook.predicate) {
            tracing::debug!(
                hook_id = %hook.id,
                kind,
                complexity = query_complexity(query).as_str(),
                "evaluating predicate"
            );
        }

        let result = Self::evaluate_inner(&hook.predicate, current, previous);
        let duration_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok((fired, context)) => PredicateOutcome {
                hook_id: hook.id.clone(),
                fired,
                kind,
                context,
                duration_ms,
                error: None,
            },
            Err(e) => {
                let failure = EngineError::PredicateFailure {
                    hook: hook.id.clone(),
                    message: e.to_string(),
                };
                tracing::warn!(hook_id = %hook.id, error = %failure, "predicate evaluation failed");
                PredicateOutcome {
                    hook_id: hook.id.clone(),
                    fired: false,
                    kind,
                    context: serde_json::Value::Null,
                    duration_ms,
                    error: Some(failure.to_string()),
                }
            }
        }
    }

    fn evaluate_inner(
        predicate: &Predicate,
        current: &GraphStore,
        previous: Option<&GraphStore>,
    ) -> EngineResult<(bool, serde_json::Value)> {
        match predicate {
            Predicate::Ask { query } => match current.query(query)? {
                QueryOutcome::Boolean(fired) => Ok((fired, json!({ "boolean": fired }))),
                _ => Err(EngineError::Parse(
                    "ASK predicate did not produce a boolean result".to_string(),
                )),
            },
            Predicate::SelectThreshold {
                query,
                threshold,
                operator,
            } => {
                let outcome = current.query(query)?;
                let rows = match &outcome {
                    QueryOutcome::Solutions(rows) => rows,
                    _ => {
                        return Err(EngineError::Parse(
                            "threshold predicate requires a SELECT query".to_string(),
                        ))
                    }
                };
                let value = match rows.first().and_then(|row| row.first()) {
                    Some((_, term)) => term.lexical.trim().parse::<f64>().map_err(|_| {
                        EngineError::Parse(format!(
                            "threshold binding is not numeric: {}",
                            term.lexical
                        ))
                    })?,
                    None => 0.0,
                };
                let fired = operator.compare(value, *threshold);
                Ok((
                    fired,
                    json!({
                        "value": value,
                        "threshold": threshold,
                        "operator": operator.as_str(),
                    }),
                ))
            }
            Predicate::ResultDelta { query } => {
                let current_rows = match current.query(query)? {
                    QueryOutcome::Solutions(rows) => rows,
                    _ => {
                        return Err(EngineError::Parse(
                            "delta predicate requires a SELECT query".to_string(),
                        ))
                    }
                };
                let current_hash = result_hash(&current_rows);
                let previous_hash = match previous {
                    Some(graph) => match graph.query(query)? {
                        QueryOutcome::Solutions(rows) => Some(result_hash(&rows)),
                        _ => {
                            return Err(EngineError::Parse(
                                "delta predicate requires a SELECT query".to_string(),
                            ))
                        }
                    },
                    None => None,
                };
                let fired = match &previous_hash {
                    Some(prev) => *prev != current_hash,
                    None => true,
                };
                Ok((
                    fired,
                    json!({
                        "currentHash": current_hash,
                        "previousHash": previous_hash,
                        "rows": current_rows.len(),
                    }),
                ))
            }
            Predicate::Shacl { shapes } => {
                let report = shacl::validate(current, shapes)?;
                let fired = !report.results.is_empty();
                Ok((
                    fired,
                    json!({
                        "conforms": report.conforms,
                        "resultCount": report.results.len(),
                    }),
                ))
            }
            Predicate::Construct { query } => {
                let triples = match current.query(query)? {
                    QueryOutcome::Graph(triples) => triples,
                    _ => {
                        return Err(EngineError::Parse(
                            "construct predicate requires a CONSTRUCT query".to_string(),
                        ))
                    }
                };
                Ok((!triples.is_empty(), json!({ "tripleCount": triples.len() })))
            }
        }
    }
}

fn predicate_query(predicate: &Predicate) -> Option<&str> {
    match predicate {
        Predicate::Ask { query }
        | Predicate::SelectThreshold { query, .. }
        | Predicate::ResultDelta { query }
        | Predicate::Construct { query } => Some(query),
        Predicate::Shacl { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::hook::{Pipeline, ThresholdOperator};
    use oxigraph::io::RdfFormat;
    use proptest::prelude::*;

    fn graph(turtle: &str) -> GraphStore {
        let store = GraphStore::new().expect("store");
        store.load_text(turtle, RdfFormat::Turtle).expect("turtle");
        store
    }

    fn hook_with(predicate: Predicate) -> Hook {
        Hook {
            id: "http://example.org/test-hook".to_string(),
            title: "test".to_string(),
            predicate,
            pipelines: vec![Pipeline {
                id: "p".to_string(),
                steps: vec![],
            }],
            tags: vec![],
            version: None,
            description: None,
        }
    }

    const ITEMS: &str = r#"
        @prefix ex: <http://example.org/> .
        @prefix gv: <https://knowhook.dev/graph-vocab#> .
        ex:a a gv:Item .
        ex:b a gv:Item .
    "#;

    #[test]
    fn test_ask_fires_on_match() {
        let store = graph(ITEMS);
        let hook = hook_with(Predicate::Ask {
            query: "ASK WHERE { ?x a <https://knowhook.dev/graph-vocab#Item> }".into(),
        });
        let outcome = PredicateEvaluator::evaluate(&hook, &store, None);
        assert!(outcome.fired);
        assert_eq!(outcome.kind, "ASK");
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_ask_does_not_fire_without_match() {
        let store = graph(ITEMS);
        let hook = hook_with(Predicate::Ask {
            query: "ASK WHERE { ?x a <http://example.org/Missing> }".into(),
        });
        assert!(!PredicateEvaluator::evaluate(&hook, &store, None).fired);
    }

    #[test]
    fn test_threshold_boundary_strict_vs_inclusive() {
        let store = graph(ITEMS);
        let query =
            "SELECT (COUNT(?x) AS ?c) WHERE { ?x a <https://knowhook.dev/graph-vocab#Item> }";

        let strict = hook_with(Predicate::SelectThreshold {
            query: query.into(),
            threshold: 2.0,
            operator: ThresholdOperator::Gt,
        });
        assert!(!PredicateEvaluator::evaluate(&strict, &store, None).fired);

        let inclusive = hook_with(Predicate::SelectThreshold {
            query: query.into(),
            threshold: 2.0,
            operator: ThresholdOperator::Ge,
        });
        assert!(PredicateEvaluator::evaluate(&inclusive, &store, None).fired);
    }

    #[test]
    fn test_threshold_empty_result_counts_as_zero() {
        let store = graph(ITEMS);
        let hook = hook_with(Predicate::SelectThreshold {
            query: "SELECT ?v WHERE { ?x <http://example.org/missing> ?v }".into(),
            threshold: 1.0,
            operator: ThresholdOperator::Lt,
        });
        let outcome = PredicateEvaluator::evaluate(&hook, &store, None);
        assert!(outcome.fired, "0 < 1 must fire");
    }

    #[test]
    fn test_delta_fires_without_previous_graph() {
        let store = graph(ITEMS);
        let hook = hook_with(Predicate::ResultDelta {
            query: "SELECT ?x WHERE { ?x a <https://knowhook.dev/graph-vocab#Item> }".into(),
        });
        assert!(PredicateEvaluator::evaluate(&hook, &store, None).fired);
    }

    #[test]
    fn test_delta_stable_against_identical_previous() {
        let store = graph(ITEMS);
        let previous = store.snapshot().expect("snapshot");
        let hook = hook_with(Predicate::ResultDelta {
            query: "SELECT ?x WHERE { ?x a <https://knowhook.dev/graph-vocab#Item> }".into(),
        });
        let outcome = PredicateEvaluator::evaluate(&hook, &store, Some(&previous));
        assert!(!outcome.fired, "identical graphs must not fire: {:?}", outcome);
    }

    #[test]
    fn test_delta_fires_on_changed_result() {
        let store = graph(ITEMS);
        let previous = graph(
            r#"
            @prefix ex: <http://example.org/> .
            @prefix gv: <https://knowhook.dev/graph-vocab#> .
            ex:a a gv:Item .
            "#,
        );
        let hook = hook_with(Predicate::ResultDelta {
            query: "SELECT ?x WHERE { ?x a <https://knowhook.dev/graph-vocab#Item> }".into(),
        });
        assert!(PredicateEvaluator::evaluate(&hook, &store, Some(&previous)).fired);
    }

    #[test]
    fn test_construct_fires_on_nonempty_subgraph() {
        let store = graph(ITEMS);
        let hook = hook_with(Predicate::Construct {
            query: "CONSTRUCT { ?x a <http://example.org/Seen> } WHERE { ?x a <https://knowhook.dev/graph-vocab#Item> }".into(),
        });
        assert!(PredicateEvaluator::evaluate(&hook, &store, None).fired);
    }

    #[test]
    fn test_shacl_fires_on_violation() {
        let store = graph(
            r#"
            @prefix ex: <http://example.org/> .
            ex:bob a ex:Person .
            "#,
        );
        let hook = hook_with(Predicate::Shacl {
            shapes: r#"
                @prefix sh: <http://www.w3.org/ns/shacl#> .
                @prefix ex: <http://example.org/> .
                ex:PersonShape a sh:NodeShape ;
                    sh:targetClass ex:Person ;
                    sh:property [ sh:path ex:name ; sh:minCount 1 ] .
            "#
            .into(),
        });
        assert!(PredicateEvaluator::evaluate(&hook, &store, None).fired);
    }

    #[test]
    fn test_broken_query_reports_failure_without_firing() {
        let store = graph(ITEMS);
        let hook = hook_with(Predicate::Ask {
            query: "ASK { broken syntax %%%% }".into(),
        });
        let outcome = PredicateEvaluator::evaluate(&hook, &store, None);
        assert!(!outcome.fired);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let store = graph(ITEMS);
        let hook = hook_with(Predicate::Ask {
            query: "ASK WHERE { ?x a <https://knowhook.dev/graph-vocab#Item> }".into(),
        });
        let first = PredicateEvaluator::evaluate(&hook, &store, None);
        let second = PredicateEvaluator::evaluate(&hook, &store, None);
        assert_eq!(first.fired, second.fired);
        assert_eq!(first.context, second.context);
    }

    #[test]
    fn test_complexity_classification() {
        assert_eq!(
            query_complexity("SELECT ?x WHERE { ?x a ?t }"),
            QueryComplexity::Low
        );
        assert_eq!(
            query_complexity(
                "SELECT ?x WHERE { ?x a ?t . OPTIONAL { ?x ?p ?o } FILTER(?x != ?o) }"
            ),
            QueryComplexity::Medium
        );
        assert_eq!(
            query_complexity(
                "SELECT ?x WHERE { { ?x ?a ?b . ?b ?c ?d . } UNION { ?x ?e ?f . } OPTIONAL { ?x ?g ?h . } FILTER(?x > 1) FILTER(?x < 9) }"
            ),
            QueryComplexity::High
        );
    }

    proptest! {
        /// fired ⇔ n OP T, pointwise over random inputs
        #[test]
        fn prop_threshold_matches_operator(value in -1.0e6f64..1.0e6, threshold in -1.0e6f64..1.0e6) {
            let store = graph(&format!(
                "@prefix ex: <http://example.org/> .\n\
                 ex:gauge ex:value \"{}\"^^<http://www.w3.org/2001/XMLSchema#double> .",
                value
            ));
            for operator in [
                ThresholdOperator::Gt,
                ThresholdOperator::Ge,
                ThresholdOperator::Lt,
                ThresholdOperator::Le,
                ThresholdOperator::Eq,
                ThresholdOperator::Ne,
            ] {
                let hook = hook_with(Predicate::SelectThreshold {
                    query: "SELECT ?v WHERE { ?s <http://example.org/value> ?v }".into(),
                    threshold,
                    operator,
                });
                let outcome = PredicateEvaluator::evaluate(&hook, &store, None);
                prop_assert_eq!(outcome.fired, operator.compare(value, threshold));
            }
        }
    }
}
