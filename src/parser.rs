//! Hook materialisation from RDF
//!
//! Follows the fixed vocabulary in [`crate::vocab`]: a `gh:Hook` subject
//! points at one predicate node and an ordered list of pipelines, each
//! pipeline at an ordered list of step nodes. The parser materialises typed
//! [`Hook`] records once; nothing downstream touches raw triples. Malformed
//! hooks are collected, never thrown.

use crate::error::{EngineError, EngineResult};
use crate::graph::GraphStore;
use crate::hook::{
    FileOperation, Hook, OutputFormat, Pipeline, Predicate, Step, StepKind, ThresholdOperator,
};
use crate::vocab;
use oxigraph::model::{NamedOrBlankNode, Term};
use std::collections::BTreeMap;

/// A hook that could not be materialised
#[derive(Debug, Clone)]
pub struct ParseFailure {
    pub subject: String,
    pub message: String,
}

/// Result of a bulk parse: usable hooks plus collected failures
#[derive(Debug, Default)]
pub struct ParseReport {
    pub hooks: Vec<Hook>,
    pub failures: Vec<ParseFailure>,
}

/// Materialises hook records from a graph store
pub struct HookParser<'a> {
    graph: &'a GraphStore,
}

impl<'a> HookParser<'a> {
    pub fn new(graph: &'a GraphStore) -> Self {
        Self { graph }
    }

    /// Parse every `gh:Hook` subject, ordered lexicographically by IRI
    pub fn parse_all(&self) -> EngineResult<ParseReport> {
        let mut subjects: Vec<String> = self
            .graph
            .subjects_of_type(vocab::HOOK)?
            .into_iter()
            .filter_map(|subject| match subject {
                NamedOrBlankNode::NamedNode(node) => Some(node.as_str().to_string()),
                _ => None,
            })
            .collect();
        subjects.sort();
        subjects.dedup();

        let mut report = ParseReport::default();
        for iri in subjects {
            match self.parse_hook(&iri) {
                Ok(hook) => report.hooks.push(hook),
                Err(e) => {
                    tracing::warn!(hook = %iri, error = %e, "skipping malformed hook");
                    report.failures.push(ParseFailure {
                        subject: iri,
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Parse a single hook by IRI
    pub fn parse_hook(&self, iri: &str) -> EngineResult<Hook> {
        let subject = NamedOrBlankNode::NamedNode(
            oxigraph::model::NamedNode::new(iri)
                .map_err(|e| self.malformed(iri, format!("invalid hook IRI: {}", e)))?,
        );

        let predicate_node = self
            .single(&subject, vocab::HAS_PREDICATE)?
            .ok_or_else(|| self.malformed(iri, "missing gh:hasPredicate".to_string()))?;
        let predicate = self.parse_predicate(iri, &predicate_node)?;

        let pipeline_nodes = self.ordered_objects(&subject, vocab::ORDERED_PIPELINES)?;
        if pipeline_nodes.is_empty() {
            return Err(self.malformed(iri, "missing gh:orderedPipelines".to_string()));
        }
        let mut pipelines = Vec::new();
        for node in pipeline_nodes {
            pipelines.push(self.parse_pipeline(iri, &node)?);
        }

        let title = self
            .literal(&subject, vocab::TITLE)?
            .unwrap_or_else(|| local_name(iri).to_string());
        let mut tags: Vec<String> = self
            .graph
            .objects(&subject, vocab::TAG)?
            .iter()
            .filter_map(term_text)
            .collect();
        tags.sort();

        Ok(Hook {
            id: iri.to_string(),
            title,
            predicate,
            pipelines,
            tags,
            version: self.literal(&subject, vocab::VERSION)?,
            description: self.literal(&subject, vocab::DESCRIPTION)?,
        })
    }

    fn parse_predicate(&self, hook: &str, node: &Term) -> EngineResult<Predicate> {
        let subject = as_subject(node)
            .ok_or_else(|| self.malformed(hook, "predicate node is a literal".to_string()))?;
        let types = self.types(&subject)?;

        if types.iter().any(|t| t == vocab::ASK_PREDICATE) {
            Ok(Predicate::Ask {
                query: self.required_literal(hook, &subject, vocab::QUERY_TEXT)?,
            })
        } else if types.iter().any(|t| t == vocab::SELECT_THRESHOLD_PREDICATE) {
            let raw_threshold = self.required_literal(hook, &subject, vocab::THRESHOLD)?;
            let threshold: f64 = raw_threshold.trim().parse().map_err(|_| {
                self.malformed(hook, format!("invalid gh:threshold: {}", raw_threshold))
            })?;
            let raw_operator = self.required_literal(hook, &subject, vocab::OPERATOR)?;
            let operator = ThresholdOperator::parse(&raw_operator).ok_or_else(|| {
                self.malformed(hook, format!("invalid gh:operator: {}", raw_operator))
            })?;
            Ok(Predicate::SelectThreshold {
                query: self.required_literal(hook, &subject, vocab::QUERY_TEXT)?,
                threshold,
                operator,
            })
        } else if types.iter().any(|t| t == vocab::RESULT_DELTA_PREDICATE) {
            Ok(Predicate::ResultDelta {
                query: self.required_literal(hook, &subject, vocab::QUERY_TEXT)?,
            })
        } else if types.iter().any(|t| t == vocab::SHACL_PREDICATE) {
            Ok(Predicate::Shacl {
                shapes: self.required_literal(hook, &subject, vocab::SHAPES_TEXT)?,
            })
        } else if types.iter().any(|t| t == vocab::CONSTRUCT_PREDICATE) {
            Ok(Predicate::Construct {
                query: self.required_literal(hook, &subject, vocab::QUERY_TEXT)?,
            })
        } else {
            Err(self.malformed(
                hook,
                format!("predicate node has no recognised class (found {:?})", types),
            ))
        }
    }

    fn parse_pipeline(&self, hook: &str, node: &Term) -> EngineResult<Pipeline> {
        let subject = as_subject(node)
            .ok_or_else(|| self.malformed(hook, "pipeline node is a literal".to_string()))?;
        let step_nodes = self.ordered_objects(&subject, vocab::STEPS)?;
        let mut steps = Vec::new();
        for step_node in step_nodes {
            steps.push(self.parse_step(hook, &step_node)?);
        }
        Ok(Pipeline {
            id: node_id(node),
            steps,
        })
    }

    fn parse_step(&self, hook: &str, node: &Term) -> EngineResult<Step> {
        let subject = as_subject(node)
            .ok_or_else(|| self.malformed(hook, "step node is a literal".to_string()))?;
        let types = self.types(&subject)?;
        let id = node_id(node);

        let kind = if types.iter().any(|t| t == vocab::SPARQL_STEP) {
            StepKind::Sparql {
                query: self.required_literal(hook, &subject, vocab::QUERY_TEXT)?,
            }
        } else if types.iter().any(|t| t == vocab::TEMPLATE_STEP) {
            let body = self.literal(&subject, vocab::TEXT)?;
            let body_path = self.literal(&subject, vocab::FILE_PATH)?;
            if body.is_none() && body_path.is_none() {
                return Err(self.malformed(
                    hook,
                    format!("template step {} has neither gv:text nor gv:filePath", id),
                ));
            }
            StepKind::Template {
                body,
                body_path,
                output_path: self.literal(&subject, vocab::OUTPUT_PATH)?,
            }
        } else if types.iter().any(|t| t == vocab::FILE_STEP) {
            let raw_operation = self.required_literal(hook, &subject, vocab::OPERATION)?;
            let operation = FileOperation::parse(&raw_operation).ok_or_else(|| {
                self.malformed(hook, format!("invalid gv:operation: {}", raw_operation))
            })?;
            StepKind::File {
                path: self.required_literal(hook, &subject, vocab::FILE_PATH)?,
                operation,
                content: self.literal(&subject, vocab::CONTENT)?,
            }
        } else if types.iter().any(|t| t == vocab::CLI_STEP) {
            let timeout_ms = match self.literal(&subject, vocab::TIMEOUT_MS)? {
                Some(raw) => Some(raw.trim().parse().map_err(|_| {
                    self.malformed(hook, format!("invalid gv:timeoutMs: {}", raw))
                })?),
                None => None,
            };
            StepKind::Cli {
                command: self.required_literal(hook, &subject, vocab::COMMAND)?,
                timeout_ms,
            }
        } else if types.iter().any(|t| t == vocab::HTTP_STEP) {
            let headers = match self.literal(&subject, vocab::HEADERS)? {
                Some(raw) => Some(serde_json::from_str::<BTreeMap<String, String>>(&raw).map_err(
                    |e| self.malformed(hook, format!("invalid gv:headers JSON: {}", e)),
                )?),
                None => None,
            };
            StepKind::Http {
                url: self.required_literal(hook, &subject, vocab::URL)?,
                method: self
                    .literal(&subject, vocab::METHOD)?
                    .unwrap_or_else(|| "GET".to_string()),
                headers,
                body: self.literal(&subject, vocab::CONTENT)?,
            }
        } else if types.iter().any(|t| t == vocab::OUTPUT_STEP) {
            let body = self.literal(&subject, vocab::TEXT)?;
            let template_path = self.literal(&subject, vocab::FILE_PATH)?;
            if body.is_none() && template_path.is_none() {
                return Err(self.malformed(
                    hook,
                    format!("output step {} has neither gv:text nor gv:filePath", id),
                ));
            }
            let format = match self.literal(&subject, vocab::OUTPUT_FORMAT)? {
                Some(raw) => OutputFormat::parse(&raw)
                    .ok_or_else(|| self.malformed(hook, format!("invalid gv:format: {}", raw)))?,
                None => OutputFormat::Auto,
            };
            StepKind::Output {
                body,
                template_path,
                output_path: self.required_literal(hook, &subject, vocab::OUTPUT_PATH)?,
                format,
            }
        } else {
            return Err(self.malformed(
                hook,
                format!("step {} has no recognised step class (found {:?})", id, types),
            ));
        };

        let mut depends_on: Vec<String> = self
            .graph
            .objects(&subject, vocab::DEPENDS_ON)?
            .iter()
            .map(node_id)
            .collect();
        depends_on.sort();
        depends_on.dedup();

        let output_mapping = match self.literal(&subject, vocab::OUTPUT_MAPPING)? {
            Some(raw) => Some(
                serde_json::from_str::<BTreeMap<String, String>>(&raw).map_err(|e| {
                    self.malformed(hook, format!("invalid gv:outputMapping JSON: {}", e))
                })?,
            ),
            None => None,
        };

        Ok(Step {
            id,
            kind,
            depends_on,
            output_mapping,
        })
    }

    /// Resolve a property whose object may be an RDF list or a single node
    fn ordered_objects(&self, subject: &NamedOrBlankNode, predicate: &str) -> EngineResult<Vec<Term>> {
        let mut ordered = Vec::new();
        for object in self.graph.objects(subject, predicate)? {
            if self.is_list_node(&object)? {
                self.walk_list(&object, &mut ordered)?;
            } else {
                ordered.push(object);
            }
        }
        Ok(ordered)
    }

    fn is_list_node(&self, node: &Term) -> EngineResult<bool> {
        if let Term::NamedNode(named) = node {
            if named.as_str() == vocab::RDF_NIL {
                return Ok(true);
            }
        }
        match as_subject(node) {
            Some(subject) => Ok(!self.graph.objects(&subject, vocab::RDF_FIRST)?.is_empty()),
            None => Ok(false),
        }
    }

    fn walk_list(&self, head: &Term, out: &mut Vec<Term>) -> EngineResult<()> {
        let mut cursor = head.clone();
        loop {
            if let Term::NamedNode(named) = &cursor {
                if named.as_str() == vocab::RDF_NIL {
                    return Ok(());
                }
            }
            let Some(subject) = as_subject(&cursor) else {
                return Err(EngineError::Parse("malformed RDF list".to_string()));
            };
            let mut first = self.graph.objects(&subject, vocab::RDF_FIRST)?;
            if first.is_empty() {
                return Err(EngineError::Parse(
                    "RDF list cell without rdf:first".to_string(),
                ));
            }
            out.push(first.remove(0));
            let mut rest = self.graph.objects(&subject, vocab::RDF_REST)?;
            if rest.is_empty() {
                return Ok(());
            }
            cursor = rest.remove(0);
        }
    }

    fn types(&self, subject: &NamedOrBlankNode) -> EngineResult<Vec<String>> {
        Ok(self
            .graph
            .objects(subject, vocab::RDF_TYPE)?
            .iter()
            .filter_map(|t| match t {
                Term::NamedNode(node) => Some(node.as_str().to_string()),
                _ => None,
            })
            .collect())
    }

    fn single(&self, subject: &NamedOrBlankNode, predicate: &str) -> EngineResult<Option<Term>> {
        let mut objects = self.graph.objects(subject, predicate)?;
        if objects.is_empty() {
            Ok(None)
        } else {
            Ok(Some(objects.remove(0)))
        }
    }

    fn literal(&self, subject: &NamedOrBlankNode, predicate: &str) -> EngineResult<Option<String>> {
        Ok(self.single(subject, predicate)?.as_ref().and_then(term_text))
    }

    fn required_literal(
        &self,
        hook: &str,
        subject: &NamedOrBlankNode,
        predicate: &str,
    ) -> EngineResult<String> {
        self.literal(subject, predicate)?
            .ok_or_else(|| self.malformed(hook, format!("missing <{}>", predicate)))
    }

    fn malformed(&self, hook: &str, message: String) -> EngineError {
        EngineError::MalformedHook {
            hook: hook.to_string(),
            message,
        }
    }
}

fn as_subject(term: &Term) -> Option<NamedOrBlankNode> {
    match term {
        Term::NamedNode(node) => Some(NamedOrBlankNode::NamedNode(node.clone())),
        Term::BlankNode(node) => Some(NamedOrBlankNode::BlankNode(node.clone())),
        _ => None,
    }
}

fn term_text(term: &Term) -> Option<String> {
    match term {
        Term::Literal(literal) => Some(literal.value().to_string()),
        Term::NamedNode(node) => Some(node.as_str().to_string()),
        _ => None,
    }
}

fn node_id(term: &Term) -> String {
    match term {
        Term::NamedNode(node) => node.as_str().to_string(),
        Term::BlankNode(node) => format!("_:{}", node.as_str()),
        other => other.to_string(),
    }
}

fn local_name(iri: &str) -> &str {
    iri.rsplit(['#', '/']).next().unwrap_or(iri)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use oxigraph::io::RdfFormat;

    const HOOK_TTL: &str = r#"
        @prefix gh: <https://knowhook.dev/graph-hook#> .
        @prefix gv: <https://knowhook.dev/graph-vocab#> .
        @prefix op: <https://knowhook.dev/op#> .
        @prefix dct: <http://purl.org/dc/terms/> .
        @prefix ex: <http://example.org/> .

        ex:item-watch a gh:Hook ;
            dct:title "Item watch" ;
            gh:tag "inventory" ;
            gh:hasPredicate [
                a gh:ASKPredicate ;
                gh:queryText "ASK WHERE { ?x a gv:Item }" ;
            ] ;
            gh:orderedPipelines ( [
                a op:Pipeline ;
                op:steps ( ex:query-items ex:write-report )
            ] ) .

        ex:query-items a gv:SparqlStep ;
            gh:queryText "SELECT ?x WHERE { ?x a gv:Item }" ;
            gv:outputMapping "{\"items\": \"data\"}" .

        ex:write-report a gv:FileStep ;
            gv:filePath "out.txt" ;
            gv:operation "write" ;
            gv:content "fired" ;
            gv:dependsOn ex:query-items .
    "#;

    fn graph(turtle: &str) -> GraphStore {
        let store = GraphStore::new().expect("store");
        store.load_text(turtle, RdfFormat::Turtle).expect("turtle");
        store
    }

    #[test]
    fn test_parse_complete_hook() {
        let store = graph(HOOK_TTL);
        let parser = HookParser::new(&store);
        let report = parser.parse_all().expect("parse");
        assert!(report.failures.is_empty(), "{:?}", report.failures);
        assert_eq!(report.hooks.len(), 1);

        let hook = &report.hooks[0];
        assert_eq!(hook.id, "http://example.org/item-watch");
        assert_eq!(hook.title, "Item watch");
        assert_eq!(hook.tags, vec!["inventory"]);
        assert!(matches!(hook.predicate, Predicate::Ask { .. }));
        assert_eq!(hook.pipelines.len(), 1);

        let steps = &hook.pipelines[0].steps;
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].id, "http://example.org/query-items");
        assert!(matches!(steps[0].kind, StepKind::Sparql { .. }));
        assert_eq!(
            steps[0]
                .output_mapping
                .as_ref()
                .expect("mapping")
                .get("items")
                .map(String::as_str),
            Some("data")
        );
        assert!(matches!(
            steps[1].kind,
            StepKind::File {
                operation: FileOperation::Write,
                ..
            }
        ));
        assert_eq!(steps[1].depends_on, vec!["http://example.org/query-items"]);
    }

    #[test]
    fn test_missing_predicate_is_collected_not_thrown() {
        let store = graph(
            r#"
            @prefix gh: <https://knowhook.dev/graph-hook#> .
            @prefix ex: <http://example.org/> .
            ex:broken a gh:Hook .
            "#,
        );
        let parser = HookParser::new(&store);
        let report = parser.parse_all().expect("parse");
        assert!(report.hooks.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].message.contains("hasPredicate"));
    }

    #[test]
    fn test_threshold_predicate_fields() {
        let store = graph(
            r#"
            @prefix gh: <https://knowhook.dev/graph-hook#> .
            @prefix op: <https://knowhook.dev/op#> .
            @prefix ex: <http://example.org/> .
            ex:gauge a gh:Hook ;
                gh:hasPredicate [
                    a gh:SELECTThresholdPredicate ;
                    gh:queryText "SELECT (COUNT(?x) AS ?c) WHERE { ?x ?p ?o }" ;
                    gh:threshold "10" ;
                    gh:operator ">=" ;
                ] ;
                gh:orderedPipelines ( [ a op:Pipeline ] ) .
            "#,
        );
        let report = HookParser::new(&store).parse_all().expect("parse");
        assert_eq!(report.hooks.len(), 1, "{:?}", report.failures);
        match &report.hooks[0].predicate {
            Predicate::SelectThreshold {
                threshold,
                operator,
                ..
            } => {
                assert_eq!(*threshold, 10.0);
                assert_eq!(*operator, ThresholdOperator::Ge);
            }
            other => panic!("unexpected predicate: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_operator_is_malformed() {
        let store = graph(
            r#"
            @prefix gh: <https://knowhook.dev/graph-hook#> .
            @prefix op: <https://knowhook.dev/op#> .
            @prefix ex: <http://example.org/> .
            ex:gauge a gh:Hook ;
                gh:hasPredicate [
                    a gh:SELECTThresholdPredicate ;
                    gh:queryText "SELECT ?c WHERE { ?x ?p ?c }" ;
                    gh:threshold "10" ;
                    gh:operator "~" ;
                ] ;
                gh:orderedPipelines ( [ a op:Pipeline ] ) .
            "#,
        );
        let report = HookParser::new(&store).parse_all().expect("parse");
        assert!(report.hooks.is_empty());
        assert!(report.failures[0].message.contains("operator"));
    }

    #[test]
    fn test_hooks_ordered_by_iri() {
        let store = graph(
            r#"
            @prefix gh: <https://knowhook.dev/graph-hook#> .
            @prefix op: <https://knowhook.dev/op#> .
            @prefix ex: <http://example.org/> .
            ex:zeta a gh:Hook ;
                gh:hasPredicate [ a gh:ASKPredicate ; gh:queryText "ASK { ?s ?p ?o }" ] ;
                gh:orderedPipelines ( [ a op:Pipeline ] ) .
            ex:alpha a gh:Hook ;
                gh:hasPredicate [ a gh:ASKPredicate ; gh:queryText "ASK { ?s ?p ?o }" ] ;
                gh:orderedPipelines ( [ a op:Pipeline ] ) .
            "#,
        );
        let report = HookParser::new(&store).parse_all().expect("parse");
        let ids: Vec<&str> = report.hooks.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["http://example.org/alpha", "http://example.org/zeta"]
        );
    }
}
