//! In-memory RDF graph store
//!
//! Wraps an oxigraph [`Store`] behind the engine's graph-store contract:
//! directory loading, SPARQL evaluation into owned result values, sizing,
//! and isolated snapshots. The store is mutated only while the orchestrator
//! initialises a run; evaluation reads it concurrently.

use crate::error::{EngineError, EngineResult};
use oxigraph::io::RdfFormat;
use oxigraph::model::Term;
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Kind of an RDF term in a query result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TermKind {
    Iri,
    Literal,
    Blank,
}

/// Owned RDF term as it appears in bindings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermValue {
    pub kind: TermKind,
    pub lexical: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl TermValue {
    pub fn iri(value: impl Into<String>) -> Self {
        Self {
            kind: TermKind::Iri,
            lexical: value.into(),
            datatype: None,
            lang: None,
        }
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            kind: TermKind::Literal,
            lexical: value.into(),
            datatype: None,
            lang: None,
        }
    }
}

/// One SELECT row; column order follows the query projection
pub type Row = Vec<(String, TermValue)>;

/// One constructed triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripleRecord {
    pub subject: String,
    pub predicate: String,
    pub object: TermValue,
}

/// Result of a SPARQL query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryOutcome {
    Boolean(bool),
    Solutions(Vec<Row>),
    Graph(Vec<TripleRecord>),
}

impl QueryOutcome {
    /// SELECT rows, or an empty slice for other result kinds
    pub fn rows(&self) -> &[Row] {
        match self {
            QueryOutcome::Solutions(rows) => rows,
            _ => &[],
        }
    }
}

/// In-memory triple store with SPARQL evaluation
pub struct GraphStore {
    store: Store,
}

impl GraphStore {
    /// Create an empty store
    pub fn new() -> EngineResult<Self> {
        let store = Store::new()
            .map_err(|e| EngineError::IoFailure(format!("failed to create RDF store: {}", e)))?;
        Ok(Self { store })
    }

    /// Recursively load every recognised RDF file under `path`
    ///
    /// Per-file parse failures are logged and skipped; the load errs only
    /// when the directory itself cannot be read. Returns the number of files
    /// loaded.
    pub fn load_dir(&self, path: &Path) -> EngineResult<usize> {
        if !path.is_dir() {
            return Err(EngineError::IoFailure(format!(
                "graph directory does not exist: {}",
                path.display()
            )));
        }
        let mut loaded = 0;
        self.load_dir_inner(path, &mut loaded)?;
        tracing::debug!(dir = %path.display(), files = loaded, "graph directory loaded");
        Ok(loaded)
    }

    fn load_dir_inner(&self, dir: &Path, loaded: &mut usize) -> EngineResult<()> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| EngineError::IoFailure(format!("cannot read {}: {}", dir.display(), e)))?;
        // Deterministic union regardless of directory iteration order
        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        paths.sort();
        for path in paths {
            if path.is_dir() {
                self.load_dir_inner(&path, loaded)?;
                continue;
            }
            let format = path
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(RdfFormat::from_extension);
            let Some(format) = format else {
                continue;
            };
            match self.load_file(&path, format) {
                Ok(()) => *loaded += 1,
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "skipping unparseable RDF file");
                }
            }
        }
        Ok(())
    }

    fn load_file(&self, path: &Path, format: RdfFormat) -> EngineResult<()> {
        let content = std::fs::read(path)
            .map_err(|e| EngineError::IoFailure(format!("cannot read {}: {}", path.display(), e)))?;
        self.store
            .load_from_reader(format, content.as_slice())
            .map_err(|e| EngineError::Parse(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Load serialised RDF text into the store
    pub fn load_text(&self, text: &str, format: RdfFormat) -> EngineResult<()> {
        self.store
            .load_from_reader(format, text.as_bytes())
            .map_err(|e| EngineError::Parse(format!("failed to parse RDF: {}", e)))
    }

    /// Add one triple to the default graph; idempotent on the set, returns
    /// true when the triple was not present before
    pub fn add(&self, triple: &TripleRecord) -> EngineResult<bool> {
        let quad = to_quad(triple)?;
        Ok(self.store.insert(&quad)?)
    }

    /// Remove one triple; idempotent, returns true when it was present
    pub fn remove(&self, triple: &TripleRecord) -> EngineResult<bool> {
        let quad = to_quad(triple)?;
        Ok(self.store.remove(&quad)?)
    }

    /// Execute a SPARQL query
    pub fn query(&self, sparql: &str) -> EngineResult<QueryOutcome> {
        let results = self
            .store
            .query(sparql)
            .map_err(|e| EngineError::Parse(format!("SPARQL query failed: {}", e)))?;
        match results {
            QueryResults::Boolean(b) => Ok(QueryOutcome::Boolean(b)),
            QueryResults::Solutions(solutions) => {
                let mut rows = Vec::new();
                for solution in solutions {
                    let solution = solution
                        .map_err(|e| EngineError::Parse(format!("solution error: {}", e)))?;
                    let mut row: Row = Vec::new();
                    for (var, term) in &solution {
                        row.push((var.as_str().to_string(), term_value(term)));
                    }
                    rows.push(row);
                }
                Ok(QueryOutcome::Solutions(rows))
            }
            QueryResults::Graph(triples) => {
                let mut records = Vec::new();
                for triple in triples {
                    let triple = triple
                        .map_err(|e| EngineError::Parse(format!("triple error: {}", e)))?;
                    records.push(TripleRecord {
                        subject: triple.subject.to_string(),
                        predicate: triple.predicate.as_str().to_string(),
                        object: term_value(&triple.object),
                    });
                }
                Ok(QueryOutcome::Graph(records))
            }
        }
    }

    /// Number of triples in the store
    pub fn size(&self) -> EngineResult<usize> {
        Ok(self.store.len()?)
    }

    /// Independent clone of the store; later mutations do not leak
    pub fn snapshot(&self) -> EngineResult<GraphStore> {
        let clone = GraphStore::new()?;
        for quad in self.store.iter() {
            let quad = quad?;
            clone.store.insert(&quad)?;
        }
        Ok(clone)
    }

    /// Serialise the store as sorted N-Triples (graph component dropped)
    pub fn to_ntriples(&self) -> EngineResult<String> {
        let mut lines = Vec::new();
        for quad in self.store.iter() {
            let quad = quad?;
            lines.push(format!(
                "{} {} {} .",
                quad.subject, quad.predicate, quad.object
            ));
        }
        lines.sort();
        let mut text = lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        Ok(text)
    }

    /// Rebuild a store from an N-Triples dump produced by [`Self::to_ntriples`]
    pub fn from_ntriples(text: &str) -> EngineResult<GraphStore> {
        let store = GraphStore::new()?;
        store.load_text(text, RdfFormat::NTriples)?;
        Ok(store)
    }

    /// All subjects carrying `rdf:type <class_iri>`
    pub(crate) fn subjects_of_type(
        &self,
        class_iri: &str,
    ) -> EngineResult<Vec<oxigraph::model::NamedOrBlankNode>> {
        let rdf_type = named(crate::vocab::RDF_TYPE)?;
        let class = named(class_iri)?;
        let mut subjects = Vec::new();
        for quad in self.store.quads_for_pattern(
            None,
            Some(rdf_type.as_ref()),
            Some(class.as_ref().into()),
            None,
        ) {
            subjects.push(quad?.subject);
        }
        Ok(subjects)
    }

    /// Objects of `(subject, <predicate_iri>, ?)`
    pub(crate) fn objects(
        &self,
        subject: &oxigraph::model::NamedOrBlankNode,
        predicate_iri: &str,
    ) -> EngineResult<Vec<Term>> {
        let predicate = named(predicate_iri)?;
        let mut objects = Vec::new();
        for quad in self.store.quads_for_pattern(
            Some(subject.as_ref()),
            Some(predicate.as_ref()),
            None,
            None,
        ) {
            objects.push(quad?.object);
        }
        Ok(objects)
    }
}

fn named(iri: &str) -> EngineResult<oxigraph::model::NamedNode> {
    oxigraph::model::NamedNode::new(iri)
        .map_err(|e| EngineError::Parse(format!("invalid IRI {}: {}", iri, e)))
}

fn to_quad(triple: &TripleRecord) -> EngineResult<oxigraph::model::Quad> {
    use oxigraph::model::{BlankNode, GraphName, Literal, NamedOrBlankNode, Quad};

    let subject = if let Some(label) = triple.subject.strip_prefix("_:") {
        NamedOrBlankNode::BlankNode(
            BlankNode::new(label)
                .map_err(|e| EngineError::Parse(format!("invalid blank node: {}", e)))?,
        )
    } else {
        NamedOrBlankNode::NamedNode(named(&triple.subject)?)
    };
    let predicate = named(&triple.predicate)?;
    let object: Term = match triple.object.kind {
        TermKind::Iri => named(&triple.object.lexical)?.into(),
        TermKind::Blank => BlankNode::new(triple.object.lexical.as_str())
            .map_err(|e| EngineError::Parse(format!("invalid blank node: {}", e)))?
            .into(),
        TermKind::Literal => match (&triple.object.lang, &triple.object.datatype) {
            (Some(lang), _) => Literal::new_language_tagged_literal(
                triple.object.lexical.as_str(),
                lang.as_str(),
            )
            .map_err(|e| EngineError::Parse(format!("invalid language tag: {}", e)))?
            .into(),
            (None, Some(datatype)) => {
                Literal::new_typed_literal(triple.object.lexical.as_str(), named(datatype)?).into()
            }
            (None, None) => Literal::new_simple_literal(triple.object.lexical.as_str()).into(),
        },
    };
    Ok(Quad::new(subject, predicate, object, GraphName::DefaultGraph))
}

/// Convert an oxigraph term into an owned binding value
fn term_value(term: &Term) -> TermValue {
    match term {
        Term::NamedNode(node) => TermValue {
            kind: TermKind::Iri,
            lexical: node.as_str().to_string(),
            datatype: None,
            lang: None,
        },
        Term::BlankNode(node) => TermValue {
            kind: TermKind::Blank,
            lexical: node.as_str().to_string(),
            datatype: None,
            lang: None,
        },
        Term::Literal(literal) => TermValue {
            kind: TermKind::Literal,
            lexical: literal.value().to_string(),
            datatype: Some(literal.datatype().as_str().to_string()),
            lang: literal.language().map(|l| l.to_string()),
        },
        #[allow(unreachable_patterns)]
        other => TermValue {
            kind: TermKind::Literal,
            lexical: other.to_string(),
            datatype: None,
            lang: None,
        },
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    const DATA: &str = r#"
        @prefix ex: <http://example.org/> .
        ex:alice ex:name "Alice" .
        ex:bob ex:name "Bob" .
        ex:alice ex:age "30"^^<http://www.w3.org/2001/XMLSchema#integer> .
    "#;

    fn store_with_data() -> GraphStore {
        let store = GraphStore::new().expect("store");
        store
            .load_text(DATA, RdfFormat::Turtle)
            .expect("load turtle");
        store
    }

    #[test]
    fn test_ask_query() {
        let store = store_with_data();
        let outcome = store
            .query("ASK { ?s <http://example.org/name> ?o }")
            .expect("query");
        assert_eq!(outcome, QueryOutcome::Boolean(true));

        let outcome = store
            .query("ASK { ?s <http://example.org/missing> ?o }")
            .expect("query");
        assert_eq!(outcome, QueryOutcome::Boolean(false));
    }

    #[test]
    fn test_select_preserves_column_order() {
        let store = store_with_data();
        let outcome = store
            .query(
                "SELECT ?age ?s WHERE { ?s <http://example.org/age> ?age }",
            )
            .expect("query");
        let rows = outcome.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0].0, "age");
        assert_eq!(rows[0][0].1.lexical, "30");
        assert_eq!(rows[0][1].0, "s");
        assert_eq!(rows[0][1].1.kind, TermKind::Iri);
    }

    #[test]
    fn test_add_and_remove_are_idempotent() {
        let store = GraphStore::new().expect("store");
        let triple = TripleRecord {
            subject: "http://example.org/carol".to_string(),
            predicate: "http://example.org/name".to_string(),
            object: TermValue::literal("Carol"),
        };
        assert!(store.add(&triple).expect("add"));
        assert!(!store.add(&triple).expect("add again"), "set semantics");
        assert_eq!(store.size().expect("size"), 1);

        assert!(store.remove(&triple).expect("remove"));
        assert!(!store.remove(&triple).expect("remove again"));
        assert_eq!(store.size().expect("size"), 0);
    }

    #[test]
    fn test_snapshot_is_isolated() {
        let store = store_with_data();
        let snap = store.snapshot().expect("snapshot");
        assert_eq!(snap.size().expect("size"), store.size().expect("size"));

        store
            .load_text(
                "<http://example.org/carol> <http://example.org/name> \"Carol\" .",
                RdfFormat::NTriples,
            )
            .expect("load");
        assert_eq!(store.size().expect("size"), snap.size().expect("size") + 1);
    }

    #[test]
    fn test_ntriples_round_trip() {
        let store = store_with_data();
        let dump = store.to_ntriples().expect("dump");
        let restored = GraphStore::from_ntriples(&dump).expect("restore");
        assert_eq!(
            restored.size().expect("size"),
            store.size().expect("size")
        );
        assert_eq!(restored.to_ntriples().expect("dump"), dump);
    }

    #[test]
    fn test_load_dir_skips_bad_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("good.ttl"), DATA).expect("write");
        std::fs::write(dir.path().join("bad.ttl"), "not turtle at all {{{{").expect("write");
        std::fs::write(dir.path().join("ignored.txt"), "plain text").expect("write");

        let store = GraphStore::new().expect("store");
        let loaded = store.load_dir(dir.path()).expect("load dir");
        assert_eq!(loaded, 1);
        assert_eq!(store.size().expect("size"), 3);
    }

    #[test]
    fn test_load_dir_missing_directory_fails() {
        let store = GraphStore::new().expect("store");
        assert!(store.load_dir(Path::new("/nonexistent/graph/dir")).is_err());
    }
}
