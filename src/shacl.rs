//! Shape validation gate
//!
//! A core subset of SHACL sufficient for gate predicates: node shapes with
//! `sh:targetClass` and property shapes carrying `sh:path` plus
//! `sh:minCount`, `sh:maxCount`, `sh:datatype`, `sh:class`, and
//! `sh:pattern`. Validation never mutates the data graph.

use crate::error::EngineResult;
use crate::graph::{GraphStore, TermKind, TermValue};
use crate::vocab;
use oxigraph::io::RdfFormat;
use serde::{Deserialize, Serialize};

/// One violation found during validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub focus_node: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub constraint: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Validation report over one data graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub conforms: bool,
    pub results: Vec<ValidationResult>,
}

#[derive(Debug)]
struct PropertyShape {
    path: String,
    min_count: Option<usize>,
    max_count: Option<usize>,
    datatype: Option<String>,
    class: Option<String>,
    pattern: Option<String>,
}

/// Validate `data` against a Turtle shapes document
pub fn validate(data: &GraphStore, shapes_turtle: &str) -> EngineResult<ValidationReport> {
    let shapes = GraphStore::new()?;
    shapes.load_text(shapes_turtle, RdfFormat::Turtle)?;

    let mut results = Vec::new();

    let shape_query = format!(
        "PREFIX sh: <{sh}>\nSELECT ?shape ?cls WHERE {{ ?shape a sh:NodeShape ; sh:targetClass ?cls }}",
        sh = vocab::SH
    );
    for row in shapes.query(&shape_query)?.rows() {
        let Some(shape) = cell(row, "shape") else { continue };
        let Some(target) = cell(row, "cls") else { continue };
        if shape.kind != TermKind::Iri || target.kind != TermKind::Iri {
            continue;
        }
        let property_shapes = load_property_shapes(&shapes, &shape.lexical)?;
        let focus_query = format!(
            "SELECT ?focus WHERE {{ ?focus <{}> <{}> }}",
            vocab::RDF_TYPE,
            target.lexical
        );
        for focus_row in data.query(&focus_query)?.rows() {
            let Some(focus) = cell(focus_row, "focus") else { continue };
            if focus.kind != TermKind::Iri {
                continue;
            }
            for ps in &property_shapes {
                check_property(data, &focus.lexical, ps, &mut results)?;
            }
        }
    }

    Ok(ValidationReport {
        conforms: results.is_empty(),
        results,
    })
}

fn load_property_shapes(shapes: &GraphStore, shape: &str) -> EngineResult<Vec<PropertyShape>> {
    let query = format!(
        "PREFIX sh: <{sh}>\n\
         SELECT ?path ?minCount ?maxCount ?datatype ?class ?pattern WHERE {{\n\
           <{shape}> sh:property ?ps .\n\
           ?ps sh:path ?path .\n\
           OPTIONAL {{ ?ps sh:minCount ?minCount }}\n\
           OPTIONAL {{ ?ps sh:maxCount ?maxCount }}\n\
           OPTIONAL {{ ?ps sh:datatype ?datatype }}\n\
           OPTIONAL {{ ?ps sh:class ?class }}\n\
           OPTIONAL {{ ?ps sh:pattern ?pattern }}\n\
         }}",
        sh = vocab::SH,
        shape = shape
    );
    let mut property_shapes = Vec::new();
    for row in shapes.query(&query)?.rows() {
        let Some(path) = cell(row, "path") else { continue };
        property_shapes.push(PropertyShape {
            path: path.lexical.clone(),
            min_count: cell(row, "minCount").and_then(|t| t.lexical.parse().ok()),
            max_count: cell(row, "maxCount").and_then(|t| t.lexical.parse().ok()),
            datatype: cell(row, "datatype").map(|t| t.lexical.clone()),
            class: cell(row, "class").map(|t| t.lexical.clone()),
            pattern: cell(row, "pattern").map(|t| t.lexical.clone()),
        });
    }
    Ok(property_shapes)
}

fn check_property(
    data: &GraphStore,
    focus: &str,
    ps: &PropertyShape,
    results: &mut Vec<ValidationResult>,
) -> EngineResult<()> {
    let query = format!("SELECT ?v WHERE {{ <{}> <{}> ?v }}", focus, ps.path);
    let outcome = data.query(&query)?;
    let values: Vec<&TermValue> = outcome
        .rows()
        .iter()
        .filter_map(|row| cell(row, "v"))
        .collect();

    if let Some(min) = ps.min_count {
        if values.len() < min {
            results.push(violation(
                focus,
                ps,
                "minCount",
                format!("expected at least {} values, found {}", min, values.len()),
                None,
            ));
        }
    }
    if let Some(max) = ps.max_count {
        if values.len() > max {
            results.push(violation(
                focus,
                ps,
                "maxCount",
                format!("expected at most {} values, found {}", max, values.len()),
                None,
            ));
        }
    }
    if let Some(ref datatype) = ps.datatype {
        for value in &values {
            let actual = value.datatype.as_deref().unwrap_or("");
            if value.kind != TermKind::Literal || actual != datatype {
                results.push(violation(
                    focus,
                    ps,
                    "datatype",
                    format!("value is not a literal of {}", datatype),
                    Some(value.lexical.clone()),
                ));
            }
        }
    }
    if let Some(ref class) = ps.class {
        for value in &values {
            if value.kind != TermKind::Iri {
                results.push(violation(
                    focus,
                    ps,
                    "class",
                    format!("value is not an instance of {}", class),
                    Some(value.lexical.clone()),
                ));
                continue;
            }
            let ask = format!(
                "ASK {{ <{}> <{}> <{}> }}",
                value.lexical,
                vocab::RDF_TYPE,
                class
            );
            if !matches!(data.query(&ask)?, crate::graph::QueryOutcome::Boolean(true)) {
                results.push(violation(
                    focus,
                    ps,
                    "class",
                    format!("value is not an instance of {}", class),
                    Some(value.lexical.clone()),
                ));
            }
        }
    }
    if let Some(ref pattern) = ps.pattern {
        let re = regex::Regex::new(pattern).map_err(|e| {
            crate::error::EngineError::Parse(format!("invalid sh:pattern {}: {}", pattern, e))
        })?;
        for value in &values {
            if !re.is_match(&value.lexical) {
                results.push(violation(
                    focus,
                    ps,
                    "pattern",
                    format!("value does not match {}", pattern),
                    Some(value.lexical.clone()),
                ));
            }
        }
    }
    Ok(())
}

fn violation(
    focus: &str,
    ps: &PropertyShape,
    constraint: &str,
    message: String,
    value: Option<String>,
) -> ValidationResult {
    ValidationResult {
        focus_node: focus.to_string(),
        path: Some(ps.path.clone()),
        constraint: constraint.to_string(),
        message,
        value,
    }
}

fn cell<'a>(row: &'a [(String, TermValue)], var: &str) -> Option<&'a TermValue> {
    row.iter().find(|(v, _)| v == var).map(|(_, t)| t)
}
