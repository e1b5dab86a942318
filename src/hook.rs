//! Hook data model
//!
//! Hook records are materialised once by the parser; every downstream
//! component works on these records, never on raw triples. Step kinds are a
//! closed set: the dispatch decision is made at parse time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Comparison operator for threshold predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdOperator {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl ThresholdOperator {
    /// Parse an operator from its serialised form; both ASCII and the
    /// typographic variants are accepted
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            ">" => Some(Self::Gt),
            ">=" | "≥" => Some(Self::Ge),
            "<" => Some(Self::Lt),
            "<=" | "≤" => Some(Self::Le),
            "=" | "==" => Some(Self::Eq),
            "!=" | "≠" => Some(Self::Ne),
            _ => None,
        }
    }

    /// Apply the operator: `value OP threshold`
    pub fn compare(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Ge => value >= threshold,
            Self::Lt => value < threshold,
            Self::Le => value <= threshold,
            Self::Eq => value == threshold,
            Self::Ne => value != threshold,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "=",
            Self::Ne => "!=",
        }
    }
}

/// Decision function of a hook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Predicate {
    /// Fires when the ASK query answers true on the current graph
    Ask { query: String },
    /// Fires when the first binding, read as a number, passes the comparison
    SelectThreshold {
        query: String,
        threshold: f64,
        operator: ThresholdOperator,
    },
    /// Fires when the canonical result hash differs from the previous graph
    ResultDelta { query: String },
    /// Fires when shape validation produces any result
    Shacl { shapes: String },
    /// Fires when the constructed sub-graph is non-empty
    Construct { query: String },
}

impl Predicate {
    /// Stable kind name used in predicate outcomes and receipts
    pub fn kind(&self) -> &'static str {
        match self {
            Predicate::Ask { .. } => "ASK",
            Predicate::SelectThreshold { .. } => "SELECTThreshold",
            Predicate::ResultDelta { .. } => "ResultDelta",
            Predicate::Shacl { .. } => "SHACL",
            Predicate::Construct { .. } => "Construct",
        }
    }
}

/// Filesystem mutation performed by a file step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    Create,
    Write,
    Append,
    Delete,
}

impl FileOperation {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Some(Self::Create),
            "write" => Some(Self::Write),
            "append" => Some(Self::Append),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Output document format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Markdown,
    Html,
    Latex,
    Xlsx,
    Pptx,
    Docx,
    Auto,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Some(Self::Markdown),
            "html" => Some(Self::Html),
            "latex" | "tex" => Some(Self::Latex),
            "xlsx" => Some(Self::Xlsx),
            "pptx" => Some(Self::Pptx),
            "docx" => Some(Self::Docx),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }

    /// Resolve `Auto` from the output path's extension; unknown extensions
    /// fall back to markdown
    pub fn resolve(&self, output_path: &Path) -> OutputFormat {
        if *self != OutputFormat::Auto {
            return *self;
        }
        let ext = output_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "md" | "markdown" => OutputFormat::Markdown,
            "html" | "htm" => OutputFormat::Html,
            "tex" | "latex" => OutputFormat::Latex,
            "xlsx" | "xls" => OutputFormat::Xlsx,
            "pptx" | "ppt" => OutputFormat::Pptx,
            "docx" | "doc" => OutputFormat::Docx,
            _ => OutputFormat::Markdown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Latex => "latex",
            Self::Xlsx => "xlsx",
            Self::Pptx => "pptx",
            Self::Docx => "docx",
            Self::Auto => "auto",
        }
    }
}

/// Kind-specific step payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum StepKind {
    /// Run a SELECT query against the current graph
    Sparql { query: String },
    /// Render a template; optionally write the rendered text
    Template {
        body: Option<String>,
        body_path: Option<String>,
        output_path: Option<String>,
    },
    /// Mutate the filesystem
    File {
        path: String,
        operation: FileOperation,
        content: Option<String>,
    },
    /// Spawn a shell command
    Cli {
        command: String,
        timeout_ms: Option<u64>,
    },
    /// Perform one HTTP request
    Http {
        url: String,
        method: String,
        headers: Option<BTreeMap<String, String>>,
        body: Option<String>,
    },
    /// Render and write a document in a named format
    Output {
        body: Option<String>,
        template_path: Option<String>,
        output_path: String,
        format: OutputFormat,
    },
}

impl StepKind {
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Sparql { .. } => "sparql",
            StepKind::Template { .. } => "template",
            StepKind::File { .. } => "file",
            StepKind::Cli { .. } => "cli",
            StepKind::Http { .. } => "http",
            StepKind::Output { .. } => "output",
        }
    }
}

/// One unit of work inside a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(flatten)]
    pub kind: StepKind,
    /// Step ids that must complete before this one; empty means "after the
    /// previously declared step"
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Context variable name → JSON path into this step's result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_mapping: Option<BTreeMap<String, String>>,
}

/// Ordered list of steps executed as a planned DAG
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: String,
    pub steps: Vec<Step>,
}

/// A declarative trigger: predicate plus ordered pipelines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hook {
    /// Hook IRI, unique within a run
    pub id: String,
    pub title: String,
    pub predicate: Predicate,
    /// Non-empty; pipelines run sequentially, context carries across
    pub pipelines: Vec<Pipeline>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
