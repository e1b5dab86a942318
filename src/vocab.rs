//! RDF vocabulary recognised by the hook parser
//!
//! The engine follows these IRIs verbatim; hooks authored against any other
//! vocabulary are invisible to it.

/// Hook vocabulary namespace (`gh:`)
pub const GH: &str = "https://knowhook.dev/graph-hook#";
/// Step vocabulary namespace (`gv:`)
pub const GV: &str = "https://knowhook.dev/graph-vocab#";
/// Pipeline vocabulary namespace (`op:`)
pub const OP: &str = "https://knowhook.dev/op#";
/// Dublin Core terms (`dct:`)
pub const DCT: &str = "http://purl.org/dc/terms/";
/// RDF syntax namespace
pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
/// SHACL namespace
pub const SH: &str = "http://www.w3.org/ns/shacl#";

// Classes
pub const HOOK: &str = "https://knowhook.dev/graph-hook#Hook";
pub const ASK_PREDICATE: &str = "https://knowhook.dev/graph-hook#ASKPredicate";
pub const SELECT_THRESHOLD_PREDICATE: &str =
    "https://knowhook.dev/graph-hook#SELECTThresholdPredicate";
pub const RESULT_DELTA_PREDICATE: &str =
    "https://knowhook.dev/graph-hook#ResultDeltaPredicate";
pub const SHACL_PREDICATE: &str = "https://knowhook.dev/graph-hook#SHACLPredicate";
pub const CONSTRUCT_PREDICATE: &str =
    "https://knowhook.dev/graph-hook#ConstructPredicate";
pub const PIPELINE: &str = "https://knowhook.dev/op#Pipeline";
pub const SPARQL_STEP: &str = "https://knowhook.dev/graph-vocab#SparqlStep";
pub const TEMPLATE_STEP: &str = "https://knowhook.dev/graph-vocab#TemplateStep";
pub const FILE_STEP: &str = "https://knowhook.dev/graph-vocab#FileStep";
pub const CLI_STEP: &str = "https://knowhook.dev/graph-vocab#CliStep";
pub const HTTP_STEP: &str = "https://knowhook.dev/graph-vocab#HttpStep";
pub const OUTPUT_STEP: &str = "https://knowhook.dev/graph-vocab#OutputStep";

// Properties
pub const HAS_PREDICATE: &str = "https://knowhook.dev/graph-hook#hasPredicate";
pub const ORDERED_PIPELINES: &str =
    "https://knowhook.dev/graph-hook#orderedPipelines";
pub const STEPS: &str = "https://knowhook.dev/op#steps";
pub const QUERY_TEXT: &str = "https://knowhook.dev/graph-hook#queryText";
pub const THRESHOLD: &str = "https://knowhook.dev/graph-hook#threshold";
pub const OPERATOR: &str = "https://knowhook.dev/graph-hook#operator";
pub const SHAPES_TEXT: &str = "https://knowhook.dev/graph-hook#shapesText";
pub const TEXT: &str = "https://knowhook.dev/graph-vocab#text";
pub const FILE_PATH: &str = "https://knowhook.dev/graph-vocab#filePath";
pub const OPERATION: &str = "https://knowhook.dev/graph-vocab#operation";
pub const CONTENT: &str = "https://knowhook.dev/graph-vocab#content";
pub const COMMAND: &str = "https://knowhook.dev/graph-vocab#command";
pub const URL: &str = "https://knowhook.dev/graph-vocab#url";
pub const METHOD: &str = "https://knowhook.dev/graph-vocab#method";
pub const HEADERS: &str = "https://knowhook.dev/graph-vocab#headers";
pub const OUTPUT_PATH: &str = "https://knowhook.dev/graph-vocab#outputPath";
pub const OUTPUT_FORMAT: &str = "https://knowhook.dev/graph-vocab#format";
pub const OUTPUT_MAPPING: &str = "https://knowhook.dev/graph-vocab#outputMapping";
pub const DEPENDS_ON: &str = "https://knowhook.dev/graph-vocab#dependsOn";
pub const TIMEOUT_MS: &str = "https://knowhook.dev/graph-vocab#timeoutMs";
pub const TITLE: &str = "http://purl.org/dc/terms/title";
pub const DESCRIPTION: &str = "http://purl.org/dc/terms/description";
pub const TAG: &str = "https://knowhook.dev/graph-hook#tag";
pub const VERSION: &str = "https://knowhook.dev/graph-hook#version";

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDF_FIRST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#first";
pub const RDF_REST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#rest";
pub const RDF_NIL: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#nil";

/// SPARQL PREFIX header shared by the parser's extraction queries
pub fn prefixes() -> String {
    format!(
        "PREFIX gh: <{}>\nPREFIX gv: <{}>\nPREFIX op: <{}>\nPREFIX dct: <{}>\nPREFIX rdf: <{}>\n",
        GH, GV, OP, DCT, RDF
    )
}
