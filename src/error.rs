//! Error types for the knowledge hook engine

use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Error taxonomy for the hook engine
///
/// Each variant carries a stable kind name (see [`EngineError::kind`]) that
/// is persisted into receipts and metrics records.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A hook definition is missing mandatory fields or is otherwise unusable
    #[error("Malformed hook {hook}: {message}")]
    MalformedHook { hook: String, message: String },

    /// Predicate evaluation raised instead of producing a verdict
    #[error("Predicate evaluation failed for {hook}: {message}")]
    PredicateFailure { hook: String, message: String },

    /// The declared step dependencies do not form a DAG
    #[error("Invalid execution plan: {0}")]
    InvalidPlan(String),

    /// A step failed during execution
    #[error("Step {step} failed: {message}")]
    StepFailure { step: String, message: String },

    /// A step exceeded its effective timeout
    #[error("Step {step} timed out after {timeout_ms}ms")]
    StepTimeout { step: String, timeout_ms: u64 },

    /// A template called a non-deterministic function
    #[error("Template impurity in step {step}: {message}")]
    TemplateImpurity { step: String, message: String },

    /// A named lock could not be acquired within the timeout
    #[error("Lock {0} unavailable")]
    LockUnavailable(String),

    /// Durable storage or other infrastructure failed
    #[error("I/O failure: {0}")]
    IoFailure(String),

    /// RDF or SPARQL level failure
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Stable kind name recorded in receipts and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::MalformedHook { .. } => "MalformedHook",
            EngineError::PredicateFailure { .. } => "PredicateFailure",
            EngineError::InvalidPlan(_) => "InvalidPlan",
            EngineError::StepFailure { .. } => "StepFailure",
            EngineError::StepTimeout { .. } => "StepTimeout",
            EngineError::TemplateImpurity { .. } => "TemplateImpurity",
            EngineError::LockUnavailable(_) => "LockUnavailable",
            EngineError::IoFailure(_) => "IoFailure",
            EngineError::Parse(_) => "Parse",
            EngineError::Config(_) => "Config",
        }
    }

    /// Exit code for CLI front-ends (see the external interface contract)
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::IoFailure(_) | EngineError::LockUnavailable(_) => 2,
            EngineError::MalformedHook { .. }
            | EngineError::Parse(_)
            | EngineError::Config(_) => 3,
            _ => 1,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::IoFailure(err.to_string())
    }
}

impl From<oxigraph::store::StorageError> for EngineError {
    fn from(err: oxigraph::store::StorageError) -> Self {
        EngineError::IoFailure(format!("RDF store error: {}", err))
    }
}

impl From<oxigraph::sparql::EvaluationError> for EngineError {
    fn from(err: oxigraph::sparql::EvaluationError) -> Self {
        EngineError::Parse(format!("SPARQL evaluation error: {}", err))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::IoFailure(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn test_kind_names_are_stable() {
        let err = EngineError::StepTimeout {
            step: "s1".to_string(),
            timeout_ms: 500,
        };
        assert_eq!(err.kind(), "StepTimeout");

        let err = EngineError::LockUnavailable("hook-execution-a".to_string());
        assert_eq!(err.kind(), "LockUnavailable");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(EngineError::IoFailure("disk".into()).exit_code(), 2);
        assert_eq!(EngineError::Config("bad".into()).exit_code(), 3);
        assert_eq!(
            EngineError::StepFailure {
                step: "s".into(),
                message: "boom".into()
            }
            .exit_code(),
            1
        );
    }
}
