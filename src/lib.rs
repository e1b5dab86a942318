//! Knowledge hook engine
//!
//! Reactive evaluation and workflow execution driven by an RDF knowledge
//! graph:
//! - hooks are declared as RDF and materialised into typed records
//! - five predicate kinds decide whether a hook fires, including a
//!   canonical-hash diff against the previous run's snapshot
//! - triggered pipelines execute as planned DAGs under per-hook named locks
//! - every execution leaves a hashed receipt, a metric record, and a
//!   snapshot, optionally anchored in an append-only git audit repository

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod canonical;
pub mod config;
pub mod context;
pub mod error;
pub mod gitio;
pub mod graph;
pub mod hook;
pub mod orchestrator;
pub mod parser;
pub mod plan;
pub mod predicate;
pub mod shacl;
pub mod steps;
pub mod template;
pub mod vocab;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use gitio::{LockManager, MetricsLog, Receipt, ReceiptStore, SnapshotStore, WorkerPool};
pub use graph::{GraphStore, QueryOutcome, TermValue};
pub use hook::{Hook, Pipeline, Predicate, Step, StepKind};
pub use orchestrator::{EvaluateOptions, EvaluationResult, HookOrchestrator};
pub use parser::{HookParser, ParseReport};
pub use plan::ExecutionPlan;
pub use predicate::{PredicateEvaluator, PredicateOutcome};
pub use steps::{StepResult, StepRunner, StepState};
