//! Top-level evaluation lifecycle
//!
//! One `evaluate()` call: load the hook graph, load the previous snapshot
//! (best effort), parse all hooks, test every predicate, submit each
//! triggered hook to the worker pool, and aggregate the results. Every
//! triggered hook leaves exactly one receipt; hook-scoped failures never
//! abort siblings, and `evaluate()` itself errs only when the graph cannot
//! be loaded at all.

use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::error::{EngineError, EngineResult};
use crate::gitio::receipts::durable_write;
use crate::gitio::{
    sanitise_id, GitAuditLog, LockManager, MetricRecord, MetricsLog, Priority, Receipt,
    ReceiptStore, SnapshotStore, WorkerPool,
};
use crate::graph::GraphStore;
use crate::hook::Hook;
use crate::parser::HookParser;
use crate::plan::ExecutionPlan;
use crate::predicate::{PredicateEvaluator, PredicateOutcome};
use crate::steps::{ErrorInfo, StepResult, StepRunner};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Options for one evaluation run
#[derive(Debug, Clone, Default)]
pub struct EvaluateOptions {
    /// Evaluate predicates but execute nothing
    pub dry_run: bool,
}

/// Per-hook predicate verdict included in the evaluation result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredicateSummary {
    pub hook_id: String,
    pub kind: String,
    pub fired: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate outcome of one `evaluate()` call
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub hooks_evaluated: usize,
    pub hooks_triggered: usize,
    pub workflows_executed: usize,
    pub workflows_successful: usize,
    pub predicates: Vec<PredicateSummary>,
    pub executions: Vec<Receipt>,
    /// Lock and storage level failures; the run is marked failed when any
    /// are present
    pub infrastructure_failures: Vec<String>,
    pub metadata: serde_json::Value,
}

impl EvaluationResult {
    /// CLI exit code per the external interface contract
    pub fn exit_code(&self) -> i32 {
        if !self.infrastructure_failures.is_empty() {
            2
        } else if self.workflows_executed > self.workflows_successful {
            1
        } else {
            0
        }
    }
}

/// Everything a hook-execution job needs, shared across the pool
struct JobEnv {
    config: EngineConfig,
    graph: Arc<GraphStore>,
    locks: Arc<LockManager>,
    receipts: Arc<ReceiptStore>,
    metrics: Arc<MetricsLog>,
    snapshots: Arc<SnapshotStore>,
    audit: Option<Arc<parking_lot::Mutex<GitAuditLog>>>,
    shutdown: Arc<AtomicBool>,
}

/// The hook engine's top-level orchestrator
pub struct HookOrchestrator {
    config: EngineConfig,
    locks: Arc<LockManager>,
    pool: WorkerPool,
    receipts: Arc<ReceiptStore>,
    metrics: Arc<MetricsLog>,
    snapshots: Arc<SnapshotStore>,
    audit: Option<Arc<parking_lot::Mutex<GitAuditLog>>>,
    shutdown: Arc<AtomicBool>,
}

impl HookOrchestrator {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let audit = match &config.audit_repo {
            Some(path) => Some(Arc::new(parking_lot::Mutex::new(GitAuditLog::open(path)?))),
            None => None,
        };
        Ok(Self {
            locks: Arc::new(LockManager::new()),
            pool: WorkerPool::new(config.workers()),
            receipts: Arc::new(ReceiptStore::new(config.receipts_dir())),
            metrics: Arc::new(MetricsLog::new(config.metrics_path())),
            snapshots: Arc::new(SnapshotStore::new(config.snapshots_dir())),
            audit,
            shutdown: Arc::new(AtomicBool::new(false)),
            config,
        })
    }

    /// Request cooperative cancellation; in-flight steps finish or are
    /// marked cancelled at the next suspension point
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.pool.shutdown();
    }

    /// Evaluate every hook once and execute the triggered ones
    pub async fn evaluate(&self, options: EvaluateOptions) -> EngineResult<EvaluationResult> {
        let run_started = Utc::now();
        let run_id = new_execution_id();

        // 1. Read the hook directory exactly once; this store is the run's truth
        let graph = GraphStore::new()?;
        let files_loaded = graph.load_dir(&self.config.graph_dir)?;
        let triples = graph.size()?;
        let graph = Arc::new(graph);

        // 2. Previous snapshot is best effort; absence is not an error
        let previous = match self.snapshots.load_graph_state() {
            Ok(Some(text)) => match GraphStore::from_ntriples(&text) {
                Ok(store) => Some(store),
                Err(e) => {
                    tracing::warn!(error = %e, "previous snapshot unreadable, treating as absent");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "previous snapshot unreadable, treating as absent");
                None
            }
        };

        // 3. Materialise hook records
        let report = HookParser::new(&graph).parse_all()?;
        tracing::info!(
            hooks = report.hooks.len(),
            malformed = report.failures.len(),
            triples,
            "hooks parsed"
        );

        // 4. Test every predicate against the read-only graphs
        let mut outcomes: Vec<(Hook, PredicateOutcome)> = Vec::new();
        for hook in report.hooks {
            let outcome = PredicateEvaluator::evaluate(&hook, &graph, previous.as_ref());
            outcomes.push((hook, outcome));
        }
        let predicates: Vec<PredicateSummary> = outcomes
            .iter()
            .map(|(_, o)| PredicateSummary {
                hook_id: o.hook_id.clone(),
                kind: o.kind.to_string(),
                fired: o.fired,
                duration_ms: o.duration_ms,
                error: o.error.clone(),
            })
            .collect();
        let hooks_evaluated = outcomes.len();
        let hooks_triggered = outcomes.iter().filter(|(_, o)| o.fired).count();

        // 5. Submit every triggered hook as a high priority job
        let mut receivers = Vec::new();
        if !options.dry_run {
            for (hook, outcome) in outcomes.into_iter().filter(|(_, o)| o.fired) {
                let env = JobEnv {
                    config: self.config.clone(),
                    graph: graph.clone(),
                    locks: self.locks.clone(),
                    receipts: self.receipts.clone(),
                    metrics: self.metrics.clone(),
                    snapshots: self.snapshots.clone(),
                    audit: self.audit.clone(),
                    shutdown: self.shutdown.clone(),
                };
                let context = outcome.context;
                receivers.push(self.pool.submit(Priority::High, None, async move {
                    execute_hook(env, hook, context).await
                }));
            }
        }

        // 6. Await every job; never fail fast
        let mut executions = Vec::new();
        let mut infrastructure_failures = Vec::new();
        for outcome in futures::future::join_all(receivers).await {
            match outcome {
                Ok(Ok(receipt)) => executions.push(receipt),
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "hook execution hit an infrastructure fault");
                    infrastructure_failures.push(e.to_string());
                }
                Err(_) => {
                    infrastructure_failures
                        .push("worker pool dropped a hook execution".to_string());
                }
            }
        }

        let workflows_executed = executions.len();
        let workflows_successful = executions.iter().filter(|r| r.success).count();

        // Persist the graph for the next run's delta predicates
        if !options.dry_run {
            match graph.to_ntriples() {
                Ok(dump) => {
                    if let Err(e) = self.snapshots.store_graph_state(&dump) {
                        infrastructure_failures.push(e.to_string());
                    }
                }
                Err(e) => infrastructure_failures.push(e.to_string()),
            }
        }

        let result = EvaluationResult {
            hooks_evaluated,
            hooks_triggered,
            workflows_executed,
            workflows_successful,
            predicates,
            executions,
            infrastructure_failures,
            metadata: json!({
                "executionId": run_id,
                "graphDir": self.config.graph_dir.display().to_string(),
                "filesLoaded": files_loaded,
                "triples": triples,
                "previousSnapshot": previous.is_some(),
                "malformedHooks": report
                    .failures
                    .iter()
                    .map(|f| json!({"hook": f.subject, "message": f.message}))
                    .collect::<Vec<_>>(),
                "startedAt": run_started.to_rfc3339(),
                "finishedAt": Utc::now().to_rfc3339(),
            }),
        };

        // 7. The aggregate evaluation receipt is written last
        let path = self
            .config
            .state_dir
            .join("evaluations")
            .join(format!("{}.json", run_id));
        if let Err(e) = serde_json::to_vec_pretty(&result)
            .map_err(EngineError::from)
            .and_then(|bytes| durable_write(&path, &bytes))
        {
            tracing::error!(error = %e, "failed to write evaluation receipt");
        }

        tracing::info!(
            hooks_evaluated,
            hooks_triggered,
            workflows_executed,
            workflows_successful,
            "evaluation finished"
        );
        Ok(result)
    }

    /// Parse and return every hook currently in the graph directory
    pub fn list_hooks(&self) -> EngineResult<Vec<Hook>> {
        let graph = GraphStore::new()?;
        graph.load_dir(&self.config.graph_dir)?;
        Ok(HookParser::new(&graph).parse_all()?.hooks)
    }

    /// Parse one hook by IRI, reporting exactly what is wrong with it
    pub fn validate_hook(&self, id: &str) -> EngineResult<Hook> {
        let graph = GraphStore::new()?;
        graph.load_dir(&self.config.graph_dir)?;
        HookParser::new(&graph).parse_hook(id)
    }
}

/// Execute one triggered hook under its named lock
async fn execute_hook(
    env: JobEnv,
    hook: Hook,
    predicate_context: serde_json::Value,
) -> EngineResult<Receipt> {
    let execution_id = new_execution_id();
    let lock_name = format!("hook-execution-{}", sanitise_id(&hook.id));

    tracing::info!(hook_id = %hook.id, execution_id = %execution_id, "executing hook");

    if !env
        .locks
        .acquire(&lock_name, env.config.lock_timeout_ms, true)
        .await
    {
        let err = EngineError::LockUnavailable(lock_name);
        let now = Utc::now();
        let receipt = Receipt {
            hook_id: hook.id.clone(),
            execution_id: execution_id.clone(),
            started_at: now,
            finished_at: now,
            duration_ms: 0,
            success: false,
            step_results: vec![],
            error: Some(ErrorInfo::from(&err)),
            receipt_hash: String::new(),
        }
        .seal()?;
        finalise(&env, &receipt)?;
        return Ok(receipt);
    }

    // The execution window opens only once the lock is held
    let started_at = Utc::now();
    let clock = std::time::Instant::now();
    let (step_results, error) = run_pipelines(&env, &hook, predicate_context).await;
    let receipt = Receipt {
        hook_id: hook.id.clone(),
        execution_id: execution_id.clone(),
        started_at,
        finished_at: Utc::now(),
        duration_ms: clock.elapsed().as_millis() as u64,
        success: error.is_none(),
        step_results,
        error,
        receipt_hash: String::new(),
    }
    .seal();

    // The receipt is made durable before the lock is released, so lock
    // exclusion covers the whole execution window
    let persisted = receipt.and_then(|receipt| {
        finalise(&env, &receipt)?;
        Ok(receipt)
    });
    env.locks.release(&lock_name);
    persisted
}

/// Drive every pipeline of the hook in declared order; the first failure
/// aborts the rest
async fn run_pipelines(
    env: &JobEnv,
    hook: &Hook,
    predicate_context: serde_json::Value,
) -> (Vec<StepResult>, Option<ErrorInfo>) {
    let mut ctx = ExecutionContext::new(Utc::now(), predicate_context);
    let mut runner = StepRunner::new(env.graph.clone(), &env.config);
    let mut step_results = Vec::new();

    for pipeline in &hook.pipelines {
        let plan = match ExecutionPlan::from_steps(&pipeline.steps) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(hook_id = %hook.id, pipeline = %pipeline.id, error = %e, "pipeline plan rejected");
                return (step_results, Some(ErrorInfo::from(&e)));
            }
        };
        for step in &plan.steps {
            if env.shutdown.load(Ordering::SeqCst) {
                step_results.push(StepResult::cancelled(step));
                let err = EngineError::StepFailure {
                    step: step.id.clone(),
                    message: "execution cancelled by shutdown".to_string(),
                };
                return (step_results, Some(ErrorInfo::from(&err)));
            }
            let result = runner.run(step, &mut ctx).await;
            let failed = !result.success;
            let error = result.error.clone();
            step_results.push(result);
            if failed {
                return (step_results, error);
            }
        }
    }
    (step_results, None)
}

/// Receipt, metric record, execution snapshot, and audit commit for one
/// finished execution
fn finalise(env: &JobEnv, receipt: &Receipt) -> EngineResult<()> {
    env.receipts.write(receipt)?;
    env.metrics.append(&MetricRecord {
        hook_id: receipt.hook_id.clone(),
        execution_id: receipt.execution_id.clone(),
        duration_ms: receipt.duration_ms,
        steps_executed: receipt.step_results.len(),
        success: receipt.success,
        error: receipt.error.as_ref().map(|e| e.message.clone()),
        timestamp: Utc::now(),
    })?;
    env.snapshots.store(
        &receipt.execution_id,
        &receipt.hook_id,
        json!({
            "success": receipt.success,
            "steps": receipt.step_results.len(),
            "receiptHash": receipt.receipt_hash,
        }),
    )?;
    if let Some(audit) = &env.audit {
        if let Err(e) = audit
            .lock()
            .append(&receipt.execution_id, &receipt.receipt_hash)
        {
            tracing::warn!(error = %e, "audit commit failed");
        }
    }
    Ok(())
}

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// `exec_<epoch-ms>_<9-char-base36>`
pub fn new_execution_id() -> String {
    let suffix: String = (0..9)
        .map(|_| BASE36[fastrand::usize(..BASE36.len())] as char)
        .collect();
    format!("exec_{}_{}", Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn test_execution_id_shape() {
        let id = new_execution_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "exec");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_execution_ids_are_unique() {
        let a = new_execution_id();
        let b = new_execution_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_exit_codes() {
        let mut result = EvaluationResult {
            hooks_evaluated: 2,
            hooks_triggered: 1,
            workflows_executed: 1,
            workflows_successful: 1,
            predicates: vec![],
            executions: vec![],
            infrastructure_failures: vec![],
            metadata: json!({}),
        };
        assert_eq!(result.exit_code(), 0);

        result.workflows_successful = 0;
        assert_eq!(result.exit_code(), 1);

        result.infrastructure_failures.push("lock".to_string());
        assert_eq!(result.exit_code(), 2);
    }
}
