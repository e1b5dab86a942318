//! Step execution
//!
//! One handler per step kind; the kind decision was made at parse time.
//! Every handler returns a JSON result value; failures become structured
//! step errors, never panics. A step runs under its effective timeout,
//! `min(step timeout, orchestrator timeout)`.

use crate::config::{EngineConfig, DEFAULT_CLI_TIMEOUT_MS};
use crate::context::ExecutionContext;
use crate::error::{EngineError, EngineResult};
use crate::graph::{GraphStore, QueryOutcome, Row};
use crate::hook::{FileOperation, Step, StepKind};
use crate::template::TemplateEngine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Step lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    /// Reachable only while the orchestrator is shutting down
    Cancelled,
}

/// Structured error recorded on a failed step or receipt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: String,
    pub message: String,
}

impl From<&EngineError> for ErrorInfo {
    fn from(err: &EngineError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one step execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub id: String,
    pub kind: String,
    pub state: StepState,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl StepResult {
    /// Result for a step skipped by a shutdown, before or while running
    pub fn cancelled(step: &Step) -> Self {
        let now = Utc::now();
        Self {
            id: step.id.clone(),
            kind: step.kind.name().to_string(),
            state: StepState::Cancelled,
            success: false,
            data: None,
            error: Some(ErrorInfo {
                kind: "StepFailure".to_string(),
                message: "cancelled by shutdown".to_string(),
            }),
            started_at: now,
            finished_at: now,
            duration_ms: 0,
        }
    }
}

/// Executes steps against the current graph and execution context
pub struct StepRunner {
    graph: Arc<GraphStore>,
    templates: TemplateEngine,
    http: reqwest::Client,
    max_buffer: usize,
    orchestrator_timeout_ms: u64,
}

impl StepRunner {
    pub fn new(graph: Arc<GraphStore>, config: &EngineConfig) -> Self {
        Self {
            graph,
            templates: TemplateEngine::new(),
            http: reqwest::Client::new(),
            max_buffer: config.max_buffer,
            orchestrator_timeout_ms: config.timeout_ms,
        }
    }

    /// Run one step: execute under the effective timeout, then apply the
    /// step's output mapping and append to the context outputs on success
    pub async fn run(&mut self, step: &Step, ctx: &mut ExecutionContext) -> StepResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let timeout_ms = self.effective_timeout(step);

        tracing::debug!(step = %step.id, kind = step.kind.name(), timeout_ms, "running step");

        let outcome = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.execute(step, ctx),
        )
        .await;

        let finished_at = Utc::now();
        let duration_ms = clock.elapsed().as_millis() as u64;
        match outcome {
            Err(_) => {
                let err = EngineError::StepTimeout {
                    step: step.id.clone(),
                    timeout_ms,
                };
                tracing::warn!(step = %step.id, timeout_ms, "step timed out");
                StepResult {
                    id: step.id.clone(),
                    kind: step.kind.name().to_string(),
                    state: StepState::TimedOut,
                    success: false,
                    data: None,
                    error: Some(ErrorInfo::from(&err)),
                    started_at,
                    finished_at,
                    duration_ms,
                }
            }
            Ok(Ok(data)) => {
                if let Some(mapping) = &step.output_mapping {
                    ctx.apply_mapping(&data, mapping);
                }
                ctx.push_output(json!({ "step": step.id, "data": data.clone() }));
                StepResult {
                    id: step.id.clone(),
                    kind: step.kind.name().to_string(),
                    state: StepState::Succeeded,
                    success: true,
                    data: Some(data),
                    error: None,
                    started_at,
                    finished_at,
                    duration_ms,
                }
            }
            Ok(Err(err)) => {
                tracing::warn!(step = %step.id, error = %err, "step failed");
                StepResult {
                    id: step.id.clone(),
                    kind: step.kind.name().to_string(),
                    state: StepState::Failed,
                    success: false,
                    data: None,
                    error: Some(ErrorInfo::from(&err)),
                    started_at,
                    finished_at,
                    duration_ms,
                }
            }
        }
    }

    fn effective_timeout(&self, step: &Step) -> u64 {
        let step_timeout = match &step.kind {
            StepKind::Cli { timeout_ms, .. } => timeout_ms.unwrap_or(DEFAULT_CLI_TIMEOUT_MS),
            _ => self.orchestrator_timeout_ms,
        };
        step_timeout.min(self.orchestrator_timeout_ms)
    }

    async fn execute(&mut self, step: &Step, ctx: &ExecutionContext) -> EngineResult<Value> {
        match &step.kind {
            StepKind::Sparql { query } => self.run_sparql(step, query),
            StepKind::Template {
                body,
                body_path,
                output_path,
            } => {
                self.run_template(step, body.as_deref(), body_path.as_deref(), output_path.as_deref(), ctx)
                    .await
            }
            StepKind::File {
                path,
                operation,
                content,
            } => self.run_file(step, path, *operation, content.as_deref()).await,
            StepKind::Cli { command, .. } => self.run_cli(step, command).await,
            StepKind::Http {
                url,
                method,
                headers,
                body,
            } => self.run_http(step, url, method, headers.as_ref(), body.as_deref()).await,
            StepKind::Output {
                body,
                template_path,
                output_path,
                format,
            } => {
                self.run_output(
                    step,
                    body.as_deref(),
                    template_path.as_deref(),
                    output_path,
                    *format,
                    ctx,
                )
                .await
            }
        }
    }

    fn run_sparql(&self, step: &Step, query: &str) -> EngineResult<Value> {
        let outcome = self.graph.query(query).map_err(|e| EngineError::StepFailure {
            step: step.id.clone(),
            message: e.to_string(),
        })?;
        let rows = match outcome {
            QueryOutcome::Solutions(rows) => rows,
            _ => {
                return Err(EngineError::StepFailure {
                    step: step.id.clone(),
                    message: "sparql step requires a SELECT query".to_string(),
                })
            }
        };
        Ok(json!({
            "results": rows_to_json(&rows),
            "count": rows.len(),
        }))
    }

    async fn run_template(
        &mut self,
        step: &Step,
        body: Option<&str>,
        body_path: Option<&str>,
        output_path: Option<&str>,
        ctx: &ExecutionContext,
    ) -> EngineResult<Value> {
        let source = match (body, body_path) {
            (Some(inline), _) => inline.to_string(),
            (None, Some(path)) => tokio::fs::read_to_string(path).await.map_err(|e| {
                EngineError::StepFailure {
                    step: step.id.clone(),
                    message: format!("cannot read template {}: {}", path, e),
                }
            })?,
            (None, None) => {
                return Err(EngineError::StepFailure {
                    step: step.id.clone(),
                    message: "template step has no body".to_string(),
                })
            }
        };
        let rendered = self.render(step, &source, ctx)?;
        let mut result = json!({ "text": rendered });
        if let Some(path) = output_path {
            let bytes = rendered.len();
            write_with_parents(path, rendered.as_bytes()).await.map_err(|e| {
                EngineError::StepFailure {
                    step: step.id.clone(),
                    message: e.to_string(),
                }
            })?;
            result["outputPath"] = json!(path);
            result["bytes"] = json!(bytes);
        }
        Ok(result)
    }

    async fn run_file(
        &self,
        step: &Step,
        path: &str,
        operation: FileOperation,
        content: Option<&str>,
    ) -> EngineResult<Value> {
        let fail = |message: String| EngineError::StepFailure {
            step: step.id.clone(),
            message,
        };
        let content = content.unwrap_or("");
        match operation {
            FileOperation::Create => {
                if tokio::fs::try_exists(path).await.unwrap_or(false) {
                    return Err(fail(format!("create target already exists: {}", path)));
                }
                write_with_parents(path, content.as_bytes())
                    .await
                    .map_err(|e| fail(e.to_string()))?;
            }
            FileOperation::Write => {
                write_with_parents(path, content.as_bytes())
                    .await
                    .map_err(|e| fail(e.to_string()))?;
            }
            FileOperation::Append => {
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent)
                            .await
                            .map_err(|e| fail(e.to_string()))?;
                    }
                }
                use tokio::io::AsyncWriteExt;
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await
                    .map_err(|e| fail(e.to_string()))?;
                file.write_all(content.as_bytes())
                    .await
                    .map_err(|e| fail(e.to_string()))?;
            }
            FileOperation::Delete => match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(fail(e.to_string())),
            },
        }
        Ok(json!({ "path": path, "operation": operation }))
    }

    async fn run_cli(&self, step: &Step, command: &str) -> EngineResult<Value> {
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| EngineError::StepFailure {
                step: step.id.clone(),
                message: format!("failed to spawn command: {}", e),
            })?;

        let stdout = truncate_buffer(&output.stdout, self.max_buffer);
        let stderr = truncate_buffer(&output.stderr, self.max_buffer);
        let exit_code = output.status.code().unwrap_or(-1);
        if !output.status.success() {
            return Err(EngineError::StepFailure {
                step: step.id.clone(),
                message: format!(
                    "command exited with code {}: {}",
                    exit_code,
                    stderr.trim()
                ),
            });
        }
        Ok(json!({
            "stdout": stdout,
            "stderr": stderr,
            "exitCode": exit_code,
        }))
    }

    async fn run_http(
        &self,
        step: &Step,
        url: &str,
        method: &str,
        headers: Option<&std::collections::BTreeMap<String, String>>,
        body: Option<&str>,
    ) -> EngineResult<Value> {
        let fail = |message: String| EngineError::StepFailure {
            step: step.id.clone(),
            message,
        };
        let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
            .map_err(|_| fail(format!("invalid HTTP method: {}", method)))?;
        let mut request = self.http.request(method, url);
        if let Some(headers) = headers {
            for (name, value) in headers {
                request = request.header(name, value);
            }
        }
        if let Some(body) = body {
            request = request.body(body.to_string());
        }
        let response = request
            .send()
            .await
            .map_err(|e| fail(format!("request failed: {}", e)))?;

        let status = response.status().as_u16();
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("json"))
            .unwrap_or(false);
        let text = response
            .text()
            .await
            .map_err(|e| fail(format!("cannot read response body: {}", e)))?;
        let parsed: Value = if is_json {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        } else {
            Value::String(text)
        };

        if status >= 400 {
            return Err(fail(format!("HTTP failure: status {}", status)));
        }
        Ok(json!({ "status": status, "body": parsed }))
    }

    async fn run_output(
        &mut self,
        step: &Step,
        body: Option<&str>,
        template_path: Option<&str>,
        output_path: &str,
        format: crate::hook::OutputFormat,
        ctx: &ExecutionContext,
    ) -> EngineResult<Value> {
        let source = match (body, template_path) {
            (Some(inline), _) => inline.to_string(),
            (None, Some(path)) => tokio::fs::read_to_string(path).await.map_err(|e| {
                EngineError::StepFailure {
                    step: step.id.clone(),
                    message: format!("cannot read template {}: {}", path, e),
                }
            })?,
            (None, None) => {
                return Err(EngineError::StepFailure {
                    step: step.id.clone(),
                    message: "output step has no template".to_string(),
                })
            }
        };
        let rendered = self.render(step, &source, ctx)?;
        let resolved = format.resolve(Path::new(output_path));
        let bytes = rendered.len();
        write_with_parents(output_path, rendered.as_bytes())
            .await
            .map_err(|e| EngineError::StepFailure {
                step: step.id.clone(),
                message: e.to_string(),
            })?;
        Ok(json!({
            "outputPath": output_path,
            "format": resolved.as_str(),
            "bytes": bytes,
        }))
    }

    fn render(
        &mut self,
        step: &Step,
        source: &str,
        ctx: &ExecutionContext,
    ) -> EngineResult<String> {
        self.templates.render(source, ctx.vars()).map_err(|failure| {
            if failure.impure {
                EngineError::TemplateImpurity {
                    step: step.id.clone(),
                    message: failure.message,
                }
            } else {
                EngineError::StepFailure {
                    step: step.id.clone(),
                    message: failure.message,
                }
            }
        })
    }
}

/// Bindings rows as JSON objects, `var → lexical`
fn rows_to_json(rows: &[Row]) -> Value {
    Value::Array(
        rows.iter()
            .map(|row| {
                Value::Object(
                    row.iter()
                        .map(|(var, term)| (var.clone(), Value::String(term.lexical.clone())))
                        .collect(),
                )
            })
            .collect(),
    )
}

fn truncate_buffer(bytes: &[u8], max: usize) -> String {
    let slice = if bytes.len() > max { &bytes[..max] } else { bytes };
    String::from_utf8_lossy(slice).to_string()
}

async fn write_with_parents(path: &str, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, content).await
}
