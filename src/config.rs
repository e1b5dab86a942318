//! Engine configuration
//!
//! Loading hierarchy: env > file > defaults, matching the rest of the
//! platform's configuration crates.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default per-step CLI timeout (ms)
pub const DEFAULT_CLI_TIMEOUT_MS: u64 = 60_000;
/// Default orchestrator-wide timeout (ms)
pub const DEFAULT_ORCHESTRATOR_TIMEOUT_MS: u64 = 300_000;
/// Default cap on captured CLI output (bytes)
pub const DEFAULT_MAX_BUFFER: usize = 1024 * 1024;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding the RDF hook definitions
    pub graph_dir: PathBuf,
    /// Root directory for receipts, metrics, and snapshots
    pub state_dir: PathBuf,
    /// Optional append-only git repository for the receipt audit trail
    pub audit_repo: Option<PathBuf>,
    /// Worker pool width; 0 means "number of cores"
    pub max_workers: usize,
    /// Orchestrator-wide timeout applied to every step (ms)
    pub timeout_ms: u64,
    /// Max bytes of stdout/stderr captured per CLI step
    pub max_buffer: usize,
    /// Lock acquisition timeout (ms)
    pub lock_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            graph_dir: PathBuf::from("hooks"),
            state_dir: PathBuf::from(".knowhook"),
            audit_repo: None,
            max_workers: 0,
            timeout_ms: DEFAULT_ORCHESTRATOR_TIMEOUT_MS,
            max_buffer: DEFAULT_MAX_BUFFER,
            lock_timeout_ms: 30_000,
        }
    }
}

impl EngineConfig {
    /// Load configuration: optional TOML file, then environment overrides,
    /// then validation
    pub fn load(file: Option<&Path>) -> EngineResult<Self> {
        let mut config = match file {
            Some(path) if path.exists() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| EngineError::Config(format!("cannot parse {}: {}", path.display(), e)))
    }

    /// Apply `ENGINE_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> EngineResult<()> {
        if let Ok(dir) = std::env::var("ENGINE_GRAPH_DIR") {
            self.graph_dir = PathBuf::from(dir);
        }
        if let Ok(value) = std::env::var("ENGINE_MAX_BUFFER") {
            self.max_buffer = value
                .parse()
                .map_err(|_| EngineError::Config(format!("invalid ENGINE_MAX_BUFFER: {}", value)))?;
        }
        if let Ok(value) = std::env::var("ENGINE_TIMEOUT_MS") {
            self.timeout_ms = value
                .parse()
                .map_err(|_| EngineError::Config(format!("invalid ENGINE_TIMEOUT_MS: {}", value)))?;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> EngineResult<()> {
        if self.timeout_ms == 0 {
            return Err(EngineError::Config("timeout_ms must be positive".into()));
        }
        if self.max_buffer == 0 {
            return Err(EngineError::Config("max_buffer must be positive".into()));
        }
        Ok(())
    }

    /// Effective worker pool width
    pub fn workers(&self) -> usize {
        if self.max_workers == 0 {
            num_cpus::get()
        } else {
            self.max_workers
        }
    }

    /// Receipts directory
    pub fn receipts_dir(&self) -> PathBuf {
        self.state_dir.join("receipts")
    }

    /// Metrics log file
    pub fn metrics_path(&self) -> PathBuf {
        self.state_dir.join("metrics.jsonl")
    }

    /// Snapshots directory
    pub fn snapshots_dir(&self) -> PathBuf {
        self.state_dir.join("snapshots")
    }
}
