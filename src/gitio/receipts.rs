//! Durable receipts, metrics, and snapshots
//!
//! Every write is crash-safe: records land in a temp file, are fsynced, and
//! renamed into place, so a reader sees either the whole record or nothing.
//! Receipts carry a SHA-256 hash over their canonical JSON; when an audit
//! repository is configured the hash is also committed there, one commit per
//! receipt.

use crate::error::{EngineError, EngineResult};
use crate::gitio::sanitise_id;
use crate::steps::{ErrorInfo, StepResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Durable record of one hook execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub hook_id: String,
    pub execution_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    pub step_results: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// SHA-256 over the canonical JSON of this record minus the hash itself
    #[serde(default)]
    pub receipt_hash: String,
}

impl Receipt {
    /// Compute and set the receipt hash
    pub fn seal(mut self) -> EngineResult<Self> {
        self.receipt_hash = String::new();
        let canonical = serde_json::to_vec(&self)?;
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        self.receipt_hash = hex::encode(hasher.finalize());
        Ok(self)
    }

    /// Verify the stored hash against the record contents
    pub fn verify(&self) -> EngineResult<bool> {
        let sealed = self.clone().seal()?;
        Ok(sealed.receipt_hash == self.receipt_hash)
    }
}

/// Metric record appended for every execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    pub hook_id: String,
    pub execution_id: String,
    pub duration_ms: u64,
    pub steps_executed: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Stored snapshot; the payload is opaque to the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord {
    pub id: String,
    pub hook_id: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Write bytes crash-safely: temp file, fsync, rename
pub(crate) fn durable_write(path: &Path, bytes: &[u8]) -> EngineResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| EngineError::IoFailure(format!("no parent for {}", path.display())))?;
    std::fs::create_dir_all(parent)?;
    // Unique temp name so concurrent writers of one target cannot collide
    let tmp = path.with_extension(format!("tmp-{}", fastrand::u64(..)));
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Append-only receipt store, one file per execution keyed by hook id
pub struct ReceiptStore {
    dir: PathBuf,
}

impl ReceiptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Persist a sealed receipt; returns its path
    pub fn write(&self, receipt: &Receipt) -> EngineResult<PathBuf> {
        let path = self
            .dir
            .join(sanitise_id(&receipt.hook_id))
            .join(format!("{}.json", receipt.execution_id));
        durable_write(&path, &serde_json::to_vec_pretty(receipt)?)?;
        tracing::debug!(hook_id = %receipt.hook_id, execution_id = %receipt.execution_id, "receipt written");
        Ok(path)
    }

    /// All receipts for one hook, ordered by execution id
    pub fn load_for_hook(&self, hook_id: &str) -> EngineResult<Vec<Receipt>> {
        let dir = self.dir.join(sanitise_id(hook_id));
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();
        paths.sort();
        let mut receipts = Vec::new();
        for path in paths {
            let content = std::fs::read(&path)?;
            receipts.push(serde_json::from_slice(&content)?);
        }
        Ok(receipts)
    }
}

/// Single rolling metrics log, JSON lines
pub struct MetricsLog {
    path: PathBuf,
    guard: parking_lot::Mutex<()>,
}

impl MetricsLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: parking_lot::Mutex::new(()),
        }
    }

    /// Append one record; internally serialised
    pub fn append(&self, record: &MetricRecord) -> EngineResult<()> {
        let _guard = self.guard.lock();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        file.write_all(&line)?;
        file.sync_all()?;
        Ok(())
    }

    /// Read back every record in append order
    pub fn read_all(&self) -> EngineResult<Vec<MetricRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let mut records = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            records.push(serde_json::from_str(line)?);
        }
        Ok(records)
    }
}

/// Durable snapshot store
pub struct SnapshotStore {
    dir: PathBuf,
}

/// Snapshot id under which the engine persists the graph state between runs
pub const GRAPH_STATE_SNAPSHOT: &str = "graph-state";

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn store(
        &self,
        id: &str,
        hook_id: &str,
        payload: serde_json::Value,
    ) -> EngineResult<SnapshotRecord> {
        let record = SnapshotRecord {
            id: id.to_string(),
            hook_id: hook_id.to_string(),
            timestamp: Utc::now(),
            payload,
        };
        let path = self.dir.join(format!("{}.json", sanitise_id(id)));
        durable_write(&path, &serde_json::to_vec_pretty(&record)?)?;
        Ok(record)
    }

    pub fn load(&self, id: &str) -> EngineResult<Option<SnapshotRecord>> {
        let path = self.dir.join(format!("{}.json", sanitise_id(id)));
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&content)?))
    }

    /// Persist the graph state consumed by the next run's delta predicates
    pub fn store_graph_state(&self, ntriples: &str) -> EngineResult<()> {
        self.store(
            GRAPH_STATE_SNAPSHOT,
            "engine",
            serde_json::Value::String(ntriples.to_string()),
        )?;
        Ok(())
    }

    /// Load the previous run's graph state, if any
    pub fn load_graph_state(&self) -> EngineResult<Option<String>> {
        Ok(self
            .load(GRAPH_STATE_SNAPSHOT)?
            .and_then(|record| match record.payload {
                serde_json::Value::String(text) => Some(text),
                _ => None,
            }))
    }
}

/// Append-only git repository holding one commit per receipt hash
pub struct GitAuditLog {
    repo: git2::Repository,
}

impl GitAuditLog {
    /// Open or initialise the audit repository
    pub fn open(path: &Path) -> EngineResult<Self> {
        let repo = if path.join(".git").exists() || path.join("HEAD").exists() {
            git2::Repository::open(path)
                .map_err(|e| EngineError::IoFailure(format!("cannot open audit repo: {}", e)))?
        } else {
            git2::Repository::init(path)
                .map_err(|e| EngineError::IoFailure(format!("cannot init audit repo: {}", e)))?
        };
        Ok(Self { repo })
    }

    /// Commit one receipt hash under `receipts/<execution-id>.txt`
    pub fn append(&self, execution_id: &str, receipt_hash: &str) -> EngineResult<git2::Oid> {
        let git_err = |e: git2::Error| EngineError::IoFailure(format!("audit repo: {}", e));

        let content = format!("execution: {}\nhash: {}\n", execution_id, receipt_hash);
        let blob = self.repo.blob(content.as_bytes()).map_err(git_err)?;

        let mut index = self.repo.index().map_err(git_err)?;
        let now_secs = Utc::now().timestamp() as i32;
        index
            .add_frombuffer(
                &git2::IndexEntry {
                    ctime: git2::IndexTime::new(now_secs, 0),
                    mtime: git2::IndexTime::new(now_secs, 0),
                    dev: 0,
                    ino: 0,
                    mode: 0o100644,
                    uid: 0,
                    gid: 0,
                    file_size: content.len() as u32,
                    id: blob,
                    flags: 0,
                    flags_extended: 0,
                    path: format!("receipts/{}.txt", execution_id).into_bytes(),
                },
                content.as_bytes(),
            )
            .map_err(git_err)?;
        index.write().map_err(git_err)?;

        let tree_id = index.write_tree().map_err(git_err)?;
        let tree = self.repo.find_tree(tree_id).map_err(git_err)?;
        let signature = git2::Signature::now("knowhook", "audit@knowhook.dev").map_err(git_err)?;

        let parent = self
            .repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        let message = format!("Receipt {}", execution_id);
        self.repo
            .commit(Some("HEAD"), &signature, &signature, &message, &tree, &parents)
            .map_err(git_err)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde_json::json;

    fn receipt(hook: &str, execution: &str, success: bool) -> Receipt {
        Receipt {
            hook_id: hook.to_string(),
            execution_id: execution.to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            duration_ms: 12,
            success,
            step_results: vec![],
            error: None,
            receipt_hash: String::new(),
        }
        .seal()
        .expect("seal")
    }

    #[test]
    fn test_receipt_seal_and_verify() {
        let sealed = receipt("http://example.org/h", "exec_1_aaaaaaaaa", true);
        assert_eq!(sealed.receipt_hash.len(), 64);
        assert!(sealed.verify().expect("verify"));

        let mut tampered = sealed.clone();
        tampered.success = false;
        assert!(!tampered.verify().expect("verify"));
    }

    #[test]
    fn test_receipt_store_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ReceiptStore::new(dir.path());

        store
            .write(&receipt("http://example.org/h", "exec_1_aaaaaaaaa", true))
            .expect("write");
        store
            .write(&receipt("http://example.org/h", "exec_2_bbbbbbbbb", false))
            .expect("write");

        let receipts = store.load_for_hook("http://example.org/h").expect("load");
        assert_eq!(receipts.len(), 2);
        assert_eq!(receipts[0].execution_id, "exec_1_aaaaaaaaa");
        assert!(receipts.iter().all(|r| r.verify().expect("verify")));

        assert!(store
            .load_for_hook("http://example.org/other")
            .expect("load")
            .is_empty());
    }

    #[test]
    fn test_metrics_append_and_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = MetricsLog::new(dir.path().join("metrics.jsonl"));
        for i in 0..3 {
            log.append(&MetricRecord {
                hook_id: "h".to_string(),
                execution_id: format!("exec_{}_ccccccccc", i),
                duration_ms: i,
                steps_executed: 1,
                success: true,
                error: None,
                timestamp: Utc::now(),
            })
            .expect("append");
        }
        let records = log.read_all().expect("read");
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].duration_ms, 2);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        store
            .store("snap-1", "http://example.org/h", json!({"rows": 4}))
            .expect("store");
        let loaded = store.load("snap-1").expect("load").expect("present");
        assert_eq!(loaded.payload, json!({"rows": 4}));
        assert!(store.load("snap-2").expect("load").is_none());
    }

    #[test]
    fn test_graph_state_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        assert!(store.load_graph_state().expect("load").is_none());
        store
            .store_graph_state("<http://a> <http://b> <http://c> .\n")
            .expect("store");
        assert_eq!(
            store.load_graph_state().expect("load").expect("present"),
            "<http://a> <http://b> <http://c> .\n"
        );
    }

    #[test]
    fn test_git_audit_appends_commits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let audit = GitAuditLog::open(dir.path()).expect("open");
        let first = audit.append("exec_1_aaaaaaaaa", "00ff").expect("commit");
        let second = audit.append("exec_2_bbbbbbbbb", "11ee").expect("commit");
        assert_ne!(first, second);

        // Second commit must descend from the first
        let repo = git2::Repository::open(dir.path()).expect("reopen");
        let head = repo.head().expect("head").peel_to_commit().expect("commit");
        assert_eq!(head.id(), second);
        assert_eq!(head.parent(0).expect("parent").id(), first);
    }
}
