//! Git-native I/O: named locks, bounded worker pool, durable receipt,
//! metric, and snapshot logs, plus the optional git audit trail.

pub mod locks;
pub mod pool;
pub mod receipts;

pub use locks::LockManager;
pub use pool::{Priority, WorkerPool};
pub use receipts::{
    GitAuditLog, MetricRecord, MetricsLog, Receipt, ReceiptStore, SnapshotRecord, SnapshotStore,
};

/// Reduce an arbitrary identifier (usually a hook IRI) to a filesystem and
/// lock-safe name
pub fn sanitise_id(id: &str) -> String {
    let mut out: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    while out.contains("--") {
        out = out.replace("--", "-");
    }
    out.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn test_sanitise_collapses_separators() {
        assert_eq!(
            sanitise_id("http://example.org/hooks#item-watch"),
            "http-example-org-hooks-item-watch"
        );
        assert_eq!(sanitise_id("plain_name-1"), "plain_name-1");
    }

    #[test]
    fn test_sanitise_is_stable() {
        let id = "https://knowhook.dev/hooks/report";
        assert_eq!(sanitise_id(id), sanitise_id(id));
    }
}
