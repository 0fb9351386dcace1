//! Best-effort JSON state snapshots
//!
//! The controller records a snapshot of its registry after every connect,
//! register, and disconnect. Snapshots are a write-only audit trail: they
//! are never read back, and a failed write must not abort the operation
//! that triggered it.

use std::path::PathBuf;
use std::sync::Arc;

/// Write-only JSON snapshot store
#[derive(Debug)]
pub struct SnapshotStore {
    /// Snapshot directory; `None` disables the store entirely
    dir: Option<PathBuf>,
}

impl SnapshotStore {
    /// Create a store rooted at the given directory
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// A store that drops every snapshot
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    /// Whether snapshots are being written at all
    pub fn enabled(&self) -> bool {
        self.dir.is_some()
    }

    /// Write a snapshot under the given key (e.g. `controllers/<id>`).
    ///
    /// Failures are logged at warn level and swallowed.
    pub async fn record(&self, key: &str, value: serde_json::Value) {
        let Some(dir) = &self.dir else {
            return;
        };

        let path = dir.join(format!("{}.json", key));

        let result: std::io::Result<()> = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let body = serde_json::to_vec_pretty(&value)?;
            tokio::fs::write(&path, body).await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!("Failed to write snapshot {:?}: {}", path, e);
        }
    }

    /// Fire-and-forget variant for callers that must not await the write
    pub fn record_detached(self: &Arc<Self>, key: String, value: serde_json::Value) {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            store.record(&key, value).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_record_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(Some(dir.path().to_path_buf()));

        store
            .record("controllers/abc", json!({ "agents": ["a1"] }))
            .await;

        let body = tokio::fs::read_to_string(dir.path().join("controllers/abc.json"))
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["agents"][0], "a1");
    }

    #[tokio::test]
    async fn test_disabled_store_is_a_noop() {
        let store = SnapshotStore::disabled();
        assert!(!store.enabled());
        // Must not panic or create anything
        store.record("controllers/abc", json!({})).await;
    }

    #[tokio::test]
    async fn test_record_failure_is_swallowed() {
        // A file where the directory should be makes create_dir_all fail
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("controllers");
        tokio::fs::write(&blocker, b"in the way").await.unwrap();

        let store = SnapshotStore::new(Some(dir.path().to_path_buf()));
        store.record("controllers/abc", json!({})).await;
    }
}
