//! File-backed status persistence.
//!
//! Saves are write-to-temp, fsync, rename so a crash mid-write never leaves
//! a torn status file behind. No cross-process locking: one registry, one
//! process, one file.

use super::{StatusStore, SyncStatus};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct FileStatusStore {
    path: PathBuf,
}

impl FileStatusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_status(path: &Path) -> Result<Option<SyncStatus>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let status = serde_json::from_str(&content)
            .map_err(|e| Error::StorageFailed(format!("corrupt status file: {}", e)))?;
        Ok(Some(status))
    }

    fn write_atomic(path: &Path, status: &SyncStatus) -> Result<()> {
        let tmp = path.with_extension("tmp");
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(&serde_json::to_vec_pretty(status)?)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[async_trait]
impl StatusStore for FileStatusStore {
    async fn load(&self, registry: &str) -> Result<SyncStatus> {
        let mut status = match Self::read_status(&self.path)? {
            Some(status) => status,
            None => {
                tracing::info!(registry, path = %self.path.display(), "no prior sync status");
                return Ok(SyncStatus::initial());
            }
        };

        if status.recover_interrupted() {
            tracing::warn!(registry, "previous sync was interrupted, marking failed");
            self.save(registry, &status).await?;
        }

        Ok(status)
    }

    async fn save(&self, _registry: &str, status: &SyncStatus) -> Result<()> {
        Self::write_atomic(&self.path, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{SyncPhase, INTERRUPTED_MESSAGE, NO_STATUS_MESSAGE};

    #[tokio::test]
    async fn load_without_file_returns_initial() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStatusStore::new(dir.path().join("status.json"));

        let status = store.load("test").await.unwrap();
        assert_eq!(status.phase, SyncPhase::Failed);
        assert_eq!(status.message, NO_STATUS_MESSAGE);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStatusStore::new(dir.path().join("status.json"));

        let status = SyncStatus {
            phase: SyncPhase::Complete,
            message: "Sync completed successfully".to_string(),
            last_sync_hash: "abc123".to_string(),
            server_count: 7,
            ..SyncStatus::initial()
        };
        store.save("test", &status).await.unwrap();

        let loaded = store.load("test").await.unwrap();
        assert_eq!(loaded, status);
    }

    #[tokio::test]
    async fn interrupted_sync_is_rewritten_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let store = FileStatusStore::new(path.clone());

        let status = SyncStatus {
            phase: SyncPhase::Syncing,
            message: "Sync in progress".to_string(),
            attempt_count: 3,
            ..SyncStatus::initial()
        };
        store.save("test", &status).await.unwrap();

        let loaded = store.load("test").await.unwrap();
        assert_eq!(loaded.phase, SyncPhase::Failed);
        assert_eq!(loaded.message, INTERRUPTED_MESSAGE);
        // the rewrite must be durable, not just in-memory
        let on_disk: SyncStatus =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.phase, SyncPhase::Failed);
    }

    #[tokio::test]
    async fn save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let store = FileStatusStore::new(path.clone());

        store.save("test", &SyncStatus::initial()).await.unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }
}
