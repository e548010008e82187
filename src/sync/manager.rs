//! Sync manager: decides whether a sync is warranted and orchestrates a
//! single attempt (fetch, filter, store).

use crate::config::Config;
use crate::error::{SyncCause, SyncCondition, SyncFailure};
use crate::filter;
use crate::sources::SourceHandlerFactory;
use crate::status::{SyncPhase, SyncStatus};
use crate::storage::RegistryWriter;
use crate::sync::detector::ChangeDetector;
use chrono::Utc;
use std::sync::Arc;

/// Why a sync was started or skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncReason {
    AlreadyInProgress,
    UpToDate,
    StateNeedsSync,
    ManualRequested,
    FilterChanged,
    IntervalElapsed,
    ErrorCheckingChanges,
    ManualNoChanges,
}

impl std::fmt::Display for SyncReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            SyncReason::AlreadyInProgress => "sync already in progress",
            SyncReason::UpToDate => "registry is up to date",
            SyncReason::StateNeedsSync => "previous sync did not complete",
            SyncReason::ManualRequested => "manual sync requested",
            SyncReason::FilterChanged => "filter configuration changed",
            SyncReason::IntervalElapsed => "sync interval elapsed",
            SyncReason::ErrorCheckingChanges => "could not check for upstream changes",
            SyncReason::ManualNoChanges => "manual sync requested but no upstream changes",
        };
        write!(f, "{}", text)
    }
}

/// Outcome of one successful sync attempt.
#[derive(Debug, Clone)]
pub struct SyncResult {
    /// Content hash of the fetched (pre-filter) registry; compared against
    /// the source's `current_hash` on later ticks.
    pub hash: String,
    /// Servers actually stored after filtering.
    pub server_count: usize,
}

pub struct SyncManager {
    factory: Arc<SourceHandlerFactory>,
    detector: ChangeDetector,
    writer: Arc<dyn RegistryWriter>,
}

impl SyncManager {
    pub fn new(factory: Arc<SourceHandlerFactory>, writer: Arc<dyn RegistryWriter>) -> Self {
        let detector = ChangeDetector::new(factory.clone());
        Self {
            factory,
            detector,
            writer,
        }
    }

    /// Decide whether to sync. Cheap checks run first; the (potentially
    /// remote) change probe only runs when some trigger fired.
    pub async fn should_sync(
        &self,
        config: &Config,
        status: &SyncStatus,
        manual: bool,
    ) -> (bool, SyncReason) {
        if status.phase == SyncPhase::Syncing {
            return (false, SyncReason::AlreadyInProgress);
        }

        let state_needs_sync = status.phase != SyncPhase::Complete;

        // First run has no recorded filter hash and must not count as a
        // filter change.
        let filter_changed = !status.last_applied_filter_hash.is_empty()
            && filter::canonical_filter_hash(config.filter.as_ref())
                != status.last_applied_filter_hash;

        let (interval_elapsed, _next_due) =
            ChangeDetector::is_interval_elapsed(config, status, Utc::now());

        if !(state_needs_sync || manual || filter_changed || interval_elapsed) {
            return (false, SyncReason::UpToDate);
        }

        let (changed, probe_error) = self.detector.is_data_changed(config, status).await;
        if let Some(err) = probe_error {
            tracing::warn!(registry = %config.registry_name, %err, "change probe failed, syncing anyway");
            return (true, SyncReason::ErrorCheckingChanges);
        }

        if changed {
            let reason = if state_needs_sync {
                SyncReason::StateNeedsSync
            } else if manual {
                SyncReason::ManualRequested
            } else if filter_changed {
                SyncReason::FilterChanged
            } else {
                SyncReason::IntervalElapsed
            };
            (true, reason)
        } else if manual {
            (false, SyncReason::ManualNoChanges)
        } else {
            (false, SyncReason::UpToDate)
        }
    }

    /// Run one sync attempt end to end. The attempt is bounded by the
    /// caller's task: cancelling the surrounding future aborts it.
    pub async fn perform_sync(
        &self,
        config: &Config,
    ) -> std::result::Result<SyncResult, SyncFailure> {
        let handler = self.factory.create(config.source.source_type).map_err(|e| {
            SyncFailure::new(
                SyncCondition::SourceAvailable,
                SyncCause::HandlerCreationFailed,
                e,
            )
        })?;

        handler.validate(config).await.map_err(|e| {
            SyncFailure::new(
                SyncCondition::SourceAvailable,
                SyncCause::ValidationFailed,
                e,
            )
        })?;

        let fetched = handler.fetch_registry(config).await.map_err(|e| {
            SyncFailure::new(SyncCondition::SyncSuccessful, SyncCause::FetchFailed, e)
        })?;
        let hash = fetched.hash.clone();
        tracing::debug!(
            registry = %config.registry_name,
            servers = fetched.server_count,
            %hash,
            "fetched registry document"
        );

        let filtered = filter::apply_filters(fetched.registry, config.filter.as_ref())
            .map_err(|e| {
                SyncFailure::new(SyncCondition::SyncSuccessful, SyncCause::FetchFailed, e)
            })?;
        let server_count = filtered.servers.len();

        self.writer
            .store(&config.registry_name, &filtered)
            .await
            .map_err(|e| {
                SyncFailure::new(SyncCondition::SyncSuccessful, SyncCause::StorageFailed, e)
            })?;

        Ok(SyncResult { hash, server_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        FileSource, FilterConfig, NameFilter, SourceConfig, SourceType, SyncPolicy, TagFilter,
    };
    use crate::error::Result;
    use crate::types::{SourceFormat, UpstreamRegistry};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Writer that records stored sets instead of touching a database.
    #[derive(Default)]
    struct RecordingWriter {
        stored: Mutex<Vec<(String, UpstreamRegistry)>>,
    }

    #[async_trait]
    impl RegistryWriter for RecordingWriter {
        async fn store(&self, registry_name: &str, set: &UpstreamRegistry) -> Result<()> {
            self.stored
                .lock()
                .unwrap()
                .push((registry_name.to_string(), set.clone()));
            Ok(())
        }
    }

    fn file_config(path: std::path::PathBuf) -> Config {
        Config {
            registry_name: "test".to_string(),
            server: Default::default(),
            storage: Default::default(),
            source: SourceConfig {
                source_type: SourceType::File,
                format: SourceFormat::Toolhive,
                configmap: None,
                git: None,
                api: None,
                file: Some(FileSource { path }),
                kubernetes: None,
            },
            sync_policy: SyncPolicy {
                interval: Some("1h".to_string()),
            },
            filter: None,
            database: Default::default(),
        }
    }

    fn manager(writer: Arc<RecordingWriter>) -> SyncManager {
        let factory = Arc::new(SourceHandlerFactory::new(None).unwrap());
        SyncManager::new(factory, writer)
    }

    const DOC: &str = r#"{
        "version": "1.0.0",
        "servers": {
            "prod-db": {"image": "ghcr.io/x/prod-db:1.0.0", "tags": ["prod"]},
            "prod-exp": {"image": "ghcr.io/x/prod-exp:1.0.0", "tags": ["prod", "experimental"]},
            "dev-db": {"image": "ghcr.io/x/dev-db:1.0.0", "tags": ["dev"]}
        }
    }"#;

    fn write_doc(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("registry.json");
        std::fs::write(&path, DOC).unwrap();
        path
    }

    #[tokio::test]
    async fn syncing_phase_blocks_new_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(Arc::new(RecordingWriter::default()));
        let config = file_config(write_doc(&dir));

        let status = SyncStatus {
            phase: SyncPhase::Syncing,
            ..SyncStatus::initial()
        };
        let (should, reason) = manager.should_sync(&config, &status, true).await;
        assert!(!should);
        assert_eq!(reason, SyncReason::AlreadyInProgress);
    }

    #[tokio::test]
    async fn failed_state_forces_sync() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(Arc::new(RecordingWriter::default()));
        let config = file_config(write_doc(&dir));

        let (should, reason) = manager.should_sync(&config, &SyncStatus::initial(), false).await;
        assert!(should);
        assert_eq!(reason, SyncReason::StateNeedsSync);
    }

    #[tokio::test]
    async fn up_to_date_when_nothing_triggers() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(Arc::new(RecordingWriter::default()));
        let config = file_config(write_doc(&dir));

        let status = SyncStatus {
            phase: SyncPhase::Complete,
            last_attempt: Some(Utc::now()),
            last_sync_hash: "deadbeef".to_string(),
            last_applied_filter_hash: filter::canonical_filter_hash(None),
            ..SyncStatus::initial()
        };
        let (should, reason) = manager.should_sync(&config, &status, false).await;
        assert!(!should);
        assert_eq!(reason, SyncReason::UpToDate);
    }

    #[tokio::test]
    async fn manual_request_without_changes_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let writer = Arc::new(RecordingWriter::default());
        let manager = manager(writer.clone());
        let config = file_config(write_doc(&dir));

        // sync once to learn the real content hash
        let result = manager.perform_sync(&config).await.unwrap();

        let status = SyncStatus {
            phase: SyncPhase::Complete,
            last_attempt: Some(Utc::now()),
            last_sync_hash: result.hash,
            last_applied_filter_hash: filter::canonical_filter_hash(None),
            ..SyncStatus::initial()
        };
        let (should, reason) = manager.should_sync(&config, &status, true).await;
        assert!(!should);
        assert_eq!(reason, SyncReason::ManualNoChanges);
    }

    #[tokio::test]
    async fn manual_request_with_changes_syncs() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(Arc::new(RecordingWriter::default()));
        let config = file_config(write_doc(&dir));

        let status = SyncStatus {
            phase: SyncPhase::Complete,
            last_attempt: Some(Utc::now()),
            last_sync_hash: "0000000000000000".to_string(),
            last_applied_filter_hash: filter::canonical_filter_hash(None),
            ..SyncStatus::initial()
        };
        let (should, reason) = manager.should_sync(&config, &status, true).await;
        assert!(should);
        assert_eq!(reason, SyncReason::ManualRequested);
    }

    #[tokio::test]
    async fn perform_sync_fetches_filters_and_stores() {
        let dir = tempfile::tempdir().unwrap();
        let writer = Arc::new(RecordingWriter::default());
        let manager = manager(writer.clone());

        let mut config = file_config(write_doc(&dir));
        config.filter = Some(FilterConfig {
            names: NameFilter {
                include: vec!["prod-*".to_string()],
                exclude: vec![],
            },
            tags: TagFilter {
                include: vec![],
                exclude: vec!["experimental".to_string()],
            },
        });

        let result = manager.perform_sync(&config).await.unwrap();
        // hash covers the full fetched set, count covers the stored one
        assert_eq!(result.server_count, 1);
        assert_eq!(result.hash.len(), 64);

        let stored = writer.stored.lock().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].0, "test");
        assert_eq!(stored[0].1.servers.len(), 1);
        assert_eq!(stored[0].1.servers[0].name, "prod-db");
    }

    #[tokio::test]
    async fn perform_sync_reports_source_failures() {
        let writer = Arc::new(RecordingWriter::default());
        let manager = manager(writer.clone());
        let config = file_config("/nonexistent/registry.json".into());

        let failure = manager.perform_sync(&config).await.unwrap_err();
        assert_eq!(failure.condition, SyncCondition::SourceAvailable);
        assert_eq!(failure.cause, SyncCause::ValidationFailed);
        assert!(writer.stored.lock().unwrap().is_empty());
    }
}
