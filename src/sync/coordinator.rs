//! Per-registry coordinator: timer loop, single-flight, status transitions.
//!
//! One coordinator task owns the cached [`SyncStatus`] for its registry.
//! The mutex guards only in-memory mutation and the save call, never the
//! sync work itself; `perform_sync` runs lock-free. Ticks and manual
//! triggers are handled serially by the same task, so at most one sync per
//! registry is ever in flight.

use crate::config::{default_interval, Config};
use crate::filter;
use crate::metrics;
use crate::status::{StatusStore, SyncPhase, SyncStatus};
use crate::sync::manager::SyncManager;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Notify};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub struct SyncCoordinator {
    config: Arc<Config>,
    manager: Arc<SyncManager>,
    store: Arc<dyn StatusStore>,
    status: Arc<Mutex<SyncStatus>>,
    manual: Arc<Notify>,
}

impl SyncCoordinator {
    /// Load (and crash-recover) the persisted status and build the
    /// coordinator.
    pub async fn new(
        config: Arc<Config>,
        manager: Arc<SyncManager>,
        store: Arc<dyn StatusStore>,
    ) -> crate::error::Result<Self> {
        let status = store.load(&config.registry_name).await?;
        tracing::info!(
            registry = %config.registry_name,
            phase = %status.phase,
            "loaded sync status"
        );

        Ok(Self {
            config,
            manager,
            store,
            status: Arc::new(Mutex::new(status)),
            manual: Arc::new(Notify::new()),
        })
    }

    /// Read-only snapshot handle for the HTTP API.
    pub fn status_handle(&self) -> Arc<Mutex<SyncStatus>> {
        self.status.clone()
    }

    /// Handle the HTTP API pokes to request a manual sync.
    pub fn manual_trigger(&self) -> Arc<Notify> {
        self.manual.clone()
    }

    /// Run until cancelled. Fires one check immediately, then on every
    /// interval tick and every manual trigger.
    pub async fn run(self, cancel: CancellationToken) {
        let period = self
            .config
            .sync_policy
            .interval_duration()
            .unwrap_or_else(default_interval);

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            registry = %self.config.registry_name,
            period_secs = period.as_secs(),
            "sync coordinator started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(registry = %self.config.registry_name, "sync coordinator stopping");
                    break;
                }
                // the first tick completes immediately
                _ = ticker.tick() => self.check(false).await,
                _ = self.manual.notified() => self.check(true).await,
            }
        }
    }

    /// One scheduling decision plus, when warranted, one sync attempt.
    async fn check(&self, manual: bool) {
        let registry = self.config.registry_name.as_str();

        // Decide on a snapshot; the change probe does network I/O and must
        // not run under the lock. This task is the only status writer, so
        // the snapshot cannot go stale between decision and transition.
        let snapshot = self.status.lock().await.clone();
        let (should_sync, reason) = self.manager.should_sync(&self.config, &snapshot, manual).await;

        if !should_sync {
            tracing::debug!(registry, %reason, "sync skipped");
            metrics::SYNC_ATTEMPTS_TOTAL
                .with_label_values(&[registry, "skipped"])
                .inc();
            let mut status = self.status.lock().await;
            status.message = format!("Skipped: {}", reason);
            self.persist(&status).await;
            return;
        }

        tracing::info!(registry, %reason, "starting sync");
        {
            // Observers must see the in-progress state before work begins.
            let mut status = self.status.lock().await;
            status.phase = SyncPhase::Syncing;
            status.attempt_count += 1;
            status.last_attempt = Some(Utc::now());
            status.message = format!("Sync in progress: {}", reason);
            self.persist(&status).await;
        }

        let started = Instant::now();
        let outcome = self.manager.perform_sync(&self.config).await;
        metrics::SYNC_DURATION_SECONDS
            .with_label_values(&[registry])
            .observe(started.elapsed().as_secs_f64());

        let mut status = self.status.lock().await;
        match outcome {
            Ok(result) => {
                tracing::info!(
                    registry,
                    servers = result.server_count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "sync completed"
                );
                metrics::SYNC_ATTEMPTS_TOTAL
                    .with_label_values(&[registry, "success"])
                    .inc();
                metrics::SYNCED_SERVERS
                    .with_label_values(&[registry])
                    .set(result.server_count as f64);

                status.phase = SyncPhase::Complete;
                status.message = "Sync completed successfully".to_string();
                status.last_sync_time = Some(Utc::now());
                status.last_sync_hash = result.hash;
                status.last_applied_filter_hash =
                    filter::canonical_filter_hash(self.config.filter.as_ref());
                status.server_count = result.server_count as i64;
                status.attempt_count = 0;
            }
            Err(failure) => {
                tracing::error!(registry, %failure, "sync failed");
                metrics::SYNC_ATTEMPTS_TOTAL
                    .with_label_values(&[registry, "failure"])
                    .inc();

                status.phase = SyncPhase::Failed;
                status.message = failure.to_string();
            }
        }
        self.persist(&status).await;
    }

    /// Persistence failures must not kill the loop; the next transition
    /// retries the write.
    async fn persist(&self, status: &SyncStatus) {
        if let Err(err) = self.store.save(&self.config.registry_name, status).await {
            tracing::error!(
                registry = %self.config.registry_name,
                %err,
                "failed to persist sync status"
            );
        }
    }
}
