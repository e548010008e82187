//! Change detection: has the upstream content moved, and is the configured
//! interval up?

use crate::config::Config;
use crate::error::Error;
use crate::sources::SourceHandlerFactory;
use crate::status::SyncStatus;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct ChangeDetector {
    factory: Arc<SourceHandlerFactory>,
}

impl ChangeDetector {
    pub fn new(factory: Arc<SourceHandlerFactory>) -> Self {
        Self { factory }
    }

    /// Compare the source's current content hash against the last synced
    /// one. Fails open: any probe error reports "changed" together with the
    /// error so the caller can log it — a broken probe must provoke a sync,
    /// never suppress one.
    pub async fn is_data_changed(
        &self,
        config: &Config,
        status: &SyncStatus,
    ) -> (bool, Option<Error>) {
        if status.last_sync_hash.is_empty() {
            return (true, None);
        }

        let handler = match self.factory.create(config.source.source_type) {
            Ok(handler) => handler,
            Err(err) => return (true, Some(err)),
        };

        match handler.current_hash(config).await {
            Ok(current) => (current != status.last_sync_hash, None),
            Err(err) => (true, Some(err)),
        }
    }

    /// Whether the sync interval has elapsed, and when the next sync is
    /// due. No configured interval means interval-based syncing is off.
    /// The returned due time always lies in the future.
    pub fn is_interval_elapsed(
        config: &Config,
        status: &SyncStatus,
        now: DateTime<Utc>,
    ) -> (bool, Option<DateTime<Utc>>) {
        let Some(interval) = config.sync_policy.interval_duration() else {
            return (false, None);
        };
        let interval = match chrono::Duration::from_std(interval) {
            Ok(interval) => interval,
            Err(_) => return (false, None),
        };

        match status.last_attempt {
            None => (true, Some(now + interval)),
            Some(last_attempt) => {
                let due = last_attempt + interval;
                if now >= due {
                    (true, Some(now + interval))
                } else {
                    (false, Some(due))
                }
            }
        }
    }
}
