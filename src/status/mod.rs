//! Durable sync status: the record scheduling and crash recovery hang off.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod database;
pub mod file;

pub use database::DbStatusStore;
pub use file::FileStatusStore;

pub const INTERRUPTED_MESSAGE: &str = "Previous sync was interrupted";
pub const NO_STATUS_MESSAGE: &str = "No previous sync status found";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    Syncing,
    Complete,
    Failed,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncPhase::Syncing => write!(f, "Syncing"),
            SyncPhase::Complete => write!(f, "Complete"),
            SyncPhase::Failed => write!(f, "Failed"),
        }
    }
}

impl std::str::FromStr for SyncPhase {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Syncing" => Ok(SyncPhase::Syncing),
            "Complete" => Ok(SyncPhase::Complete),
            "Failed" => Ok(SyncPhase::Failed),
            other => Err(format!("unknown sync phase: {}", other)),
        }
    }
}

/// Outcome record of the most recent sync attempt for one registry.
/// Timestamps serialize as RFC 3339; absent optionals are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub phase: SyncPhase,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_sync_hash: String,
    #[serde(default)]
    pub last_applied_filter_hash: String,
    #[serde(default)]
    pub server_count: i64,
}

impl SyncStatus {
    /// Status returned when no prior record exists; `Failed` forces a fresh
    /// sync on the first tick.
    pub fn initial() -> Self {
        Self {
            phase: SyncPhase::Failed,
            message: NO_STATUS_MESSAGE.to_string(),
            last_attempt: None,
            attempt_count: 0,
            last_sync_time: None,
            last_sync_hash: String::new(),
            last_applied_filter_hash: String::new(),
            server_count: 0,
        }
    }

    /// Crash recovery: a loaded `Syncing` phase means the previous process
    /// died mid-sync. The engine must never start up believing a sync is in
    /// progress. Returns whether the status was rewritten.
    pub fn recover_interrupted(&mut self) -> bool {
        if self.phase == SyncPhase::Syncing {
            self.phase = SyncPhase::Failed;
            self.message = INTERRUPTED_MESSAGE.to_string();
            true
        } else {
            false
        }
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self::initial()
    }
}

/// Durable store for [`SyncStatus`]. Implementations must make every save
/// atomic, and must apply the crash-recovery rewrite during `load` so the
/// rewritten record is persisted before anyone observes it.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn load(&self, registry: &str) -> Result<SyncStatus>;
    async fn save(&self, registry: &str, status: &SyncStatus) -> Result<()>;
}
