//! Database-backed status persistence: one row per registry in
//! `sync_status`, written in its own short transaction.

use super::{StatusStore, SyncStatus};
use crate::error::{Error, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

pub struct DbStatusStore {
    pool: PgPool,
}

impl DbStatusStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatusStore for DbStatusStore {
    async fn load(&self, registry: &str) -> Result<SyncStatus> {
        let row = sqlx::query(
            r#"
            SELECT phase, message, last_attempt, attempt_count,
                   last_sync_time, last_sync_hash, last_applied_filter_hash, server_count
            FROM sync_status
            WHERE registry_name = $1
            "#,
        )
        .bind(registry)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            tracing::info!(registry, "no prior sync status row");
            return Ok(SyncStatus::initial());
        };

        let phase: String = row.try_get("phase")?;
        let mut status = SyncStatus {
            phase: phase
                .parse()
                .map_err(|e: String| Error::StorageFailed(e))?,
            message: row.try_get("message")?,
            last_attempt: row.try_get("last_attempt")?,
            attempt_count: row.try_get::<i32, _>("attempt_count")? as u32,
            last_sync_time: row.try_get("last_sync_time")?,
            last_sync_hash: row.try_get("last_sync_hash")?,
            last_applied_filter_hash: row.try_get("last_applied_filter_hash")?,
            server_count: row.try_get("server_count")?,
        };

        if status.recover_interrupted() {
            tracing::warn!(registry, "previous sync was interrupted, marking failed");
            self.save(registry, &status).await?;
        }

        Ok(status)
    }

    async fn save(&self, registry: &str, status: &SyncStatus) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_status (registry_name, phase, message, last_attempt, attempt_count,
                                     last_sync_time, last_sync_hash, last_applied_filter_hash,
                                     server_count, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
            ON CONFLICT (registry_name) DO UPDATE SET
                phase = EXCLUDED.phase,
                message = EXCLUDED.message,
                last_attempt = EXCLUDED.last_attempt,
                attempt_count = EXCLUDED.attempt_count,
                last_sync_time = EXCLUDED.last_sync_time,
                last_sync_hash = EXCLUDED.last_sync_hash,
                last_applied_filter_hash = EXCLUDED.last_applied_filter_hash,
                server_count = EXCLUDED.server_count,
                updated_at = now()
            "#,
        )
        .bind(registry)
        .bind(status.phase.to_string())
        .bind(&status.message)
        .bind(status.last_attempt)
        .bind(status.attempt_count as i32)
        .bind(status.last_sync_time)
        .bind(&status.last_sync_hash)
        .bind(&status.last_applied_filter_hash)
        .bind(status.server_count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
