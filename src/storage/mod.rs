//! Relational catalog store: pool construction, the writer capability, and
//! the read-side queries backing the HTTP API.

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::types::UpstreamRegistry;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

pub mod copy;
pub mod migrations;
pub mod queries;
pub mod writer;

pub use writer::BulkWriter;

/// Capability the sync manager stores through. Trait-shaped so tests can
/// substitute an in-memory writer.
#[async_trait]
pub trait RegistryWriter: Send + Sync {
    /// Reconcile the fetched set against the store; all-or-nothing.
    async fn store(&self, registry_name: &str, set: &UpstreamRegistry) -> Result<()>;
}

/// Bounded connection pool shared by the sync loop and the read API.
pub async fn connect_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.url())
        .await?;
    Ok(pool)
}

/// Upsert the `registry` row for the configured registry so a fresh
/// database never produces `RegistryNotFound` on the first sync.
pub async fn ensure_registry(pool: &PgPool, name: &str, registry_type: &str) -> Result<Uuid> {
    let row: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO registry (id, name, registry_type, syncable)
        VALUES ($1, $2, $3, TRUE)
        ON CONFLICT (name) DO UPDATE SET registry_type = EXCLUDED.registry_type
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(registry_type)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}
