//! Schema setup for the canonical relational store.
//!
//! Statements are idempotent so `migrate` can run on every deploy. The
//! migration role may differ from the service role (see
//! `database.migrationUser`).

use crate::error::Result;
use sqlx::postgres::PgPool;

/// Apply the full schema.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    tracing::info!("applying schema migrations");

    // icon_theme enum; CREATE TYPE has no IF NOT EXISTS
    sqlx::query(
        r#"
        DO $$ BEGIN
            CREATE TYPE icon_theme AS ENUM ('LIGHT', 'DARK');
        EXCEPTION
            WHEN duplicate_object THEN NULL;
        END $$
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS registry (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            registry_type TEXT NOT NULL DEFAULT '',
            syncable BOOLEAN NOT NULL DEFAULT TRUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mcp_server (
            id UUID PRIMARY KEY,
            reg_id UUID NOT NULL REFERENCES registry(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            version TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            description TEXT,
            title TEXT,
            website_url TEXT,
            upstream_meta JSONB,
            server_meta JSONB,
            repository_url TEXT,
            repository_source TEXT,
            repository_id TEXT,
            repository_subfolder TEXT,
            UNIQUE (reg_id, name, version)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mcp_server_package (
            server_id UUID NOT NULL REFERENCES mcp_server(id) ON DELETE CASCADE,
            registry_type TEXT NOT NULL,
            registry_base_url TEXT,
            identifier TEXT NOT NULL,
            version TEXT NOT NULL,
            runtime_hint TEXT,
            runtime_args JSONB,
            package_args JSONB,
            env_vars JSONB,
            sha256 TEXT,
            transport JSONB,
            PRIMARY KEY (server_id, identifier, version)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mcp_server_remote (
            server_id UUID NOT NULL REFERENCES mcp_server(id) ON DELETE CASCADE,
            transport TEXT NOT NULL,
            transport_url TEXT NOT NULL,
            headers JSONB,
            PRIMARY KEY (server_id, transport, transport_url)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mcp_server_icon (
            server_id UUID NOT NULL REFERENCES mcp_server(id) ON DELETE CASCADE,
            source_uri TEXT NOT NULL,
            mime_type TEXT NOT NULL DEFAULT '',
            theme icon_theme NOT NULL DEFAULT 'LIGHT',
            PRIMARY KEY (server_id, source_uri, theme)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS latest_server_version (
            reg_id UUID NOT NULL REFERENCES registry(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            version TEXT NOT NULL,
            server_id UUID NOT NULL REFERENCES mcp_server(id) ON DELETE CASCADE,
            PRIMARY KEY (reg_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_status (
            registry_name TEXT PRIMARY KEY,
            phase TEXT NOT NULL,
            message TEXT NOT NULL DEFAULT '',
            last_attempt TIMESTAMPTZ,
            attempt_count INTEGER NOT NULL DEFAULT 0,
            last_sync_time TIMESTAMPTZ,
            last_sync_hash TEXT NOT NULL DEFAULT '',
            last_applied_filter_hash TEXT NOT NULL DEFAULT '',
            server_count BIGINT NOT NULL DEFAULT 0,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_mcp_server_reg_name ON mcp_server (reg_id, name)",
    )
    .execute(pool)
    .await?;

    tracing::info!("schema migrations complete");
    Ok(())
}
