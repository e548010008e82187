//! Bulk differential writer.
//!
//! Reconciles a freshly fetched server set against the relational store in
//! one serializable transaction: bulk-load into transaction-scoped scratch
//! tables, upsert from scratch preserving row identity, delete orphans, and
//! refresh the latest-version pointers. Either every row lands or none do.

use super::RegistryWriter;
use crate::error::{Error, Result};
use crate::storage::copy::CopyBuffer;
use crate::types::{compare_versions, Icon, Remote, ServerJson, UpstreamRegistry};
use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgPool};
use sqlx::Row;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

pub struct BulkWriter {
    pool: PgPool,
}

impl BulkWriter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RegistryWriter for BulkWriter {
    async fn store(&self, registry_name: &str, set: &UpstreamRegistry) -> Result<()> {
        check_duplicate_keys(&set.servers)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let reg_id: Uuid = sqlx::query("SELECT id FROM registry WHERE name = $1")
            .bind(registry_name)
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| row.get("id"))
            .ok_or_else(|| Error::RegistryNotFound(registry_name.to_string()))?;

        let ids = upsert_servers(&mut *tx, reg_id, &set.servers).await?;

        // Orphan delete; an empty input set clears the whole registry.
        // Child rows follow via ON DELETE CASCADE.
        let kept: Vec<Uuid> = set
            .servers
            .iter()
            .map(|server| ids[&key_of(server)])
            .collect();
        sqlx::query("DELETE FROM mcp_server WHERE reg_id = $1 AND id <> ALL($2)")
            .bind(reg_id)
            .bind(&kept)
            .execute(&mut *tx)
            .await?;

        reconcile_packages(&mut *tx, &set.servers, &ids, &kept).await?;
        reconcile_remotes(&mut *tx, &set.servers, &ids, &kept).await?;
        reconcile_icons(&mut *tx, &set.servers, &ids, &kept).await?;
        refresh_latest_versions(&mut *tx, reg_id, &set.servers, &ids).await?;

        tx.commit().await?;
        Ok(())
    }
}

fn key_of(server: &ServerJson) -> (String, String) {
    (server.name.clone(), server.version.clone())
}

fn check_duplicate_keys(servers: &[ServerJson]) -> Result<()> {
    let mut seen = HashSet::new();
    for server in servers {
        if !seen.insert(server.key()) {
            return Err(Error::DataInvalid(format!(
                "duplicate server {}@{} in input set",
                server.name, server.version
            )));
        }
    }
    Ok(())
}

/// Empty strings in optional fields are stored as absent, not "".
fn opt_nonempty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.is_empty())
}

/// Upstream-dialect extras carried through storage so the read API can
/// reconstruct the record faithfully.
fn upstream_meta_json(server: &ServerJson) -> Option<String> {
    let mut meta = serde_json::Map::new();
    if let Some(schema) = opt_nonempty(server.schema.as_ref()) {
        meta.insert("schema".to_string(), schema.into());
    }
    if !server.tags.is_empty() {
        meta.insert("tags".to_string(), server.tags.clone().into());
    }
    if meta.is_empty() {
        None
    } else {
        Some(serde_json::Value::Object(meta).to_string())
    }
}

/// `server_meta` is the JSON of `publisherProvided`; absent when the map is
/// empty or missing.
fn server_meta_json(server: &ServerJson) -> Option<String> {
    let provided = server.meta.as_ref()?.publisher_provided.as_ref()?;
    if provided.is_empty() {
        None
    } else {
        Some(serde_json::Value::Object(provided.clone()).to_string())
    }
}

async fn upsert_servers(
    tx: &mut PgConnection,
    reg_id: Uuid,
    servers: &[ServerJson],
) -> Result<HashMap<(String, String), Uuid>> {
    if servers.is_empty() {
        return Ok(HashMap::new());
    }

    sqlx::query(
        r#"
        CREATE TEMPORARY TABLE temp_mcp_server (
            id UUID,
            name TEXT,
            version TEXT,
            description TEXT,
            title TEXT,
            website_url TEXT,
            upstream_meta JSONB,
            server_meta JSONB,
            repository_url TEXT,
            repository_source TEXT,
            repository_id TEXT,
            repository_subfolder TEXT
        ) ON COMMIT DROP
        "#,
    )
    .execute(&mut *tx)
    .await?;

    let mut buffer = CopyBuffer::new(12);
    for server in servers {
        // candidate UUID; the conflict clause keeps any pre-existing one
        let id = Uuid::new_v4().to_string();
        let upstream_meta = upstream_meta_json(server);
        let server_meta = server_meta_json(server);
        let repo = server.repository.as_ref();

        buffer.push_row([
            Some(id.as_str()),
            Some(server.name.as_str()),
            Some(server.version.as_str()),
            opt_nonempty(server.description.as_ref()),
            opt_nonempty(server.title.as_ref()),
            opt_nonempty(server.website_url.as_ref()),
            upstream_meta.as_deref(),
            server_meta.as_deref(),
            repo.map(|r| r.url.as_str()).filter(|s| !s.is_empty()),
            repo.and_then(|r| opt_nonempty(r.source.as_ref())),
            repo.and_then(|r| opt_nonempty(r.id.as_ref())),
            repo.and_then(|r| opt_nonempty(r.subfolder.as_ref())),
        ]);
    }

    let copied = copy_into(
        tx,
        "COPY temp_mcp_server (id, name, version, description, title, website_url, \
         upstream_meta, server_meta, repository_url, repository_source, repository_id, \
         repository_subfolder) FROM STDIN",
        &buffer,
    )
    .await?;
    if copied != servers.len() as u64 {
        return Err(Error::StorageInconsistent(format!(
            "bulk-loaded {} server rows, expected {}",
            copied,
            servers.len()
        )));
    }

    let upserted = sqlx::query(
        r#"
        INSERT INTO mcp_server (id, reg_id, name, version, description, title, website_url,
                                upstream_meta, server_meta, repository_url, repository_source,
                                repository_id, repository_subfolder, created_at, updated_at)
        SELECT t.id, $1, t.name, t.version, t.description, t.title, t.website_url,
               t.upstream_meta, t.server_meta, t.repository_url, t.repository_source,
               t.repository_id, t.repository_subfolder, now(), now()
        FROM temp_mcp_server t
        ON CONFLICT (reg_id, name, version) DO UPDATE SET
            description = EXCLUDED.description,
            title = EXCLUDED.title,
            website_url = EXCLUDED.website_url,
            upstream_meta = EXCLUDED.upstream_meta,
            server_meta = EXCLUDED.server_meta,
            repository_url = EXCLUDED.repository_url,
            repository_source = EXCLUDED.repository_source,
            repository_id = EXCLUDED.repository_id,
            repository_subfolder = EXCLUDED.repository_subfolder,
            updated_at = now()
        "#,
    )
    .bind(reg_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if upserted != servers.len() as u64 {
        return Err(Error::StorageInconsistent(format!(
            "upserted {} server rows, expected {}",
            upserted,
            servers.len()
        )));
    }

    // Read back stored IDs so children and latest pointers reference the
    // stable UUIDs, not our insert candidates.
    let rows = sqlx::query("SELECT name, version, id FROM mcp_server WHERE reg_id = $1")
        .bind(reg_id)
        .fetch_all(&mut *tx)
        .await?;

    let mut stored: HashMap<(String, String), Uuid> = HashMap::with_capacity(rows.len());
    for row in rows {
        stored.insert((row.get("name"), row.get("version")), row.get("id"));
    }

    let mut ids = HashMap::with_capacity(servers.len());
    for server in servers {
        let key = key_of(server);
        let id = stored.get(&key).copied().ok_or_else(|| {
            Error::StorageInconsistent(format!(
                "server {}@{} missing after upsert",
                server.name, server.version
            ))
        })?;
        ids.insert(key, id);
    }
    Ok(ids)
}

async fn copy_into(tx: &mut PgConnection, statement: &str, buffer: &CopyBuffer) -> Result<u64> {
    let mut copy = tx.copy_in_raw(statement).await?;
    copy.send(buffer.as_bytes()).await?;
    Ok(copy.finish().await?)
}

async fn reconcile_packages(
    tx: &mut PgConnection,
    servers: &[ServerJson],
    ids: &HashMap<(String, String), Uuid>,
    kept: &[Uuid],
) -> Result<()> {
    let mut rows: Vec<(Uuid, &crate::types::Package)> = Vec::new();
    let mut seen = HashSet::new();
    for server in servers {
        let server_id = ids[&key_of(server)];
        for package in &server.packages {
            if seen.insert((server_id, package.identifier.clone(), package.version.clone())) {
                rows.push((server_id, package));
            }
        }
    }

    if rows.is_empty() {
        sqlx::query("DELETE FROM mcp_server_package WHERE server_id = ANY($1)")
            .bind(kept)
            .execute(&mut *tx)
            .await?;
        return Ok(());
    }

    sqlx::query(
        r#"
        CREATE TEMPORARY TABLE temp_mcp_server_package (
            server_id UUID,
            registry_type TEXT,
            registry_base_url TEXT,
            identifier TEXT,
            version TEXT,
            runtime_hint TEXT,
            runtime_args JSONB,
            package_args JSONB,
            env_vars JSONB,
            sha256 TEXT,
            transport JSONB
        ) ON COMMIT DROP
        "#,
    )
    .execute(&mut *tx)
    .await?;

    let mut buffer = CopyBuffer::new(11);
    for (server_id, package) in &rows {
        let server_id = server_id.to_string();
        let runtime_args = json_array(&package.runtime_arguments);
        let package_args = json_array(&package.package_arguments);
        let env_vars = json_array(&package.environment_variables);
        let transport = package
            .transport
            .as_ref()
            .map(|t| serde_json::to_string(t))
            .transpose()?;

        buffer.push_row([
            Some(server_id.as_str()),
            Some(package.registry_type.as_str()),
            opt_nonempty(package.registry_base_url.as_ref()),
            Some(package.identifier.as_str()),
            Some(package.version.as_str()),
            opt_nonempty(package.runtime_hint.as_ref()),
            runtime_args.as_deref(),
            package_args.as_deref(),
            env_vars.as_deref(),
            opt_nonempty(package.sha256.as_ref()),
            transport.as_deref(),
        ]);
    }

    let copied = copy_into(
        tx,
        "COPY temp_mcp_server_package (server_id, registry_type, registry_base_url, identifier, \
         version, runtime_hint, runtime_args, package_args, env_vars, sha256, transport) \
         FROM STDIN",
        &buffer,
    )
    .await?;
    if copied != rows.len() as u64 {
        return Err(Error::StorageInconsistent(format!(
            "bulk-loaded {} package rows, expected {}",
            copied,
            rows.len()
        )));
    }

    sqlx::query(
        r#"
        INSERT INTO mcp_server_package (server_id, registry_type, registry_base_url, identifier,
                                        version, runtime_hint, runtime_args, package_args,
                                        env_vars, sha256, transport)
        SELECT server_id, registry_type, registry_base_url, identifier, version, runtime_hint,
               runtime_args, package_args, env_vars, sha256, transport
        FROM temp_mcp_server_package
        ON CONFLICT (server_id, identifier, version) DO UPDATE SET
            registry_type = EXCLUDED.registry_type,
            registry_base_url = EXCLUDED.registry_base_url,
            runtime_hint = EXCLUDED.runtime_hint,
            runtime_args = EXCLUDED.runtime_args,
            package_args = EXCLUDED.package_args,
            env_vars = EXCLUDED.env_vars,
            sha256 = EXCLUDED.sha256,
            transport = EXCLUDED.transport
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        DELETE FROM mcp_server_package p
        WHERE p.server_id = ANY($1)
          AND NOT EXISTS (
              SELECT 1 FROM temp_mcp_server_package t
              WHERE t.server_id = p.server_id
                AND t.identifier = p.identifier
                AND t.version = p.version
          )
        "#,
    )
    .bind(kept)
    .execute(&mut *tx)
    .await?;

    Ok(())
}

async fn reconcile_remotes(
    tx: &mut PgConnection,
    servers: &[ServerJson],
    ids: &HashMap<(String, String), Uuid>,
    kept: &[Uuid],
) -> Result<()> {
    let mut rows: Vec<(Uuid, &Remote)> = Vec::new();
    let mut skipped = 0usize;
    for server in servers {
        let server_id = ids[&key_of(server)];
        let (deduped, dupes) = dedup_remotes(&server.remotes);
        skipped += dupes;
        rows.extend(deduped.into_iter().map(|remote| (server_id, remote)));
    }
    if skipped > 0 {
        tracing::debug!(skipped, "collapsed duplicate remote entries");
    }

    if rows.is_empty() {
        sqlx::query("DELETE FROM mcp_server_remote WHERE server_id = ANY($1)")
            .bind(kept)
            .execute(&mut *tx)
            .await?;
        return Ok(());
    }

    sqlx::query(
        r#"
        CREATE TEMPORARY TABLE temp_mcp_server_remote (
            server_id UUID,
            transport TEXT,
            transport_url TEXT,
            headers JSONB
        ) ON COMMIT DROP
        "#,
    )
    .execute(&mut *tx)
    .await?;

    let mut buffer = CopyBuffer::new(4);
    for (server_id, remote) in &rows {
        let server_id = server_id.to_string();
        let headers = if remote.headers.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&remote.headers)?)
        };
        buffer.push_row([
            Some(server_id.as_str()),
            Some(remote.transport_type.as_str()),
            Some(remote.url.as_str()),
            headers.as_deref(),
        ]);
    }

    let copied = copy_into(
        tx,
        "COPY temp_mcp_server_remote (server_id, transport, transport_url, headers) FROM STDIN",
        &buffer,
    )
    .await?;
    if copied != rows.len() as u64 {
        return Err(Error::StorageInconsistent(format!(
            "bulk-loaded {} remote rows, expected {}",
            copied,
            rows.len()
        )));
    }

    sqlx::query(
        r#"
        INSERT INTO mcp_server_remote (server_id, transport, transport_url, headers)
        SELECT server_id, transport, transport_url, headers
        FROM temp_mcp_server_remote
        ON CONFLICT (server_id, transport, transport_url) DO UPDATE SET
            headers = EXCLUDED.headers
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        DELETE FROM mcp_server_remote r
        WHERE r.server_id = ANY($1)
          AND NOT EXISTS (
              SELECT 1 FROM temp_mcp_server_remote t
              WHERE t.server_id = r.server_id
                AND t.transport = r.transport
                AND t.transport_url = r.transport_url
          )
        "#,
    )
    .bind(kept)
    .execute(&mut *tx)
    .await?;

    Ok(())
}

async fn reconcile_icons(
    tx: &mut PgConnection,
    servers: &[ServerJson],
    ids: &HashMap<(String, String), Uuid>,
    kept: &[Uuid],
) -> Result<()> {
    let mut rows: Vec<(Uuid, &Icon, &'static str)> = Vec::new();
    let mut seen = HashSet::new();
    for server in servers {
        let server_id = ids[&key_of(server)];
        for icon in &server.icons {
            let theme = map_icon_theme(icon.theme.as_deref());
            if seen.insert((server_id, icon.src.clone(), theme)) {
                rows.push((server_id, icon, theme));
            }
        }
    }

    if rows.is_empty() {
        sqlx::query("DELETE FROM mcp_server_icon WHERE server_id = ANY($1)")
            .bind(kept)
            .execute(&mut *tx)
            .await?;
        return Ok(());
    }

    sqlx::query(
        r#"
        CREATE TEMPORARY TABLE temp_mcp_server_icon (
            server_id UUID,
            source_uri TEXT,
            mime_type TEXT,
            theme TEXT
        ) ON COMMIT DROP
        "#,
    )
    .execute(&mut *tx)
    .await?;

    let mut buffer = CopyBuffer::new(4);
    for (server_id, icon, theme) in &rows {
        let server_id = server_id.to_string();
        buffer.push_row([
            Some(server_id.as_str()),
            Some(icon.src.as_str()),
            // missing MIME type is stored as empty string, not NULL
            Some(icon.mime_type.as_deref().unwrap_or("")),
            Some(*theme),
        ]);
    }

    let copied = copy_into(
        tx,
        "COPY temp_mcp_server_icon (server_id, source_uri, mime_type, theme) FROM STDIN",
        &buffer,
    )
    .await?;
    if copied != rows.len() as u64 {
        return Err(Error::StorageInconsistent(format!(
            "bulk-loaded {} icon rows, expected {}",
            copied,
            rows.len()
        )));
    }

    sqlx::query(
        r#"
        INSERT INTO mcp_server_icon (server_id, source_uri, mime_type, theme)
        SELECT server_id, source_uri, mime_type, theme::icon_theme
        FROM temp_mcp_server_icon
        ON CONFLICT (server_id, source_uri, theme) DO UPDATE SET
            mime_type = EXCLUDED.mime_type
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        DELETE FROM mcp_server_icon i
        WHERE i.server_id = ANY($1)
          AND NOT EXISTS (
              SELECT 1 FROM temp_mcp_server_icon t
              WHERE t.server_id = i.server_id
                AND t.source_uri = i.source_uri
                AND t.theme::icon_theme = i.theme
          )
        "#,
    )
    .bind(kept)
    .execute(&mut *tx)
    .await?;

    Ok(())
}

async fn refresh_latest_versions(
    tx: &mut PgConnection,
    reg_id: Uuid,
    servers: &[ServerJson],
    ids: &HashMap<(String, String), Uuid>,
) -> Result<()> {
    // Stale pointers for vanished names were already removed by the orphan
    // delete's cascade; only the survivors need rewriting.
    let latest = latest_versions(servers);
    if latest.is_empty() {
        return Ok(());
    }

    let mut names = Vec::with_capacity(latest.len());
    let mut versions = Vec::with_capacity(latest.len());
    let mut server_ids = Vec::with_capacity(latest.len());
    for (name, version) in latest {
        server_ids.push(ids[&(name.clone(), version.clone())]);
        names.push(name);
        versions.push(version);
    }

    sqlx::query(
        r#"
        INSERT INTO latest_server_version (reg_id, name, version, server_id)
        SELECT $1, u.name, u.version, u.server_id
        FROM UNNEST($2::text[], $3::text[], $4::uuid[]) AS u(name, version, server_id)
        ON CONFLICT (reg_id, name) DO UPDATE SET
            version = EXCLUDED.version,
            server_id = EXCLUDED.server_id
        "#,
    )
    .bind(reg_id)
    .bind(&names)
    .bind(&versions)
    .bind(&server_ids)
    .execute(&mut *tx)
    .await?;

    Ok(())
}

/// Greatest version per unique name under the SemVer-then-lexicographic
/// order.
fn latest_versions(servers: &[ServerJson]) -> Vec<(String, String)> {
    let mut latest: HashMap<&str, &str> = HashMap::new();
    for server in servers {
        latest
            .entry(&server.name)
            .and_modify(|current| {
                if compare_versions(&server.version, current) == Ordering::Greater {
                    *current = &server.version;
                }
            })
            .or_insert(&server.version);
    }
    let mut result: Vec<(String, String)> = latest
        .into_iter()
        .map(|(name, version)| (name.to_string(), version.to_string()))
        .collect();
    result.sort();
    result
}

/// Collapse duplicate `(type, url)` remotes, keeping the first occurrence.
fn dedup_remotes(remotes: &[Remote]) -> (Vec<&Remote>, usize) {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(remotes.len());
    for remote in remotes {
        if seen.insert((remote.transport_type.as_str(), remote.url.as_str())) {
            kept.push(remote);
        }
    }
    let skipped = remotes.len() - kept.len();
    (kept, skipped)
}

/// Input themes "light"/"dark" map onto the DB enum; anything else defaults
/// to LIGHT.
fn map_icon_theme(theme: Option<&str>) -> &'static str {
    match theme.map(str::to_ascii_lowercase).as_deref() {
        Some("dark") => "DARK",
        _ => "LIGHT",
    }
}

fn json_array(values: &[serde_json::Value]) -> Option<String> {
    if values.is_empty() {
        None
    } else {
        Some(serde_json::Value::Array(values.to_vec()).to_string())
    }
}
