//! Read-side queries: reassemble canonical server records from the
//! relational rows for the HTTP API.

use crate::error::{Error, Result};
use crate::types::{Header, Icon, Package, Remote, Repository, ServerJson, ServerMeta, Transport};
use sqlx::postgres::PgPool;
use sqlx::Row;
use uuid::Uuid;

/// Number of distinct server names currently stored for a registry.
pub async fn total_servers(pool: &PgPool, registry: &str) -> Result<i64> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS total
        FROM latest_server_version l
        JOIN registry r ON r.id = l.reg_id
        WHERE r.name = $1
        "#,
    )
    .bind(registry)
    .fetch_one(pool)
    .await?;
    Ok(row.get("total"))
}

/// Latest version of each server, ordered by name. `cursor` is the last
/// name of the previous page.
pub async fn list_latest_servers(
    pool: &PgPool,
    registry: &str,
    limit: i64,
    cursor: Option<&str>,
) -> Result<Vec<ServerJson>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.name, s.version, s.description, s.title, s.website_url,
               s.upstream_meta, s.server_meta, s.repository_url, s.repository_source,
               s.repository_id, s.repository_subfolder
        FROM latest_server_version l
        JOIN registry r ON r.id = l.reg_id
        JOIN mcp_server s ON s.id = l.server_id
        WHERE r.name = $1 AND ($3::text IS NULL OR s.name > $3)
        ORDER BY s.name
        LIMIT $2
        "#,
    )
    .bind(registry)
    .bind(limit)
    .bind(cursor)
    .fetch_all(pool)
    .await?;

    let servers = rows.into_iter().map(base_server).collect::<Result<Vec<_>>>()?;
    attach_children(pool, servers).await
}

/// One server by name: the latest version, or the exact version when given.
pub async fn get_server(
    pool: &PgPool,
    registry: &str,
    name: &str,
    version: Option<&str>,
) -> Result<Option<ServerJson>> {
    let row = match version {
        Some(version) => {
            sqlx::query(
                r#"
                SELECT s.id, s.name, s.version, s.description, s.title, s.website_url,
                       s.upstream_meta, s.server_meta, s.repository_url, s.repository_source,
                       s.repository_id, s.repository_subfolder
                FROM mcp_server s
                JOIN registry r ON r.id = s.reg_id
                WHERE r.name = $1 AND s.name = $2 AND s.version = $3
                "#,
            )
            .bind(registry)
            .bind(name)
            .bind(version)
            .fetch_optional(pool)
            .await?
        }
        None => {
            sqlx::query(
                r#"
                SELECT s.id, s.name, s.version, s.description, s.title, s.website_url,
                       s.upstream_meta, s.server_meta, s.repository_url, s.repository_source,
                       s.repository_id, s.repository_subfolder
                FROM latest_server_version l
                JOIN registry r ON r.id = l.reg_id
                JOIN mcp_server s ON s.id = l.server_id
                WHERE r.name = $1 AND l.name = $2
                "#,
            )
            .bind(registry)
            .bind(name)
            .fetch_optional(pool)
            .await?
        }
    };

    let Some(row) = row else {
        return Ok(None);
    };
    let servers = attach_children(pool, vec![base_server(row)?]).await?;
    Ok(servers.into_iter().next())
}

struct PartialServer {
    id: Uuid,
    server: ServerJson,
}

fn base_server(row: sqlx::postgres::PgRow) -> Result<PartialServer> {
    let id: Uuid = row.get("id");
    let upstream_meta: Option<serde_json::Value> = row.get("upstream_meta");
    let server_meta: Option<serde_json::Value> = row.get("server_meta");

    let (schema, tags) = match upstream_meta {
        Some(meta) => {
            let schema = meta
                .get("schema")
                .and_then(|v| v.as_str())
                .map(String::from);
            let tags = meta
                .get("tags")
                .and_then(|v| v.as_array())
                .map(|values| {
                    values
                        .iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();
            (schema, tags)
        }
        None => (None, Vec::new()),
    };

    let meta = match server_meta {
        Some(serde_json::Value::Object(map)) => Some(ServerMeta {
            publisher_provided: Some(map),
        }),
        Some(other) => {
            return Err(Error::StorageInconsistent(format!(
                "server_meta is not an object: {}",
                other
            )))
        }
        None => None,
    };

    let repository = row
        .get::<Option<String>, _>("repository_url")
        .map(|url| Repository {
            url,
            source: row.get("repository_source"),
            id: row.get("repository_id"),
            subfolder: row.get("repository_subfolder"),
        });

    Ok(PartialServer {
        id,
        server: ServerJson {
            schema,
            name: row.get("name"),
            version: row.get("version"),
            description: row.get("description"),
            title: row.get("title"),
            website_url: row.get("website_url"),
            repository,
            packages: Vec::new(),
            remotes: Vec::new(),
            icons: Vec::new(),
            tags,
            meta,
        },
    })
}

async fn attach_children(
    pool: &PgPool,
    partials: Vec<PartialServer>,
) -> Result<Vec<ServerJson>> {
    let ids: Vec<Uuid> = partials.iter().map(|p| p.id).collect();
    let mut servers: Vec<(Uuid, ServerJson)> =
        partials.into_iter().map(|p| (p.id, p.server)).collect();

    let package_rows = sqlx::query(
        r#"
        SELECT server_id, registry_type, registry_base_url, identifier, version, runtime_hint,
               runtime_args, package_args, env_vars, sha256, transport
        FROM mcp_server_package
        WHERE server_id = ANY($1)
        ORDER BY identifier, version
        "#,
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    for row in package_rows {
        let server_id: Uuid = row.get("server_id");
        let transport: Option<serde_json::Value> = row.get("transport");
        let package = Package {
            registry_type: row.get("registry_type"),
            registry_base_url: row.get("registry_base_url"),
            identifier: row.get("identifier"),
            version: row.get("version"),
            runtime_hint: row.get("runtime_hint"),
            runtime_arguments: json_values(row.get("runtime_args")),
            package_arguments: json_values(row.get("package_args")),
            environment_variables: json_values(row.get("env_vars")),
            sha256: row.get("sha256"),
            transport: transport
                .map(serde_json::from_value::<Transport>)
                .transpose()
                .map_err(|e| Error::StorageInconsistent(format!("package transport: {}", e)))?,
        };
        if let Some((_, server)) = servers.iter_mut().find(|(id, _)| *id == server_id) {
            server.packages.push(package);
        }
    }

    let remote_rows = sqlx::query(
        r#"
        SELECT server_id, transport, transport_url, headers
        FROM mcp_server_remote
        WHERE server_id = ANY($1)
        ORDER BY transport, transport_url
        "#,
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    for row in remote_rows {
        let server_id: Uuid = row.get("server_id");
        let headers: Option<serde_json::Value> = row.get("headers");
        let remote = Remote {
            transport_type: row.get("transport"),
            url: row.get("transport_url"),
            headers: headers
                .map(serde_json::from_value::<Vec<Header>>)
                .transpose()
                .map_err(|e| Error::StorageInconsistent(format!("remote headers: {}", e)))?
                .unwrap_or_default(),
        };
        if let Some((_, server)) = servers.iter_mut().find(|(id, _)| *id == server_id) {
            server.remotes.push(remote);
        }
    }

    let icon_rows = sqlx::query(
        r#"
        SELECT server_id, source_uri, mime_type, theme::text AS theme
        FROM mcp_server_icon
        WHERE server_id = ANY($1)
        ORDER BY source_uri, theme
        "#,
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    for row in icon_rows {
        let server_id: Uuid = row.get("server_id");
        let mime_type: String = row.get("mime_type");
        let theme: String = row.get("theme");
        let icon = Icon {
            src: row.get("source_uri"),
            mime_type: (!mime_type.is_empty()).then_some(mime_type),
            theme: Some(theme.to_ascii_lowercase()),
        };
        if let Some((_, server)) = servers.iter_mut().find(|(id, _)| *id == server_id) {
            server.icons.push(icon);
        }
    }

    Ok(servers.into_iter().map(|(_, server)| server).collect())
}

fn json_values(value: Option<serde_json::Value>) -> Vec<serde_json::Value> {
    match value {
        Some(serde_json::Value::Array(values)) => values,
        _ => Vec::new(),
    }
}
