//! HTTP API source handler.
//!
//! Supports both dialects: a ToolHive registry service (probed via
//! `/v0/info`, document at `/v0/registry`) and an Upstream MCP registry
//! (probed via `/openapi.yaml`, servers listed at `/v0/servers` with
//! per-server detail fetches).

use super::{http_get_capped, SourceHandler};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::sources::format;
use crate::types::{FetchResult, ServerJson, SourceFormat, UpstreamRegistry};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;

/// Marker the Upstream registry's OpenAPI description must carry.
const UPSTREAM_DESCRIPTION_MARKER: &str = "https://github.com/modelcontextprotocol/registry";

/// Required `info.version` of the Upstream registry's OpenAPI document.
const UPSTREAM_OPENAPI_VERSION: &str = "1.0.0";

/// Page size for Upstream server listings.
const LIST_LIMIT: usize = 100;

/// Concurrent per-server detail fetches.
const DETAIL_CONCURRENCY: usize = 8;

pub struct ApiSourceHandler {
    http: reqwest::Client,
}

impl ApiSourceHandler {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn endpoint<'a>(&self, config: &'a Config) -> Result<&'a str> {
        config
            .source
            .api
            .as_ref()
            .map(|api| api.endpoint.trim_end_matches('/'))
            .ok_or_else(|| Error::Config("api source configuration missing".to_string()))
    }

    /// ToolHive probe: `/v0/info` must return a version string and a
    /// non-negative server count.
    async fn validate_toolhive(&self, endpoint: &str) -> Result<()> {
        #[derive(Deserialize)]
        struct Info {
            version: String,
            total_servers: i64,
        }

        let body = http_get_capped(&self.http, &format!("{}/v0/info", endpoint)).await?;
        let info: Info = serde_json::from_slice(&body)
            .map_err(|e| Error::DataInvalid(format!("/v0/info response: {}", e)))?;

        if info.version.is_empty() || info.total_servers < 0 {
            return Err(Error::DataInvalid(format!(
                "implausible /v0/info response: version={:?} total_servers={}",
                info.version, info.total_servers
            )));
        }
        Ok(())
    }

    /// Upstream probe: `/openapi.yaml` must describe the canonical MCP
    /// registry API.
    async fn validate_upstream(&self, endpoint: &str) -> Result<()> {
        let body = http_get_capped(&self.http, &format!("{}/openapi.yaml", endpoint)).await?;
        let document: serde_yaml::Value = serde_yaml::from_slice(&body)
            .map_err(|e| Error::DataInvalid(format!("openapi.yaml: {}", e)))?;

        let info = &document["info"];
        let version = info["version"].as_str().unwrap_or_default();
        let description = info["description"].as_str().unwrap_or_default();

        if version != UPSTREAM_OPENAPI_VERSION {
            return Err(Error::DataInvalid(format!(
                "unexpected openapi info.version: {:?}",
                version
            )));
        }
        if !description.contains(UPSTREAM_DESCRIPTION_MARKER) {
            return Err(Error::DataInvalid(
                "openapi info.description does not identify an MCP registry".to_string(),
            ));
        }
        Ok(())
    }

    async fn fetch_toolhive(&self, endpoint: &str) -> Result<FetchResult> {
        let body = http_get_capped(&self.http, &format!("{}/v0/registry", endpoint)).await?;
        format::fetch_result_from_document(&body, SourceFormat::Toolhive)
    }

    async fn fetch_upstream(&self, endpoint: &str) -> Result<FetchResult> {
        let summaries = self.list_servers(endpoint).await?;

        // Per-server detail fetches run concurrently but `buffered` keeps
        // input order, so the normalized sequence is deterministic.
        let servers: Vec<ServerJson> = stream::iter(summaries.into_iter().map(|summary| {
            let http = self.http.clone();
            let endpoint = endpoint.to_string();
            async move {
                match fetch_server_detail(&http, &endpoint, &summary.name).await {
                    Ok(detail) => detail,
                    Err(err) => {
                        // A single broken detail endpoint must not fail the
                        // whole sync; the summary record is still usable.
                        tracing::warn!(server = %summary.name, %err, "detail fetch failed, using summary");
                        summary
                    }
                }
            }
        }))
        .buffered(DETAIL_CONCURRENCY)
        .collect()
        .await;

        let registry = UpstreamRegistry {
            servers,
            ..Default::default()
        };
        FetchResult::from_registry(registry, SourceFormat::Upstream)
    }

    async fn list_servers(&self, endpoint: &str) -> Result<Vec<ServerJson>> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ListMetadata {
            next_cursor: Option<String>,
        }

        #[derive(Deserialize)]
        struct ListResponse {
            #[serde(default)]
            servers: Vec<ServerJson>,
            #[serde(default)]
            metadata: Option<ListMetadata>,
        }

        let mut servers = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let url = match &cursor {
                Some(cursor) => format!(
                    "{}/v0/servers?limit={}&cursor={}",
                    endpoint, LIST_LIMIT, cursor
                ),
                None => format!("{}/v0/servers?limit={}", endpoint, LIST_LIMIT),
            };

            let body = http_get_capped(&self.http, &url).await?;
            let page: ListResponse = serde_json::from_slice(&body)
                .map_err(|e| Error::DataInvalid(format!("server list page: {}", e)))?;

            servers.extend(page.servers);

            match page.metadata.and_then(|m| m.next_cursor) {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        Ok(servers)
    }
}

async fn fetch_server_detail(
    http: &reqwest::Client,
    endpoint: &str,
    name: &str,
) -> Result<ServerJson> {
    let encoded: String = url::form_urlencoded::byte_serialize(name.as_bytes()).collect();
    let body = http_get_capped(http, &format!("{}/v0/servers/{}", endpoint, encoded)).await?;

    let value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| Error::DataInvalid(format!("server detail: {}", e)))?;

    // Some registry builds wrap the record in {"server": ...}.
    let record = match value.get("server") {
        Some(inner) => inner.clone(),
        None => value,
    };

    serde_json::from_value(record).map_err(|e| Error::DataInvalid(format!("server detail: {}", e)))
}

#[async_trait]
impl SourceHandler for ApiSourceHandler {
    async fn validate(&self, config: &Config) -> Result<()> {
        let endpoint = self.endpoint(config)?;
        match config.source.format {
            SourceFormat::Toolhive => self.validate_toolhive(endpoint).await,
            SourceFormat::Upstream => self.validate_upstream(endpoint).await,
        }
    }

    async fn fetch_registry(&self, config: &Config) -> Result<FetchResult> {
        let endpoint = self.endpoint(config)?;
        match config.source.format {
            SourceFormat::Toolhive => self.fetch_toolhive(endpoint).await,
            SourceFormat::Upstream => self.fetch_upstream(endpoint).await,
        }
    }
}
