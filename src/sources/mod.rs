//! Source handlers: validate, fetch and hash registry documents from each
//! supported upstream kind.
//!
//! Every handler normalizes its payload into [`crate::types::UpstreamRegistry`]
//! before returning, so the rest of the engine never sees dialect- or
//! source-specific shapes. New source kinds plug in via the factory without
//! touching the sync manager.

use crate::config::{Config, SourceType};
use crate::error::{Error, Result};
use crate::types::FetchResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub mod api;
pub mod configmap;
pub mod file;
pub mod format;
pub mod git;
pub mod kubernetes;

pub use api::ApiSourceHandler;
pub use configmap::ConfigMapSourceHandler;
pub use file::FileSourceHandler;
pub use git::GitSourceHandler;
pub use kubernetes::KubernetesSourceHandler;

/// Request timeout applied to every upstream HTTP call.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Ceiling on any single upstream response body.
pub const MAX_RESPONSE_BYTES: usize = 100 * 1024 * 1024;

/// Capability shared by all source kinds.
#[async_trait]
pub trait SourceHandler: Send + Sync {
    /// Pre-flight: verify the source is reachable and speaks the declared
    /// dialect. Must cap body size and time like any other fetch.
    async fn validate(&self, config: &Config) -> Result<()>;

    /// Download, normalize and hash the registry document.
    async fn fetch_registry(&self, config: &Config) -> Result<FetchResult>;

    /// Cheap content-hash probe. The default fetches the full document;
    /// sources with a cheaper probe override this.
    async fn current_hash(&self, config: &Config) -> Result<String> {
        Ok(self.fetch_registry(config).await?.hash)
    }
}

/// Maps a source type tag to a concrete handler, injecting the shared HTTP
/// and Kubernetes clients.
pub struct SourceHandlerFactory {
    http: reqwest::Client,
    kube: Option<kube::Client>,
}

impl SourceHandlerFactory {
    pub fn new(kube: Option<kube::Client>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("mcpsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, kube })
    }

    pub fn create(&self, source_type: SourceType) -> Result<Arc<dyn SourceHandler>> {
        match source_type {
            SourceType::Api => Ok(Arc::new(ApiSourceHandler::new(self.http.clone()))),
            SourceType::File => Ok(Arc::new(FileSourceHandler::new())),
            SourceType::Git => Ok(Arc::new(GitSourceHandler::new())),
            SourceType::Configmap => {
                let client = self.require_kube()?;
                Ok(Arc::new(ConfigMapSourceHandler::new(client)))
            }
            SourceType::Kubernetes => {
                let client = self.require_kube()?;
                Ok(Arc::new(KubernetesSourceHandler::new(client)))
            }
        }
    }

    fn require_kube(&self) -> Result<kube::Client> {
        self.kube.clone().ok_or_else(|| {
            Error::UnsupportedSource(
                "kubernetes-backed source configured but no cluster client is available"
                    .to_string(),
            )
        })
    }
}

/// GET a URL with the shared size ceiling. Returns `FetchFailed` for
/// HTTP >= 400 and for oversized bodies.
pub(crate) async fn http_get_capped(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::SourceUnavailable(format!("GET {}: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::FetchFailed(format!("HTTP {} from {}", status, url)));
    }

    if let Some(length) = response.content_length() {
        if length as usize > MAX_RESPONSE_BYTES {
            return Err(Error::FetchFailed(format!(
                "response from {} exceeds {} byte cap",
                url, MAX_RESPONSE_BYTES
            )));
        }
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| Error::FetchFailed(format!("reading body from {}: {}", url, e)))?;

    if body.len() > MAX_RESPONSE_BYTES {
        return Err(Error::FetchFailed(format!(
            "response from {} exceeds {} byte cap",
            url, MAX_RESPONSE_BYTES
        )));
    }

    crate::metrics::FETCH_BYTES_TOTAL
        .with_label_values(&["http"])
        .inc_by(body.len() as f64);

    Ok(body.to_vec())
}
