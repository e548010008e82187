//! Kubernetes custom-resource source handler.
//!
//! Lists the ToolHive MCP custom resources and synthesizes one canonical
//! server record per resource that opted into registry export via
//! annotations. Listing order from the API server is not stable, so the
//! extracted set is sorted by name before hashing.

use super::SourceHandler;
use crate::config::{Config, KubernetesSource};
use crate::error::{Error, Result};
use crate::types::{FetchResult, Remote, ServerJson, SourceFormat, UpstreamRegistry};
use async_trait::async_trait;
use kube::api::{Api, ApiResource, DynamicObject, ListParams};
use kube::core::GroupVersionKind;
use std::collections::BTreeMap;

const GROUP: &str = "toolhive.stacklok.dev";
const VERSION: &str = "v1alpha1";
const KINDS: [&str; 3] = ["MCPServer", "VirtualMCPServer", "MCPRemoteProxy"];

pub const EXPORT_ANNOTATION: &str = "toolhive.stacklok.dev/registry-export";
pub const DESCRIPTION_ANNOTATION: &str = "toolhive.stacklok.dev/registry-description";
pub const URL_ANNOTATION: &str = "toolhive.stacklok.dev/registry-url";
pub const TRANSPORT_ANNOTATION: &str = "toolhive.stacklok.dev/registry-transport";

/// Synthesized reverse-DNS names are capped at this length.
const MAX_NAME_LEN: usize = 200;

const DEFAULT_TRANSPORT: &str = "streamable-http";

pub struct KubernetesSourceHandler {
    client: kube::Client,
}

impl KubernetesSourceHandler {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn source<'a>(&self, config: &'a Config) -> Result<&'a KubernetesSource> {
        config
            .source
            .kubernetes
            .as_ref()
            .ok_or_else(|| Error::Config("kubernetes source configuration missing".to_string()))
    }

    fn apis_for(&self, kind: &str, source: &KubernetesSource) -> Vec<Api<DynamicObject>> {
        let gvk = GroupVersionKind::gvk(GROUP, VERSION, kind);
        let resource = ApiResource::from_gvk(&gvk);

        if source.namespaces.is_empty() {
            vec![Api::all_with(self.client.clone(), &resource)]
        } else {
            source
                .namespaces
                .iter()
                .map(|ns| Api::namespaced_with(self.client.clone(), ns, &resource))
                .collect()
        }
    }

    async fn collect_servers(&self, source: &KubernetesSource) -> Result<Vec<ServerJson>> {
        let mut servers = Vec::new();

        for kind in KINDS {
            for api in self.apis_for(kind, source) {
                let list = match api.list(&ListParams::default()).await {
                    Ok(list) => list,
                    // A cluster without one of the CRDs installed is fine;
                    // the other kinds still contribute.
                    Err(kube::Error::Api(response)) if response.code == 404 => {
                        tracing::debug!(kind, "custom resource kind not installed, skipping");
                        continue;
                    }
                    Err(err) => {
                        return Err(Error::SourceUnavailable(format!(
                            "listing {}: {}",
                            kind, err
                        )))
                    }
                };

                for object in list.items {
                    let namespace = object.metadata.namespace.clone().unwrap_or_default();
                    let name = object.metadata.name.clone().unwrap_or_default();
                    let annotations = object.metadata.annotations.clone().unwrap_or_default();

                    if let Some(server) = extract_server(&namespace, &name, &annotations) {
                        servers.push(server);
                    }
                }
            }
        }

        servers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(servers)
    }
}

/// Build a canonical server record from an exported resource, or `None`
/// when the resource did not opt in or lacks required annotations.
pub fn extract_server(
    namespace: &str,
    resource_name: &str,
    annotations: &BTreeMap<String, String>,
) -> Option<ServerJson> {
    if annotations.get(EXPORT_ANNOTATION).map(String::as_str) != Some("true") {
        return None;
    }

    let description = annotations.get(DESCRIPTION_ANNOTATION)?;
    let url = annotations.get(URL_ANNOTATION)?;
    if description.is_empty() || url.is_empty() {
        return None;
    }

    let transport = annotations
        .get(TRANSPORT_ANNOTATION)
        .cloned()
        .unwrap_or_else(|| DEFAULT_TRANSPORT.to_string());

    Some(ServerJson {
        name: synthesize_name(namespace, resource_name),
        version: "latest".to_string(),
        description: Some(description.clone()),
        remotes: vec![Remote {
            transport_type: transport,
            url: url.clone(),
            headers: Vec::new(),
        }],
        ..Default::default()
    })
}

/// Reverse-DNS name for a cluster resource, capped at 200 characters.
fn synthesize_name(namespace: &str, resource_name: &str) -> String {
    let mut name = format!("com.toolhive.k8s.{}/{}", namespace, resource_name);
    if name.len() > MAX_NAME_LEN {
        name.truncate(MAX_NAME_LEN);
    }
    name
}

#[async_trait]
impl SourceHandler for KubernetesSourceHandler {
    /// Reachability probe: one bounded list call against the primary kind.
    async fn validate(&self, config: &Config) -> Result<()> {
        let source = self.source(config)?;
        let api = self
            .apis_for(KINDS[0], source)
            .into_iter()
            .next()
            .expect("apis_for always yields at least one api");

        match api.list(&ListParams::default().limit(1)).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
            Err(err) => Err(Error::SourceUnavailable(format!(
                "listing {}: {}",
                KINDS[0], err
            ))),
        }
    }

    async fn fetch_registry(&self, config: &Config) -> Result<FetchResult> {
        let source = self.source(config)?;
        let servers = self.collect_servers(source).await?;

        let registry = UpstreamRegistry {
            servers,
            ..Default::default()
        };
        FetchResult::from_registry(registry, SourceFormat::Upstream)
    }
}
