//! ToolHive-dialect registry documents and their normalization.
//!
//! The ToolHive format keys servers by name and splits container-backed
//! servers from remote servers. Normalization flattens both maps into the
//! canonical [`UpstreamRegistry`] sequence: container images become the
//! server's single package, remote transport config becomes its remote.

use super::{Header, Package, Remote, ServerJson, Transport, UpstreamRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version recorded when a ToolHive entry carries no usable tag.
const DEFAULT_VERSION: &str = "latest";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolhiveRegistry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    /// Container-backed servers keyed by name. BTreeMap keeps normalization
    /// order stable across fetches of the same document.
    #[serde(default)]
    pub servers: BTreeMap<String, ImageMetadata>,
    #[serde(
        rename = "remoteServers",
        alias = "remote_servers",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub remote_servers: BTreeMap<String, RemoteMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_vars: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteMetadata {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Header>,
}

impl ToolhiveRegistry {
    /// Normalize into the canonical registry shape.
    pub fn into_upstream(self) -> UpstreamRegistry {
        let mut servers = Vec::with_capacity(self.servers.len() + self.remote_servers.len());

        for (name, image) in self.servers {
            servers.push(image_to_server(name, image));
        }
        for (name, remote) in self.remote_servers {
            servers.push(remote_to_server(name, remote));
        }

        UpstreamRegistry {
            schema: None,
            version: self.version,
            last_updated: self.last_updated,
            servers,
        }
    }
}

fn image_to_server(name: String, image: ImageMetadata) -> ServerJson {
    let (identifier, version) = split_image_reference(&image.image);

    let package = Package {
        registry_type: "oci".to_string(),
        registry_base_url: None,
        identifier,
        version: version.clone(),
        runtime_hint: None,
        runtime_arguments: image.args,
        package_arguments: Vec::new(),
        environment_variables: image.env_vars,
        sha256: None,
        transport: image.transport.map(|t| Transport {
            transport_type: t,
            url: None,
            headers: Vec::new(),
        }),
    };

    ServerJson {
        name,
        version,
        description: image.description,
        repository: image.repository_url.map(|url| super::Repository {
            url,
            ..Default::default()
        }),
        packages: vec![package],
        tags: image.tags,
        ..Default::default()
    }
}

fn remote_to_server(name: String, remote: RemoteMetadata) -> ServerJson {
    ServerJson {
        name,
        version: DEFAULT_VERSION.to_string(),
        description: remote.description,
        repository: remote.repository_url.map(|url| super::Repository {
            url,
            ..Default::default()
        }),
        remotes: vec![Remote {
            transport_type: remote
                .transport
                .unwrap_or_else(|| "streamable-http".to_string()),
            url: remote.url,
            headers: remote.headers,
        }],
        tags: remote.tags,
        ..Default::default()
    }
}

/// Split an OCI image reference into identifier and tag. Digest-pinned
/// references keep the digest as the version. A port in the registry host
/// (`host:5000/repo`) is not a tag.
fn split_image_reference(image: &str) -> (String, String) {
    if let Some((identifier, digest)) = image.split_once('@') {
        return (identifier.to_string(), digest.to_string());
    }
    match image.rsplit_once(':') {
        Some((identifier, tag)) if !tag.contains('/') => {
            (identifier.to_string(), tag.to_string())
        }
        _ => (image.to_string(), DEFAULT_VERSION.to_string()),
    }
}
