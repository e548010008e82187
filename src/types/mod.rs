//! Canonical registry data model.
//!
//! Every source dialect is normalized into [`UpstreamRegistry`] before it
//! crosses the sync boundary; the writer, the filter pipeline, and the hash
//! computation all operate on this shape only.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

pub mod toolhive;

/// Registry document dialect tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    #[default]
    Toolhive,
    Upstream,
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFormat::Toolhive => write!(f, "toolhive"),
            SourceFormat::Upstream => write!(f, "upstream"),
        }
    }
}

/// Top-level container for a normalized registry snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamRegistry {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub servers: Vec<ServerJson>,
}

/// Canonical server record (Upstream-dialect `ServerJSON`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerJson {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<Repository>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<Package>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remotes: Vec<Remote>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub icons: Vec<Icon>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ServerMeta>,
}

impl ServerJson {
    /// Identity of this record within a registry.
    pub fn key(&self) -> (&str, &str) {
        (&self.name, &self.version)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subfolder: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub registry_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_base_url: Option<String>,
    pub identifier: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub runtime_arguments: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub package_arguments: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment_variables: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<Transport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transport {
    #[serde(rename = "type")]
    pub transport_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Header>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Remote {
    #[serde(rename = "type")]
    pub transport_type: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Header>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_required: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_secret: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Icon {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
}

/// Publisher-provided extension payload, preserved byte-for-byte through
/// storage. `serde_json::Map` is BTree-backed so key order is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher_provided: Option<serde_json::Map<String, serde_json::Value>>,
}

impl UpstreamRegistry {
    /// Canonical serialization used for content digests. Struct fields
    /// serialize in declaration order and all maps sort their keys, so two
    /// equal registries always produce byte-identical output.
    pub fn canonical_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// SHA-256 of the canonical serialization, lowercase hex.
    pub fn content_hash(&self) -> Result<String> {
        let bytes = self.canonical_json()?;
        let digest = Sha256::digest(&bytes);
        Ok(format!("{:x}", digest))
    }
}

/// Result of one successful fetch from a source.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub registry: UpstreamRegistry,
    pub server_count: usize,
    pub hash: String,
    pub format: SourceFormat,
}

impl FetchResult {
    pub fn from_registry(registry: UpstreamRegistry, format: SourceFormat) -> Result<Self> {
        let hash = registry.content_hash()?;
        let server_count = registry.servers.len();
        Ok(Self {
            registry,
            server_count,
            hash,
            format,
        })
    }
}

/// Order two version strings: SemVer when both parse, lexicographic otherwise.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_registry() -> UpstreamRegistry {
        UpstreamRegistry {
            schema: None,
            version: Some("1.0".to_string()),
            last_updated: Some("2025-06-01T00:00:00Z".to_string()),
            servers: vec![ServerJson {
                name: "com.example/echo".to_string(),
                version: "1.2.3".to_string(),
                description: Some("Echo server".to_string()),
                remotes: vec![Remote {
                    transport_type: "sse".to_string(),
                    url: "https://echo.example.com/sse".to_string(),
                    headers: vec![],
                }],
                ..Default::default()
            }],
        }
    }

    #[test]
    fn content_hash_is_deterministic() {
        let a = sample_registry();
        let b = sample_registry();
        assert_eq!(a.content_hash().unwrap(), b.content_hash().unwrap());
    }

    #[test]
    fn content_hash_reflects_changes() {
        let a = sample_registry();
        let mut b = sample_registry();
        b.servers[0].version = "1.2.4".to_string();
        assert_ne!(a.content_hash().unwrap(), b.content_hash().unwrap());
    }

    #[test]
    fn content_hash_is_lowercase_hex() {
        let hash = sample_registry().content_hash().unwrap();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn semver_ordering_wins_when_parseable() {
        assert_eq!(compare_versions("2.0.0", "10.0.0"), Ordering::Less);
        assert_eq!(compare_versions("1.5.0", "1.5.0"), Ordering::Equal);
        assert_eq!(compare_versions("2.0.0", "1.9.9"), Ordering::Greater);
    }

    #[test]
    fn lexicographic_fallback_for_freeform_versions() {
        // "10" < "2" lexicographically; only applies when SemVer fails
        assert_eq!(compare_versions("v10", "v2"), Ordering::Less);
        assert_eq!(compare_versions("2024-01", "2024-02"), Ordering::Less);
    }

    #[test]
    fn empty_collections_are_omitted_from_canonical_json() {
        let registry = sample_registry();
        let json = String::from_utf8(registry.canonical_json().unwrap()).unwrap();
        assert!(!json.contains("packages"));
        assert!(!json.contains("icons"));
        assert!(!json.contains("tags"));
    }
}
