//! Common test utilities for integration tests

use mcpsync::config::{ApiSource, Config, FileSource, SourceConfig, SourceType, SyncPolicy};
use mcpsync::error::Result;
use mcpsync::storage::RegistryWriter;
use mcpsync::types::{SourceFormat, UpstreamRegistry};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;

/// Registry writer that records stored sets in memory.
#[derive(Default)]
#[allow(dead_code)]
pub struct RecordingWriter {
    pub stored: Mutex<Vec<(String, UpstreamRegistry)>>,
}

#[async_trait]
impl RegistryWriter for RecordingWriter {
    async fn store(&self, registry_name: &str, set: &UpstreamRegistry) -> Result<()> {
        self.stored
            .lock()
            .unwrap()
            .push((registry_name.to_string(), set.clone()));
        Ok(())
    }
}

/// Configuration for an API-backed registry pointing at a mock server.
#[allow(dead_code)]
pub fn api_config(endpoint: &str, format: SourceFormat) -> Config {
    Config {
        registry_name: "test".to_string(),
        server: Default::default(),
        storage: Default::default(),
        source: SourceConfig {
            source_type: SourceType::Api,
            format,
            configmap: None,
            git: None,
            api: Some(ApiSource {
                endpoint: endpoint.to_string(),
            }),
            file: None,
            kubernetes: None,
        },
        sync_policy: SyncPolicy {
            interval: Some("1h".to_string()),
        },
        filter: None,
        database: Default::default(),
    }
}

/// Configuration for a file-backed registry.
#[allow(dead_code)]
pub fn file_config(path: PathBuf, format: SourceFormat) -> Config {
    Config {
        registry_name: "test".to_string(),
        server: Default::default(),
        storage: Default::default(),
        source: SourceConfig {
            source_type: SourceType::File,
            format,
            configmap: None,
            git: None,
            api: None,
            file: Some(FileSource { path }),
            kubernetes: None,
        },
        sync_policy: SyncPolicy {
            interval: Some("1h".to_string()),
        },
        filter: None,
        database: Default::default(),
    }
}

/// A small ToolHive-dialect document with both server collections.
#[allow(dead_code)]
pub fn toolhive_document() -> serde_json::Value {
    serde_json::json!({
        "version": "1.0.0",
        "last_updated": "2025-06-01T00:00:00Z",
        "servers": {
            "prod-db": {
                "image": "ghcr.io/example/prod-db:1.2.0",
                "description": "Production database tools",
                "transport": "stdio",
                "tags": ["prod"]
            },
            "prod-exp": {
                "image": "ghcr.io/example/prod-exp:0.1.0",
                "description": "Experimental production tools",
                "transport": "stdio",
                "tags": ["prod", "experimental"]
            },
            "dev-db": {
                "image": "ghcr.io/example/dev-db:2.0.0",
                "description": "Development database tools",
                "transport": "stdio",
                "tags": ["dev"]
            }
        },
        "remoteServers": {
            "prod-search": {
                "url": "https://search.example.com/mcp",
                "transport": "sse",
                "description": "Hosted search",
                "tags": ["prod"]
            }
        }
    })
}
