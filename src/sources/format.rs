//! Dialect normalization: parse raw registry documents into the canonical
//! shape. One parse function per dialect arm; no runtime type sniffing.

use crate::error::{Error, Result};
use crate::types::toolhive::ToolhiveRegistry;
use crate::types::{FetchResult, ServerJson, SourceFormat, UpstreamRegistry};

/// Prefix every Upstream-dialect schema URL must carry. The date segment is
/// a version tag carried through but not validated semantically.
pub const UPSTREAM_SCHEMA_PREFIX: &str = "https://static.modelcontextprotocol.io/schemas/";

/// Parse a raw document in the given dialect into the canonical registry.
pub fn parse_registry_document(bytes: &[u8], format: SourceFormat) -> Result<UpstreamRegistry> {
    match format {
        SourceFormat::Toolhive => parse_toolhive(bytes),
        SourceFormat::Upstream => parse_upstream(bytes),
    }
}

/// Parse and wrap into a [`FetchResult`] with hash and server count.
pub fn fetch_result_from_document(bytes: &[u8], format: SourceFormat) -> Result<FetchResult> {
    let registry = parse_registry_document(bytes, format)?;
    FetchResult::from_registry(registry, format)
}

fn parse_toolhive(bytes: &[u8]) -> Result<UpstreamRegistry> {
    let document: ToolhiveRegistry = serde_json::from_slice(bytes)
        .map_err(|e| Error::DataInvalid(format!("toolhive document: {}", e)))?;
    Ok(document.into_upstream())
}

fn parse_upstream(bytes: &[u8]) -> Result<UpstreamRegistry> {
    // Accept both the enveloped form and a bare ServerJSON array.
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| Error::DataInvalid(format!("upstream document: {}", e)))?;

    let registry = if value.is_array() {
        let servers: Vec<ServerJson> = serde_json::from_value(value)
            .map_err(|e| Error::DataInvalid(format!("upstream server list: {}", e)))?;
        UpstreamRegistry {
            servers,
            ..Default::default()
        }
    } else {
        serde_json::from_value(value)
            .map_err(|e| Error::DataInvalid(format!("upstream document: {}", e)))?
    };

    if let Some(schema) = &registry.schema {
        if !schema.starts_with(UPSTREAM_SCHEMA_PREFIX) {
            return Err(Error::DataInvalid(format!(
                "unexpected schema URL: {}",
                schema
            )));
        }
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_enveloped_upstream_document() {
        let doc = r#"{
            "$schema": "https://static.modelcontextprotocol.io/schemas/2025-07-09/server.schema.json",
            "version": "2.0",
            "servers": [
                {"name": "com.example/echo", "version": "1.0.0"}
            ]
        }"#;
        let registry = parse_registry_document(doc.as_bytes(), SourceFormat::Upstream).unwrap();
        assert_eq!(registry.servers.len(), 1);
        assert_eq!(registry.servers[0].name, "com.example/echo");
    }

    #[test]
    fn parses_bare_server_array() {
        let doc = r#"[{"name": "com.example/echo", "version": "1.0.0"}]"#;
        let registry = parse_registry_document(doc.as_bytes(), SourceFormat::Upstream).unwrap();
        assert_eq!(registry.servers.len(), 1);
    }

    #[test]
    fn rejects_foreign_schema_url() {
        let doc = r#"{"$schema": "https://example.com/other.json", "servers": []}"#;
        let result = parse_registry_document(doc.as_bytes(), SourceFormat::Upstream);
        assert!(matches!(result, Err(Error::DataInvalid(_))));
    }

    #[test]
    fn rejects_malformed_json() {
        let result = parse_registry_document(b"{not json", SourceFormat::Toolhive);
        assert!(matches!(result, Err(Error::DataInvalid(_))));
    }

    #[test]
    fn toolhive_document_normalizes_and_counts() {
        let doc = r#"{
            "version": "1.0.0",
            "servers": {
                "alpha": {"image": "ghcr.io/x/alpha:1.0.0", "transport": "stdio"}
            },
            "remoteServers": {
                "beta": {"url": "https://beta.example.com/mcp"}
            }
        }"#;
        let result = fetch_result_from_document(doc.as_bytes(), SourceFormat::Toolhive).unwrap();
        assert_eq!(result.server_count, 2);
        assert_eq!(result.hash.len(), 64);
        assert_eq!(result.format, SourceFormat::Toolhive);
    }
}
