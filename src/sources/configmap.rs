//! Kubernetes ConfigMap source handler: the registry document lives under a
//! single key of a ConfigMap (plain or binary data).

use super::SourceHandler;
use crate::config::{Config, ConfigMapSource};
use crate::error::{Error, Result};
use crate::sources::format;
use crate::types::FetchResult;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::Api;

pub struct ConfigMapSourceHandler {
    client: kube::Client,
}

impl ConfigMapSourceHandler {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn source<'a>(&self, config: &'a Config) -> Result<&'a ConfigMapSource> {
        config
            .source
            .configmap
            .as_ref()
            .ok_or_else(|| Error::Config("configmap source configuration missing".to_string()))
    }

    async fn read_document(&self, source: &ConfigMapSource) -> Result<Vec<u8>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &source.namespace);
        let configmap = api.get(&source.name).await.map_err(|e| {
            Error::SourceUnavailable(format!(
                "reading ConfigMap {}/{}: {}",
                source.namespace, source.name, e
            ))
        })?;

        if let Some(data) = configmap.data.as_ref().and_then(|d| d.get(&source.key)) {
            return Ok(data.clone().into_bytes());
        }
        if let Some(binary) = configmap
            .binary_data
            .as_ref()
            .and_then(|d| d.get(&source.key))
        {
            return Ok(binary.0.clone());
        }

        Err(Error::DataInvalid(format!(
            "ConfigMap {}/{} has no key {:?}",
            source.namespace, source.name, source.key
        )))
    }
}

#[async_trait]
impl SourceHandler for ConfigMapSourceHandler {
    async fn validate(&self, config: &Config) -> Result<()> {
        let source = self.source(config)?;
        let bytes = self.read_document(source).await?;
        format::parse_registry_document(&bytes, config.source.format)?;
        Ok(())
    }

    async fn fetch_registry(&self, config: &Config) -> Result<FetchResult> {
        let source = self.source(config)?;
        let bytes = self.read_document(source).await?;
        format::fetch_result_from_document(&bytes, config.source.format)
    }
}
