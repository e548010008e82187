//! Local file source handler.

use super::SourceHandler;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::sources::format;
use crate::types::FetchResult;
use async_trait::async_trait;
use std::path::Path;

#[derive(Default)]
pub struct FileSourceHandler;

impl FileSourceHandler {
    pub fn new() -> Self {
        Self
    }

    fn path<'a>(&self, config: &'a Config) -> Result<&'a Path> {
        config
            .source
            .file
            .as_ref()
            .map(|file| file.path.as_path())
            .ok_or_else(|| Error::Config("file source configuration missing".to_string()))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path).await.map_err(|e| {
            Error::SourceUnavailable(format!("reading {}: {}", path.display(), e))
        })
    }
}

#[async_trait]
impl SourceHandler for FileSourceHandler {
    async fn validate(&self, config: &Config) -> Result<()> {
        let path = self.path(config)?;
        let bytes = self.read(path).await?;
        format::parse_registry_document(&bytes, config.source.format)?;
        Ok(())
    }

    async fn fetch_registry(&self, config: &Config) -> Result<FetchResult> {
        let path = self.path(config)?;
        let bytes = self.read(path).await?;
        format::fetch_result_from_document(&bytes, config.source.format)
    }
}
