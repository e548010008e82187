//! Configuration validation logic

use crate::config::{Config, SourceType};
use crate::error::{Error, Result};

impl Config {
    /// Validate configuration
    ///
    /// Checks the ConfigInvalid class of errors: these are fatal at startup
    /// rather than retried by the sync loop.
    pub fn validate(&self) -> Result<()> {
        if self.registry_name.is_empty() {
            return Err(Error::Config("registryName cannot be empty".to_string()));
        }

        self.validate_source()?;

        if self.server.port == 0 {
            return Err(Error::Config("Server port must be non-zero".to_string()));
        }

        if self.database.host.is_empty() {
            return Err(Error::Config("database.host cannot be empty".to_string()));
        }
        if self.database.database.is_empty() {
            return Err(Error::Config("database.database cannot be empty".to_string()));
        }

        Ok(())
    }

    /// Exactly one source variant must be populated, and it must match the
    /// declared source type.
    fn validate_source(&self) -> Result<()> {
        let source = &self.source;
        let populated = [
            source.configmap.is_some(),
            source.git.is_some(),
            source.api.is_some(),
            source.file.is_some(),
            source.kubernetes.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();

        if populated != 1 {
            return Err(Error::Config(format!(
                "exactly one source variant must be set, found {}",
                populated
            )));
        }

        match source.source_type {
            SourceType::Configmap => {
                let cm = source.configmap.as_ref().ok_or_else(|| {
                    Error::Config("source.type is configmap but source.configmap is missing".to_string())
                })?;
                if cm.namespace.is_empty() || cm.name.is_empty() || cm.key.is_empty() {
                    return Err(Error::Config(
                        "configmap source requires namespace, name and key".to_string(),
                    ));
                }
            }
            SourceType::Git => {
                let git = source.git.as_ref().ok_or_else(|| {
                    Error::Config("source.type is git but source.git is missing".to_string())
                })?;
                if git.url.is_empty() {
                    return Err(Error::Config("git source requires a url".to_string()));
                }
                if git.path.is_empty() {
                    return Err(Error::Config(
                        "git source requires a path inside the tree".to_string(),
                    ));
                }
            }
            SourceType::Api => {
                let api = source.api.as_ref().ok_or_else(|| {
                    Error::Config("source.type is api but source.api is missing".to_string())
                })?;
                url::Url::parse(&api.endpoint).map_err(|e| {
                    Error::Config(format!("invalid API endpoint {}: {}", api.endpoint, e))
                })?;
            }
            SourceType::File => {
                let file = source.file.as_ref().ok_or_else(|| {
                    Error::Config("source.type is file but source.file is missing".to_string())
                })?;
                if file.path.as_os_str().is_empty() {
                    return Err(Error::Config("file source requires a path".to_string()));
                }
            }
            SourceType::Kubernetes => {
                let k8s = source.kubernetes.as_ref().ok_or_else(|| {
                    Error::Config(
                        "source.type is kubernetes but source.kubernetes is missing".to_string(),
                    )
                })?;
                if k8s.registry_name.is_empty() {
                    return Err(Error::Config(
                        "kubernetes source requires a registryName".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}
