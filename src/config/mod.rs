//! Configuration module for mcpsync
//!
//! Handles loading and validation of the registry sync configuration
//! document (YAML, with a TOML fallback for local tooling).

use crate::error::{Error, Result};
use crate::types::SourceFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod validation;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Identifier of the logical registry this process synchronizes.
    pub registry_name: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub sync_policy: SyncPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterConfig>,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Bind address of the read HTTP API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Where `SyncStatus` is persisted; the catalog itself always lives in
    /// the database.
    #[serde(rename = "type", default)]
    pub storage_type: StorageType,
    #[serde(default = "default_status_file")]
    pub status_file: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    File,
    #[default]
    Database,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    #[serde(default)]
    pub format: SourceFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configmap: Option<ConfigMapSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<ApiSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<KubernetesSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Configmap,
    Git,
    Api,
    File,
    Kubernetes,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Configmap => write!(f, "configmap"),
            SourceType::Git => write!(f, "git"),
            SourceType::Api => write!(f, "api"),
            SourceType::File => write!(f, "file"),
            SourceType::Kubernetes => write!(f, "kubernetes"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfigMapSource {
    pub namespace: String,
    pub name: String,
    #[serde(default = "default_configmap_key")]
    pub key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitSource {
    pub url: String,
    #[serde(rename = "ref", default = "default_git_ref")]
    pub git_ref: String,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiSource {
    pub endpoint: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileSource {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesSource {
    /// Registry name stamped on resources exported from the cluster.
    pub registry_name: String,
    /// Namespaces to list; empty means all namespaces.
    #[serde(default)]
    pub namespaces: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SyncPolicy {
    /// Duration string, e.g. "1h", "30m". Unparseable values fall back to
    /// one minute with a warning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

impl SyncPolicy {
    /// Parsed interval; `None` when not configured at all.
    pub fn interval_duration(&self) -> Option<Duration> {
        let raw = self.interval.as_deref()?;
        match humantime::parse_duration(raw) {
            Ok(d) => Some(d),
            Err(err) => {
                tracing::warn!(interval = raw, %err, "unparseable sync interval, using 1m");
                Some(default_interval())
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct FilterConfig {
    #[serde(default)]
    pub names: NameFilter,
    #[serde(default)]
    pub tags: TagFilter,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct NameFilter {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct TagFilter {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_db_name")]
    pub database: String,
    #[serde(default = "default_sslmode")]
    pub sslmode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_user: Option<String>,
    #[serde(default)]
    pub dynamic_auth: bool,
}

impl DatabaseConfig {
    /// Connection URL for the regular service role. The password falls back
    /// to `PGPASSWORD` so credentials stay out of the config document.
    pub fn url(&self) -> String {
        self.url_for(&self.user)
    }

    /// Connection URL for schema migrations (separate role when configured).
    pub fn migration_url(&self) -> String {
        self.url_for(self.migration_user.as_deref().unwrap_or(&self.user))
    }

    fn url_for(&self, user: &str) -> String {
        let password = self
            .password
            .clone()
            .or_else(|| std::env::var("PGPASSWORD").ok())
            .map(|p| format!(":{}", p))
            .unwrap_or_default();
        format!(
            "postgres://{}{}@{}:{}/{}?sslmode={}",
            user, password, self.host, self.port, self.database, self.sslmode
        )
    }
}

// Default functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_status_file() -> PathBuf {
    PathBuf::from("mcpsync-status.json")
}
fn default_configmap_key() -> String {
    "registry.json".to_string()
}
fn default_git_ref() -> String {
    "main".to_string()
}
fn default_db_host() -> String {
    "localhost".to_string()
}
fn default_db_port() -> u16 {
    5432
}
fn default_db_user() -> String {
    "mcpsync".to_string()
}
fn default_db_name() -> String {
    "mcpsync".to_string()
}
fn default_sslmode() -> String {
    "prefer".to_string()
}

/// Default and fallback sync interval.
pub fn default_interval() -> Duration {
    Duration::from_secs(60)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::default(),
            status_file: default_status_file(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            user: default_db_user(),
            password: None,
            database: default_db_name(),
            sslmode: default_sslmode(),
            migration_user: None,
            dynamic_auth: false,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("yaml");

        match extension {
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse YAML: {}", e))),
            "toml" => toml::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e))),
            _ => Err(Error::Config(format!(
                "Unsupported config format: {}",
                extension
            ))),
        }
    }

    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let config = Self::from_file(path)?;
        config.validate()?;
        Ok(config)
    }
}
