//! Error types for mcpsync

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Unsupported source type: {0}")]
    UnsupportedSource(String),

    #[error("Invalid registry data: {0}")]
    DataInvalid(String),

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Invalid filter: {0}")]
    FilterInvalid(String),

    #[error("Storage error: {0}")]
    StorageFailed(String),

    #[error("Storage inconsistency: {0}")]
    StorageInconsistent(String),

    #[error("Registry not found: {0}")]
    RegistryNotFound(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}

impl Error {
    /// Whether the next tick may succeed without operator intervention.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::Config(_) | Error::FilterInvalid(_) | Error::UnsupportedSource(_)
        )
    }
}

/// The sync-level condition a failed attempt violates, mirrored into the
/// persisted status message so operators can tell "the source is down" from
/// "we fetched it but could not store it".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCondition {
    /// The source could not be reached or rejected validation.
    SourceAvailable,
    /// The source was reachable but the sync itself failed.
    SyncSuccessful,
}

impl std::fmt::Display for SyncCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCondition::SourceAvailable => write!(f, "SourceAvailable"),
            SyncCondition::SyncSuccessful => write!(f, "SyncSuccessful"),
        }
    }
}

/// Immediate cause recorded on a failed sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCause {
    HandlerCreationFailed,
    ValidationFailed,
    FetchFailed,
    StorageFailed,
}

impl std::fmt::Display for SyncCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCause::HandlerCreationFailed => write!(f, "handler creation failed"),
            SyncCause::ValidationFailed => write!(f, "source validation failed"),
            SyncCause::FetchFailed => write!(f, "fetch failed"),
            SyncCause::StorageFailed => write!(f, "storage failed"),
        }
    }
}

/// A failed sync attempt: which condition broke, why, and the underlying error.
#[derive(Error, Debug)]
#[error("{condition}: {cause}: {source}")]
pub struct SyncFailure {
    pub condition: SyncCondition,
    pub cause: SyncCause,
    pub source: Error,
}

impl SyncFailure {
    pub fn new(condition: SyncCondition, cause: SyncCause, source: Error) -> Self {
        Self {
            condition,
            cause,
            source,
        }
    }
}

/// Read-API errors mapped onto HTTP responses.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::RegistryNotFound(name) => ApiError::NotFound(name),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": {
                "code": status.as_u16(),
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
