//! Read HTTP API serving the stored catalog.
//!
//! The API only ever reads committed rows and the cached status snapshot;
//! it keeps serving the last successful sync while the loop retries
//! failures. The one write-shaped endpoint, `POST /v0/sync`, just pokes the
//! coordinator's manual trigger.

use crate::error::ApiError;
use crate::metrics;
use crate::status::SyncStatus;
use crate::storage::queries;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::postgres::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

const DEFAULT_PAGE_LIMIT: i64 = 50;
const MAX_PAGE_LIMIT: i64 = 200;

/// Shared application state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub registry_name: Arc<str>,
    pub status: Arc<Mutex<SyncStatus>>,
    pub manual_sync: Arc<Notify>,
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics::prometheus_metrics))
        .route("/v0/info", get(info))
        .route("/v0/servers", get(list_servers))
        .route("/v0/servers/*name", get(get_server))
        .route("/v0/sync/status", get(sync_status))
        .route("/v0/sync", post(trigger_sync))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(Duration::from_secs(30))),
        )
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn info(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let total = queries::total_servers(&state.pool, &state.registry_name).await?;
    Ok(Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "registry": &*state.registry_name,
        "total_servers": total,
    })))
}

#[derive(Deserialize)]
struct ListParams {
    limit: Option<i64>,
    cursor: Option<String>,
}

async fn list_servers(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
        return Err(ApiError::InvalidRequest(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_LIMIT
        )));
    }

    let servers = queries::list_latest_servers(
        &state.pool,
        &state.registry_name,
        limit,
        params.cursor.as_deref(),
    )
    .await?;

    let next_cursor = (servers.len() as i64 == limit)
        .then(|| servers.last().map(|s| s.name.clone()))
        .flatten();

    Ok(Json(json!({
        "servers": servers,
        "metadata": { "nextCursor": next_cursor },
    })))
}

#[derive(Deserialize)]
struct GetParams {
    version: Option<String>,
}

async fn get_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<GetParams>,
) -> Result<impl IntoResponse, ApiError> {
    let server = queries::get_server(
        &state.pool,
        &state.registry_name,
        &name,
        params.version.as_deref(),
    )
    .await?
    .ok_or_else(|| ApiError::NotFound(name))?;

    Ok(Json(json!({ "server": server })))
}

async fn sync_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.status.lock().await.clone();
    Json(status)
}

async fn trigger_sync(State(state): State<AppState>) -> impl IntoResponse {
    state.manual_sync.notify_one();
    (
        StatusCode::ACCEPTED,
        Json(json!({"status": "sync requested"})),
    )
}
