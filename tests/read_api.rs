//! Read API surface tests that do not need a live database: health, status
//! snapshot, and the manual sync trigger.

use mcpsync::api::{build_router, AppState};
use mcpsync::status::{SyncPhase, SyncStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

async fn spawn_api(state: AppState) -> String {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn test_state() -> AppState {
    // connect_lazy never dials; the endpoints under test do not touch the
    // database
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy("postgres://unused@localhost:5432/unused")
        .unwrap();
    AppState {
        pool,
        registry_name: Arc::from("test"),
        status: Arc::new(Mutex::new(SyncStatus::initial())),
        manual_sync: Arc::new(Notify::new()),
    }
}

#[tokio::test]
async fn health_endpoint_responds() {
    let base = spawn_api(test_state()).await;
    let response = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn sync_status_exposes_the_cached_snapshot() {
    let state = test_state();
    {
        let mut status = state.status.lock().await;
        status.phase = SyncPhase::Complete;
        status.message = "Sync completed successfully".to_string();
        status.server_count = 12;
    }

    let base = spawn_api(state).await;
    let response = reqwest::get(format!("{}/v0/sync/status", base)).await.unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["phase"], "Complete");
    assert_eq!(body["serverCount"], 12);
}

#[tokio::test]
async fn manual_sync_trigger_pokes_the_coordinator() {
    let state = test_state();
    let notify = state.manual_sync.clone();

    let base = spawn_api(state).await;

    let waiter = tokio::spawn(async move {
        tokio::time::timeout(Duration::from_secs(2), notify.notified())
            .await
            .is_ok()
    });

    // give the waiter a moment to register
    tokio::time::sleep(Duration::from_millis(50)).await;

    let response = reqwest::Client::new()
        .post(format!("{}/v0/sync", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);

    assert!(waiter.await.unwrap(), "trigger must reach the notifier");
}

#[tokio::test]
async fn metrics_endpoint_serves_prometheus_text() {
    let base = spawn_api(test_state()).await;
    let response = reqwest::get(format!("{}/metrics", base)).await.unwrap();
    assert_eq!(response.status(), 200);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/plain"));
}
