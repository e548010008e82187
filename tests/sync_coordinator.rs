//! Coordinator loop tests: crash recovery, status transitions, skip
//! messages. These run against a file-backed status store and a local file
//! source; no network or database.

mod common;

use common::{file_config, toolhive_document, RecordingWriter};
use mcpsync::filter::canonical_filter_hash;
use mcpsync::sources::SourceHandlerFactory;
use mcpsync::status::{FileStatusStore, StatusStore, SyncPhase, SyncStatus, INTERRUPTED_MESSAGE};
use mcpsync::sync::{SyncCoordinator, SyncManager};
use mcpsync::types::SourceFormat;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Harness {
    config: Arc<mcpsync::Config>,
    writer: Arc<RecordingWriter>,
    store: Arc<FileStatusStore>,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let doc_path = dir.path().join("registry.json");
    std::fs::write(
        &doc_path,
        serde_json::to_vec(&toolhive_document()).unwrap(),
    )
    .unwrap();

    let config = Arc::new(file_config(doc_path, SourceFormat::Toolhive));
    let writer = Arc::new(RecordingWriter::default());
    let store = Arc::new(FileStatusStore::new(dir.path().join("status.json")));

    Harness {
        config,
        writer,
        store,
        _dir: dir,
    }
}

fn manager(harness: &Harness) -> Arc<SyncManager> {
    let factory = Arc::new(SourceHandlerFactory::new(None).unwrap());
    Arc::new(SyncManager::new(factory, harness.writer.clone()))
}

async fn run_briefly(coordinator: SyncCoordinator) {
    let cancel = CancellationToken::new();
    let task = tokio::spawn(coordinator.run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn first_run_syncs_and_completes() {
    let harness = harness();
    let coordinator = SyncCoordinator::new(
        harness.config.clone(),
        manager(&harness),
        harness.store.clone(),
    )
    .await
    .unwrap();
    let status_handle = coordinator.status_handle();

    run_briefly(coordinator).await;

    let stored = harness.writer.stored.lock().unwrap();
    assert_eq!(stored.len(), 1, "exactly one sync attempt expected");
    assert_eq!(stored[0].1.servers.len(), 4);
    drop(stored);

    let status = status_handle.lock().await.clone();
    assert_eq!(status.phase, SyncPhase::Complete);
    assert_eq!(status.message, "Sync completed successfully");
    assert_eq!(status.server_count, 4);
    assert_eq!(status.attempt_count, 0);
    assert_eq!(status.last_sync_hash.len(), 64);
    assert_eq!(
        status.last_applied_filter_hash,
        canonical_filter_hash(None)
    );
    assert!(status.last_sync_time.is_some());

    // and the terminal status is durable
    let persisted = harness.store.load("test").await.unwrap();
    assert_eq!(persisted.phase, SyncPhase::Complete);
}

#[tokio::test]
async fn interrupted_status_recovers_and_resyncs() {
    let harness = harness();

    // simulate a crash mid-sync from a previous process
    let interrupted = SyncStatus {
        phase: SyncPhase::Syncing,
        message: "Sync in progress".to_string(),
        attempt_count: 2,
        ..SyncStatus::initial()
    };
    harness.store.save("test", &interrupted).await.unwrap();

    let coordinator = SyncCoordinator::new(
        harness.config.clone(),
        manager(&harness),
        harness.store.clone(),
    )
    .await
    .unwrap();
    let status_handle = coordinator.status_handle();

    // startup never believes a sync is in progress
    {
        let status = status_handle.lock().await;
        assert_eq!(status.phase, SyncPhase::Failed);
        assert_eq!(status.message, INTERRUPTED_MESSAGE);
    }

    run_briefly(coordinator).await;

    assert!(
        !harness.writer.stored.lock().unwrap().is_empty(),
        "recovery must trigger a fresh sync"
    );
    let status = status_handle.lock().await.clone();
    assert_eq!(status.phase, SyncPhase::Complete);
}

#[tokio::test]
async fn up_to_date_registry_is_skipped() {
    let harness = harness();
    let manager = manager(&harness);

    // first coordinator run records the real content hash
    let coordinator = SyncCoordinator::new(
        harness.config.clone(),
        manager.clone(),
        harness.store.clone(),
    )
    .await
    .unwrap();
    run_briefly(coordinator).await;
    assert_eq!(harness.writer.stored.lock().unwrap().len(), 1);

    // second run sees Complete + unchanged content and skips
    let coordinator = SyncCoordinator::new(
        harness.config.clone(),
        manager,
        harness.store.clone(),
    )
    .await
    .unwrap();
    let status_handle = coordinator.status_handle();
    run_briefly(coordinator).await;

    assert_eq!(
        harness.writer.stored.lock().unwrap().len(),
        1,
        "unchanged content must not be written again"
    );
    let status = status_handle.lock().await.clone();
    assert_eq!(status.phase, SyncPhase::Complete);
    assert!(
        status.message.starts_with("Skipped:"),
        "message was {:?}",
        status.message
    );
}

#[tokio::test]
async fn manual_trigger_fires_a_check() {
    let harness = harness();
    let manager = manager(&harness);

    // prime: one completed sync
    let coordinator = SyncCoordinator::new(
        harness.config.clone(),
        manager.clone(),
        harness.store.clone(),
    )
    .await
    .unwrap();
    run_briefly(coordinator).await;

    // mutate the source document, then poke the manual trigger
    let doc_path = harness.config.source.file.as_ref().unwrap().path.clone();
    let mut document = toolhive_document();
    document["servers"]["new-entry"] =
        serde_json::json!({"image": "ghcr.io/example/new:1.0.0"});
    std::fs::write(&doc_path, serde_json::to_vec(&document).unwrap()).unwrap();

    let coordinator = SyncCoordinator::new(
        harness.config.clone(),
        manager,
        harness.store.clone(),
    )
    .await
    .unwrap();
    let trigger = coordinator.manual_trigger();

    let cancel = CancellationToken::new();
    let task = tokio::spawn(coordinator.run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(200)).await;
    trigger.notify_one();
    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();
    task.await.unwrap();

    let stored = harness.writer.stored.lock().unwrap();
    let last = stored.last().unwrap();
    assert_eq!(last.1.servers.len(), 5, "manual sync must pick up the new entry");
}
