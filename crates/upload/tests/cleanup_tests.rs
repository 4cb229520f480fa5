mod common;

use common::mocks::RecordingStore;
use std::sync::Arc;
use stitch_storage::{ComposeStore, CreateOptions};
use stitch_upload::{CleanupBatch, CleanupScheduler};

async fn seed(store: &RecordingStore, keys: &[&str]) {
    for key in keys {
        store
            .create("bucket", key, bytes::Bytes::from_static(b"x"), CreateOptions::default())
            .await
            .unwrap();
    }
}

fn batch(store: &Arc<RecordingStore>, destination: &str, names: &[&str]) -> CleanupBatch {
    CleanupBatch::new(
        store.clone(),
        "bucket",
        destination,
        names.iter().map(|n| n.to_string()).collect(),
    )
}

#[tokio::test]
async fn test_batches_run_in_submission_order() {
    let store = Arc::new(RecordingStore::new());
    let scheduler = CleanupScheduler::new();

    scheduler.submit(batch(&store, "a", &["a", "a.chunk2", "a.chunk3"]));
    scheduler.submit(batch(&store, "b", &["b", "b.chunk2"]));
    scheduler.submit(batch(&store, "c", &["c", "c.chunk2", "c.chunk3", "c.chunk4"]));
    scheduler.flush().await;

    assert_eq!(
        store.deleted(),
        vec![
            "a.chunk2", "a.chunk3", "b.chunk2", "c.chunk2", "c.chunk3", "c.chunk4"
        ]
    );
    assert_eq!(scheduler.batches_submitted(), 3);
}

#[tokio::test]
async fn test_failed_delete_is_not_retried_and_does_not_stop_batch() {
    let store = Arc::new(RecordingStore::failing_delete());
    seed(&store, &["a", "a.chunk2", "a.chunk3"]).await;
    let scheduler = CleanupScheduler::new();

    scheduler.submit(batch(&store, "a", &["a", "a.chunk2", "a.chunk3"]));
    scheduler.submit(batch(&store, "b", &["b.chunk2"]));
    scheduler.shutdown().await;

    assert_eq!(store.deleted(), vec!["a.chunk2", "a.chunk3", "b.chunk2"]);
    assert!(store.contains("bucket", "a.chunk2"));
}

#[tokio::test]
async fn test_panicking_store_does_not_kill_worker() {
    let panicking = Arc::new(RecordingStore::panicking_delete());
    let healthy = Arc::new(RecordingStore::new());
    seed(&healthy, &["b", "b.chunk2"]).await;
    let scheduler = CleanupScheduler::new();

    scheduler.submit(batch(&panicking, "a", &["a.chunk2"]));
    scheduler.submit(batch(&healthy, "b", &["b", "b.chunk2"]));
    scheduler.flush().await;

    assert_eq!(healthy.deleted(), vec!["b.chunk2"]);
    assert!(healthy.contains("bucket", "b"));
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_unrelated_names_are_left_alone() {
    let store = Arc::new(RecordingStore::new());
    let scheduler = CleanupScheduler::new();

    scheduler.submit(batch(
        &store,
        "d",
        &["d", "other.chunk2", "d.chunk", "d.chunk02", "d.chunk1", "d.chunk5"],
    ));
    scheduler.shutdown().await;

    assert_eq!(store.deleted(), vec!["d.chunk5"]);
}

#[tokio::test]
async fn test_flush_on_idle_scheduler_returns() {
    let scheduler = CleanupScheduler::new();
    scheduler.flush().await;
    assert_eq!(scheduler.batches_submitted(), 0);
    scheduler.shutdown().await;
}
