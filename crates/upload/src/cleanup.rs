//! Background deletion of intermediate parts.
//!
//! A single worker task drains a queue of deletion batches in submission
//! order. Submitting never blocks and never fails the upload that submitted
//! it; deletion failures are logged and counted, never retried.

use crate::metrics::{CLEANUP_DELETES, CLEANUP_FAILURES};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use stitch_core::is_chunk_name;
use stitch_storage::ComposeStore;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Part names recorded by one upload call.
pub struct CleanupBatch {
    store: Arc<dyn ComposeStore>,
    bucket: String,
    destination: String,
    names: Vec<String>,
}

impl CleanupBatch {
    pub fn new(
        store: Arc<dyn ComposeStore>,
        bucket: impl Into<String>,
        destination: impl Into<String>,
        names: Vec<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            destination: destination.into(),
            names,
        }
    }

    /// Names this batch will delete, in order. The destination itself is never
    /// among them.
    pub fn deletable(&self) -> impl Iterator<Item = &str> {
        self.names
            .iter()
            .map(String::as_str)
            .filter(|name| is_chunk_name(&self.destination, name))
    }

    async fn execute(self) {
        for name in self.deletable() {
            match self.store.delete(&self.bucket, name).await {
                Ok(()) => {
                    CLEANUP_DELETES.inc();
                    tracing::debug!(bucket = %self.bucket, chunk = %name, "Deleted chunk");
                }
                Err(e) => {
                    CLEANUP_FAILURES.inc();
                    tracing::warn!(
                        bucket = %self.bucket,
                        chunk = %name,
                        error = %e,
                        "Failed to delete chunk; leaving it in place"
                    );
                }
            }
        }
    }
}

enum CleanupTask {
    Delete(CleanupBatch),
    Flush(oneshot::Sender<()>),
}

/// Single-worker queue that deletes intermediate parts off the upload path.
pub struct CleanupScheduler {
    sender: mpsc::UnboundedSender<CleanupTask>,
    worker: JoinHandle<()>,
    submitted: AtomicU64,
}

impl CleanupScheduler {
    /// Spawn the cleanup worker.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(
            Self::run(receiver).instrument(tracing::debug_span!("chunk_cleanup_worker")),
        );
        Self {
            sender,
            worker,
            submitted: AtomicU64::new(0),
        }
    }

    async fn run(mut receiver: mpsc::UnboundedReceiver<CleanupTask>) {
        while let Some(task) = receiver.recv().await {
            match task {
                CleanupTask::Delete(batch) => {
                    // Each batch runs in its own task so a panicking store
                    // cannot take the worker down with it.
                    if let Err(e) = tokio::spawn(batch.execute().in_current_span()).await {
                        tracing::error!(error = %e, "Chunk cleanup batch panicked");
                    }
                }
                CleanupTask::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        tracing::debug!("Chunk cleanup worker stopped");
    }

    /// Queue a batch for deletion. Returns immediately.
    pub fn submit(&self, batch: CleanupBatch) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        if self.sender.send(CleanupTask::Delete(batch)).is_err() {
            tracing::warn!("Chunk cleanup worker is not running; chunks left in place");
        }
    }

    /// Number of batches submitted since the scheduler was created.
    pub fn batches_submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Wait until every batch submitted before this call has been processed.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(CleanupTask::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// Stop accepting batches and wait for the queue to drain.
    pub async fn shutdown(self) {
        let Self { sender, worker, .. } = self;
        drop(sender);
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "Chunk cleanup worker panicked");
        }
    }

    /// Guard that submits the parts it collects when dropped.
    pub(crate) fn guard(
        &self,
        store: Arc<dyn ComposeStore>,
        bucket: &str,
        destination: &str,
    ) -> CleanupGuard<'_> {
        CleanupGuard {
            scheduler: self,
            store,
            bucket: bucket.to_string(),
            destination: destination.to_string(),
            names: Vec::new(),
        }
    }
}

impl Default for CleanupScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Collects part names during an upload and hands them to the scheduler on
/// every exit path, including a dropped (cancelled) upload future.
pub(crate) struct CleanupGuard<'a> {
    scheduler: &'a CleanupScheduler,
    store: Arc<dyn ComposeStore>,
    bucket: String,
    destination: String,
    names: Vec<String>,
}

impl CleanupGuard<'_> {
    pub(crate) fn names_mut(&mut self) -> &mut Vec<String> {
        &mut self.names
    }
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        let batch = CleanupBatch::new(
            self.store.clone(),
            std::mem::take(&mut self.bucket),
            std::mem::take(&mut self.destination),
            std::mem::take(&mut self.names),
        );
        self.scheduler.submit(batch);
    }
}
