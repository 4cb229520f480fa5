//! Chunked upload orchestration.

use crate::cleanup::CleanupScheduler;
use crate::error::UploadError;
use crate::metrics::{
    BYTES_UPLOADED, COMPOSE_LIMIT_HITS, COMPOSE_REQUESTS, PARTS_UPLOADED, UPLOAD_DURATION,
    UPLOAD_FAILURES, UPLOADS_STARTED,
};
use crate::reader::read_chunk;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use stitch_core::{COMPOSE_REQUEST_LIMIT, UploaderConfig, chunk_name};
use stitch_storage::{ComposeStore, CreateOptions, StorageResult, StoredObject};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// One object to upload.
#[derive(Debug)]
pub struct UploadRequest<R> {
    pub bucket: String,
    pub destination: String,
    pub contents: R,
}

impl<R> UploadRequest<R> {
    pub fn new(bucket: impl Into<String>, destination: impl Into<String>, contents: R) -> Self {
        Self {
            bucket: bucket.into(),
            destination: destination.into(),
            contents,
        }
    }
}

/// Parts written so far by one upload call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) enum UploadState {
    #[default]
    Empty,
    /// Exactly one part exists and it already sits at the destination.
    Single(StoredObject),
    /// Two or more parts exist; a compose is required.
    Multiple,
}

impl UploadState {
    pub(crate) fn record(self, object: StoredObject) -> Self {
        match self {
            Self::Empty => Self::Single(object),
            Self::Single(_) | Self::Multiple => Self::Multiple,
        }
    }

    pub(crate) fn into_single(self) -> Option<StoredObject> {
        match self {
            Self::Single(object) => Some(object),
            Self::Empty | Self::Multiple => None,
        }
    }
}

/// Uploads streams of unknown length as a sequence of parts joined by one
/// compose request.
///
/// Parts are read and written strictly one after another. A single `Uploader`
/// may serve concurrent uploads; the only state shared between them is the
/// compose-limit counter and the cleanup queue.
pub struct Uploader {
    chunk_size: usize,
    compose_limit_hits: AtomicU64,
    cleanup: CleanupScheduler,
}

impl Uploader {
    /// Create an uploader and start its cleanup worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &UploaderConfig) -> stitch_core::Result<Self> {
        config.validate()?;
        Ok(Self {
            chunk_size: config.chunk_size,
            compose_limit_hits: AtomicU64::new(0),
            cleanup: CleanupScheduler::new(),
        })
    }

    /// Configured part size in bytes.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of uploads that reached the compose request limit since this
    /// uploader was created.
    pub fn compose_limit_hits(&self) -> u64 {
        self.compose_limit_hits.load(Ordering::Relaxed)
    }

    pub fn cleanup(&self) -> &CleanupScheduler {
        &self.cleanup
    }

    /// Wait for queued cleanup to finish and stop the worker.
    pub async fn shutdown(self) {
        self.cleanup.shutdown().await;
    }

    /// Upload `request.contents` to `request.destination`.
    ///
    /// The stream is consumed and dropped before this returns. Intermediate
    /// parts are queued for deletion on every exit path, including when the
    /// returned future is dropped before completion.
    #[tracing::instrument(
        skip(self, store, request),
        fields(
            backend = store.backend_name(),
            bucket = %request.bucket,
            destination = %request.destination,
        )
    )]
    pub async fn upload<R>(
        &self,
        store: Arc<dyn ComposeStore>,
        request: UploadRequest<R>,
    ) -> Result<StoredObject, UploadError>
    where
        R: AsyncRead + Send + Unpin,
    {
        let UploadRequest {
            bucket,
            destination,
            contents,
        } = request;
        tracing::debug!("Starting chunked upload");
        UPLOADS_STARTED.inc();
        let start = Instant::now();

        let mut guard = self.cleanup.guard(store.clone(), &bucket, &destination);
        let mut contents = BufReader::new(contents);
        let result = self
            .upload_parts(
                store.as_ref(),
                &bucket,
                &destination,
                &mut contents,
                guard.names_mut(),
            )
            .await;
        drop(contents);
        drop(guard);

        match result {
            Ok(object) => {
                UPLOAD_DURATION.observe(start.elapsed().as_secs_f64());
                tracing::debug!(size = object.size, "Chunked upload complete");
                Ok(object)
            }
            Err(e) => {
                UPLOAD_FAILURES.inc();
                tracing::debug!(error = %e, "Chunked upload failed");
                Err(UploadError::new(destination, e))
            }
        }
    }

    async fn upload_parts<R>(
        &self,
        store: &dyn ComposeStore,
        bucket: &str,
        destination: &str,
        contents: &mut BufReader<R>,
        names: &mut Vec<String>,
    ) -> StorageResult<StoredObject>
    where
        R: AsyncRead + Send + Unpin,
    {
        let options = CreateOptions::uncompressed();
        let mut state = UploadState::Empty;
        let mut buffer = vec![0u8; self.chunk_size];

        for part in 1..=COMPOSE_REQUEST_LIMIT {
            if part < COMPOSE_REQUEST_LIMIT {
                let data = read_chunk(contents, &mut buffer).await?;
                // Part 1 is written even when empty so the destination exists.
                if part > 1 && data.is_empty() {
                    break;
                }
                let name = chunk_name(destination, part);
                names.push(name.clone());
                let len = data.len();
                tracing::debug!(part, bytes = len, "Uploading part");
                let object = store.create(bucket, &name, data, options).await?;
                PARTS_UPLOADED.inc();
                BYTES_UPLOADED.inc_by(len as u64);
                state = state.record(object);
            } else {
                if contents.fill_buf().await?.is_empty() {
                    break;
                }
                self.compose_limit_hits.fetch_add(1, Ordering::Relaxed);
                COMPOSE_LIMIT_HITS.inc();
                tracing::warn!(
                    chunk_size = self.chunk_size,
                    limit = COMPOSE_REQUEST_LIMIT,
                    "Upload reached the compose request limit; writing the remainder as one part. \
                     Consider increasing uploader.chunk_size"
                );
                let name = chunk_name(destination, part);
                names.push(name.clone());
                tracing::debug!(part, "Uploading final part of unknown length");
                let object = store.create_from_reader(bucket, &name, contents).await?;
                PARTS_UPLOADED.inc();
                BYTES_UPLOADED.inc_by(object.size);
                state = state.record(object);
            }
        }

        if let Some(object) = state.into_single() {
            return Ok(object);
        }

        COMPOSE_REQUESTS.inc();
        let object = store.compose(bucket, names, destination).await?;
        tracing::debug!(parts = names.len(), "Composed parts");
        Ok(object)
    }
}
