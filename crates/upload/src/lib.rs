//! Chunked upload of size-unknown streams into an object store with compose.
//!
//! An input stream is split into parts of the configured chunk size, each part
//! is written under a deterministic name, and the parts are joined by a single
//! compose request. Compose accepts at most
//! [`COMPOSE_REQUEST_LIMIT`](stitch_core::COMPOSE_REQUEST_LIMIT) sources, so
//! once the limit is reached the rest of the stream is written as one
//! unbounded final part. Intermediate parts are deleted afterwards by a
//! background worker.

pub mod cleanup;
pub mod error;
pub mod metrics;
pub mod reader;
pub mod uploader;

pub use cleanup::{CleanupBatch, CleanupScheduler};
pub use error::UploadError;
pub use uploader::{UploadRequest, Uploader};
