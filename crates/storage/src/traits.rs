//! Storage trait definitions.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use stitch_core::COMPOSE_REQUEST_LIMIT;
use tokio::io::AsyncRead;

/// A reader of unknown length, consumed by [`ComposeStore::create_from_reader`].
pub type ObjectReader<'a> = &'a mut (dyn AsyncRead + Send + Unpin);

/// Handle to an object that was written to the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// Bucket holding the object.
    pub bucket: String,
    /// Bucket-relative object name.
    pub name: String,
    /// Object size in bytes.
    pub size: u64,
}

impl StoredObject {
    pub fn new(bucket: impl Into<String>, name: impl Into<String>, size: u64) -> Self {
        Self {
            bucket: bucket.into(),
            name: name.into(),
            size,
        }
    }
}

/// Options for bounded object creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CreateOptions {
    /// Disable any transport-level compression so stored bytes match the
    /// written bytes exactly. Chunk boundaries depend on this.
    pub disable_compression: bool,
}

impl CreateOptions {
    /// Options used for every bounded part of a chunked upload.
    pub fn uncompressed() -> Self {
        Self {
            disable_compression: true,
        }
    }
}

/// Object store with a server-side compose (concatenate) primitive.
#[async_trait]
pub trait ComposeStore: Send + Sync + 'static {
    /// Write `data` to `key`, replacing any existing object.
    async fn create(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        options: CreateOptions,
    ) -> StorageResult<StoredObject>;

    /// Write everything remaining in `reader` to `key`.
    ///
    /// The length is not known up front; implementations must not assume the
    /// content fits in memory.
    async fn create_from_reader(
        &self,
        bucket: &str,
        key: &str,
        reader: ObjectReader<'_>,
    ) -> StorageResult<StoredObject>;

    /// Concatenate `sources`, in order, into a single object at `destination`.
    ///
    /// `destination` may be one of the sources. Callers must not pass more than
    /// [`COMPOSE_REQUEST_LIMIT`] sources; see [`check_compose_sources`].
    async fn compose(
        &self,
        bucket: &str,
        sources: &[String],
        destination: &str,
    ) -> StorageResult<StoredObject>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Read an object's content.
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Bytes>;

    /// Get the name of this storage backend.
    ///
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;
}

/// Reject compose requests the store would refuse.
pub fn check_compose_sources(sources: &[String]) -> StorageResult<()> {
    if sources.is_empty() || sources.len() > COMPOSE_REQUEST_LIMIT as usize {
        return Err(StorageError::ComposeLimit {
            count: sources.len(),
            limit: COMPOSE_REQUEST_LIMIT,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_compose_sources_accepts_limit() {
        let sources: Vec<String> = (0..COMPOSE_REQUEST_LIMIT).map(|i| format!("k{i}")).collect();
        assert!(check_compose_sources(&sources).is_ok());
    }

    #[test]
    fn test_check_compose_sources_rejects_over_limit() {
        let sources: Vec<String> = (0..=COMPOSE_REQUEST_LIMIT)
            .map(|i| format!("k{i}"))
            .collect();
        match check_compose_sources(&sources) {
            Err(StorageError::ComposeLimit { count: 33, limit: 32 }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_check_compose_sources_rejects_empty() {
        assert!(check_compose_sources(&[]).is_err());
    }
}
