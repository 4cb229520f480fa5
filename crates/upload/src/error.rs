//! Upload error types.

use stitch_storage::StorageError;
use thiserror::Error;

/// Failure of an upload call.
///
/// Callers are not told which step failed; the underlying read or store error
/// is available through [`std::error::Error::source`].
#[derive(Debug, Error)]
#[error("error uploading blob {destination}")]
pub struct UploadError {
    destination: String,
    #[source]
    source: StorageError,
}

impl UploadError {
    pub fn new(destination: impl Into<String>, source: StorageError) -> Self {
        Self {
            destination: destination.into(),
            source,
        }
    }

    /// Destination key of the failed upload.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// The read or store error that aborted the upload.
    pub fn cause(&self) -> &StorageError {
        &self.source
    }
}
