//! Object storage with server-side compose for stitch.
//!
//! This crate provides:
//! - The [`ComposeStore`] trait: create, create-from-reader, compose, delete
//! - Backends: local filesystem and S3-compatible
//! - [`fill_buffer`], the short-read-safe fill loop used to cut parts

pub mod backends;
pub mod error;
pub mod io;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, s3::S3Backend};
pub use error::{StorageError, StorageResult};
pub use io::fill_buffer;
pub use traits::{ComposeStore, CreateOptions, ObjectReader, StoredObject, check_compose_sources};

use stitch_core::config::StorageConfig;
use std::sync::Arc;

/// Create a compose-capable object store from configuration.
///
/// Buckets are not part of the configuration; every store call names its own.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ComposeStore>> {
    config
        .validate()
        .map_err(|e| StorageError::Config(e.to_string()))?;

    let store: Arc<dyn ComposeStore> = match config {
        StorageConfig::Filesystem { path } => Arc::new(FilesystemBackend::new(path).await?),
        StorageConfig::S3 {
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
        } => Arc::new(
            S3Backend::new(
                endpoint.clone(),
                region.clone(),
                prefix.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                *force_path_style,
            )
            .await?,
        ),
    };
    tracing::debug!(backend = store.backend_name(), "Compose store ready");
    Ok(store)
}
