//! Configuration types shared across crates.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Uploader configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploaderConfig {
    /// Size in bytes of every part except an overflow tail.
    /// Env: `STITCH_UPLOADER__CHUNK_SIZE`.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_chunk_size() -> usize {
    crate::DEFAULT_CHUNK_SIZE
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

impl UploaderConfig {
    /// Create a configuration with an explicit chunk size.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self { chunk_size }
    }

    /// Validate uploader configuration invariants.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidChunkSize {
                size: self.chunk_size,
                min: 1,
            });
        }
        Ok(())
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage. Buckets are directories below `path`.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to the ambient AWS credential chain if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to the ambient AWS credential chain if not set.
        secret_access_key: Option<String>,
        /// Force path-style URLs (`endpoint/bucket/key`). Required for MinIO.
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/objects"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<()> {
        match self {
            StorageConfig::S3 {
                access_key_id,
                secret_access_key,
                ..
            } => match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                (Some(_), Some(_)) | (None, None) => Ok(()),
                _ => Err(Error::Config(
                    "s3 config requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                )),
            },
            StorageConfig::Filesystem { .. } => Ok(()),
        }
    }

    /// Whether this configuration targets an S3-compatible store.
    pub fn is_s3(&self) -> bool {
        matches!(self, StorageConfig::S3 { .. })
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Uploader configuration.
    #[serde(default)]
    pub uploader: UploaderConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Bucket used when a command does not name one.
    #[serde(default)]
    pub default_bucket: Option<String>,
}

impl AppConfig {
    /// Validate the combined configuration.
    pub fn validate(&self) -> Result<()> {
        self.uploader.validate()?;
        self.storage.validate()?;

        // S3 composes via UploadPartCopy, which rejects sources under 5 MiB
        // except for the last one.
        if self.storage.is_s3() && self.uploader.chunk_size < crate::S3_MIN_CHUNK_SIZE {
            return Err(Error::InvalidChunkSize {
                size: self.uploader.chunk_size,
                min: crate::S3_MIN_CHUNK_SIZE,
            });
        }
        Ok(())
    }
}
