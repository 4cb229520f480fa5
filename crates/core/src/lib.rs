//! Core types shared by the stitch crates.
//!
//! This crate defines:
//! - Deterministic chunk naming for multi-part uploads
//! - The compose request limit mirrored from the object store
//! - Configuration for the uploader and the storage backends

pub mod chunk;
pub mod config;
pub mod error;

pub use chunk::{CHUNK_NAME_MARKER, COMPOSE_REQUEST_LIMIT, chunk_name, is_chunk_name};
pub use config::{AppConfig, StorageConfig, UploaderConfig};
pub use error::{Error, Result};

/// Default chunk size: 5 MiB
pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Smallest chunk size S3 accepts for every compose source but the last: 5 MiB
pub const S3_MIN_CHUNK_SIZE: usize = 5 * 1024 * 1024;
