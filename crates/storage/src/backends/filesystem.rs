//! Local filesystem storage backend.
//!
//! Objects live at `<root>/<bucket>/<key>`. Every write lands in a uniquely
//! named temp file next to its target and is renamed into place once synced,
//! so readers never observe a partially written object.

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    ComposeStore, CreateOptions, ObjectReader, StoredObject, check_compose_sources,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Local filesystem object store.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Resolve the on-disk path of an object, with path traversal protection.
    ///
    /// Validation touches the filesystem (`canonicalize`, `symlink_metadata`),
    /// so it runs on the blocking pool.
    async fn object_path(&self, bucket: &str, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let bucket = bucket.to_string();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::object_path_sync(&root, &bucket, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    fn object_path_sync(root: &Path, bucket: &str, key: &str) -> StorageResult<PathBuf> {
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket == "." || bucket == ".." {
            return Err(StorageError::InvalidKey(format!("invalid bucket name: {bucket}")));
        }
        if key.is_empty() || key.contains("..") || key.starts_with(['/', '\\']) {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }
        if !Path::new(key)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidKey(format!(
                "contains unsafe path component: {key}"
            )));
        }

        let path = root.join(bucket).join(key);
        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        // The nearest existing ancestor (or the path itself) must resolve inside
        // the root; otherwise a symlink would let writes escape it.
        let mut candidate = Some(path.as_path());
        while let Some(current) = candidate {
            match std::fs::symlink_metadata(current) {
                Ok(meta) => {
                    let resolved = current.canonicalize().map_err(|e| {
                        if meta.file_type().is_symlink() {
                            StorageError::InvalidKey(format!(
                                "symlink target missing or invalid: {key}"
                            ))
                        } else {
                            StorageError::Io(e)
                        }
                    })?;
                    if !resolved.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidKey(format!(
                            "resolved path escapes storage root: {key}"
                        )));
                    }
                    return Ok(path);
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    candidate = current.parent();
                }
                Err(err) => return Err(StorageError::Io(err)),
            }
        }

        Ok(path)
    }

    /// Unique sibling temp path for an atomic write to `path`.
    fn temp_path(path: &Path) -> PathBuf {
        let suffix = format!(".tmp.{}", Uuid::new_v4());
        let name = path
            .file_name()
            .map(|n| format!("{}{}", n.to_string_lossy(), suffix))
            .unwrap_or(suffix);
        path.with_file_name(name)
    }

    /// Ensure parent directory exists.
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Sync `file` and move it from `temp` onto `path`, removing `temp` if that fails.
    async fn commit(file: fs::File, temp: &Path, path: &Path) -> StorageResult<()> {
        let result = async {
            file.sync_all().await?;
            drop(file);
            fs::rename(temp, path).await
        }
        .await;
        if let Err(e) = result {
            let _ = fs::remove_file(temp).await;
            return Err(StorageError::Io(e));
        }
        Ok(())
    }

    fn not_found_or_io(key: &str, e: std::io::Error) -> StorageError {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

#[async_trait]
impl ComposeStore for FilesystemBackend {
    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn create(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        _options: CreateOptions,
    ) -> StorageResult<StoredObject> {
        let path = self.object_path(bucket, key).await?;
        self.ensure_parent(&path).await?;

        let temp = Self::temp_path(&path);
        let mut file = fs::File::create(&temp).await?;
        if let Err(e) = file.write_all(&data).await {
            let _ = fs::remove_file(&temp).await;
            return Err(StorageError::Io(e));
        }
        Self::commit(file, &temp, &path).await?;

        Ok(StoredObject::new(bucket, key, data.len() as u64))
    }

    #[instrument(skip(self, reader), fields(backend = "filesystem"))]
    async fn create_from_reader(
        &self,
        bucket: &str,
        key: &str,
        reader: ObjectReader<'_>,
    ) -> StorageResult<StoredObject> {
        let path = self.object_path(bucket, key).await?;
        self.ensure_parent(&path).await?;

        let temp = Self::temp_path(&path);
        let mut file = fs::File::create(&temp).await?;
        let size = match tokio::io::copy(reader, &mut file).await {
            Ok(size) => size,
            Err(e) => {
                let _ = fs::remove_file(&temp).await;
                return Err(StorageError::Io(e));
            }
        };
        Self::commit(file, &temp, &path).await?;

        Ok(StoredObject::new(bucket, key, size))
    }

    #[instrument(skip(self, sources), fields(backend = "filesystem", sources = sources.len()))]
    async fn compose(
        &self,
        bucket: &str,
        sources: &[String],
        destination: &str,
    ) -> StorageResult<StoredObject> {
        check_compose_sources(sources)?;

        let mut source_paths = Vec::with_capacity(sources.len());
        for source in sources {
            source_paths.push((source, self.object_path(bucket, source).await?));
        }
        let path = self.object_path(bucket, destination).await?;
        self.ensure_parent(&path).await?;

        // Sources are fully copied before the rename, so the destination may
        // itself be one of them.
        let temp = Self::temp_path(&path);
        let mut file = fs::File::create(&temp).await?;
        let mut size = 0u64;
        for (source, source_path) in source_paths {
            let copied = async {
                let mut input = fs::File::open(&source_path)
                    .await
                    .map_err(|e| Self::not_found_or_io(source, e))?;
                Ok::<_, StorageError>(tokio::io::copy(&mut input, &mut file).await?)
            }
            .await;
            match copied {
                Ok(n) => size += n,
                Err(e) => {
                    let _ = fs::remove_file(&temp).await;
                    return Err(e);
                }
            }
        }
        Self::commit(file, &temp, &path).await?;

        Ok(StoredObject::new(bucket, destination, size))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let path = self.object_path(bucket, key).await?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        let path = self.object_path(bucket, key).await?;
        let data = fs::read(&path)
            .await
            .map_err(|e| Self::not_found_or_io(key, e))?;
        Ok(Bytes::from(data))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}
