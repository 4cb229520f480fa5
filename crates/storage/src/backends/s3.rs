//! S3-compatible storage backend using AWS SDK.
//!
//! S3 has no native compose call. [`ComposeStore::compose`] is built from a
//! multipart upload whose parts are server-side copies (`UploadPartCopy`) of
//! the source objects, so no source bytes pass through this process. S3
//! requires every copied part except the last to be at least 5 MiB, and no
//! single copy may exceed 5 GiB, so larger sources are copied in ranges.

use crate::error::{StorageError, StorageResult};
use crate::io::fill_buffer;
use crate::traits::{
    ComposeStore, CreateOptions, ObjectReader, StoredObject, check_compose_sources,
};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::Bytes;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::instrument;

/// Smallest part S3 accepts for any part but the last (5 MiB).
const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Largest source range a single `UploadPartCopy` may copy (5 GiB).
const MAX_COPY_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// S3 rejects multipart uploads with more parts than this.
const MAX_MULTIPART_PARTS: i32 = 10_000;

/// Reader parts double in size every this many parts.
const PARTS_PER_SIZE_STEP: i32 = 1_000;

/// Doublings after which the reader part size stops growing (2.5 GiB parts).
const MAX_SIZE_STEPS: i32 = 9;

fn map_s3_operation_error<E>(err: aws_sdk_s3::error::SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StorageError::S3(Box::new(err))
}

fn missing_etag() -> StorageError {
    StorageError::Protocol("S3 did not return an ETag".to_string())
}

fn check_part_number(part_number: i32) -> StorageResult<()> {
    if part_number > MAX_MULTIPART_PARTS {
        return Err(StorageError::ObjectTooLarge(format!(
            "needs more than {MAX_MULTIPART_PARTS} multipart parts"
        )));
    }
    Ok(())
}

/// Size of reader part `part_number` (1-based).
///
/// Starts at [`MIN_PART_SIZE`] and doubles every [`PARTS_PER_SIZE_STEP`]
/// parts, so 10,000 parts reach roughly 5 TB.
fn reader_part_size(part_number: i32) -> usize {
    let steps = ((part_number.max(1) - 1) / PARTS_PER_SIZE_STEP).min(MAX_SIZE_STEPS);
    MIN_PART_SIZE << steps
}

/// Inclusive byte ranges that split an object of `size` bytes into the fewest
/// near-equal pieces no larger than `max`.
///
/// Returns `None` when the object fits in one copy. Pieces differ in length by
/// at most one byte, so each is over half of `max`.
fn copy_ranges(size: u64, max: u64) -> Option<Vec<(u64, u64)>> {
    if size <= max {
        return None;
    }
    let count = size.div_ceil(max);
    let base = size / count;
    let extra = size % count;
    let mut start = 0;
    let ranges = (0..count)
        .map(|i| {
            let len = base + u64::from(i < extra);
            let range = (start, start + len - 1);
            start += len;
            range
        })
        .collect();
    Some(ranges)
}

/// S3-compatible object store using AWS SDK.
pub struct S3Backend {
    client: Client,
    prefix: Option<String>,
    endpoint: String,
    region: String,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("prefix", &self.prefix)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl S3Backend {
    /// Create a new S3 backend.
    ///
    /// Buckets are chosen per call. Without explicit credentials the ambient AWS
    /// credential chain is used.
    ///
    /// # Arguments
    /// * `force_path_style` - Use path-style URLs (`endpoint/bucket/key`) instead of
    ///   virtual-hosted style (`bucket.endpoint/key`). Required for MinIO.
    pub async fn new(
        endpoint: Option<String>,
        region: Option<String>,
        prefix: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        force_path_style: bool,
    ) -> StorageResult<Self> {
        let resolved_region = region.unwrap_or_else(|| "us-east-1".to_string());

        let mut builder = match (access_key_id, secret_access_key) {
            (Some(key_id), Some(secret)) => {
                let credentials =
                    aws_sdk_s3::config::Credentials::new(key_id, secret, None, None, "stitch-config");
                aws_sdk_s3::config::Builder::new()
                    .behavior_version(BehaviorVersion::latest())
                    .region(aws_config::Region::new(resolved_region.clone()))
                    .credentials_provider(credentials)
            }
            (None, None) => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(aws_config::Region::new(resolved_region.clone()))
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
            _ => {
                return Err(StorageError::Config(
                    "s3 config requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                ));
            }
        };

        // Bare host:port endpoints (e.g. "minio:9000") get an http:// scheme.
        let normalized_endpoint = endpoint.map(|url| {
            let lower = url.to_ascii_lowercase();
            if lower.starts_with("http://") || lower.starts_with("https://") {
                url
            } else {
                format!("http://{url}")
            }
        });
        if let Some(url) = &normalized_endpoint {
            builder = builder.endpoint_url(url);
        }
        if force_path_style {
            builder = builder.force_path_style(true);
        }

        let endpoint = normalized_endpoint
            .unwrap_or_else(|| format!("s3.{resolved_region}.amazonaws.com"));

        Ok(Self {
            client: Client::from_conf(builder.build()),
            prefix: prefix.map(|p| p.trim_end_matches('/').to_string()),
            endpoint,
            region: resolved_region,
        })
    }

    /// Get the full object key for a key (applies prefix if configured).
    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key.to_string(),
        }
    }

    /// Convert an AWS SDK error to StorageError, mapping 404 to NotFound.
    fn map_sdk_error<E>(err: aws_sdk_s3::error::SdkError<E>, key: &str) -> StorageError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        if let aws_sdk_s3::error::SdkError::ServiceError(ref service_err) = err
            && service_err.raw().status().as_u16() == 404
        {
            return StorageError::NotFound(key.to_string());
        }
        map_s3_operation_error(err)
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> StorageResult<StoredObject> {
        let size = data.len() as u64;
        self.client
            .put_object()
            .bucket(bucket)
            .key(self.full_key(key))
            .content_length(size as i64)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(map_s3_operation_error)?;
        Ok(StoredObject::new(bucket, key, size))
    }

    async fn start_multipart(&self, bucket: &str, full_key: &str) -> StorageResult<String> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(full_key)
            .send()
            .await
            .map_err(map_s3_operation_error)?;
        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| StorageError::Protocol("S3 did not return an upload id".to_string()))
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        full_key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> StorageResult<()> {
        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(full_key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(map_s3_operation_error)?;
        Ok(())
    }

    async fn abort_multipart(&self, bucket: &str, full_key: &str, upload_id: &str) {
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(full_key)
            .upload_id(upload_id)
            .send()
            .await
        {
            tracing::warn!(
                key = %full_key,
                upload_id = %upload_id,
                error = %e,
                "Failed to abort multipart upload"
            );
        }
    }

    /// Upload the rest of `reader` as parts of `upload_id`, starting with the
    /// already buffered first `first_len` bytes of `buffer`.
    ///
    /// `buffer` grows as the part number rises so the 10,000-part cap is not
    /// reached by streams larger than 10,000 minimum-size parts.
    async fn upload_reader_parts(
        &self,
        bucket: &str,
        full_key: &str,
        upload_id: &str,
        reader: ObjectReader<'_>,
        buffer: &mut Vec<u8>,
        first_len: usize,
    ) -> StorageResult<(Vec<CompletedPart>, u64)> {
        let mut parts = Vec::new();
        let mut size = 0u64;
        let mut len = first_len;
        let mut part_number = 1;

        while len > 0 {
            check_part_number(part_number)?;
            let output = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(full_key)
                .upload_id(upload_id)
                .part_number(part_number)
                .content_length(len as i64)
                .body(ByteStream::from(Bytes::copy_from_slice(&buffer[..len])))
                .send()
                .await
                .map_err(map_s3_operation_error)?;
            let e_tag = output.e_tag().ok_or_else(missing_etag)?;
            parts.push(
                CompletedPart::builder()
                    .e_tag(e_tag)
                    .part_number(part_number)
                    .build(),
            );
            size += len as u64;
            part_number += 1;

            let next_size = reader_part_size(part_number);
            if buffer.len() < next_size {
                tracing::debug!(part_number, part_size = next_size, "Growing reader part size");
                buffer.resize(next_size, 0);
            }
            len = fill_buffer(&mut *reader, buffer).await?;
        }

        Ok((parts, size))
    }

    async fn object_size(&self, bucket: &str, key: &str) -> StorageResult<u64> {
        let head = self
            .client
            .head_object()
            .bucket(bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;
        Ok(head.content_length().unwrap_or(0).max(0) as u64)
    }

    /// Copy `sources` into the parts of `upload_id`.
    ///
    /// Sources over 5 GiB are copied as several ranged parts, so part numbers
    /// follow a running counter rather than the source index.
    async fn copy_parts(
        &self,
        bucket: &str,
        full_key: &str,
        upload_id: &str,
        sources: &[String],
    ) -> StorageResult<Vec<CompletedPart>> {
        let mut parts = Vec::with_capacity(sources.len());
        let mut part_number = 1;
        for source in sources {
            // CopySource format: bucket/key, with the key URL-encoded.
            let encoded = utf8_percent_encode(&self.full_key(source), NON_ALPHANUMERIC).to_string();
            let copy_source = format!("{bucket}/{encoded}");
            let size = self.object_size(bucket, source).await?;
            let ranges: Vec<Option<(u64, u64)>> = match copy_ranges(size, MAX_COPY_PART_SIZE) {
                Some(ranges) => {
                    tracing::debug!(
                        source = %source,
                        size,
                        parts = ranges.len(),
                        "Copying source in ranges"
                    );
                    ranges.into_iter().map(Some).collect()
                }
                None => vec![None],
            };

            for range in ranges {
                check_part_number(part_number)?;
                let mut request = self
                    .client
                    .upload_part_copy()
                    .bucket(bucket)
                    .key(full_key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .copy_source(&copy_source);
                if let Some((first, last)) = range {
                    request = request.copy_source_range(format!("bytes={first}-{last}"));
                }
                let output = request
                    .send()
                    .await
                    .map_err(|e| Self::map_sdk_error(e, source))?;
                let e_tag = output
                    .copy_part_result()
                    .and_then(|r| r.e_tag())
                    .ok_or_else(missing_etag)?;
                parts.push(
                    CompletedPart::builder()
                        .e_tag(e_tag)
                        .part_number(part_number)
                        .build(),
                );
                part_number += 1;
            }
        }
        Ok(parts)
    }
}

#[async_trait]
impl ComposeStore for S3Backend {
    #[instrument(skip(self, data), fields(backend = "s3", size = data.len()))]
    async fn create(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        _options: CreateOptions,
    ) -> StorageResult<StoredObject> {
        // The SDK never applies content encoding to PutObject bodies, so
        // `disable_compression` holds without extra request settings.
        self.put_object(bucket, key, data).await
    }

    #[instrument(skip(self, reader), fields(backend = "s3"))]
    async fn create_from_reader(
        &self,
        bucket: &str,
        key: &str,
        reader: ObjectReader<'_>,
    ) -> StorageResult<StoredObject> {
        let mut buffer = vec![0u8; reader_part_size(1)];
        let first_len = fill_buffer(&mut *reader, &mut buffer).await?;
        if first_len < MIN_PART_SIZE {
            buffer.truncate(first_len);
            return self.put_object(bucket, key, Bytes::from(buffer)).await;
        }

        let full_key = self.full_key(key);
        let upload_id = self.start_multipart(bucket, &full_key).await?;
        let result = async {
            let (parts, size) = self
                .upload_reader_parts(bucket, &full_key, &upload_id, reader, &mut buffer, first_len)
                .await?;
            self.complete_multipart(bucket, &full_key, &upload_id, parts)
                .await?;
            Ok::<_, StorageError>(size)
        }
        .await;

        match result {
            Ok(size) => Ok(StoredObject::new(bucket, key, size)),
            Err(e) => {
                self.abort_multipart(bucket, &full_key, &upload_id).await;
                Err(e)
            }
        }
    }

    #[instrument(skip(self, sources), fields(backend = "s3", sources = sources.len()))]
    async fn compose(
        &self,
        bucket: &str,
        sources: &[String],
        destination: &str,
    ) -> StorageResult<StoredObject> {
        check_compose_sources(sources)?;

        let full_key = self.full_key(destination);
        let upload_id = self.start_multipart(bucket, &full_key).await?;
        let result = async {
            let parts = self
                .copy_parts(bucket, &full_key, &upload_id, sources)
                .await?;
            self.complete_multipart(bucket, &full_key, &upload_id, parts)
                .await
        }
        .await;
        if let Err(e) = result {
            self.abort_multipart(bucket, &full_key, &upload_id).await;
            return Err(e);
        }

        let size = self.object_size(bucket, destination).await?;
        Ok(StoredObject::new(bucket, destination, size))
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        // DeleteObject succeeds on missing keys.
        self.client
            .delete_object()
            .bucket(bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(map_s3_operation_error)?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(Box::new(e)))?
            .into_bytes();
        Ok(bytes)
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}
