use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use stitch_storage::{
    ComposeStore, CreateOptions, ObjectReader, StorageError, StorageResult, StoredObject,
    check_compose_sources,
};
use tokio::io::AsyncReadExt;

/// A store operation as observed by [`RecordingStore`].
#[allow(dead_code)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Create { key: String, len: usize, options: CreateOptions },
    CreateFromReader { key: String, len: usize },
    Compose { sources: Vec<String>, destination: String },
    Delete { key: String },
}

/// In-memory store that records every call and can be told to fail.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingStore {
    objects: Mutex<HashMap<(String, String), Bytes>>,
    calls: Mutex<Vec<Call>>,
    /// Fail the n-th create (1-based, counting both create kinds).
    pub fail_create_at: Option<usize>,
    pub fail_compose: bool,
    pub fail_delete: bool,
    pub panic_on_delete: bool,
}

#[allow(dead_code)]
impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_create_at(n: usize) -> Self {
        Self {
            fail_create_at: Some(n),
            ..Self::default()
        }
    }

    pub fn failing_compose() -> Self {
        Self {
            fail_compose: true,
            ..Self::default()
        }
    }

    pub fn failing_delete() -> Self {
        Self {
            fail_delete: true,
            ..Self::default()
        }
    }

    pub fn panicking_delete() -> Self {
        Self {
            panic_on_delete: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn creates(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Create { .. } | Call::CreateFromReader { .. }))
            .collect()
    }

    pub fn composes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Compose { .. }))
            .collect()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete { key } => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    fn record(&self, call: Call) -> usize {
        let mut calls = self.calls.lock().unwrap();
        calls.push(call);
        calls
            .iter()
            .filter(|c| matches!(c, Call::Create { .. } | Call::CreateFromReader { .. }))
            .count()
    }

    fn store(&self, bucket: &str, key: &str, data: Bytes) -> StoredObject {
        let size = data.len() as u64;
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), data);
        StoredObject::new(bucket, key, size)
    }

    fn injected(what: &str) -> StorageError {
        StorageError::S3(format!("injected {what} failure").into())
    }
}

#[async_trait]
impl ComposeStore for RecordingStore {
    async fn create(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        options: CreateOptions,
    ) -> StorageResult<StoredObject> {
        let n = self.record(Call::Create {
            key: key.to_string(),
            len: data.len(),
            options,
        });
        if self.fail_create_at == Some(n) {
            return Err(Self::injected("create"));
        }
        Ok(self.store(bucket, key, data))
    }

    async fn create_from_reader(
        &self,
        bucket: &str,
        key: &str,
        reader: ObjectReader<'_>,
    ) -> StorageResult<StoredObject> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        let n = self.record(Call::CreateFromReader {
            key: key.to_string(),
            len: data.len(),
        });
        if self.fail_create_at == Some(n) {
            return Err(Self::injected("create"));
        }
        Ok(self.store(bucket, key, Bytes::from(data)))
    }

    async fn compose(
        &self,
        bucket: &str,
        sources: &[String],
        destination: &str,
    ) -> StorageResult<StoredObject> {
        self.record(Call::Compose {
            sources: sources.to_vec(),
            destination: destination.to_string(),
        });
        check_compose_sources(sources)?;
        if self.fail_compose {
            return Err(Self::injected("compose"));
        }
        let mut joined = Vec::new();
        {
            let objects = self.objects.lock().unwrap();
            for source in sources {
                let data = objects
                    .get(&(bucket.to_string(), source.clone()))
                    .ok_or_else(|| StorageError::NotFound(source.clone()))?;
                joined.extend_from_slice(data);
            }
        }
        Ok(self.store(bucket, destination, Bytes::from(joined)))
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.record(Call::Delete {
            key: key.to_string(),
        });
        if self.panic_on_delete {
            panic!("injected delete panic");
        }
        if self.fail_delete {
            return Err(Self::injected("delete"));
        }
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}
