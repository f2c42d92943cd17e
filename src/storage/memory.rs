use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::storage::{ObjectStore, StorageError};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// In-process `ObjectStore` that records every signing request.
pub struct MemoryObjectStore {
    bucket: String,
    objects: Mutex<HashMap<String, StoredObject>>,
    signed: Mutex<Vec<(String, Duration)>>,
    fail_puts: bool,
}

impl MemoryObjectStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_owned(),
            objects: Mutex::new(HashMap::new()),
            signed: Mutex::new(Vec::new()),
            fail_puts: false,
        }
    }

    pub fn failing(bucket: &str) -> Self {
        Self {
            fail_puts: true,
            ..Self::new(bucket)
        }
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn signed(&self) -> Vec<(String, Duration)> {
        self.signed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn ensure_bucket(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        path: &Path,
        length: u64,
        content_type: &str,
    ) -> Result<(), StorageError> {
        if self.fail_puts {
            return Err(StorageError::backend("put_object", "connection refused"));
        }
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| StorageError::Body(e.to_string()))?;
        if bytes.len() as u64 != length {
            return Err(StorageError::Body(format!(
                "declared {length} bytes, read {}",
                bytes.len()
            )));
        }
        self.objects.lock().unwrap().insert(
            key.to_owned(),
            StoredObject {
                bytes,
                content_type: content_type.to_owned(),
            },
        );
        Ok(())
    }

    async fn presigned_get_url(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        if !self.objects.lock().unwrap().contains_key(key) {
            return Err(StorageError::NotFound(key.to_owned()));
        }
        self.signed
            .lock()
            .unwrap()
            .push((key.to_owned(), expires_in));
        Ok(format!(
            "memory://{}/{}?X-Amz-Expires={}",
            self.bucket,
            key,
            expires_in.as_secs()
        ))
    }

    fn object_url(&self, key: &str) -> String {
        format!("memory://{}/{}", self.bucket, key)
    }
}
