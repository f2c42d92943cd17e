pub mod s3;

#[cfg(test)]
pub mod memory;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use s3::S3ObjectStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object `{0}` does not exist")]
    NotFound(String),
    #[error("failed to read upload body: {0}")]
    Body(String),
    #[error("{operation} failed: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },
}

impl StorageError {
    pub fn backend(operation: &'static str, err: impl std::fmt::Display) -> Self {
        StorageError::Backend {
            operation,
            message: err.to_string(),
        }
    }
}

/// The object store holding raw video bytes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Creates the bucket when it is missing. Safe to call repeatedly.
    async fn ensure_bucket(&self) -> Result<(), StorageError>;

    /// Streams `length` bytes from the file at `path` into `key`.
    async fn put_object(
        &self,
        key: &str,
        path: &Path,
        length: u64,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Signed GET URL for an existing object.
    async fn presigned_get_url(&self, key: &str, expires_in: Duration)
        -> Result<String, StorageError>;

    /// Unsigned public location of `key`.
    fn object_url(&self, key: &str) -> String;
}
