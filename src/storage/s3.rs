/// S3-compatible object store (MinIO in development) backed by aws-sdk-s3.
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;

use crate::config::ObjectStoreConfig;
use crate::storage::{ObjectStore, StorageError};

#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    config: ObjectStoreConfig,
}

impl S3ObjectStore {
    /// Builds the client from explicit settings; no ambient AWS profile is read.
    pub async fn connect(config: &ObjectStoreConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "portal_object_store",
        );

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(&config.endpoint)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.force_path_style)
            .build();

        log::info!(
            "Object store client ready for bucket {} at {}",
            config.bucket,
            config.endpoint
        );

        Self {
            client: Client::from_conf(s3_config),
            config: config.clone(),
        }
    }

    async fn create_bucket(&self) -> Result<(), StorageError> {
        let mut request = self.client.create_bucket().bucket(&self.config.bucket);
        // us-east-1 is the implicit location and must not be sent explicitly.
        if self.config.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(
                        self.config.region.as_str(),
                    ))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                log::info!("Created bucket {}", self.config.bucket);
                Ok(())
            }
            Err(err) => match err.as_service_error() {
                Some(e) if e.is_bucket_already_owned_by_you() || e.is_bucket_already_exists() => {
                    Ok(())
                }
                _ => Err(StorageError::backend(
                    "create_bucket",
                    DisplayErrorContext(&err),
                )),
            },
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn ensure_bucket(&self) -> Result<(), StorageError> {
        match self
            .client
            .head_bucket()
            .bucket(&self.config.bucket)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => match err.as_service_error() {
                Some(e) if e.is_not_found() => self.create_bucket().await,
                _ => Err(StorageError::backend("head_bucket", DisplayErrorContext(&err))),
            },
        }
    }

    async fn put_object(
        &self,
        key: &str,
        path: &Path,
        length: u64,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::Body(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .content_length(length as i64)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::backend("put_object", DisplayErrorContext(&e)))?;

        Ok(())
    }

    async fn presigned_get_url(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        // Presigning is offline, so check the object first to fail on stale keys.
        if let Err(err) = self
            .client
            .head_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
        {
            return Err(match err.as_service_error() {
                Some(e) if e.is_not_found() => StorageError::NotFound(key.to_owned()),
                _ => StorageError::backend("head_object", DisplayErrorContext(&err)),
            });
        }

        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::backend("presigning_config", e))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::backend("presign_get_object", DisplayErrorContext(&e)))?;

        Ok(request.uri().to_string())
    }

    fn object_url(&self, key: &str) -> String {
        self.config.object_url(key)
    }
}
