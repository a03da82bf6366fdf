use crate::traits::{validate_key, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::Error as ObjectStoreError;
use object_store::{Attribute, Attributes, ObjectStore, ObjectStoreExt, PutOptions, PutPayload};
use std::time::{Duration, Instant};

/// S3 (or S3-compatible, e.g. MinIO) object storage
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
}

impl S3Storage {
    /// Build a client for `bucket`. Credentials come from the usual `AWS_*`
    /// variables; `endpoint_url` points at an S3-compatible server such as
    /// `http://localhost:9000`.
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket.clone());

        if let Some(endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder.with_endpoint(endpoint).with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage { store, bucket })
    }

    fn location(storage_key: &str) -> StorageResult<Path> {
        validate_key(storage_key)?;
        Ok(Path::from(storage_key.to_string()))
    }

    fn log_failure(&self, operation: &str, storage_key: &str, started: Instant, error: &ObjectStoreError) {
        tracing::error!(
            error = %error,
            bucket = %self.bucket,
            key = %storage_key,
            operation,
            duration_ms = started.elapsed().as_millis() as u64,
            "S3 request failed"
        );
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn download(&self, storage_key: &str) -> StorageResult<Bytes> {
        let location = Self::location(storage_key)?;
        let started = Instant::now();

        let object = match self.store.get(&location).await {
            Ok(object) => object,
            Err(ObjectStoreError::NotFound { .. }) => {
                return Err(StorageError::NotFound(storage_key.to_string()))
            }
            Err(e) => {
                self.log_failure("download", storage_key, started, &e);
                return Err(StorageError::DownloadFailed(e.to_string()));
            }
        };
        let bytes = object
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        tracing::debug!(
            key = %storage_key,
            size_bytes = bytes.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Downloaded from S3"
        );
        Ok(bytes)
    }

    async fn upload(
        &self,
        storage_key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        let location = Self::location(storage_key)?;
        let size_bytes = data.len();
        let started = Instant::now();

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        if let Err(e) = self
            .store
            .put_opts(&location, PutPayload::from(data), opts)
            .await
        {
            self.log_failure("upload", storage_key, started, &e);
            return Err(StorageError::UploadFailed(e.to_string()));
        }

        tracing::debug!(
            key = %storage_key,
            size_bytes,
            content_type,
            duration_ms = started.elapsed().as_millis() as u64,
            "Uploaded to S3"
        );
        Ok(())
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        let location = Self::location(storage_key)?;
        let started = Instant::now();

        // Deleting a missing object is not an error
        match self.store.delete(&location).await {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => Ok(()),
            Err(e) => {
                self.log_failure("delete", storage_key, started, &e);
                Err(StorageError::DeleteFailed(e.to_string()))
            }
        }
    }

    async fn get_presigned_url(
        &self,
        storage_key: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let location = Self::location(storage_key)?;
        let url = self
            .store
            .signed_url(Method::GET, &location, expires_in)
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;
        Ok(url.to_string())
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        let location = Self::location(storage_key)?;
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
