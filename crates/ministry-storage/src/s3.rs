use crate::keys::validate_key;
use crate::traits::{
    BackendDescription, DeleteOutcome, PutReceipt, StorageAdapter, StorageError, StorageResult,
};
use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use ministry_core::{StorageBackend, Visibility};
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, Attributes, ObjectStore, ObjectStoreExt, PutOptions, PutPayload,
    Result as ObjectResult,
};
use std::time::Duration;

const DEFAULT_SIGNED_URL_EXPIRY: Duration = Duration::from_secs(3600);

/// S3-compatible object store implementation
///
/// One bucket holds every category; the category is the first key segment.
/// Public objects are addressed through the CDN when one is configured.
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    region: String,
    endpoint_url: Option<String>, // Custom endpoint for S3-compatible providers
    cdn_base_url: Option<String>,
    cache_control: Option<String>,
}

impl std::fmt::Debug for S3Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Storage")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("cdn_base_url", &self.cdn_base_url)
            .finish_non_exhaustive()
    }
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub fn new(bucket: String, region: String, endpoint_url: Option<String>) -> StorageResult<Self> {
        // Credentials come from the standard AWS environment variables.
        Self::from_builder(AmazonS3Builder::from_env(), bucket, region, endpoint_url)
    }

    /// Build from a pre-configured builder, e.g. one carrying explicit credentials.
    pub fn from_builder(
        builder: AmazonS3Builder,
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        let mut builder = builder
            .with_region(region.clone())
            .with_bucket_name(bucket.clone());

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage {
            store,
            bucket,
            region,
            endpoint_url,
            cdn_base_url: None,
            cache_control: None,
        })
    }

    pub fn with_cdn_base_url(mut self, cdn_base_url: Option<String>) -> Self {
        self.cdn_base_url = cdn_base_url;
        self
    }

    /// Cache-Control header stored with every object.
    pub fn with_cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.cache_control = Some(cache_control.into());
        self
    }

    /// Generate public URL for S3 object
    ///
    /// CDN first; then the custom endpoint (path-style); then the standard AWS
    /// virtual-hosted form `https://{bucket}.s3.{region}.amazonaws.com/{key}`.
    fn generate_url(&self, key: &str) -> String {
        if let Some(ref cdn) = self.cdn_base_url {
            format!("{}/{}", cdn.trim_end_matches('/'), key)
        } else if let Some(ref endpoint) = self.endpoint_url {
            let base_url = endpoint.trim_end_matches('/');
            format!("{}/{}/{}", base_url, self.bucket, key)
        } else {
            format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            )
        }
    }

    async fn presigned_url(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let location = Path::from(key.to_string());
        let url_result: ObjectResult<_> = self
            .store
            .signed_url(Method::GET, &location, expires_in)
            .await;

        let url = url_result
            .map_err(|e| StorageError::BackendError(e.to_string()))?
            .to_string();

        Ok(url)
    }
}

fn map_object_store_error(e: ObjectStoreError, key: &str) -> StorageError {
    match e {
        ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
        ObjectStoreError::PermissionDenied { .. } | ObjectStoreError::Unauthenticated { .. } => {
            StorageError::BackendError(e.to_string())
        }
        other => StorageError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl StorageAdapter for S3Storage {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<PutReceipt> {
        validate_key(key)?;

        let size = data.len() as u64;
        let location = Path::from(key.to_string());
        let start = std::time::Instant::now();

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        if let Some(ref cache_control) = self.cache_control {
            attributes.insert(Attribute::CacheControl, cache_control.clone().into());
        }
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        let result: ObjectResult<_> = self
            .store
            .put_opts(&location, PutPayload::from(data), options)
            .await;

        let put = result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            map_object_store_error(e, key)
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(PutReceipt {
            provider_id: put.e_tag.unwrap_or_else(|| key.to_string()),
        })
    }

    async fn delete(&self, key: &str) -> StorageResult<DeleteOutcome> {
        validate_key(key)?;

        let start = std::time::Instant::now();
        let location = Path::from(key.to_string());

        // S3 reports success for missing keys; other stores may say NotFound.
        let result: ObjectResult<_> = self.store.delete(&location).await;

        let outcome = match result {
            Ok(()) => DeleteOutcome::Deleted,
            Err(ObjectStoreError::NotFound { .. }) => DeleteOutcome::NotFoundIgnored,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                return Err(map_object_store_error(e, key));
            }
        };

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(outcome)
    }

    async fn resolve_access_url(
        &self,
        key: &str,
        visibility: Visibility,
        expires_in: Option<Duration>,
    ) -> StorageResult<String> {
        validate_key(key)?;

        match visibility {
            Visibility::Public => Ok(self.generate_url(key)),
            Visibility::Private => {
                self.presigned_url(key, expires_in.unwrap_or(DEFAULT_SIGNED_URL_EXPIRY))
                    .await
            }
        }
    }

    fn supports_signed_urls(&self) -> bool {
        true
    }

    async fn describe(&self) -> StorageResult<BackendDescription> {
        let location = match self.endpoint_url {
            Some(ref endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), self.bucket),
            None => format!("s3://{} ({})", self.bucket, self.region),
        };

        Ok(BackendDescription {
            backend: StorageBackend::ObjectStore,
            location,
            usage: None,
        })
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::ObjectStore
    }
}
