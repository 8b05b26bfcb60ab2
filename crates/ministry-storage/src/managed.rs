//! Managed storage-as-a-service backend (Supabase Storage REST shape).
//!
//! Each category maps to its own bucket, and each bucket carries its own
//! public/private flag. Visibility of an object therefore follows the bucket,
//! never the request; [`ManagedStorage::verify_visibility`] makes sure the
//! bucket table agrees with the category policies before any traffic.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ministry_core::{CategoryPolicies, StorageBackend, StorageCategory, Visibility};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::keys::ObjectKey;
use crate::provider_http;
use crate::traits::{
    BackendDescription, DeleteOutcome, PutReceipt, StorageAdapter, StorageError, StorageResult,
};

const API_PREFIX: &str = "/storage/v1";
const DEFAULT_SIGNED_URL_EXPIRY: Duration = Duration::from_secs(3600);
const CACHE_CONTROL_SECS: u64 = 3600;

/// Buckets as provisioned for the ministry project.
const PROVISIONED_BUCKETS: [(StorageCategory, &str, bool); 4] = [
    (StorageCategory::Avatar, "avatars", true),
    (StorageCategory::Recording, "recordings", false),
    (StorageCategory::Sequence, "sequences", false),
    (StorageCategory::Multimedia, "multimedia", true),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedBucket {
    pub name: String,
    pub public: bool,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(rename = "Id")]
    id: Option<String>,
    #[serde(rename = "Key")]
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

#[derive(Clone)]
pub struct ManagedStorage {
    client: Client,
    base_url: String,
    service_key: String,
    buckets: HashMap<StorageCategory, ManagedBucket>,
}

impl std::fmt::Debug for ManagedStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedStorage")
            .field("base_url", &self.base_url)
            .field("buckets", &self.buckets)
            .finish_non_exhaustive()
    }
}

impl ManagedStorage {
    pub fn new(base_url: String, service_key: String, timeout: Duration) -> StorageResult<Self> {
        let buckets = PROVISIONED_BUCKETS
            .iter()
            .map(|(category, name, public)| {
                (
                    *category,
                    ManagedBucket {
                        name: name.to_string(),
                        public: *public,
                    },
                )
            })
            .collect();
        Self::with_buckets(base_url, service_key, timeout, buckets)
    }

    pub fn with_buckets(
        base_url: String,
        service_key: String,
        timeout: Duration,
        buckets: HashMap<StorageCategory, ManagedBucket>,
    ) -> StorageResult<Self> {
        if let Some(missing) = StorageCategory::ALL
            .into_iter()
            .find(|category| !buckets.contains_key(category))
        {
            return Err(StorageError::ConfigError(format!(
                "No managed storage bucket configured for category '{}'",
                missing
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            buckets,
        })
    }

    /// Fail if any bucket's public flag or name disagrees with the category policy.
    pub fn verify_visibility(&self, policies: &CategoryPolicies) -> StorageResult<()> {
        for (category, policy) in policies.iter() {
            let bucket = self.bucket(category);
            if bucket.public != policy.visibility.is_public() {
                return Err(StorageError::ConfigError(format!(
                    "managed storage bucket '{}' is {} but category '{}' is {}",
                    bucket.name,
                    if bucket.public { "public" } else { "private" },
                    category,
                    policy.visibility
                )));
            }
            if bucket.name != policy.container {
                return Err(StorageError::ConfigError(format!(
                    "managed storage bucket '{}' does not match container '{}' for category '{}'",
                    bucket.name, policy.container, category
                )));
            }
        }
        Ok(())
    }

    fn bucket(&self, category: StorageCategory) -> &ManagedBucket {
        // Completeness is checked in the constructor.
        &self.buckets[&category]
    }

    /// Bucket and URL-encoded object path (`{tenant}/{file}`) for a key.
    fn locate(&self, key: &str) -> StorageResult<(&ManagedBucket, String)> {
        let key = ObjectKey::parse(key)?;
        let path = format!(
            "{}/{}",
            urlencoding::encode(key.tenant_segment()),
            urlencoding::encode(key.file_name())
        );
        Ok((self.bucket(key.category()), path))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
    }

    async fn upload_object(
        &self,
        bucket: &ManagedBucket,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<Response> {
        self.authorized(
            self.client
                .post(self.url(&format!("/object/{}/{}", bucket.name, path))),
        )
        .header(reqwest::header::CONTENT_TYPE, content_type)
        .header(
            reqwest::header::CACHE_CONTROL,
            format!("max-age={}", CACHE_CONTROL_SECS),
        )
        .header("x-upsert", "false")
        .body(data)
        .send()
        .await
        .map_err(transport_error)
    }

    /// Create the bucket if needed. A concurrent creator winning is success.
    pub async fn ensure_bucket(&self, bucket: &ManagedBucket) -> StorageResult<()> {
        let response = self
            .authorized(self.client.post(self.url("/bucket")))
            .json(&json!({
                "id": bucket.name,
                "name": bucket.name,
                "public": bucket.public,
            }))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(bucket = %bucket.name, public = bucket.public, "Managed storage bucket created");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT || body.to_lowercase().contains("already exists") {
            tracing::debug!(bucket = %bucket.name, "Managed storage bucket already exists");
            return Ok(());
        }

        Err(status_error(status, &body, "create bucket"))
    }

    async fn create_signed_url(
        &self,
        bucket: &ManagedBucket,
        path: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let response = self
            .authorized(
                self.client
                    .post(self.url(&format!("/object/sign/{}/{}", bucket.name, path))),
            )
            .json(&json!({ "expiresIn": expires_in.as_secs() }))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body, "sign URL"));
        }

        let signed: SignResponse = response
            .json()
            .await
            .map_err(|e| StorageError::BackendError(format!("Invalid sign response: {}", e)))?;

        Ok(self.absolute_signed_url(&signed.signed_url))
    }

    fn absolute_signed_url(&self, signed: &str) -> String {
        if signed.starts_with("http://") || signed.starts_with("https://") {
            signed.to_string()
        } else if signed.starts_with(API_PREFIX) {
            format!("{}{}", self.base_url, signed)
        } else {
            let separator = if signed.starts_with('/') { "" } else { "/" };
            format!("{}{}{}{}", self.base_url, API_PREFIX, separator, signed)
        }
    }
}

const PROVIDER: &str = "managed storage";

fn transport_error(e: reqwest::Error) -> StorageError {
    provider_http::transport_error(PROVIDER, e)
}

fn status_error(status: StatusCode, body: &str, operation: &str) -> StorageError {
    provider_http::status_error(PROVIDER, operation, status, body)
}

/// The API reports some 404s as a 400 with a JSON body, so check both.
fn is_not_found(status: StatusCode, body: &str, what: &str) -> bool {
    let body = body.to_lowercase();
    status == StatusCode::NOT_FOUND
        || body.contains(&format!("{} not found", what))
        || (what == "object" && (body.contains("not_found") || body.contains("not found")))
}

#[async_trait]
impl StorageAdapter for ManagedStorage {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<PutReceipt> {
        let (bucket, path) = self.locate(key)?;
        let size = data.len() as u64;
        let start = std::time::Instant::now();

        let mut response = self
            .upload_object(bucket, &path, data.clone(), content_type)
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if !is_not_found(status, &body, "bucket") {
                tracing::error!(
                    bucket = %bucket.name,
                    key = %key,
                    status = %status,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Managed storage upload failed"
                );
                return Err(status_error(status, &body, "upload"));
            }

            tracing::warn!(bucket = %bucket.name, "Managed storage bucket missing, creating it");
            self.ensure_bucket(bucket).await?;

            response = self
                .upload_object(bucket, &path, data, content_type)
                .await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(status_error(status, &body, "upload"));
            }
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .unwrap_or(UploadResponse { id: None, key: None });

        tracing::info!(
            bucket = %bucket.name,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Managed storage upload successful"
        );

        Ok(PutReceipt {
            provider_id: uploaded
                .id
                .or(uploaded.key)
                .unwrap_or_else(|| format!("{}/{}", bucket.name, path)),
        })
    }

    async fn delete(&self, key: &str) -> StorageResult<DeleteOutcome> {
        let (bucket, path) = self.locate(key)?;
        let start = std::time::Instant::now();

        let response = self
            .authorized(
                self.client
                    .delete(self.url(&format!("/object/{}/{}", bucket.name, path))),
            )
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(
                bucket = %bucket.name,
                key = %key,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Managed storage delete successful"
            );
            return Ok(DeleteOutcome::Deleted);
        }

        let body = response.text().await.unwrap_or_default();
        if is_not_found(status, &body, "object") {
            tracing::debug!(bucket = %bucket.name, key = %key, "Managed storage delete of missing object ignored");
            return Ok(DeleteOutcome::NotFoundIgnored);
        }

        Err(status_error(status, &body, "delete"))
    }

    async fn resolve_access_url(
        &self,
        key: &str,
        _visibility: Visibility,
        expires_in: Option<Duration>,
    ) -> StorageResult<String> {
        let (bucket, path) = self.locate(key)?;

        if bucket.public {
            Ok(self.url(&format!("/object/public/{}/{}", bucket.name, path)))
        } else {
            self.create_signed_url(bucket, &path, expires_in.unwrap_or(DEFAULT_SIGNED_URL_EXPIRY))
                .await
        }
    }

    fn supports_signed_urls(&self) -> bool {
        true
    }

    async fn describe(&self) -> StorageResult<BackendDescription> {
        Ok(BackendDescription {
            backend: StorageBackend::ManagedStorage,
            location: self.base_url.clone(),
            usage: None,
        })
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::ManagedStorage
    }
}
