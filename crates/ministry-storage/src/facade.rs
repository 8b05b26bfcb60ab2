//! Single entry point for storing, deleting and addressing uploaded files.
//!
//! The facade owns the whole upload pipeline: validation against the
//! category policy, key derivation, the adapter write and URL resolution.
//! Callers never talk to an adapter directly.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ministry_core::validation::normalize_mime_type;
use ministry_core::{validate_upload, CategoryPolicies, StorageCategory};
use serde::Serialize;

use crate::access::AccessPolicy;
use crate::backend::ActiveBackend;
use crate::keys::{parse_category, KeyNamingPolicy};
use crate::proxy_token::ProxyTokenError;
use crate::traits::{BackendDescription, DeleteOutcome, StorageAdapter, StorageError, StorageResult};

const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub category: StorageCategory,
    /// Caller-supplied name; only its extension is kept.
    pub file_name: String,
    pub data: Bytes,
    pub content_type: String,
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    pub url: String,
    pub key: String,
    /// Final path segment of the key.
    pub file_name: String,
}

pub struct StorageFacade<A = ActiveBackend> {
    adapter: A,
    policies: Arc<CategoryPolicies>,
    access: AccessPolicy,
    keys: KeyNamingPolicy,
    operation_timeout: Duration,
}

impl<A: StorageAdapter> StorageFacade<A> {
    /// Fails when the access policy needs something the adapter cannot do.
    pub fn new(adapter: A, policies: Arc<CategoryPolicies>, access: AccessPolicy) -> StorageResult<Self> {
        access.check_backend(&adapter)?;

        Ok(Self {
            adapter,
            policies,
            access,
            keys: KeyNamingPolicy::new(),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        })
    }

    pub fn with_key_policy(mut self, keys: KeyNamingPolicy) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn policies(&self) -> &CategoryPolicies {
        &self.policies
    }

    pub fn access_policy(&self) -> &AccessPolicy {
        &self.access
    }

    #[tracing::instrument(
        skip(self, request),
        fields(
            category = %request.category,
            size_bytes = request.data.len(),
            backend = %self.adapter.backend_type()
        )
    )]
    pub async fn upload(&self, request: UploadRequest) -> StorageResult<UploadResult> {
        let category = request.category;

        validate_upload(
            &self.policies,
            category,
            &request.content_type,
            request.data.len() as u64,
        )
        .inspect_err(|rejection| tracing::debug!(%rejection, "Upload rejected"))?;

        let key = self
            .keys
            .derive_key(category, &request.file_name, request.tenant_id.as_deref())?;
        let key_str = key.to_string();
        let content_type = normalize_mime_type(&request.content_type);

        let receipt = match self
            .bounded(self.adapter.put(&key_str, request.data, content_type))
            .await
        {
            Ok(receipt) => {
                tracing::debug!(key = %key_str, provider_id = %receipt.provider_id, "Object stored");
                receipt
            }
            Err(StorageError::PermissionGrantFailed {
                provider_id,
                message,
            }) => {
                tracing::warn!(key = %key_str, provider_id = %provider_id, "Object stored but not made public");
                return Err(StorageError::PartialUpload {
                    backend: self.adapter.backend_type(),
                    category,
                    key: key_str,
                    provider_id,
                    message,
                });
            }
            Err(e) => return Err(self.with_context(category, &key_str, e)),
        };

        let url = self
            .bounded(
                self.access
                    .upload_url_for(category, &key_str, &receipt, &self.adapter),
            )
            .await
            .map_err(|e| self.with_context(category, &key_str, e))?;

        tracing::info!(key = %key_str, "Upload complete");

        Ok(UploadResult {
            url,
            file_name: key.file_name().to_string(),
            key: key_str,
        })
    }

    /// Idempotent: deleting a missing object succeeds.
    #[tracing::instrument(skip(self), fields(backend = %self.adapter.backend_type()))]
    pub async fn delete(&self, key: &str) -> StorageResult<DeleteOutcome> {
        let category = parse_category(key)?;
        self.bounded(self.adapter.delete(key))
            .await
            .map_err(|e| self.with_context(category, key, e))
    }

    /// URL for a stored object. `expires_in` only applies to private categories.
    pub async fn get_access_url(&self, key: &str, expires_in: Option<Duration>) -> StorageResult<String> {
        let category = parse_category(key)?;
        self.bounded(self.access.url_for(category, key, &self.adapter, expires_in))
            .await
            .map_err(|e| self.with_context(category, key, e))
    }

    /// Re-run the "make public" step for an object left behind by a partial upload.
    #[tracing::instrument(skip(self), fields(backend = %self.adapter.backend_type()))]
    pub async fn retry_public_grant(&self, key: &str) -> StorageResult<()> {
        let category = parse_category(key)?;
        if !self.policies.visibility(category).is_public() {
            return Err(StorageError::InvalidKey(format!(
                "'{}' belongs to private category '{}' and cannot be made public",
                key, category
            )));
        }
        self.bounded(self.adapter.grant_public_access(key))
            .await
            .map_err(|e| self.with_context(category, key, e))
    }

    /// Check a proxy token presented for a private object.
    pub fn verify_proxy_url(&self, key: &str, token: &str) -> StorageResult<()> {
        let signer = self.access.proxy_signer().ok_or_else(|| {
            StorageError::ConfigError("proxy access is not enabled".to_string())
        })?;
        parse_category(key)?;
        signer.verify(key, token).map(|_| ()).map_err(|e| match e {
            ProxyTokenError::Expired => StorageError::NotFound(format!("{} (link expired)", key)),
            ProxyTokenError::Invalid => StorageError::InvalidKey(e.to_string()),
        })
    }

    pub async fn describe_backend(&self) -> StorageResult<BackendDescription> {
        self.bounded(self.adapter.describe()).await
    }

    async fn bounded<T>(&self, operation: impl Future<Output = StorageResult<T>>) -> StorageResult<T> {
        tokio::time::timeout(self.operation_timeout, operation)
            .await
            .map_err(|_| StorageError::Timeout(self.operation_timeout))?
    }

    fn with_context(&self, category: StorageCategory, key: &str, err: StorageError) -> StorageError {
        match err {
            StorageError::Rejected(_)
            | StorageError::InvalidKey(_)
            | StorageError::InvalidTenant(_)
            | StorageError::Backend { .. }
            | StorageError::PartialUpload { .. } => err,
            source => {
                tracing::error!(error = %source, key = %key, category = %category, "Storage operation failed");
                StorageError::Backend {
                    backend: self.adapter.backend_type(),
                    category,
                    key: key.to_string(),
                    source: Box::new(source),
                }
            }
        }
    }
}
