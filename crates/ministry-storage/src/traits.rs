//! Storage abstraction trait
//!
//! This module defines the adapter contract all storage backends implement and
//! the error type shared by adapters, the access policy and the facade.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ministry_core::{ErrorMetadata, LogLevel, StorageBackend, StorageCategory, UploadRejection, Visibility};
use serde::Serialize;
use thiserror::Error;

/// Storage operation errors
///
/// Messages carry the category, key and backend where known, never credentials.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Rejected(#[from] UploadRejection),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Invalid tenant identifier: {0}")]
    InvalidTenant(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    /// The provider answered but refused the request (bad request, permission denied).
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Network, authentication-refresh or provider-side failure; safe to retry.
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),

    /// Raised by adapters whose "make public" step is separate from the write.
    #[error("Object {provider_id} was written but public access could not be granted: {message}")]
    PermissionGrantFailed { provider_id: String, message: String },

    #[error("{backend} storage failed for {category} object '{key}': {source}")]
    Backend {
        backend: StorageBackend,
        category: StorageCategory,
        key: String,
        #[source]
        source: Box<StorageError>,
    },

    #[error("{backend} stored {category} object '{key}' (provider id {provider_id}) but it is not publicly readable: {message}")]
    PartialUpload {
        backend: StorageBackend,
        category: StorageCategory,
        key: String,
        provider_id: String,
        message: String,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// Innermost error, skipping facade context.
    pub fn root(&self) -> &StorageError {
        match self {
            StorageError::Backend { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the caller may retry the same operation.
    pub fn is_retryable(&self) -> bool {
        self.is_recoverable()
    }
}

/// Static metadata per variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn storage_error_static_metadata(
    err: &StorageError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        StorageError::Rejected(rejection) => (
            rejection.http_status_code(),
            rejection.error_code(),
            false,
            rejection.suggested_action(),
            false,
            LogLevel::Debug,
        ),
        StorageError::InvalidKey(_) | StorageError::InvalidTenant(_) => (
            400,
            "INVALID_STORAGE_KEY",
            false,
            Some("Check the storage key and try again"),
            false,
            LogLevel::Debug,
        ),
        StorageError::ConfigError(_) => (
            500,
            "STORAGE_CONFIGURATION_ERROR",
            false,
            Some("Contact support if this error persists"),
            true,
            LogLevel::Error,
        ),
        StorageError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the storage key exists"),
            false,
            LogLevel::Debug,
        ),
        StorageError::BackendError(_) => (
            502,
            "STORAGE_REJECTED",
            false,
            Some("Contact support if this error persists"),
            true,
            LogLevel::Error,
        ),
        StorageError::IoError(e) if e.kind() == std::io::ErrorKind::PermissionDenied => (
            502,
            "STORAGE_REJECTED",
            false,
            Some("Contact support if this error persists"),
            true,
            LogLevel::Error,
        ),
        StorageError::UploadFailed(_)
        | StorageError::DeleteFailed(_)
        | StorageError::Unavailable(_)
        | StorageError::IoError(_) => (
            503,
            "STORAGE_UNAVAILABLE",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        StorageError::Timeout(_) => (
            504,
            "STORAGE_TIMEOUT",
            true,
            Some("Retry after a short delay"),
            false,
            LogLevel::Warn,
        ),
        StorageError::PermissionGrantFailed { .. } | StorageError::PartialUpload { .. } => (
            502,
            "STORAGE_PARTIAL_UPLOAD",
            true,
            Some("Retry granting public access; the file does not need to be uploaded again"),
            true,
            LogLevel::Warn,
        ),
        StorageError::Backend { source, .. } => storage_error_static_metadata(source),
    }
}

impl ErrorMetadata for StorageError {
    fn http_status_code(&self) -> u16 {
        storage_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        storage_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        storage_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        storage_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        storage_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        storage_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self.root() {
            StorageError::Rejected(rejection) => rejection.client_message(),
            StorageError::InvalidKey(msg) | StorageError::InvalidTenant(msg) => msg.clone(),
            StorageError::NotFound(key) => format!("File not found: {}", key),
            StorageError::Timeout(_) => "Storage did not respond in time".to_string(),
            StorageError::PermissionGrantFailed { .. } | StorageError::PartialUpload { .. } => {
                "File was stored but could not be made public".to_string()
            }
            _ => "Failed to access storage".to_string(),
        }
    }
}

/// Acknowledgement of a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PutReceipt {
    /// Backend-native identifier (file id, ETag or the key itself).
    pub provider_id: String,
}

/// Outcome of a delete. A missing object is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    NotFoundIgnored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageUsage {
    pub used_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_bytes: Option<u64>,
}

/// Operational view of the active backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendDescription {
    pub backend: StorageBackend,
    /// Root directory, bucket or provider endpoint.
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<StorageUsage>,
}

/// Adapter contract shared by every storage backend.
///
/// **Key format:** `{category}/{tenant|default}/{file}`. Adapters call
/// [`crate::keys::validate_key`] before touching the backend.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Write an object, creating any missing parent container.
    ///
    /// Container creation must tolerate a concurrent creator winning the race.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<PutReceipt>;

    /// Delete an object. Deleting a missing object succeeds with
    /// [`DeleteOutcome::NotFoundIgnored`]; any other failure is surfaced.
    async fn delete(&self, key: &str) -> StorageResult<DeleteOutcome>;

    /// Resolve a URL for an object.
    ///
    /// Public objects get a stable, cacheable URL. Private objects get a
    /// time-bounded URL that callers must not assume is stable across calls.
    async fn resolve_access_url(
        &self,
        key: &str,
        visibility: Visibility,
        expires_in: Option<Duration>,
    ) -> StorageResult<String>;

    /// Public URL for an object this adapter has just written.
    ///
    /// Adapters whose URLs depend on a provider id build it from the receipt
    /// instead of looking the object up again.
    async fn uploaded_object_url(&self, key: &str, _receipt: &PutReceipt) -> StorageResult<String> {
        self.resolve_access_url(key, Visibility::Public, None).await
    }

    /// Re-run the step that makes an already written object publicly readable.
    async fn grant_public_access(&self, _key: &str) -> StorageResult<()> {
        Ok(())
    }

    /// Whether the backend can issue real expiring URLs for private objects.
    fn supports_signed_urls(&self) -> bool;

    async fn describe(&self) -> StorageResult<BackendDescription>;

    fn backend_type(&self) -> StorageBackend;
}
