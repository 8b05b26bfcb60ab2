use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ministry_core::{StorageBackend, Visibility};

#[cfg(feature = "storage-drive")]
use crate::drive::DriveStorage;
#[cfg(feature = "storage-local")]
use crate::local::LocalStorage;
#[cfg(feature = "storage-managed")]
use crate::managed::ManagedStorage;
#[cfg(feature = "storage-s3")]
use crate::s3::S3Storage;
use crate::traits::{BackendDescription, DeleteOutcome, PutReceipt, StorageAdapter, StorageResult};

/// The one adapter selected at startup.
#[derive(Debug)]
pub enum ActiveBackend {
    #[cfg(feature = "storage-local")]
    Local(LocalStorage),
    #[cfg(feature = "storage-s3")]
    ObjectStore(S3Storage),
    #[cfg(feature = "storage-managed")]
    Managed(ManagedStorage),
    #[cfg(feature = "storage-drive")]
    CloudDrive(DriveStorage),
}

macro_rules! dispatch {
    ($self:ident, $inner:ident => $body:expr) => {
        match $self {
            #[cfg(feature = "storage-local")]
            ActiveBackend::Local($inner) => $body,
            #[cfg(feature = "storage-s3")]
            ActiveBackend::ObjectStore($inner) => $body,
            #[cfg(feature = "storage-managed")]
            ActiveBackend::Managed($inner) => $body,
            #[cfg(feature = "storage-drive")]
            ActiveBackend::CloudDrive($inner) => $body,
        }
    };
}

#[async_trait]
impl StorageAdapter for ActiveBackend {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<PutReceipt> {
        dispatch!(self, backend => backend.put(key, data, content_type).await)
    }

    async fn delete(&self, key: &str) -> StorageResult<DeleteOutcome> {
        dispatch!(self, backend => backend.delete(key).await)
    }

    async fn resolve_access_url(
        &self,
        key: &str,
        visibility: Visibility,
        expires_in: Option<Duration>,
    ) -> StorageResult<String> {
        dispatch!(self, backend => backend.resolve_access_url(key, visibility, expires_in).await)
    }

    async fn uploaded_object_url(&self, key: &str, receipt: &PutReceipt) -> StorageResult<String> {
        dispatch!(self, backend => backend.uploaded_object_url(key, receipt).await)
    }

    async fn grant_public_access(&self, key: &str) -> StorageResult<()> {
        dispatch!(self, backend => backend.grant_public_access(key).await)
    }

    fn supports_signed_urls(&self) -> bool {
        dispatch!(self, backend => backend.supports_signed_urls())
    }

    async fn describe(&self) -> StorageResult<BackendDescription> {
        dispatch!(self, backend => backend.describe().await)
    }

    fn backend_type(&self) -> StorageBackend {
        dispatch!(self, backend => backend.backend_type())
    }
}
