//! Ministry Storage Library
//!
//! This crate provides the storage facade for uploaded ministry media and the
//! adapters behind it: local filesystem, S3-compatible object store, managed
//! storage service and cloud drive. Exactly one adapter is active per process.
//!
//! # Storage key format
//!
//! All backends use the same key layout:
//!
//! - `{category}/{tenant}/{uuid}.{ext}` for tenant uploads
//! - `{category}/default/{uuid}.{ext}` when no tenant is given
//!
//! Keys must not contain `..`, a leading `/`, backslashes or empty segments.
//! Key generation is centralized in the `keys` module so all backends stay
//! consistent.

pub mod access;
pub mod backend;
#[cfg(feature = "storage-drive")]
pub mod drive;
pub mod facade;
pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-managed")]
pub mod managed;
#[cfg(any(feature = "storage-managed", feature = "storage-drive"))]
mod provider_http;
pub mod proxy_token;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use access::AccessPolicy;
pub use backend::ActiveBackend;
#[cfg(feature = "storage-drive")]
pub use drive::DriveStorage;
pub use facade::{StorageFacade, UploadRequest, UploadResult};
pub use factory::{create_facade, create_storage};
pub use keys::{KeyNamingPolicy, ObjectKey};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-managed")]
pub use managed::ManagedStorage;
pub use ministry_core::{StorageBackend, StorageCategory, Visibility};
pub use proxy_token::{ProxyTokenError, ProxyUrlSigner};
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{
    BackendDescription, DeleteOutcome, PutReceipt, StorageAdapter, StorageError, StorageResult,
    StorageUsage,
};
