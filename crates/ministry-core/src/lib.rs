//! Ministry Core Library
//!
//! This crate provides the domain types shared by the storage core: upload
//! categories and their policies, backend selection, environment configuration,
//! upload validation and error metadata.

pub mod config;
pub mod error;
pub mod policy;
pub mod storage_types;
pub mod validation;

// Re-export commonly used types
pub use config::{LogFormat, PrivateAccessMode, StorageConfig};
pub use error::{ErrorMetadata, LogLevel};
pub use policy::{CategoryPolicies, CategoryPolicy, PolicyError};
pub use storage_types::{StorageBackend, StorageCategory, Visibility};
pub use validation::{validate_upload, RejectionReason, UploadRejection};
