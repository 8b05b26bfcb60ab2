use crate::access::AccessPolicy;
use crate::backend::ActiveBackend;
#[cfg(feature = "storage-drive")]
use crate::drive::{DriveCredentials, DriveStorage};
use crate::facade::StorageFacade;
#[cfg(feature = "storage-local")]
use crate::local::LocalStorage;
#[cfg(feature = "storage-managed")]
use crate::managed::ManagedStorage;
use crate::proxy_token::ProxyUrlSigner;
#[cfg(feature = "storage-s3")]
use crate::s3::S3Storage;
use crate::{StorageBackend, StorageError, StorageResult};
use ministry_core::{CategoryPolicies, PrivateAccessMode, StorageConfig};
use std::sync::Arc;

fn required<'a>(value: &'a Option<String>, name: &str) -> StorageResult<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| StorageError::ConfigError(format!("{} not configured", name)))
}

/// Create the storage backend selected by configuration
#[allow(unused_variables)]
pub async fn create_storage(
    config: &StorageConfig,
    policies: &CategoryPolicies,
) -> StorageResult<ActiveBackend> {
    match config.storage_backend {
        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = required(&config.local_storage_path, "LOCAL_STORAGE_PATH")?;
            let storage =
                LocalStorage::new(base_path, config.local_storage_base_url.clone()).await?;
            Ok(ActiveBackend::Local(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-s3")]
        StorageBackend::ObjectStore => {
            let bucket = required(&config.s3_bucket, "S3_BUCKET")?.to_string();
            let region = config
                .s3_region_or_default()
                .map(String::from)
                .ok_or_else(|| {
                    StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
                })?;

            let storage = S3Storage::new(bucket, region, config.s3_endpoint.clone())?
                .with_cdn_base_url(config.cdn_base_url.clone())
                .with_cache_control(config.s3_cache_control.clone());
            Ok(ActiveBackend::ObjectStore(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::ObjectStore => Err(StorageError::ConfigError(
            "Object store backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-managed")]
        StorageBackend::ManagedStorage => {
            let url = required(&config.managed_storage_url, "MANAGED_STORAGE_URL")?;
            let key = required(
                &config.managed_storage_service_key,
                "MANAGED_STORAGE_SERVICE_KEY",
            )?;

            let storage =
                ManagedStorage::new(url.to_string(), key.to_string(), config.operation_timeout())?;
            storage.verify_visibility(policies)?;
            Ok(ActiveBackend::Managed(storage))
        }

        #[cfg(not(feature = "storage-managed"))]
        StorageBackend::ManagedStorage => Err(StorageError::ConfigError(
            "Managed storage backend not available (storage-managed feature not enabled)"
                .to_string(),
        )),

        #[cfg(feature = "storage-drive")]
        StorageBackend::CloudDrive => {
            let credentials = DriveCredentials {
                client_id: required(&config.drive_client_id, "DRIVE_CLIENT_ID")?.to_string(),
                client_secret: required(&config.drive_client_secret, "DRIVE_CLIENT_SECRET")?
                    .to_string(),
                refresh_token: required(&config.drive_refresh_token, "DRIVE_REFRESH_TOKEN")?
                    .to_string(),
            };

            let storage = DriveStorage::new(
                credentials,
                config.drive_root_folder_id.clone(),
                policies,
                config.operation_timeout(),
            )?;
            Ok(ActiveBackend::CloudDrive(storage))
        }

        #[cfg(not(feature = "storage-drive"))]
        StorageBackend::CloudDrive => Err(StorageError::ConfigError(
            "Cloud drive backend not available (storage-drive feature not enabled)".to_string(),
        )),
    }
}

/// Access policy for private objects as configured.
pub fn create_access_policy(
    config: &StorageConfig,
    policies: Arc<CategoryPolicies>,
) -> StorageResult<AccessPolicy> {
    match config.private_access_mode {
        PrivateAccessMode::Proxy => {
            let secret = required(&config.proxy_secret, "STORAGE_PROXY_SECRET")?;
            let signer = ProxyUrlSigner::new(&config.proxy_base_path, secret.as_bytes())?;
            Ok(AccessPolicy::proxy(policies, signer, config.signed_url_expiry()))
        }
        PrivateAccessMode::Signed => Ok(AccessPolicy::signed(policies, config.signed_url_expiry())),
    }
}

/// Validate configuration and build the facade over the selected backend.
///
/// Every configuration problem surfaces here, before any upload is attempted.
pub async fn create_facade(config: &StorageConfig) -> StorageResult<StorageFacade> {
    config
        .validate()
        .map_err(|e| StorageError::ConfigError(e.to_string()))?;

    let policies = Arc::new(config.category_policies());
    let backend = create_storage(config, &policies).await?;
    let access = create_access_policy(config, policies.clone())?;

    let facade = StorageFacade::new(backend, policies, access)?
        .with_operation_timeout(config.operation_timeout());

    tracing::info!(
        backend = %config.storage_backend,
        private_access_mode = ?config.private_access_mode,
        "Storage facade initialized"
    );

    Ok(facade)
}
