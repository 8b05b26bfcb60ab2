//! Configuration module
//!
//! Storage configuration is read once at process start from environment
//! variables (a `.env` file is honoured). Everything the storage core needs,
//! backend selection, per-backend credentials, access policy and size
//! overrides, lives here so it is centralized in one place.

use std::env;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::time::Duration;

use crate::policy::CategoryPolicies;
use crate::storage_types::{StorageBackend, StorageCategory};

const SIGNED_URL_EXPIRY_SECS: u64 = 3600;
const OPERATION_TIMEOUT_SECS: u64 = 30;
const MIN_PROXY_SECRET_LEN: usize = 32;
const DEFAULT_S3_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";
const BYTES_PER_MB: u64 = 1024 * 1024;

/// How private objects are handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivateAccessMode {
    /// Same-origin route with an HMAC-signed expiry, authorized by the serving layer.
    Proxy,
    /// Backend-native presigned URL.
    Signed,
}

impl FromStr for PrivateAccessMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "proxy" => Ok(PrivateAccessMode::Proxy),
            "signed" => Ok(PrivateAccessMode::Signed),
            _ => Err(anyhow::anyhow!("Invalid private access mode: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone)]
pub struct StorageConfig {
    pub environment: String,
    pub log_format: LogFormat,
    pub storage_backend: StorageBackend,
    // Local
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: String,
    // Object store (S3-compatible)
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub aws_region: Option<String>,
    pub s3_cache_control: String,
    pub cdn_base_url: Option<String>,
    // Managed storage
    pub managed_storage_url: Option<String>,
    pub managed_storage_service_key: Option<String>,
    // Cloud drive
    pub drive_client_id: Option<String>,
    pub drive_client_secret: Option<String>,
    pub drive_refresh_token: Option<String>,
    pub drive_root_folder_id: Option<String>,
    // Access policy
    pub private_access_mode: PrivateAccessMode,
    pub proxy_base_path: String,
    pub proxy_secret: Option<String>,
    pub signed_url_expiry_secs: u64,
    pub operation_timeout_secs: u64,
    // Per-category size overrides, in MB
    pub avatar_max_size_mb: Option<u64>,
    pub recording_max_size_mb: Option<u64>,
    pub sequence_max_size_mb: Option<u64>,
    pub multimedia_max_size_mb: Option<u64>,
}

fn redact(value: &Option<String>) -> &'static str {
    if value.is_some() {
        "[redacted]"
    } else {
        "<unset>"
    }
}

impl Debug for StorageConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("StorageConfig")
            .field("environment", &self.environment)
            .field("storage_backend", &self.storage_backend)
            .field("local_storage_path", &self.local_storage_path)
            .field("local_storage_base_url", &self.local_storage_base_url)
            .field("s3_bucket", &self.s3_bucket)
            .field("s3_region", &self.s3_region)
            .field("s3_endpoint", &self.s3_endpoint)
            .field("cdn_base_url", &self.cdn_base_url)
            .field("managed_storage_url", &self.managed_storage_url)
            .field("managed_storage_service_key", &redact(&self.managed_storage_service_key))
            .field("drive_client_id", &self.drive_client_id)
            .field("drive_client_secret", &redact(&self.drive_client_secret))
            .field("drive_refresh_token", &redact(&self.drive_refresh_token))
            .field("drive_root_folder_id", &self.drive_root_folder_id)
            .field("private_access_mode", &self.private_access_mode)
            .field("proxy_base_path", &self.proxy_base_path)
            .field("proxy_secret", &redact(&self.proxy_secret))
            .field("signed_url_expiry_secs", &self.signed_url_expiry_secs)
            .field("operation_timeout_secs", &self.operation_timeout_secs)
            .finish_non_exhaustive()
    }
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from an arbitrary variable source, without validating it.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

        let environment = var("ENVIRONMENT")
            .or_else(|| var("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let storage_backend = match var("STORAGE_BACKEND") {
            Some(s) => s.parse()?,
            None => StorageBackend::Local,
        };

        let private_access_mode = match var("PRIVATE_ACCESS_MODE") {
            Some(s) => s.parse()?,
            None => PrivateAccessMode::Proxy,
        };

        let log_format = match var("LOG_FORMAT").map(|s| s.to_lowercase()).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let size_mb = |key: &str| -> Result<Option<u64>, anyhow::Error> {
            var(key)
                .map(|s| {
                    let mb = s
                        .trim()
                        .parse::<u64>()
                        .map_err(|_| anyhow::anyhow!("{} must be a whole number of megabytes", key))?;
                    mb_to_bytes(key, mb).map(|_| mb)
                })
                .transpose()
        };

        let secs = |key: &str, default: u64| -> Result<u64, anyhow::Error> {
            match var(key) {
                Some(s) => s
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| anyhow::anyhow!("{} must be a whole number of seconds", key)),
                None => Ok(default),
            }
        };

        Ok(StorageConfig {
            environment,
            log_format,
            storage_backend,
            local_storage_path: var("LOCAL_STORAGE_PATH"),
            local_storage_base_url: var("LOCAL_STORAGE_BASE_URL")
                .unwrap_or_else(|| "/media".to_string()),
            s3_bucket: var("S3_BUCKET"),
            s3_region: var("S3_REGION"),
            s3_endpoint: var("S3_ENDPOINT"),
            aws_region: var("AWS_REGION"),
            s3_cache_control: var("S3_CACHE_CONTROL")
                .unwrap_or_else(|| DEFAULT_S3_CACHE_CONTROL.to_string()),
            cdn_base_url: var("CDN_BASE_URL"),
            managed_storage_url: var("MANAGED_STORAGE_URL"),
            managed_storage_service_key: var("MANAGED_STORAGE_SERVICE_KEY"),
            drive_client_id: var("DRIVE_CLIENT_ID"),
            drive_client_secret: var("DRIVE_CLIENT_SECRET"),
            drive_refresh_token: var("DRIVE_REFRESH_TOKEN"),
            drive_root_folder_id: var("DRIVE_ROOT_FOLDER_ID"),
            private_access_mode,
            proxy_base_path: var("STORAGE_PROXY_BASE_PATH")
                .unwrap_or_else(|| "/storage".to_string()),
            proxy_secret: var("STORAGE_PROXY_SECRET"),
            signed_url_expiry_secs: secs("SIGNED_URL_EXPIRY_SECS", SIGNED_URL_EXPIRY_SECS)?,
            operation_timeout_secs: secs("STORAGE_OPERATION_TIMEOUT_SECS", OPERATION_TIMEOUT_SECS)?,
            avatar_max_size_mb: size_mb("AVATAR_MAX_SIZE_MB")?,
            recording_max_size_mb: size_mb("RECORDING_MAX_SIZE_MB")?,
            sequence_max_size_mb: size_mb("SEQUENCE_MAX_SIZE_MB")?,
            multimedia_max_size_mb: size_mb("MULTIMEDIA_MAX_SIZE_MB")?,
        })
    }

    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn s3_region_or_default(&self) -> Option<&str> {
        self.s3_region.as_deref().or(self.aws_region.as_deref())
    }

    pub fn signed_url_expiry(&self) -> Duration {
        Duration::from_secs(self.signed_url_expiry_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Category policies with any configured size overrides applied.
    pub fn category_policies(&self) -> CategoryPolicies {
        let overrides = [
            (StorageCategory::Avatar, self.avatar_max_size_mb),
            (StorageCategory::Recording, self.recording_max_size_mb),
            (StorageCategory::Sequence, self.sequence_max_size_mb),
            (StorageCategory::Multimedia, self.multimedia_max_size_mb),
        ];

        overrides
            .into_iter()
            .fold(CategoryPolicies::defaults(), |policies, (category, mb)| match mb {
                Some(mb) => policies.with_max_size(category, mb.saturating_mul(BYTES_PER_MB)),
                None => policies,
            })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.storage_backend {
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
            }
            StorageBackend::ObjectStore => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using object-store storage backend"
                    ));
                }
                if self.s3_region_or_default().is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using object-store storage backend"
                    ));
                }
            }
            StorageBackend::ManagedStorage => {
                if self.managed_storage_url.is_none() || self.managed_storage_service_key.is_none() {
                    return Err(anyhow::anyhow!(
                        "MANAGED_STORAGE_URL and MANAGED_STORAGE_SERVICE_KEY must be set when using managed-storage backend"
                    ));
                }
            }
            StorageBackend::CloudDrive => {
                if self.drive_client_id.is_none()
                    || self.drive_client_secret.is_none()
                    || self.drive_refresh_token.is_none()
                {
                    return Err(anyhow::anyhow!(
                        "DRIVE_CLIENT_ID, DRIVE_CLIENT_SECRET and DRIVE_REFRESH_TOKEN must be set when using cloud-drive backend"
                    ));
                }
                if self.private_access_mode == PrivateAccessMode::Signed {
                    return Err(anyhow::anyhow!(
                        "PRIVATE_ACCESS_MODE=signed is not supported by the cloud-drive backend; use proxy"
                    ));
                }
            }
        }

        if self.private_access_mode == PrivateAccessMode::Proxy {
            match &self.proxy_secret {
                None => {
                    return Err(anyhow::anyhow!(
                        "STORAGE_PROXY_SECRET must be set when PRIVATE_ACCESS_MODE=proxy"
                    ))
                }
                Some(secret) if secret.len() < MIN_PROXY_SECRET_LEN => {
                    return Err(anyhow::anyhow!(
                        "STORAGE_PROXY_SECRET must be at least {} characters long",
                        MIN_PROXY_SECRET_LEN
                    ))
                }
                Some(_) => {}
            }
            if !self.proxy_base_path.starts_with('/') {
                return Err(anyhow::anyhow!(
                    "STORAGE_PROXY_BASE_PATH must be a same-origin path starting with '/'"
                ));
            }
        }

        for (key, mb) in [
            ("AVATAR_MAX_SIZE_MB", self.avatar_max_size_mb),
            ("RECORDING_MAX_SIZE_MB", self.recording_max_size_mb),
            ("SEQUENCE_MAX_SIZE_MB", self.sequence_max_size_mb),
            ("MULTIMEDIA_MAX_SIZE_MB", self.multimedia_max_size_mb),
        ] {
            if let Some(mb) = mb {
                mb_to_bytes(key, mb)?;
            }
        }

        if self.signed_url_expiry_secs == 0 {
            return Err(anyhow::anyhow!("SIGNED_URL_EXPIRY_SECS must be greater than zero"));
        }
        if self.operation_timeout_secs == 0 {
            return Err(anyhow::anyhow!(
                "STORAGE_OPERATION_TIMEOUT_SECS must be greater than zero"
            ));
        }

        Ok(())
    }
}

fn mb_to_bytes(key: &str, mb: u64) -> Result<u64, anyhow::Error> {
    mb.checked_mul(BYTES_PER_MB)
        .ok_or_else(|| anyhow::anyhow!("{} is too large ({} MB)", key, mb))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn config_from(vars: &[(&str, &str)]) -> Result<StorageConfig, anyhow::Error> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StorageConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_to_local_backend_with_proxy_access() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.storage_backend, StorageBackend::Local);
        assert_eq!(config.private_access_mode, PrivateAccessMode::Proxy);
        assert_eq!(config.local_storage_base_url, "/media");
        assert_eq!(config.proxy_base_path, "/storage");
        assert_eq!(config.signed_url_expiry(), Duration::from_secs(3600));
    }

    #[test]
    fn test_local_requires_path() {
        let config = config_from(&[("STORAGE_PROXY_SECRET", SECRET)]).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("LOCAL_STORAGE_PATH"));
    }

    #[test]
    fn test_proxy_mode_requires_long_secret() {
        let config = config_from(&[
            ("LOCAL_STORAGE_PATH", "/tmp/ministry"),
            ("STORAGE_PROXY_SECRET", "short"),
        ])
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at least 32"));
    }

    #[test]
    fn test_object_store_requires_bucket_and_region() {
        let config = config_from(&[
            ("STORAGE_BACKEND", "s3"),
            ("STORAGE_PROXY_SECRET", SECRET),
            ("S3_BUCKET", "ministry-media"),
        ])
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("S3_REGION or AWS_REGION"));

        let config = config_from(&[
            ("STORAGE_BACKEND", "s3"),
            ("STORAGE_PROXY_SECRET", SECRET),
            ("S3_BUCKET", "ministry-media"),
            ("AWS_REGION", "eu-west-1"),
        ])
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.s3_region_or_default(), Some("eu-west-1"));
    }

    #[test]
    fn test_cloud_drive_rejects_signed_mode() {
        let config = config_from(&[
            ("STORAGE_BACKEND", "cloud-drive"),
            ("PRIVATE_ACCESS_MODE", "signed"),
            ("DRIVE_CLIENT_ID", "id"),
            ("DRIVE_CLIENT_SECRET", "secret"),
            ("DRIVE_REFRESH_TOKEN", "refresh"),
        ])
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not supported by the cloud-drive backend"));
    }

    #[test]
    fn test_managed_storage_requires_credentials() {
        let config = config_from(&[
            ("STORAGE_BACKEND", "managed-storage"),
            ("PRIVATE_ACCESS_MODE", "signed"),
            ("MANAGED_STORAGE_URL", "https://project.example.co"),
        ])
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_backend_is_an_error() {
        assert!(config_from(&[("STORAGE_BACKEND", "ftp")]).is_err());
    }

    #[test]
    fn test_size_overrides_apply_to_policies() {
        let config = config_from(&[("RECORDING_MAX_SIZE_MB", "80")]).unwrap();
        let policies = config.category_policies();
        assert_eq!(
            policies.get(StorageCategory::Recording).max_size_bytes,
            80 * 1024 * 1024
        );
        assert_eq!(
            policies.get(StorageCategory::Avatar).max_size_bytes,
            5 * 1024 * 1024
        );
        assert!(config_from(&[("AVATAR_MAX_SIZE_MB", "lots")]).is_err());
    }

    #[test]
    fn test_size_override_overflow_is_rejected() {
        let err = config_from(&[("MULTIMEDIA_MAX_SIZE_MB", "18446744073709551615")]).unwrap_err();
        assert!(err.to_string().contains("MULTIMEDIA_MAX_SIZE_MB"));

        let mut config = config_from(&[
            ("LOCAL_STORAGE_PATH", "/tmp/ministry"),
            ("STORAGE_PROXY_SECRET", SECRET),
        ])
        .unwrap();
        config.avatar_max_size_mb = Some(u64::MAX / 1024);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unparsable_durations_are_rejected() {
        let err = config_from(&[("SIGNED_URL_EXPIRY_SECS", "1h")]).unwrap_err();
        assert!(err.to_string().contains("SIGNED_URL_EXPIRY_SECS"));

        let err = config_from(&[("STORAGE_OPERATION_TIMEOUT_SECS", "-5")]).unwrap_err();
        assert!(err.to_string().contains("STORAGE_OPERATION_TIMEOUT_SECS"));

        let config = config_from(&[("SIGNED_URL_EXPIRY_SECS", " 600 ")]).unwrap();
        assert_eq!(config.signed_url_expiry(), Duration::from_secs(600));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = config_from(&[
            ("STORAGE_PROXY_SECRET", SECRET),
            ("DRIVE_REFRESH_TOKEN", "1//very-secret-refresh-token"),
        ])
        .unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains(SECRET));
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("[redacted]"));
    }
}
