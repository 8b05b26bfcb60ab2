use crate::keys::validate_key;
use crate::traits::{
    BackendDescription, DeleteOutcome, PutReceipt, StorageAdapter, StorageError, StorageResult,
    StorageUsage,
};
use async_trait::async_trait;
use bytes::Bytes;
use ministry_core::{StorageBackend, Visibility};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem storage implementation
///
/// Objects live at `{root}/{category}/{tenant|default}/{file}`. There is no
/// real signing on disk: a private URL resolved here is the same static path
/// as a public one, which is why private categories are normally served
/// through the signed proxy route instead.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for file storage (e.g., "/var/lib/ministry/media")
    /// * `base_url` - Base URL or path files are served from (e.g., "/media")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Convert storage key to filesystem path with security validation
    ///
    /// Rejects keys that could escape the base storage directory, including
    /// through a symlink planted inside it.
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        validate_key(storage_key)?;

        let path = self.base_path.join(storage_key);

        let base_canonical = self.base_path.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        // Canonicalize the deepest existing ancestor; the rest does not exist yet.
        let mut existing = path.as_path();
        while !existing.exists() {
            match existing.parent() {
                Some(parent) => existing = parent,
                None => break,
            }
        }

        if let Ok(canonical) = existing.canonicalize() {
            if canonical.strip_prefix(&base_canonical).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    /// Generate public URL for file
    fn generate_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            // create_dir_all tolerates a concurrent creator
            fs::create_dir_all(parent).await.map_err(|e| {
                io_failure(
                    e,
                    format!("Failed to create directory {}", parent.display()),
                    StorageError::UploadFailed,
                )
            })?;
        }
        Ok(())
    }

    async fn used_bytes(&self) -> StorageResult<u64> {
        let mut total = 0u64;
        let mut pending = vec![self.base_path.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    pending.push(entry.path());
                } else if meta.is_file() {
                    total += meta.len();
                }
            }
        }

        Ok(total)
    }
}

/// Permission problems will not go away on retry; other I/O failures may.
fn io_failure(
    err: std::io::Error,
    context: String,
    transient: fn(String) -> StorageError,
) -> StorageError {
    if err.kind() == ErrorKind::PermissionDenied {
        StorageError::BackendError(format!("{}: {}", context, err))
    } else {
        transient(format!("{}: {}", context, err))
    }
}

#[async_trait]
impl StorageAdapter for LocalStorage {
    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> StorageResult<PutReceipt> {
        let path = self.key_to_path(key)?;
        let size = data.len();

        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        let mut file = fs::File::create(&path).await.map_err(|e| {
            io_failure(e, format!("Failed to create file {}", path.display()), StorageError::UploadFailed)
        })?;

        file.write_all(&data).await.map_err(|e| {
            io_failure(e, format!("Failed to write file {}", path.display()), StorageError::UploadFailed)
        })?;

        file.sync_all().await.map_err(|e| {
            io_failure(e, format!("Failed to sync file {}", path.display()), StorageError::UploadFailed)
        })?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(PutReceipt {
            provider_id: key.to_string(),
        })
    }

    async fn delete(&self, key: &str) -> StorageResult<DeleteOutcome> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(key = %key, "Local storage delete of missing file ignored");
                return Ok(DeleteOutcome::NotFoundIgnored);
            }
            Err(e) => {
                return Err(io_failure(
                    e,
                    format!("Failed to delete file {}", path.display()),
                    StorageError::DeleteFailed,
                ))
            }
        }

        tracing::info!(
            path = %path.display(),
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(DeleteOutcome::Deleted)
    }

    async fn resolve_access_url(
        &self,
        key: &str,
        _visibility: Visibility,
        _expires_in: Option<Duration>,
    ) -> StorageResult<String> {
        self.key_to_path(key)?;
        Ok(self.generate_url(key))
    }

    fn supports_signed_urls(&self) -> bool {
        false
    }

    async fn describe(&self) -> StorageResult<BackendDescription> {
        Ok(BackendDescription {
            backend: StorageBackend::Local,
            location: self.base_path.display().to_string(),
            usage: Some(StorageUsage {
                used_bytes: self.used_bytes().await?,
                limit_bytes: None,
            }),
        })
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn storage(dir: &Path) -> LocalStorage {
        LocalStorage::new(dir, "http://localhost:3000/media".to_string())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_creates_category_and_tenant_dirs() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let receipt = storage
            .put(
                "avatar/church-42/abc.png",
                Bytes::from_static(b"png bytes"),
                "image/png",
            )
            .await
            .unwrap();

        assert_eq!(receipt.provider_id, "avatar/church-42/abc.png");
        let written = std::fs::read(dir.path().join("avatar/church-42/abc.png")).unwrap();
        assert_eq!(written, b"png bytes");
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let result = storage
            .put("../../../etc/passwd", Bytes::from_static(b"x"), "text/plain")
            .await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.delete("../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage
            .resolve_access_url("/etc/passwd", Visibility::Public, None)
            .await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_rejected() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        std::fs::create_dir_all(dir.path().join("avatar")).unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("avatar/evil")).unwrap();

        let result = storage
            .put("avatar/evil/abc.png", Bytes::from_static(b"x"), "image/png")
            .await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
        assert!(!outside.path().join("abc.png").exists());
    }

    #[test]
    fn test_permission_denied_is_not_retryable() {
        let err = io_failure(
            std::io::Error::from(ErrorKind::PermissionDenied),
            "Failed to create file /srv/media/avatar/default/a.png".to_string(),
            StorageError::UploadFailed,
        );
        assert!(matches!(err, StorageError::BackendError(_)));
        assert!(!err.is_retryable());

        let err = io_failure(
            std::io::Error::from(ErrorKind::Interrupted),
            "Failed to delete file /srv/media/avatar/default/a.png".to_string(),
            StorageError::DeleteFailed,
        );
        assert!(matches!(err, StorageError::DeleteFailed(_)));
        assert!(err.is_retryable());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_only_directory_is_a_refusal() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let locked = dir.path().join("avatar/default");
        std::fs::create_dir_all(&locked).unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o555)).unwrap();

        // Privileged users bypass directory permissions.
        if std::fs::write(locked.join("write-check"), b"").is_ok() {
            return;
        }

        let err = storage
            .put("avatar/default/a.png", Bytes::from_static(b"x"), "image/png")
            .await
            .unwrap_err();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(err, StorageError::BackendError(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_delete_twice_is_idempotent() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let key = "sequence/default/chart.pdf";

        storage
            .put(key, Bytes::from_static(b"%PDF"), "application/pdf")
            .await
            .unwrap();

        assert_eq!(storage.delete(key).await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(
            storage.delete(key).await.unwrap(),
            DeleteOutcome::NotFoundIgnored
        );
    }

    #[tokio::test]
    async fn test_delete_nonexistent() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let result = storage.delete("recording/default/missing.mp3").await;
        assert_eq!(result.unwrap(), DeleteOutcome::NotFoundIgnored);
    }

    #[tokio::test]
    async fn test_url_is_static_for_both_visibilities() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let key = "multimedia/default/clip.mp4";

        let public = storage
            .resolve_access_url(key, Visibility::Public, None)
            .await
            .unwrap();
        let private = storage
            .resolve_access_url(key, Visibility::Private, Some(Duration::from_secs(60)))
            .await
            .unwrap();

        assert_eq!(public, "http://localhost:3000/media/multimedia/default/clip.mp4");
        assert_eq!(public, private);
        assert!(!storage.supports_signed_urls());
    }

    #[tokio::test]
    async fn test_describe_reports_usage() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        storage
            .put("avatar/default/a.png", Bytes::from_static(b"12345"), "image/png")
            .await
            .unwrap();
        storage
            .put("recording/t1/b.mp3", Bytes::from_static(b"123"), "audio/mpeg")
            .await
            .unwrap();

        let description = storage.describe().await.unwrap();
        assert_eq!(description.backend, StorageBackend::Local);
        assert_eq!(description.usage.unwrap().used_bytes, 8);
    }
}
