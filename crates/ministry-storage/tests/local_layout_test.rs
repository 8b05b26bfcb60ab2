#![cfg(feature = "storage-local")]

use std::collections::HashMap;
use std::path::Path;

use bytes::Bytes;
use ministry_core::StorageConfig;
use ministry_storage::{create_facade, DeleteOutcome, StorageCategory, StorageFacade, UploadRequest};
use tempfile::tempdir;

const SECRET: &str = "0123456789abcdef0123456789abcdef";

async fn local_facade(root: &Path) -> StorageFacade {
    let vars: HashMap<String, String> = [
        ("STORAGE_BACKEND", "local".to_string()),
        ("LOCAL_STORAGE_PATH", root.to_string_lossy().to_string()),
        ("LOCAL_STORAGE_BASE_URL", "/media".to_string()),
        ("STORAGE_PROXY_SECRET", SECRET.to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let config = StorageConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();
    create_facade(&config).await.unwrap()
}

fn upload(category: StorageCategory, name: &str, mime: &str, tenant: Option<&str>) -> UploadRequest {
    UploadRequest {
        category,
        file_name: name.to_string(),
        data: Bytes::from_static(b"media bytes"),
        content_type: mime.to_string(),
        tenant_id: tenant.map(str::to_string),
    }
}

#[tokio::test]
async fn test_files_land_under_category_and_tenant() {
    let root = tempdir().unwrap();
    let facade = local_facade(root.path()).await;

    let result = facade
        .upload(upload(
            StorageCategory::Avatar,
            "Portrait.JPG",
            "image/jpeg",
            Some("church-42"),
        ))
        .await
        .unwrap();

    assert!(result.file_name.ends_with(".jpg"));
    let on_disk = root.path().join("avatar").join("church-42").join(&result.file_name);
    assert_eq!(std::fs::read(on_disk).unwrap(), b"media bytes");
    assert_eq!(result.url, format!("/media/avatar/church-42/{}", result.file_name));
}

#[tokio::test]
async fn test_missing_tenant_uses_default_folder() {
    let root = tempdir().unwrap();
    let facade = local_facade(root.path()).await;

    let result = facade
        .upload(upload(StorageCategory::Multimedia, "clip.mp4", "video/mp4", None))
        .await
        .unwrap();

    assert_eq!(result.key, format!("multimedia/default/{}", result.file_name));
    assert!(root.path().join(&result.key).is_file());
}

#[tokio::test]
async fn test_hostile_file_name_stays_inside_root() {
    let root = tempdir().unwrap();
    let facade = local_facade(root.path()).await;

    let result = facade
        .upload(upload(
            StorageCategory::Sequence,
            "../../etc/passwd",
            "application/pdf",
            None,
        ))
        .await
        .unwrap();

    assert!(!result.key.contains(".."));
    assert!(!result.file_name.contains('.'));
    assert!(root.path().join(&result.key).is_file());
}

#[tokio::test]
async fn test_private_recording_is_served_through_proxy() {
    let root = tempdir().unwrap();
    let facade = local_facade(root.path()).await;

    let result = facade
        .upload(upload(StorageCategory::Recording, "sermon.mp3", "audio/mpeg", Some("t1")))
        .await
        .unwrap();

    assert!(result.url.starts_with(&format!("/storage/{}?token=", result.key)));
    assert!(!result.url.starts_with("/media/"));
}

#[tokio::test]
async fn test_delete_removes_file_once() {
    let root = tempdir().unwrap();
    let facade = local_facade(root.path()).await;

    let result = facade
        .upload(upload(StorageCategory::Avatar, "a.png", "image/png", None))
        .await
        .unwrap();
    let path = root.path().join(&result.key);
    assert!(path.exists());

    assert_eq!(facade.delete(&result.key).await.unwrap(), DeleteOutcome::Deleted);
    assert!(!path.exists());
    assert_eq!(
        facade.delete(&result.key).await.unwrap(),
        DeleteOutcome::NotFoundIgnored
    );
}

#[tokio::test]
async fn test_concurrent_uploads_to_new_tenant() {
    let root = tempdir().unwrap();
    let facade = std::sync::Arc::new(local_facade(root.path()).await);

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let facade = facade.clone();
            tokio::spawn(async move {
                facade
                    .upload(upload(
                        StorageCategory::Avatar,
                        &format!("p{i}.png"),
                        "image/png",
                        Some("fresh-tenant"),
                    ))
                    .await
            })
        })
        .collect();

    let mut keys = std::collections::HashSet::new();
    for handle in handles {
        keys.insert(handle.await.unwrap().unwrap().key);
    }
    assert_eq!(keys.len(), 16);

    let files = std::fs::read_dir(root.path().join("avatar/fresh-tenant"))
        .unwrap()
        .count();
    assert_eq!(files, 16);
}
