//! Helpers for the `ministry-storage` operator binary.

use std::path::Path;

use anyhow::Context;
use bytes::Bytes;
use ministry_core::StorageCategory;
use ministry_storage::UploadRequest;
use serde::Serialize;

/// Content type for a file name, from its extension.
pub fn guess_content_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/x-m4a",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "aac" => "audio/aac",
        "mid" | "midi" => "audio/midi",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "pdf" => "application/pdf",
        "musicxml" => "application/vnd.recordare.musicxml+xml",
        "mxl" => "application/vnd.recordare.musicxml",
        _ => return None,
    };
    Some(mime)
}

/// Read `path` into an upload request. An explicit `content_type` wins over
/// the extension guess.
pub async fn read_upload(
    path: &Path,
    category: StorageCategory,
    content_type: Option<String>,
    tenant_id: Option<String>,
) -> anyhow::Result<UploadRequest> {
    let content_type = match content_type {
        Some(ct) => ct,
        None => guess_content_type(path)
            .map(String::from)
            .with_context(|| {
                format!(
                    "Cannot infer content type of {}; pass --content-type",
                    path.display()
                )
            })?,
    };

    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(UploadRequest {
        category,
        file_name,
        data: Bytes::from(data),
        content_type,
        tenant_id,
    })
}

pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}
