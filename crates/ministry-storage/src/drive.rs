//! Cloud drive backend (Google Drive v3 REST shape).
//!
//! Objects are regular files inside `{root}/{category folder}/{tenant|default}`.
//! Drive addresses files by id, not path, so every operation first resolves
//! the folder chain by name. Folder creation is idempotent: an in-process
//! mutex serializes first creation, and a re-search after creating adopts the
//! oldest folder when another process created one concurrently.
//!
//! Making a file public is a separate permission call after the upload, so a
//! put can succeed while the grant fails; that case is reported as
//! [`StorageError::PermissionGrantFailed`] carrying the new file id.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use ministry_core::{CategoryPolicies, StorageBackend, StorageCategory, Visibility};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::keys::ObjectKey;
use crate::provider_http;
use crate::traits::{
    BackendDescription, DeleteOutcome, PutReceipt, StorageAdapter, StorageError, StorageResult,
    StorageUsage,
};

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_API_BASE: &str = "https://www.googleapis.com";
pub const DEFAULT_ROOT_FOLDER_ID: &str = "root";

const PROVIDER: &str = "cloud drive";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const PUBLIC_URL_PREFIX: &str = "https://drive.google.com/uc?export=view&id=";

#[derive(Clone)]
pub struct DriveCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl Debug for DriveCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("DriveCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .finish()
    }
}

/// Where the OAuth and Drive APIs live. Overridden in tests.
#[derive(Debug, Clone)]
pub struct DriveEndpoints {
    pub token_url: String,
    pub api_base: String,
}

impl Default for DriveEndpoints {
    fn default() -> Self {
        Self {
            token_url: GOOGLE_TOKEN_URL.to_string(),
            api_base: GOOGLE_API_BASE.to_string(),
        }
    }
}

impl DriveEndpoints {
    /// Both APIs under one base, token endpoint at `{base}/token`.
    pub fn at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            token_url: format!("{}/token", base),
            api_base: base.to_string(),
        }
    }
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct About {
    storage_quota: StorageQuota,
}

#[derive(Deserialize)]
struct StorageQuota {
    limit: Option<String>,
    usage: Option<String>,
}

pub struct DriveStorage {
    client: Client,
    credentials: DriveCredentials,
    endpoints: DriveEndpoints,
    root_folder_id: String,
    folders: HashMap<StorageCategory, (String, Visibility)>,
    token: RwLock<Option<CachedToken>>,
    folder_ids: RwLock<HashMap<String, String>>,
    folder_creation: Mutex<()>,
}

impl Debug for DriveStorage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("DriveStorage")
            .field("credentials", &self.credentials)
            .field("endpoints", &self.endpoints)
            .field("root_folder_id", &self.root_folder_id)
            .finish_non_exhaustive()
    }
}

/// Drive search expression for a folder called `name` directly under `parent_id`.
pub(crate) fn folder_query(parent_id: &str, name: &str) -> String {
    format!(
        "name = '{}' and mimeType = '{}' and '{}' in parents and trashed = false",
        escape_query(name),
        FOLDER_MIME_TYPE,
        escape_query(parent_id)
    )
}

/// Drive search expression for a non-folder file called `name` under `parent_id`.
pub(crate) fn file_query(parent_id: &str, name: &str) -> String {
    format!(
        "name = '{}' and mimeType != '{}' and '{}' in parents and trashed = false",
        escape_query(name),
        FOLDER_MIME_TYPE,
        escape_query(parent_id)
    )
}

fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn public_url(file_id: &str) -> String {
    format!("{}{}", PUBLIC_URL_PREFIX, urlencoding::encode(file_id))
}

impl DriveStorage {
    pub fn new(
        credentials: DriveCredentials,
        root_folder_id: Option<String>,
        policies: &CategoryPolicies,
        timeout: Duration,
    ) -> StorageResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        let folders = policies
            .iter()
            .map(|(category, policy)| (category, (policy.container.clone(), policy.visibility)))
            .collect();

        Ok(Self {
            client,
            credentials,
            endpoints: DriveEndpoints::default(),
            root_folder_id: root_folder_id.unwrap_or_else(|| DEFAULT_ROOT_FOLDER_ID.to_string()),
            folders,
            token: RwLock::new(None),
            folder_ids: RwLock::new(HashMap::new()),
            folder_creation: Mutex::new(()),
        })
    }

    pub fn with_endpoints(mut self, endpoints: DriveEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.endpoints.api_base)
    }

    fn category_folder(&self, category: StorageCategory) -> &(String, Visibility) {
        // Built from a complete policy table.
        &self.folders[&category]
    }

    async fn access_token(&self) -> StorageResult<String> {
        if let Some(token) = self.token.read().await.as_ref() {
            if token.is_fresh() {
                return Ok(token.access_token.clone());
            }
        }

        let mut cached = self.token.write().await;
        if let Some(token) = cached.as_ref() {
            if token.is_fresh() {
                return Ok(token.access_token.clone());
            }
        }

        let token = self.refresh_access_token().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    async fn refresh_access_token(&self) -> StorageResult<CachedToken> {
        let start = Instant::now();
        let response = self
            .client
            .post(&self.endpoints.token_url)
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", self.credentials.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| provider_http::transport_error(PROVIDER, e))?;

        let token: TokenResponse = expect_json(response, "token refresh").await?;

        tracing::debug!(
            expires_in_secs = token.expires_in,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Cloud drive access token refreshed"
        );

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }

    async fn send(&self, request: RequestBuilder) -> StorageResult<Response> {
        let token = self.access_token().await?;
        request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| provider_http::transport_error(PROVIDER, e))
    }

    async fn search(&self, query: &str) -> StorageResult<Option<String>> {
        let request = self.client.get(self.files_url()).query(&[
            ("q", query),
            ("fields", "files(id,name,createdTime)"),
            ("orderBy", "createdTime"),
            ("spaces", "drive"),
            ("pageSize", "10"),
        ]);
        let list: FileList = expect_json(self.send(request).await?, "search").await?;
        Ok(list.files.into_iter().next().map(|file| file.id))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> StorageResult<String> {
        let request = self
            .client
            .post(self.files_url())
            .query(&[("fields", "id")])
            .json(&json!({
                "name": name,
                "mimeType": FOLDER_MIME_TYPE,
                "parents": [parent_id],
            }));
        let folder: DriveFile = expect_json(self.send(request).await?, "create folder").await?;
        Ok(folder.id)
    }

    /// Delete a file or folder by id. Returns false when it was already gone.
    async fn delete_by_id(&self, id: &str) -> StorageResult<bool> {
        let request = self
            .client
            .delete(format!("{}/{}", self.files_url(), urlencoding::encode(id)));
        let response = self.send(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let body = response.text().await.unwrap_or_default();
        Err(provider_http::status_error(PROVIDER, "delete", status, &body))
    }

    /// Find or create the folder `name` under `parent_id`, returning its id.
    ///
    /// Tolerates a concurrent creator in another process: after creating, the
    /// oldest folder with that name wins and our duplicate is removed.
    pub async fn ensure_folder(&self, parent_id: &str, name: &str) -> StorageResult<String> {
        let query = folder_query(parent_id, name);
        if let Some(id) = self.search(&query).await? {
            return Ok(id);
        }

        let created = self.create_folder(parent_id, name).await?;
        tracing::info!(folder = %name, folder_id = %created, parent_id = %parent_id, "Cloud drive folder created");

        match self.search(&query).await? {
            Some(winner) if winner != created => {
                tracing::warn!(
                    folder = %name,
                    winner = %winner,
                    duplicate = %created,
                    "Concurrent cloud drive folder creation detected, adopting oldest folder"
                );
                if let Err(e) = self.delete_by_id(&created).await {
                    tracing::warn!(error = %e, folder_id = %created, "Failed to remove duplicate cloud drive folder");
                }
                Ok(winner)
            }
            _ => Ok(created),
        }
    }

    /// Resolve the tenant folder for a key, creating the chain when `create` is set.
    async fn tenant_folder(&self, key: &ObjectKey, create: bool) -> StorageResult<Option<String>> {
        let (container, _) = self.category_folder(key.category());
        let tenant = key.tenant_segment();
        let cache_key = format!("{}/{}", container, tenant);

        if let Some(id) = self.folder_ids.read().await.get(&cache_key) {
            return Ok(Some(id.clone()));
        }

        if !create {
            let Some(category_id) = self
                .search(&folder_query(&self.root_folder_id, container))
                .await?
            else {
                return Ok(None);
            };
            let found = self.search(&folder_query(&category_id, tenant)).await?;
            if let Some(ref id) = found {
                self.folder_ids.write().await.insert(cache_key, id.clone());
            }
            return Ok(found);
        }

        let _creation = self.folder_creation.lock().await;

        // Another task may have finished while we waited for the lock.
        if let Some(id) = self.folder_ids.read().await.get(&cache_key) {
            return Ok(Some(id.clone()));
        }

        let cached_category = self.folder_ids.read().await.get(container).cloned();
        let category_id = match cached_category {
            Some(id) => id,
            None => {
                let id = self.ensure_folder(&self.root_folder_id, container).await?;
                self.folder_ids
                    .write()
                    .await
                    .insert(container.clone(), id.clone());
                id
            }
        };

        let tenant_id = self.ensure_folder(&category_id, tenant).await?;
        self.folder_ids
            .write()
            .await
            .insert(cache_key, tenant_id.clone());
        Ok(Some(tenant_id))
    }

    async fn find_file(&self, key: &ObjectKey) -> StorageResult<Option<String>> {
        match self.tenant_folder(key, false).await? {
            Some(folder_id) => self.search(&file_query(&folder_id, key.file_name())).await,
            None => Ok(None),
        }
    }

    async fn upload_file(
        &self,
        folder_id: &str,
        name: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<String> {
        let boundary = format!("ministry-{}", Uuid::new_v4().simple());
        let metadata = json!({ "name": name, "parents": [folder_id] }).to_string();

        let mut body = Vec::with_capacity(data.len() + metadata.len() + 256);
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{m}\r\n--{b}\r\nContent-Type: {ct}\r\n\r\n",
                b = boundary,
                m = metadata,
                ct = content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(&data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        let request = self
            .client
            .post(format!("{}/upload/drive/v3/files", self.endpoints.api_base))
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body);

        let file: DriveFile = expect_json(self.send(request).await?, "upload").await?;
        Ok(file.id)
    }

    async fn grant_reader_anyone(&self, file_id: &str) -> StorageResult<()> {
        let request = self
            .client
            .post(format!(
                "{}/{}/permissions",
                self.files_url(),
                urlencoding::encode(file_id)
            ))
            .json(&json!({ "role": "reader", "type": "anyone" }));
        let response = self.send(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(provider_http::status_error(PROVIDER, "permission grant", status, &body))
    }
}

async fn expect_json<T: DeserializeOwned>(response: Response, operation: &str) -> StorageResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(provider_http::status_error(PROVIDER, operation, status, &body));
    }
    response.json().await.map_err(|e| {
        StorageError::BackendError(format!("{} {} returned an unexpected body: {}", PROVIDER, operation, e))
    })
}

#[async_trait]
impl StorageAdapter for DriveStorage {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<PutReceipt> {
        let object_key = ObjectKey::parse(key)?;
        let (container, visibility) = self.category_folder(object_key.category()).clone();
        let size = data.len() as u64;
        let start = Instant::now();

        let folder_id = self
            .tenant_folder(&object_key, true)
            .await?
            .ok_or_else(|| StorageError::BackendError(format!("{} folder could not be resolved", PROVIDER)))?;

        let file_id = self
            .upload_file(&folder_id, object_key.file_name(), data, content_type)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    error = %e,
                    folder = %container,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Cloud drive upload failed"
                );
            })?;

        tracing::info!(
            folder = %container,
            key = %key,
            file_id = %file_id,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Cloud drive upload successful"
        );

        if visibility.is_public() {
            if let Err(e) = self.grant_reader_anyone(&file_id).await {
                tracing::warn!(error = %e, key = %key, file_id = %file_id, "Cloud drive public grant failed");
                return Err(StorageError::PermissionGrantFailed {
                    provider_id: file_id,
                    message: e.to_string(),
                });
            }
        }

        Ok(PutReceipt {
            provider_id: file_id,
        })
    }

    async fn delete(&self, key: &str) -> StorageResult<DeleteOutcome> {
        let object_key = ObjectKey::parse(key)?;
        let start = Instant::now();

        let Some(file_id) = self.find_file(&object_key).await? else {
            tracing::debug!(key = %key, "Cloud drive delete of missing file ignored");
            return Ok(DeleteOutcome::NotFoundIgnored);
        };

        if !self.delete_by_id(&file_id).await? {
            return Ok(DeleteOutcome::NotFoundIgnored);
        }

        tracing::info!(
            key = %key,
            file_id = %file_id,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Cloud drive delete successful"
        );

        Ok(DeleteOutcome::Deleted)
    }

    async fn resolve_access_url(
        &self,
        key: &str,
        visibility: Visibility,
        _expires_in: Option<Duration>,
    ) -> StorageResult<String> {
        let object_key = ObjectKey::parse(key)?;

        if !visibility.is_public() {
            return Err(StorageError::ConfigError(format!(
                "{} cannot issue signed URLs for private objects",
                PROVIDER
            )));
        }

        let file_id = self
            .find_file(&object_key)
            .await?
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(public_url(&file_id))
    }

    async fn uploaded_object_url(&self, key: &str, receipt: &PutReceipt) -> StorageResult<String> {
        ObjectKey::parse(key)?;
        Ok(public_url(&receipt.provider_id))
    }

    async fn grant_public_access(&self, key: &str) -> StorageResult<()> {
        let object_key = ObjectKey::parse(key)?;
        let file_id = self
            .find_file(&object_key)
            .await?
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        self.grant_reader_anyone(&file_id).await?;
        tracing::info!(key = %key, file_id = %file_id, "Cloud drive public access granted");
        Ok(())
    }

    fn supports_signed_urls(&self) -> bool {
        false
    }

    async fn describe(&self) -> StorageResult<BackendDescription> {
        let request = self
            .client
            .get(format!("{}/drive/v3/about", self.endpoints.api_base))
            .query(&[("fields", "storageQuota")]);
        let about: About = expect_json(self.send(request).await?, "quota lookup").await?;

        let parse = |value: Option<String>| value.and_then(|v| v.parse::<u64>().ok());
        let usage = parse(about.storage_quota.usage).map(|used_bytes| StorageUsage {
            used_bytes,
            limit_bytes: parse(about.storage_quota.limit),
        });

        Ok(BackendDescription {
            backend: StorageBackend::CloudDrive,
            location: format!("drive folder {}", self.root_folder_id),
            usage,
        })
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::CloudDrive
    }
}
