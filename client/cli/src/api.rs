use crate::config::Config;
use crate::model::{
    FileId, FileListing, FileMetadataUpdate, FileQuery, FolderId, MediaFile, MediaFolder,
    NewFolder,
};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("API error ({status}): {detail}")]
    Status { status: u16, detail: String },
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bytes handed to the ingestion endpoint as the multipart `file` field.
#[derive(Debug, Clone)]
pub struct UploadPayload {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Read/write operations against the remote media store.
///
/// The store is the only source of truth: callers re-read listings after any
/// mutation instead of patching local state.
#[allow(async_fn_in_trait)]
pub trait MediaStore {
    async fn list_folders(&self, parent: Option<FolderId>) -> Result<Vec<MediaFolder>, ApiError>;

    async fn list_files(&self, query: &FileQuery) -> Result<FileListing, ApiError>;

    async fn get_file(&self, id: FileId) -> Result<MediaFile, ApiError>;

    async fn upload(
        &self,
        payload: UploadPayload,
        folder_id: Option<FolderId>,
    ) -> Result<MediaFile, ApiError>;

    async fn update_file(
        &self,
        id: FileId,
        update: &FileMetadataUpdate,
    ) -> Result<MediaFile, ApiError>;

    async fn delete_file(&self, id: FileId) -> Result<(), ApiError>;

    async fn create_folder(&self, folder: &NewFolder) -> Result<MediaFolder, ApiError>;

    async fn delete_folder(&self, id: FolderId) -> Result<(), ApiError>;

    async fn download(&self, file: &MediaFile) -> Result<Vec<u8>, ApiError>;
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
struct FolderListResponse {
    items: Vec<MediaFolder>,
}

/// REST client for the media endpoints.
pub struct ApiClient {
    server_url: String,
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(server_url: &str, api_prefix: &str, token: &str) -> Self {
        let server_url = server_url.trim_end_matches('/').to_string();
        let prefix = api_prefix.trim_matches('/');
        let base_url = if prefix.is_empty() {
            server_url.clone()
        } else {
            format!("{}/{}", server_url, prefix)
        };
        Self {
            server_url,
            base_url,
            token: token.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        config.require_auth()?;
        let server = config
            .server_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No server configured"))?;
        let token = config.token.as_deref().unwrap_or_default();
        Ok(Self::new(server, config.api_prefix(), token))
    }

    /// File URLs from the store are usually origin-relative.
    pub fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.server_url, url.trim_start_matches('/'))
        }
    }

    /// Multipart `file` part, with the destination folder as both a form
    /// field and a query parameter.
    fn upload_request(
        &self,
        payload: UploadPayload,
        folder_id: Option<FolderId>,
    ) -> Result<reqwest::RequestBuilder, ApiError> {
        let part = reqwest::multipart::Part::bytes(payload.bytes)
            .file_name(payload.filename)
            .mime_str(&payload.mime_type)?;
        let mut form = reqwest::multipart::Form::new().part("file", part);
        let mut req = self
            .client
            .post(format!("{}/upload", self.base_url))
            .bearer_auth(&self.token);
        if let Some(folder_id) = folder_id {
            form = form.text("folder_id", folder_id.to_string());
            // The ingestion endpoint reads folder_id from the query string.
            req = req.query(&[("folder_id", folder_id.to_string())]);
        }
        Ok(req.multipart(form))
    }

    /// Check response status; on error, read body for detail message.
    async fn ensure_ok(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(ApiError::Status {
                status: status.as_u16(),
                detail: error_detail(&body),
            })
        }
    }
}

/// Pull a human-readable message out of an error payload.
///
/// The store answers `{"detail": ...}`; some proxies answer `{"error": ...}`.
pub fn error_detail(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["detail", "error"] {
            match value.get(key) {
                Some(serde_json::Value::String(s)) => return s.clone(),
                Some(other) => return other.to_string(),
                None => {}
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no details".to_string()
    } else {
        trimmed.to_string()
    }
}

impl MediaStore for ApiClient {
    async fn list_folders(&self, parent: Option<FolderId>) -> Result<Vec<MediaFolder>, ApiError> {
        let mut req = self
            .client
            .get(format!("{}/folders", self.base_url))
            .bearer_auth(&self.token);
        if let Some(parent) = parent {
            req = req.query(&[("parent_folder_id", parent.to_string())]);
        }
        let resp = req.send().await?;
        let list: FolderListResponse = Self::ensure_ok(resp).await?.json().await?;
        Ok(list.items)
    }

    async fn list_files(&self, query: &FileQuery) -> Result<FileListing, ApiError> {
        let resp = self
            .client
            .get(format!("{}/files", self.base_url))
            .bearer_auth(&self.token)
            .query(&query.to_query_pairs())
            .send()
            .await?;
        Ok(Self::ensure_ok(resp).await?.json().await?)
    }

    async fn get_file(&self, id: FileId) -> Result<MediaFile, ApiError> {
        let resp = self
            .client
            .get(format!("{}/files/{}", self.base_url, id))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(Self::ensure_ok(resp).await?.json().await?)
    }

    async fn upload(
        &self,
        payload: UploadPayload,
        folder_id: Option<FolderId>,
    ) -> Result<MediaFile, ApiError> {
        let resp = self.upload_request(payload, folder_id)?.send().await?;
        Ok(Self::ensure_ok(resp).await?.json().await?)
    }

    async fn update_file(
        &self,
        id: FileId,
        update: &FileMetadataUpdate,
    ) -> Result<MediaFile, ApiError> {
        let resp = self
            .client
            .put(format!("{}/files/{}", self.base_url, id))
            .bearer_auth(&self.token)
            .json(update)
            .send()
            .await?;
        Ok(Self::ensure_ok(resp).await?.json().await?)
    }

    async fn delete_file(&self, id: FileId) -> Result<(), ApiError> {
        let resp = self
            .client
            .delete(format!("{}/files/{}", self.base_url, id))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::ensure_ok(resp).await?;
        Ok(())
    }

    async fn create_folder(&self, folder: &NewFolder) -> Result<MediaFolder, ApiError> {
        let resp = self
            .client
            .post(format!("{}/folders", self.base_url))
            .bearer_auth(&self.token)
            .json(folder)
            .send()
            .await?;
        Ok(Self::ensure_ok(resp).await?.json().await?)
    }

    async fn delete_folder(&self, id: FolderId) -> Result<(), ApiError> {
        let resp = self
            .client
            .delete(format!("{}/folders/{}", self.base_url, id))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::ensure_ok(resp).await?;
        Ok(())
    }

    async fn download(&self, file: &MediaFile) -> Result<Vec<u8>, ApiError> {
        let resp = self
            .client
            .get(self.resolve_url(&file.file_url))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(Self::ensure_ok(resp).await?.bytes().await?.to_vec())
    }
}
