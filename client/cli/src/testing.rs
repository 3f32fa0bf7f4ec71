//! In-memory media store used by unit tests.

use crate::api::{ApiError, MediaStore, UploadPayload};
use crate::model::{
    FileId, FileListing, FileMetadataUpdate, FileQuery, FileType, FolderId, MediaFile,
    MediaFolder, NewFolder,
};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    next_id: i64,
    folders: Vec<MediaFolder>,
    files: Vec<MediaFile>,
    blobs: HashMap<FileId, Vec<u8>>,
    rejected: HashMap<String, (u16, String)>,
    fail_listing: bool,
    calls: Vec<String>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

fn file_type_for(mime: &str) -> FileType {
    if mime.starts_with("image/") {
        FileType::Image
    } else if mime == "application/pdf" || mime == "application/msword" {
        FileType::Document
    } else {
        FileType::Other
    }
}

fn not_found(what: &str) -> ApiError {
    ApiError::Status {
        status: 404,
        detail: format!("{} not found", what),
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_folder(&self, name: &str, parent: Option<FolderId>) -> FolderId {
        let mut inner = self.inner.lock().unwrap();
        let id = FolderId(inner.next_id());
        inner.folders.push(MediaFolder {
            id,
            name: name.to_string(),
            parent_folder_id: parent,
            file_count: 0,
            subfolder_count: 0,
        });
        id
    }

    pub fn add_file(&self, name: &str, folder: Option<FolderId>) -> FileId {
        let mime = mime_guess::from_path(name)
            .first_or_octet_stream()
            .to_string();
        let mut inner = self.inner.lock().unwrap();
        let id = FileId(inner.next_id());
        inner.files.push(MediaFile {
            id,
            filename: format!("{}-{}", id, name),
            original_filename: name.to_string(),
            file_url: format!("/uploads/media/{}-{}", id, name),
            file_type: file_type_for(&mime),
            mime_type: mime,
            file_size: 0,
            width: None,
            height: None,
            folder_id: folder,
            alt_text: None,
            title: Some(name.to_string()),
            description: None,
            created_at: "2024-01-01T00:00:00".to_string(),
        });
        id
    }

    pub fn put_blob(&self, id: FileId, bytes: Vec<u8>) {
        self.inner.lock().unwrap().blobs.insert(id, bytes);
    }

    /// Make the next uploads of `filename` fail with the given status.
    pub fn reject_upload(&self, filename: &str, status: u16, detail: &str) {
        self.inner
            .lock()
            .unwrap()
            .rejected
            .insert(filename.to_string(), (status, detail.to_string()));
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.inner.lock().unwrap().fail_listing = fail;
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn files(&self) -> Vec<MediaFile> {
        self.inner.lock().unwrap().files.clone()
    }

    fn record(&self, call: String) {
        self.inner.lock().unwrap().calls.push(call);
    }
}

impl MediaStore for InMemoryStore {
    async fn list_folders(&self, parent: Option<FolderId>) -> Result<Vec<MediaFolder>, ApiError> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_listing {
            return Err(ApiError::Status {
                status: 503,
                detail: "listing unavailable".to_string(),
            });
        }
        let mut folders: Vec<MediaFolder> = inner
            .folders
            .iter()
            .filter(|f| f.parent_folder_id == parent)
            .map(|f| MediaFolder {
                file_count: inner
                    .files
                    .iter()
                    .filter(|file| file.folder_id == Some(f.id))
                    .count() as u64,
                subfolder_count: inner
                    .folders
                    .iter()
                    .filter(|sub| sub.parent_folder_id == Some(f.id))
                    .count() as u64,
                ..f.clone()
            })
            .collect();
        folders.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(folders)
    }

    async fn list_files(&self, query: &FileQuery) -> Result<FileListing, ApiError> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_listing {
            return Err(ApiError::Status {
                status: 503,
                detail: "listing unavailable".to_string(),
            });
        }
        let search = query.search.as_deref().map(str::to_lowercase);
        let mut matching: Vec<&MediaFile> = inner
            .files
            .iter()
            .filter(|f| query.folder_id.map_or(true, |id| f.folder_id == Some(id)))
            .filter(|f| query.file_type.map_or(true, |t| f.file_type == t))
            .filter(|f| match &search {
                Some(s) => [Some(&f.original_filename), f.title.as_ref(), f.description.as_ref()]
                    .into_iter()
                    .flatten()
                    .any(|field| field.to_lowercase().contains(s.as_str())),
                None => true,
            })
            .collect();
        // Newest first.
        matching.sort_by(|a, b| b.id.0.cmp(&a.id.0));

        let page_size = query.page_size.max(1) as usize;
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip((query.page.max(1) as usize - 1) * page_size)
            .take(page_size)
            .cloned()
            .collect();
        Ok(FileListing {
            items,
            total: total as u64,
            total_pages: total.div_ceil(page_size) as u32,
        })
    }

    async fn get_file(&self, id: FileId) -> Result<MediaFile, ApiError> {
        let inner = self.inner.lock().unwrap();
        inner
            .files
            .iter()
            .find(|f| f.id == id)
            .cloned()
            .ok_or_else(|| not_found("File"))
    }

    async fn upload(
        &self,
        payload: UploadPayload,
        folder_id: Option<FolderId>,
    ) -> Result<MediaFile, ApiError> {
        self.record(format!("start:{}", payload.filename));
        // Give a concurrent caller the chance to interleave.
        tokio::task::yield_now().await;

        let result = {
            let mut inner = self.inner.lock().unwrap();
            if let Some((status, detail)) = inner.rejected.get(&payload.filename).cloned() {
                Err(ApiError::Status { status, detail })
            } else if folder_id.is_some_and(|id| !inner.folders.iter().any(|f| f.id == id)) {
                Err(not_found("Folder"))
            } else {
                let id = FileId(inner.next_id());
                let file = MediaFile {
                    id,
                    filename: format!("{}-{}", id, payload.filename),
                    original_filename: payload.filename.clone(),
                    file_url: format!("/uploads/media/{}-{}", id, payload.filename),
                    file_type: file_type_for(&payload.mime_type),
                    mime_type: payload.mime_type.clone(),
                    file_size: payload.bytes.len() as u64,
                    width: None,
                    height: None,
                    folder_id,
                    alt_text: None,
                    title: Some(payload.filename.clone()),
                    description: None,
                    created_at: "2024-01-01T00:00:00".to_string(),
                };
                inner.files.push(file.clone());
                inner.blobs.insert(id, payload.bytes);
                Ok(file)
            }
        };
        self.record(format!("end:{}", payload.filename));
        result
    }

    async fn update_file(
        &self,
        id: FileId,
        update: &FileMetadataUpdate,
    ) -> Result<MediaFile, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        let file = inner
            .files
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| not_found("File"))?;
        if let Some(folder_id) = update.folder_id {
            file.folder_id = Some(folder_id);
        }
        if let Some(alt) = &update.alt_text {
            file.alt_text = Some(alt.clone());
        }
        if let Some(title) = &update.title {
            file.title = Some(title.clone());
        }
        if let Some(description) = &update.description {
            file.description = Some(description.clone());
        }
        Ok(file.clone())
    }

    async fn delete_file(&self, id: FileId) -> Result<(), ApiError> {
        self.record(format!("delete:{}", id));
        let mut inner = self.inner.lock().unwrap();
        let before = inner.files.len();
        inner.files.retain(|f| f.id != id);
        if inner.files.len() == before {
            return Err(not_found("File"));
        }
        inner.blobs.remove(&id);
        Ok(())
    }

    async fn create_folder(&self, folder: &NewFolder) -> Result<MediaFolder, ApiError> {
        self.record(format!("mkdir:{}", folder.name));
        let mut inner = self.inner.lock().unwrap();
        if let Some(parent) = folder.parent_folder_id {
            if !inner.folders.iter().any(|f| f.id == parent) {
                return Err(not_found("Parent folder"));
            }
        }
        let created = MediaFolder {
            id: FolderId(inner.next_id()),
            name: folder.name.clone(),
            parent_folder_id: folder.parent_folder_id,
            file_count: 0,
            subfolder_count: 0,
        };
        inner.folders.push(created.clone());
        Ok(created)
    }

    async fn delete_folder(&self, id: FolderId) -> Result<(), ApiError> {
        let mut inner = self.inner.lock().unwrap();
        let occupied = inner.files.iter().any(|f| f.folder_id == Some(id))
            || inner.folders.iter().any(|f| f.parent_folder_id == Some(id));
        if occupied {
            return Err(ApiError::Status {
                status: 400,
                detail: "Cannot delete folder with files or subfolders. Delete contents first."
                    .to_string(),
            });
        }
        let before = inner.folders.len();
        inner.folders.retain(|f| f.id != id);
        if inner.folders.len() == before {
            return Err(not_found("Folder"));
        }
        Ok(())
    }

    async fn download(&self, file: &MediaFile) -> Result<Vec<u8>, ApiError> {
        let inner = self.inner.lock().unwrap();
        inner
            .blobs
            .get(&file.id)
            .cloned()
            .ok_or_else(|| not_found("Blob"))
    }
}
