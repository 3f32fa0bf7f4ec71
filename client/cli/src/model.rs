use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest page the file listing endpoint accepts.
pub const MAX_PAGE_SIZE: u32 = 100;
pub const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FolderId(pub i64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// --- Files ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Document,
    #[serde(other)]
    Other,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Image => "image",
            FileType::Document => "document",
            FileType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "image" | "images" => Some(FileType::Image),
            "document" | "documents" | "doc" => Some(FileType::Document),
            "other" => Some(FileType::Other),
            _ => None,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFile {
    pub id: FileId,
    pub filename: String,
    pub original_filename: String,
    pub file_url: String,
    pub file_type: FileType,
    pub mime_type: String,
    pub file_size: u64,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// `None` means the file lives at the root.
    #[serde(default)]
    pub folder_id: Option<FolderId>,
    #[serde(default)]
    pub alt_text: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: String,
}

impl MediaFile {
    pub fn is_image(&self) -> bool {
        self.file_type == FileType::Image
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        Some((self.width?, self.height?))
    }
}

// --- Folders ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFolder {
    pub id: FolderId,
    pub name: String,
    /// Back-reference to the parent; the store guarantees there are no cycles.
    #[serde(default)]
    pub parent_folder_id: Option<FolderId>,
    #[serde(default)]
    pub file_count: u64,
    #[serde(default)]
    pub subfolder_count: u64,
}

// --- Listing ---

/// Query for one page of the file listing. Pages are 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileQuery {
    pub folder_id: Option<FolderId>,
    pub file_type: Option<FileType>,
    pub search: Option<String>,
    pub page: u32,
    pub page_size: u32,
}

impl Default for FileQuery {
    fn default() -> Self {
        Self {
            folder_id: None,
            file_type: None,
            search: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl FileQuery {
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("page", self.page.max(1).to_string()),
            ("page_size", self.page_size.clamp(1, MAX_PAGE_SIZE).to_string()),
        ];
        if let Some(folder_id) = self.folder_id {
            pairs.push(("folder_id", folder_id.to_string()));
        }
        if let Some(file_type) = self.file_type {
            pairs.push(("file_type", file_type.as_str().to_string()));
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("search", search.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FileListing {
    pub items: Vec<MediaFile>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub total_pages: u32,
}

// --- Mutations ---

#[derive(Debug, Clone, Serialize)]
pub struct NewFolder {
    pub name: String,
    pub parent_folder_id: Option<FolderId>,
}

/// Partial metadata edit; unset fields are left untouched by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileMetadataUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<FolderId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FileMetadataUpdate {
    pub fn is_empty(&self) -> bool {
        self.folder_id.is_none()
            && self.alt_text.is_none()
            && self.title.is_none()
            && self.description.is_none()
    }
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
