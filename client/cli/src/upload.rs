use crate::api::{ApiError, MediaStore, UploadPayload};
use crate::editor::EncodedImage;
use crate::model::{format_size, FolderId, MediaFile};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// OS metadata files that never get uploaded.
const IGNORED_NAMES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

/// One item of an upload batch: a local file or an editor result.
#[derive(Debug, Clone)]
pub enum UploadSource {
    Path(PathBuf),
    Encoded(EncodedImage),
}

impl UploadSource {
    pub fn name(&self) -> String {
        match self {
            UploadSource::Path(path) => file_name(path),
            UploadSource::Encoded(image) => image.filename.clone(),
        }
    }

    async fn size(&self) -> Result<u64, ApiError> {
        match self {
            UploadSource::Path(path) => Ok(tokio::fs::metadata(path).await?.len()),
            UploadSource::Encoded(image) => Ok(image.bytes.len() as u64),
        }
    }

    pub async fn into_payload(self) -> Result<UploadPayload, ApiError> {
        match self {
            UploadSource::Path(path) => {
                let filename = file_name(&path);
                let mime_type = mime_guess::from_path(&path)
                    .first_or_octet_stream()
                    .to_string();
                let bytes = tokio::fs::read(&path).await?;
                Ok(UploadPayload {
                    filename,
                    mime_type,
                    bytes,
                })
            }
            UploadSource::Encoded(image) => Ok(UploadPayload {
                filename: image.filename,
                mime_type: image.mime_type.to_string(),
                bytes: image.bytes,
            }),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

#[derive(Debug, Clone)]
pub enum UploadEvent {
    Started {
        index: usize,
        total: usize,
        name: String,
    },
    Succeeded {
        file: MediaFile,
    },
    Failed {
        name: String,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadFailure {
    pub name: String,
    pub error: String,
}

/// Outcome of a batch, in submission order.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub uploaded: Vec<MediaFile>,
    pub failed: Vec<UploadFailure>,
}

impl UploadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn summary(&self) -> String {
        format!("uploaded {}, failed {}", self.uploaded.len(), self.failed.len())
    }
}

/// Sends files to the ingestion endpoint, tagged with a destination folder.
///
/// Batches run strictly one file at a time: each upload is awaited before the
/// next starts, and a failure is recorded against its filename without
/// stopping the rest of the batch.
pub struct UploadPipeline<'a, S> {
    store: &'a S,
    folder_id: Option<FolderId>,
    max_bytes: Option<u64>,
}

impl<'a, S: MediaStore> UploadPipeline<'a, S> {
    pub fn new(store: &'a S, folder_id: Option<FolderId>) -> Self {
        Self {
            store,
            folder_id,
            max_bytes: None,
        }
    }

    /// Reject files above `max_bytes` locally instead of sending them.
    pub fn with_size_limit(mut self, max_bytes: Option<u64>) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub async fn upload(&self, source: UploadSource) -> Result<MediaFile, ApiError> {
        if let Some(limit) = self.max_bytes {
            let size = source.size().await?;
            if size > limit {
                return Err(ApiError::Invalid(format!(
                    "file is {}, maximum size is {}",
                    format_size(size),
                    format_size(limit)
                )));
            }
        }
        let payload = source.into_payload().await?;
        tracing::debug!(
            "Uploading {} ({} bytes, {})",
            payload.filename,
            payload.bytes.len(),
            payload.mime_type
        );
        self.store.upload(payload, self.folder_id).await
    }

    pub async fn upload_batch<F>(&self, sources: Vec<UploadSource>, mut observe: F) -> UploadReport
    where
        F: FnMut(&UploadEvent),
    {
        let total = sources.len();
        let mut report = UploadReport::default();

        for (index, source) in sources.into_iter().enumerate() {
            let name = source.name();
            observe(&UploadEvent::Started {
                index,
                total,
                name: name.clone(),
            });

            match self.upload(source).await {
                Ok(file) => {
                    tracing::info!(file_id = %file.id, "Uploaded {}", name);
                    observe(&UploadEvent::Succeeded { file: file.clone() });
                    report.uploaded.push(file);
                }
                Err(e) => {
                    tracing::warn!("Failed to upload {}: {}", name, e);
                    let error = e.to_string();
                    observe(&UploadEvent::Failed {
                        name: name.clone(),
                        error: error.clone(),
                    });
                    report.failed.push(UploadFailure { name, error });
                }
            }
        }

        report
    }
}

/// Drop-target state of a drag-and-drop surface.
#[derive(Debug, Default)]
pub struct DropZone {
    active: bool,
}

impl DropZone {
    pub fn drag_enter(&mut self) {
        self.active = true;
    }

    pub fn drag_leave(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Deactivate and turn the dropped paths into a batch.
    pub fn drop_paths(&mut self, paths: &[PathBuf]) -> Vec<UploadSource> {
        self.active = false;
        resolve_dropped_paths(paths)
    }
}

pub fn is_ignored(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return true;
    };
    name.starts_with('.') || IGNORED_NAMES.iter().any(|ignored| *ignored == name)
}

/// Expand dropped paths: files as-is, directories recursively, in sorted order.
pub fn resolve_dropped_paths(paths: &[PathBuf]) -> Vec<UploadSource> {
    let mut sources = Vec::new();
    for path in paths {
        if path.is_dir() {
            let files = WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !is_ignored(e.path()))
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| UploadSource::Path(e.into_path()));
            sources.extend(files);
        } else if !is_ignored(path) {
            sources.push(UploadSource::Path(path.clone()));
        }
    }
    sources
}

/// Split text pasted into a terminal (dragged files) into paths.
///
/// Handles quoting, backslash-escaped spaces and `file://` prefixes.
pub fn parse_dropped_text(text: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => quote = Some(c),
            (None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            (None, c) if c.is_whitespace() => {
                if !current.is_empty() {
                    paths.push(to_path(&current));
                    current.clear();
                }
            }
            (None, c) => current.push(c),
        }
    }
    if !current.is_empty() {
        paths.push(to_path(&current));
    }
    paths
}

fn to_path(token: &str) -> PathBuf {
    PathBuf::from(token.strip_prefix("file://").unwrap_or(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryStore;
    use tempfile::TempDir;

    fn write_files(dir: &TempDir, names: &[&str]) -> Vec<UploadSource> {
        names
            .iter()
            .map(|name| {
                let path = dir.path().join(name);
                std::fs::write(&path, format!("contents of {}", name)).unwrap();
                UploadSource::Path(path)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_batch_continues_past_failure() {
        let dir = TempDir::new().unwrap();
        let sources = write_files(&dir, &["a.jpg", "b.jpg", "c.jpg", "d.jpg", "e.jpg"]);
        let store = InMemoryStore::new();
        store.reject_upload("c.jpg", 413, "File too large. Maximum size is 10.0MB");

        let pipeline = UploadPipeline::new(&store, None);
        let report = pipeline.upload_batch(sources, |_| {}).await;

        assert_eq!(report.uploaded.len(), 4);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].name, "c.jpg");
        assert!(report.failed[0].error.contains("File too large"));
        let names: Vec<_> = report
            .uploaded
            .iter()
            .map(|f| f.original_filename.as_str())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "d.jpg", "e.jpg"]);
        assert_eq!(report.summary(), "uploaded 4, failed 1");
    }

    #[tokio::test]
    async fn test_batch_is_sequential() {
        let dir = TempDir::new().unwrap();
        let sources = write_files(&dir, &["a.png", "b.png", "c.png"]);
        let store = InMemoryStore::new();

        UploadPipeline::new(&store, None)
            .upload_batch(sources, |_| {})
            .await;

        assert_eq!(
            store.calls(),
            vec!["start:a.png", "end:a.png", "start:b.png", "end:b.png", "start:c.png", "end:c.png"]
        );
    }

    #[tokio::test]
    async fn test_batch_reports_events_in_order() {
        let dir = TempDir::new().unwrap();
        let sources = write_files(&dir, &["a.png", "b.png"]);
        let store = InMemoryStore::new();
        store.reject_upload("b.png", 400, "File type not allowed");

        let mut events = Vec::new();
        UploadPipeline::new(&store, None)
            .upload_batch(sources, |event| {
                events.push(match event {
                    UploadEvent::Started { index, total, .. } => format!("started {}/{}", index + 1, total),
                    UploadEvent::Succeeded { file } => format!("ok {}", file.original_filename),
                    UploadEvent::Failed { name, .. } => format!("failed {}", name),
                })
            })
            .await;

        assert_eq!(events, vec!["started 1/2", "ok a.png", "started 2/2", "failed b.png"]);
    }

    #[tokio::test]
    async fn test_uploads_land_in_destination_folder() {
        let dir = TempDir::new().unwrap();
        let sources = write_files(&dir, &["stage.jpg"]);
        let store = InMemoryStore::new();
        let folder = store.add_folder("events", None);

        let report = UploadPipeline::new(&store, Some(folder))
            .upload_batch(sources, |_| {})
            .await;

        assert!(report.is_clean());
        assert_eq!(report.uploaded[0].folder_id, Some(folder));
        assert_eq!(report.uploaded[0].mime_type, "image/jpeg");
        let stored = store.files();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].folder_id, Some(folder));
    }

    #[tokio::test]
    async fn test_oversized_file_fails_without_request() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("huge.jpg");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();
        let store = InMemoryStore::new();

        let pipeline = UploadPipeline::new(&store, None).with_size_limit(Some(1024));
        let result = pipeline.upload(UploadSource::Path(path)).await;

        assert!(matches!(result, Err(ApiError::Invalid(_))));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_reported_by_name() {
        let dir = TempDir::new().unwrap();
        let mut sources = vec![UploadSource::Path(dir.path().join("gone.jpg"))];
        sources.extend(write_files(&dir, &["here.jpg"]));
        let store = InMemoryStore::new();

        let report = UploadPipeline::new(&store, None)
            .with_size_limit(Some(1024))
            .upload_batch(sources, |_| {})
            .await;

        assert_eq!(report.failed[0].name, "gone.jpg");
        assert_eq!(report.uploaded.len(), 1);
    }

    #[tokio::test]
    async fn test_encoded_image_upload() {
        let store = InMemoryStore::new();
        let encoded = EncodedImage {
            filename: "edited-1700000000000.jpg".to_string(),
            mime_type: "image/jpeg",
            bytes: vec![0xFF, 0xD8, 0xFF],
        };
        let file = UploadPipeline::new(&store, None)
            .upload(UploadSource::Encoded(encoded))
            .await
            .unwrap();
        assert_eq!(file.original_filename, "edited-1700000000000.jpg");
        assert_eq!(file.file_size, 3);
    }

    #[test]
    fn test_drop_zone_toggles() {
        let mut zone = DropZone::default();
        assert!(!zone.is_active());
        zone.drag_enter();
        assert!(zone.is_active());
        zone.drag_leave();
        assert!(!zone.is_active());
        zone.drag_enter();
        let sources = zone.drop_paths(&[]);
        assert!(sources.is_empty());
        assert!(!zone.is_active());
    }

    #[test]
    fn test_resolve_dropped_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("shoot");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("b.jpg"), b"b").unwrap();
        std::fs::write(nested.join("a.jpg"), b"a").unwrap();
        std::fs::write(nested.join(".DS_Store"), b"x").unwrap();
        let loose = dir.path().join("cover.png");
        std::fs::write(&loose, b"c").unwrap();

        let sources = resolve_dropped_paths(&[nested, loose]);
        let names: Vec<_> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "cover.png"]);
    }

    #[test]
    fn test_parse_dropped_text() {
        let paths = parse_dropped_text("/tmp/a.jpg /tmp/my\\ photo.png '/tmp/x y.gif'\nfile:///tmp/z.webp");
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/tmp/a.jpg"),
                PathBuf::from("/tmp/my photo.png"),
                PathBuf::from("/tmp/x y.gif"),
                PathBuf::from("/tmp/z.webp"),
            ]
        );
        assert!(parse_dropped_text("   ").is_empty());
    }

    #[test]
    fn test_ignored_names() {
        assert!(is_ignored(Path::new("/a/.DS_Store")));
        assert!(is_ignored(Path::new("Thumbs.db")));
        assert!(is_ignored(Path::new(".hidden.jpg")));
        assert!(!is_ignored(Path::new("photo.jpg")));
    }
}
