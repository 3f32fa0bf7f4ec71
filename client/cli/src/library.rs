//! Client-side view model of the media library.
//!
//! `ViewState` is the ephemeral browsing state (folder, filters, page, view
//! mode). `AssetView` pairs it with the last listing fetched from the store
//! and drops responses that were superseded by a newer request.

use crate::api::{ApiError, MediaStore};
use crate::model::{
    FileId, FileListing, FileQuery, FileType, FolderId, MediaFile, MediaFolder, NewFolder,
    MAX_PAGE_SIZE,
};
use crate::navigator::FolderNavigator;

const MAX_FOLDER_NAME_LEN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    Grid,
    List,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    navigator: FolderNavigator,
    file_type: Option<FileType>,
    search: String,
    page: u32,
    page_size: u32,
    view_mode: ViewMode,
}

impl ViewState {
    pub fn new(page_size: u32) -> Self {
        Self {
            navigator: FolderNavigator::default(),
            file_type: None,
            search: String::new(),
            page: 1,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            view_mode: ViewMode::default(),
        }
    }

    pub fn folder_id(&self) -> Option<FolderId> {
        self.navigator.current()
    }

    pub fn navigator(&self) -> &FolderNavigator {
        &self.navigator
    }

    pub fn file_type(&self) -> Option<FileType> {
        self.file_type
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    // Every filter setter resets the page so the next fetch never asks for a
    // page past the end of the new result set.

    pub fn enter_folder(&mut self, folder: &MediaFolder) -> bool {
        let changed = self.navigator.enter(folder);
        self.reset_page_if(changed)
    }

    pub fn enter_folder_id(&mut self, id: FolderId) -> bool {
        let changed = self.navigator.enter_id(id);
        self.reset_page_if(changed)
    }

    pub fn exit_to_root(&mut self) -> bool {
        let changed = self.navigator.exit();
        self.reset_page_if(changed)
    }

    pub fn set_file_type(&mut self, file_type: Option<FileType>) -> bool {
        let changed = self.file_type != file_type;
        self.file_type = file_type;
        self.reset_page_if(changed)
    }

    /// All → image → document → other → all.
    pub fn cycle_file_type(&mut self) -> bool {
        let next = match self.file_type {
            None => Some(FileType::Image),
            Some(FileType::Image) => Some(FileType::Document),
            Some(FileType::Document) => Some(FileType::Other),
            Some(FileType::Other) => None,
        };
        self.set_file_type(next)
    }

    pub fn set_search(&mut self, search: &str) -> bool {
        let changed = self.search != search;
        self.search = search.to_string();
        self.reset_page_if(changed)
    }

    pub fn set_page(&mut self, page: u32) -> bool {
        let page = page.max(1);
        let changed = self.page != page;
        self.page = page;
        changed
    }

    pub fn next_page(&mut self, total_pages: u32) -> bool {
        if self.page >= total_pages {
            return false;
        }
        self.set_page(self.page + 1)
    }

    pub fn prev_page(&mut self) -> bool {
        if self.page <= 1 {
            return false;
        }
        self.set_page(self.page - 1)
    }

    pub fn toggle_view_mode(&mut self) {
        self.view_mode = match self.view_mode {
            ViewMode::Grid => ViewMode::List,
            ViewMode::List => ViewMode::Grid,
        };
    }

    pub fn file_query(&self) -> FileQuery {
        let search = self.search.trim();
        FileQuery {
            folder_id: self.folder_id(),
            file_type: self.file_type,
            search: (!search.is_empty()).then(|| search.to_string()),
            page: self.page,
            page_size: self.page_size,
        }
    }

    fn reset_page_if(&mut self, changed: bool) -> bool {
        if changed {
            self.page = 1;
        }
        changed
    }
}

/// Everything one refresh of the view reads from the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub folders: Vec<MediaFolder>,
    pub files: FileListing,
}

/// A fetch in flight, tagged with the view's monotonically increasing request id.
#[derive(Debug, Clone)]
pub struct FetchTicket {
    id: u64,
    parent: Option<FolderId>,
    query: FileQuery,
}

impl FetchTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Folders first, then the file page, like the listing screen renders them.
    pub async fn fetch<S: MediaStore>(&self, store: &S) -> Result<Snapshot, ApiError> {
        let folders = store.list_folders(self.parent).await?;
        let files = store.list_files(&self.query).await?;
        Ok(Snapshot { folders, files })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    /// A newer request was started after this one; the response was dropped.
    Stale,
    /// The fetch failed; the previous listing is kept.
    Failed,
}

#[derive(Debug)]
pub struct AssetView {
    state: ViewState,
    folders: Vec<MediaFolder>,
    files: Vec<MediaFile>,
    total: u64,
    total_pages: u32,
    loading: bool,
    last_request: u64,
    last_error: Option<String>,
}

impl AssetView {
    pub fn new(page_size: u32) -> Self {
        Self::with_state(ViewState::new(page_size))
    }

    pub fn with_state(state: ViewState) -> Self {
        Self {
            state,
            folders: Vec::new(),
            files: Vec::new(),
            total: 0,
            total_pages: 0,
            loading: false,
            last_request: 0,
            last_error: None,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// Callers that change filters through this must `refresh` afterwards.
    pub fn state_mut(&mut self) -> &mut ViewState {
        &mut self.state
    }

    pub fn folders(&self) -> &[MediaFolder] {
        &self.folders
    }

    pub fn files(&self) -> &[MediaFile] {
        &self.files
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.last_request += 1;
        self.loading = true;
        FetchTicket {
            id: self.last_request,
            parent: self.state.folder_id(),
            query: self.state.file_query(),
        }
    }

    pub fn complete_fetch(
        &mut self,
        request_id: u64,
        result: Result<Snapshot, ApiError>,
    ) -> FetchOutcome {
        if request_id != self.last_request {
            tracing::debug!(
                request_id,
                latest = self.last_request,
                "Discarding superseded listing"
            );
            return FetchOutcome::Stale;
        }

        self.loading = false;
        match result {
            Ok(snapshot) => {
                self.folders = snapshot.folders;
                self.files = snapshot.files.items;
                self.total = snapshot.files.total;
                self.total_pages = snapshot.files.total_pages;
                self.last_error = None;
                FetchOutcome::Applied
            }
            Err(e) => {
                tracing::warn!(request_id, "Failed to load media listing: {}", e);
                self.last_error = Some(e.to_string());
                FetchOutcome::Failed
            }
        }
    }

    pub async fn refresh<S: MediaStore>(&mut self, store: &S) -> FetchOutcome {
        let ticket = self.begin_fetch();
        let result = ticket.fetch(store).await;
        self.complete_fetch(ticket.id(), result)
    }

    /// Create a folder inside the current one, then re-read the listing.
    pub async fn create_folder<S: MediaStore>(
        &mut self,
        store: &S,
        name: &str,
    ) -> Result<MediaFolder, ApiError> {
        let name = validate_folder_name(name)?;
        let folder = store
            .create_folder(&NewFolder {
                name,
                parent_folder_id: self.state.folder_id(),
            })
            .await?;
        tracing::info!(folder_id = %folder.id, "Created folder {}", folder.name);
        self.refresh(store).await;
        Ok(folder)
    }

    pub async fn delete_file<S: MediaStore>(
        &mut self,
        store: &S,
        id: FileId,
    ) -> Result<(), ApiError> {
        store.delete_file(id).await?;
        tracing::info!(file_id = %id, "Deleted file");
        self.refresh(store).await;
        Ok(())
    }

    pub async fn delete_folder<S: MediaStore>(
        &mut self,
        store: &S,
        id: FolderId,
    ) -> Result<(), ApiError> {
        store.delete_folder(id).await?;
        tracing::info!(folder_id = %id, "Deleted folder");
        self.refresh(store).await;
        Ok(())
    }
}

pub fn validate_folder_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::Invalid("folder name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_FOLDER_NAME_LEN {
        return Err(ApiError::Invalid(format!(
            "folder name must be at most {} characters",
            MAX_FOLDER_NAME_LEN
        )));
    }
    Ok(name.to_string())
}
