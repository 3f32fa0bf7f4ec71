use crate::model::{FolderId, MediaFolder};

/// Single-level folder context.
///
/// Holds only the current folder, never an ancestor stack: entering a nested
/// folder replaces the context, and the only way back is the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderNavigator {
    current: Option<FolderId>,
    label: Option<String>,
}

impl FolderNavigator {
    pub fn current(&self) -> Option<FolderId> {
        self.current
    }

    /// Name of the current folder when it was entered from a listing.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.current.is_none()
    }

    /// Returns false when already inside `folder`.
    pub fn enter(&mut self, folder: &MediaFolder) -> bool {
        if self.current == Some(folder.id) {
            return false;
        }
        self.current = Some(folder.id);
        self.label = Some(folder.name.clone());
        true
    }

    /// Enter by id alone, e.g. from a command-line argument.
    pub fn enter_id(&mut self, id: FolderId) -> bool {
        if self.current == Some(id) {
            return false;
        }
        self.current = Some(id);
        self.label = None;
        true
    }

    /// Return to root. Returns false when already there.
    pub fn exit(&mut self) -> bool {
        if self.current.is_none() {
            return false;
        }
        self.current = None;
        self.label = None;
        true
    }

    pub fn location(&self) -> String {
        match (self.current, self.label()) {
            (None, _) => "/".to_string(),
            (Some(_), Some(name)) => format!("/{}", name),
            (Some(id), None) => format!("/#{}", id),
        }
    }
}
