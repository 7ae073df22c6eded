//! File system items
//!
//! A [`FileSystemItem`] is the file or folder a desktop client mirrors for
//! a repository document. Items are built per request by the adapter chain
//! and never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::LockInfo;
use super::newtypes::{DocumentId, FileSystemItemId, RepositoryName};

/// Shape of an item on the client file tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    File,
    Folder,
}

/// Client-facing projection of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystemItem {
    pub id: FileSystemItemId,
    /// `None` only for the top-level folder, or when the parent could not be
    /// resolved for a historical entry
    pub parent_id: Option<FileSystemItemId>,
    pub name: String,
    pub kind: ItemKind,
    /// Backing repository, `None` for synthesized items
    pub repository: Option<RepositoryName>,
    /// Backing document, `None` for synthesized items
    pub doc_id: Option<DocumentId>,
    pub can_rename: bool,
    pub can_delete: bool,
    /// Files: content may be replaced
    pub can_update: bool,
    /// Folders: children may be created
    pub can_create_child: bool,
    /// Files: content digest
    pub digest: Option<String>,
    /// Files: content length in bytes
    pub length: Option<u64>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    /// Only filled when lock information was requested
    pub lock: Option<LockInfo>,
}

impl FileSystemItem {
    /// Returns true if the item is a folder
    pub fn is_folder(&self) -> bool {
        self.kind == ItemKind::Folder
    }

    /// The `(id, name, kind)` identity clients reconcile on
    pub fn identity(&self) -> (&FileSystemItemId, &str, ItemKind) {
        (&self.id, &self.name, self.kind)
    }
}
