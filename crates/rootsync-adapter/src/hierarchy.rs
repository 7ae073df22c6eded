//! Top-level hierarchies
//!
//! Decides where synchronization roots show up below the top-level folder.
//! The flat hierarchy lists them directly. The user-workspace hierarchy fills
//! the top-level folder with the principal's workspace and groups the roots
//! in a virtual "My synchronized folders" child. The permission hierarchy
//! splits them between "My Docs" and "Other Docs".
//!
//! Virtual folders are not backed by a document; like the top-level folder
//! their id is `<name>#`.

use chrono::{DateTime, Utc};
use rootsync_core::config::{HierarchyConfig, HierarchyKind};
use rootsync_core::domain::{DocPath, Document, FileSystemItem, FileSystemItemId, ItemKind, Principal};

use crate::error::AdapterError;

pub const USER_WORKSPACE_ROOTS: &str = "userWorkspaceSyncRootParentFactory";
pub const MY_DOCS: &str = "userSyncRootParentFactory";
pub const OTHER_DOCS: &str = "sharedSyncRootParentFactory";

/// A folder item synthesized below the top-level folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFolder {
    name: String,
    title: String,
}

impl VirtualFolder {
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> FileSystemItemId {
        FileSystemItemId::top_level(&self.name)
    }

    pub fn is_id(&self, id: &FileSystemItemId) -> bool {
        id.as_str() == self.id().as_str()
    }

    /// The synthesized folder item, hanging below `parent`
    pub fn item(&self, parent: FileSystemItemId) -> FileSystemItem {
        let epoch = DateTime::<Utc>::default();
        FileSystemItem {
            id: self.id(),
            parent_id: Some(parent),
            name: self.title.clone(),
            kind: ItemKind::Folder,
            repository: None,
            doc_id: None,
            can_rename: false,
            can_delete: false,
            can_update: false,
            can_create_child: false,
            digest: None,
            length: None,
            created: epoch,
            modified: epoch,
            lock: None,
        }
    }
}

/// Layout of the roots below the top-level folder
#[derive(Debug, Clone, Default)]
pub enum Hierarchy {
    #[default]
    Flat,
    UserWorkspace {
        workspaces: DocPath,
        roots_parent: VirtualFolder,
    },
    Permission {
        workspaces: DocPath,
        mine: VirtualFolder,
        shared: VirtualFolder,
    },
}

impl Hierarchy {
    pub fn from_config(config: &HierarchyConfig) -> Result<Self, AdapterError> {
        let workspaces = || {
            DocPath::new(config.user_workspaces_path.clone())
                .map_err(|e| AdapterError::InvalidConfig(e.to_string()))
        };
        Ok(match config.kind {
            HierarchyKind::Flat => Self::Flat,
            HierarchyKind::UserWorkspace => Self::UserWorkspace {
                workspaces: workspaces()?,
                roots_parent: VirtualFolder::new(USER_WORKSPACE_ROOTS, "My synchronized folders"),
            },
            HierarchyKind::Permission => Self::Permission {
                workspaces: workspaces()?,
                mine: VirtualFolder::new(MY_DOCS, "My Docs"),
                shared: VirtualFolder::new(OTHER_DOCS, "Other Docs"),
            },
        })
    }

    pub fn kind(&self) -> HierarchyKind {
        match self {
            Self::Flat => HierarchyKind::Flat,
            Self::UserWorkspace { .. } => HierarchyKind::UserWorkspace,
            Self::Permission { .. } => HierarchyKind::Permission,
        }
    }

    /// Path of the personal workspace of `principal`
    pub fn workspace_path(&self, principal: &Principal) -> Option<DocPath> {
        match self {
            Self::Flat => None,
            Self::UserWorkspace { workspaces, .. } | Self::Permission { workspaces, .. } => {
                workspaces.join(principal.as_str()).ok()
            }
        }
    }

    /// Workspace synchronized for `principal` without registration
    pub fn implicit_root_path(&self, principal: &Principal) -> Option<DocPath> {
        match self {
            Self::UserWorkspace { .. } => self.workspace_path(principal),
            _ => None,
        }
    }

    /// Parent item of the root `doc` as seen by `principal`
    pub fn root_parent(
        &self,
        top_level: FileSystemItemId,
        doc: &Document,
        principal: &Principal,
    ) -> FileSystemItemId {
        match self {
            Self::Flat => top_level,
            Self::UserWorkspace { roots_parent, .. } => roots_parent.id(),
            Self::Permission { mine, shared, .. } => {
                let owned = self
                    .workspace_path(principal)
                    .is_some_and(|ws| ws.contains(&doc.path));
                if owned {
                    mine.id()
                } else {
                    shared.id()
                }
            }
        }
    }

    /// Virtual folders directly below the top-level folder
    pub fn virtual_folders(&self) -> Vec<&VirtualFolder> {
        match self {
            Self::Flat => Vec::new(),
            Self::UserWorkspace { roots_parent, .. } => vec![roots_parent],
            Self::Permission { mine, shared, .. } => vec![mine, shared],
        }
    }

    pub fn virtual_folder(&self, id: &FileSystemItemId) -> Option<&VirtualFolder> {
        self.virtual_folders().into_iter().find(|f| f.is_id(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{folder, principal};

    fn hierarchy(kind: HierarchyKind) -> Hierarchy {
        Hierarchy::from_config(&HierarchyConfig {
            kind,
            ..HierarchyConfig::default()
        })
        .unwrap()
    }

    fn top() -> FileSystemItemId {
        FileSystemItemId::top_level("topLevelFolderItemFactory")
    }

    #[test]
    fn test_flat_roots_sit_below_top_level() {
        let flat = hierarchy(HierarchyKind::Flat);
        let root = folder("r", "/ws/r", None);
        assert_eq!(flat.root_parent(top(), &root, &principal("alice")), top());
        assert!(flat.virtual_folders().is_empty());
        assert!(flat.workspace_path(&principal("alice")).is_none());
    }

    #[test]
    fn test_user_workspace_groups_roots() {
        let ws = hierarchy(HierarchyKind::UserWorkspace);
        let alice = principal("alice");
        let root = folder("r", "/ws/r", None);
        let parent = ws.root_parent(top(), &root, &alice);
        assert_eq!(parent.as_str(), "userWorkspaceSyncRootParentFactory#");
        assert_eq!(
            ws.implicit_root_path(&alice).map(|p| p.to_string()),
            Some("/UserWorkspaces/alice".to_string())
        );

        let item = ws.virtual_folder(&parent).unwrap().item(top());
        assert_eq!(item.name, "My synchronized folders");
        assert_eq!(item.parent_id, Some(top()));
        assert!(item.is_folder());
    }

    #[test]
    fn test_permission_splits_by_workspace() {
        let perm = hierarchy(HierarchyKind::Permission);
        let alice = principal("alice");
        let own = folder("own", "/UserWorkspaces/alice/projects", None);
        let other = folder("other", "/UserWorkspaces/bob/projects", None);
        assert_eq!(perm.root_parent(top(), &own, &alice).as_str(), "userSyncRootParentFactory#");
        assert_eq!(perm.root_parent(top(), &other, &alice).as_str(), "sharedSyncRootParentFactory#");
        // Nothing is synchronized implicitly
        assert!(perm.implicit_root_path(&alice).is_none());
        assert_eq!(perm.virtual_folders().len(), 2);
    }

    #[test]
    fn test_invalid_workspaces_path_is_rejected() {
        let config = HierarchyConfig {
            kind: HierarchyKind::Permission,
            user_workspaces_path: "relative".to_string(),
        };
        assert!(matches!(
            Hierarchy::from_config(&config),
            Err(AdapterError::InvalidConfig(_))
        ));
    }
}
