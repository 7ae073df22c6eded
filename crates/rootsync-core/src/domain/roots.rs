//! Synchronization root sets
//!
//! A [`RootSet`] is the derived view of every active synchronization root of
//! one principal, across repositories. The source of truth is the subscriber
//! list stored on documents; root sets are rebuilt from it at will.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{DocPath, DocumentId, Principal, RepositoryName};

/// A synchronization root reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootRef {
    pub id: DocumentId,
    pub path: DocPath,
    /// Collections expose their members instead of a subtree
    pub is_collection: bool,
}

/// Active roots of a principal in one repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRoots {
    /// Ordered by title then creation date descending
    pub roots: Vec<RootRef>,
    /// Ids of the documents that belong to a collection root
    pub collection_members: BTreeSet<DocumentId>,
}

impl RepositoryRoots {
    /// Paths of the roots, in root order
    pub fn paths(&self) -> Vec<DocPath> {
        self.roots.iter().map(|r| r.path.clone()).collect()
    }

    /// Returns true if `id` is one of the roots
    pub fn contains_root(&self, id: &DocumentId) -> bool {
        self.roots.iter().any(|r| &r.id == id)
    }

    /// Returns true if `path` lies under (or is) one of the roots
    pub fn covers_path(&self, path: &DocPath) -> bool {
        self.roots
            .iter()
            .filter(|r| !r.is_collection)
            .any(|r| r.path.contains(path))
    }

    /// Returns true if the repository has no active root
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// Active roots of a principal across repositories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootSet {
    pub principal: Principal,
    pub computed_at: DateTime<Utc>,
    pub repositories: BTreeMap<RepositoryName, RepositoryRoots>,
}

impl RootSet {
    /// Creates an empty root set
    pub fn empty(principal: Principal) -> Self {
        Self {
            principal,
            computed_at: Utc::now(),
            repositories: BTreeMap::new(),
        }
    }

    /// Roots in `repository`, empty if none
    pub fn in_repository(&self, repository: &RepositoryName) -> RepositoryRoots {
        self.repositories
            .get(repository)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns true if `id` is an active root in `repository`
    pub fn is_root(&self, repository: &RepositoryName, id: &DocumentId) -> bool {
        self.repositories
            .get(repository)
            .is_some_and(|r| r.contains_root(id))
    }

    /// All root paths as `repository:path`
    pub fn qualified_paths(&self) -> Vec<String> {
        self.repositories
            .iter()
            .flat_map(|(repo, roots)| roots.roots.iter().map(move |r| format!("{repo}:{}", r.path)))
            .collect()
    }
}
