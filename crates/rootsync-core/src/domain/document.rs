//! Repository document as seen by the change-feed engine
//!
//! Documents belong to the external repository. The engine only reads
//! them, except for the subscriber list that backs synchronization roots,
//! which it mutates through [`Document::subscribe`] and
//! [`Document::unsubscribe`] before saving under optimistic concurrency.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{DocPath, DocumentId, Principal, RepositoryName};

/// Well-known facet names
pub mod facets {
    /// Document can hold children
    pub const FOLDERISH: &str = "Folderish";
    /// Document is hidden from navigation and never synchronized
    pub const HIDDEN_IN_NAVIGATION: &str = "HiddenInNavigation";
    /// Document carries a subscriber list and may be a synchronization root
    pub const SYNC_ROOT: &str = "DriveSynchronized";
    /// Document is a collection whose members are referenced by id
    pub const COLLECTION: &str = "Collection";
    /// Document is a member of at least one collection
    pub const COLLECTION_MEMBER: &str = "CollectionMember";
}

// ============================================================================
// LifecycleState
// ============================================================================

/// Lifecycle state of a document
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LifecycleState {
    /// Regular, live state
    #[default]
    Project,
    /// Soft-deleted
    Deleted,
    /// Any other state defined by the repository
    Other(String),
}

impl LifecycleState {
    /// Returns true for the soft-deleted state
    pub fn is_deleted(&self) -> bool {
        matches!(self, LifecycleState::Deleted)
    }

    /// Wire name of the state
    pub fn as_str(&self) -> &str {
        match self {
            LifecycleState::Project => "project",
            LifecycleState::Deleted => "deleted",
            LifecycleState::Other(s) => s,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for LifecycleState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "project" => LifecycleState::Project,
            "deleted" => LifecycleState::Deleted,
            _ => LifecycleState::Other(value),
        }
    }
}

impl From<LifecycleState> for String {
    fn from(state: LifecycleState) -> Self {
        state.as_str().to_string()
    }
}

// ============================================================================
// Value types
// ============================================================================

/// Primary content of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    /// File name of the content
    pub name: String,
    /// Content digest (hex)
    pub digest: String,
    /// Size in bytes
    pub length: u64,
    /// Storage backend hosting the content, `None` for the default store
    pub provider: Option<String>,
}

/// Entry of the subscriber list stored on a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub principal: Principal,
    pub enabled: bool,
    pub since: DateTime<Utc>,
}

/// Lock held on a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub owner: Principal,
    pub created: DateTime<Utc>,
}

// ============================================================================
// Document
// ============================================================================

/// A repository document
///
/// This is a transfer object of the repository port: fields are public and
/// the helpers below only interpret them. `change_token` is owned by the
/// repository and incremented on every successful save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub repository: RepositoryName,
    pub path: DocPath,
    pub parent_id: Option<DocumentId>,
    pub doc_type: String,
    pub title: String,
    pub facets: BTreeSet<String>,
    pub lifecycle: LifecycleState,
    pub is_version: bool,
    pub is_proxy: bool,
    pub is_trashed: bool,
    pub blob: Option<Blob>,
    pub subscribers: Vec<Subscription>,
    /// Ids of the collections this document belongs to
    pub collections: BTreeSet<DocumentId>,
    /// Principals allowed to read the document; empty means everyone
    pub readers: BTreeSet<Principal>,
    pub lock: Option<LockInfo>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub change_token: u64,
}

impl Document {
    /// Creates a live document with no facets, content or subscribers
    ///
    /// The title defaults to the last path segment.
    pub fn new(
        id: DocumentId,
        repository: RepositoryName,
        path: DocPath,
        doc_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let title = path.name().to_string();
        Self {
            id,
            repository,
            path,
            parent_id: None,
            doc_type: doc_type.into(),
            title,
            facets: BTreeSet::new(),
            lifecycle: LifecycleState::Project,
            is_version: false,
            is_proxy: false,
            is_trashed: false,
            blob: None,
            subscribers: Vec::new(),
            collections: BTreeSet::new(),
            readers: BTreeSet::new(),
            lock: None,
            created: now,
            modified: now,
            change_token: 0,
        }
    }

    /// Sets the parent document id
    pub fn with_parent(mut self, parent_id: DocumentId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Sets the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Adds a facet
    pub fn with_facet(mut self, facet: impl Into<String>) -> Self {
        self.facets.insert(facet.into());
        self
    }

    /// Sets the primary content
    pub fn with_blob(mut self, blob: Blob) -> Self {
        self.blob = Some(blob);
        self
    }

    /// Returns true if the document can hold children
    pub fn is_folderish(&self) -> bool {
        self.has_facet(facets::FOLDERISH)
    }

    /// Returns true if the document carries `facet`
    pub fn has_facet(&self, facet: &str) -> bool {
        self.facets.contains(facet)
    }

    /// Returns true if the document is hidden from navigation
    pub fn is_hidden(&self) -> bool {
        self.has_facet(facets::HIDDEN_IN_NAVIGATION)
    }

    /// Returns true if the document is a collection
    pub fn is_collection(&self) -> bool {
        self.has_facet(facets::COLLECTION)
    }

    /// Returns true if the document is in the trash, either flagged or in
    /// the `deleted` lifecycle state
    pub fn is_deleted(&self) -> bool {
        self.is_trashed || self.lifecycle.is_deleted()
    }

    /// Returns true if `principal` may read the document
    pub fn readable_by(&self, principal: &Principal) -> bool {
        self.readers.is_empty() || self.readers.contains(principal)
    }

    /// Subscription of `principal`, if any
    pub fn subscription_for(&self, principal: &Principal) -> Option<&Subscription> {
        self.subscribers.iter().find(|s| &s.principal == principal)
    }

    /// Returns true if the document is an enabled synchronization root for
    /// `principal`
    ///
    /// A root must carry the sync-root facet, hold an enabled subscription
    /// for the principal and not be deleted.
    pub fn is_enabled_root_for(&self, principal: &Principal) -> bool {
        self.has_facet(facets::SYNC_ROOT)
            && !self.is_deleted()
            && self
                .subscription_for(principal)
                .is_some_and(|s| s.enabled)
    }

    /// Adds or re-enables the subscription of `principal`
    ///
    /// Returns false if the principal already held an enabled subscription.
    pub fn subscribe(&mut self, principal: &Principal, now: DateTime<Utc>) -> bool {
        self.facets.insert(facets::SYNC_ROOT.to_string());
        match self.subscribers.iter_mut().find(|s| &s.principal == principal) {
            Some(existing) if existing.enabled => false,
            Some(existing) => {
                existing.enabled = true;
                existing.since = now;
                true
            }
            None => {
                self.subscribers.push(Subscription {
                    principal: principal.clone(),
                    enabled: true,
                    since: now,
                });
                true
            }
        }
    }

    /// Disables the subscription of `principal`
    ///
    /// Returns false if the principal held no enabled subscription.
    pub fn unsubscribe(&mut self, principal: &Principal) -> bool {
        match self
            .subscribers
            .iter_mut()
            .find(|s| &s.principal == principal && s.enabled)
        {
            Some(existing) => {
                existing.enabled = false;
                true
            }
            None => false,
        }
    }
}
