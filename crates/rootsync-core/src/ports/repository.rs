//! Repository port (driven/secondary port)
//!
//! This module defines the interface to the external document repository:
//! document lookup and filtering, optimistic writes of the subscriber list,
//! and the append-only audit trail with its clustering metadata.
//!
//! ## Design Notes
//!
//! - Unlike the storage-agnostic `anyhow` errors of most adapters, this port
//!   classifies failures with [`RepositoryError`]: the change-feed engine
//!   treats write conflicts and unavailability differently.
//! - Missing and unreadable documents are not errors. [`DocumentLookup`]
//!   returns them as values so callers can skip or synthesize deletions.
//! - Principals are passed explicitly on every call that depends on them.
//! - Filters ([`DocumentQuery`], [`LogQuery`]) carry their own `matches`
//!   predicate so every implementation evaluates them the same way.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{
    Document, DocPath, DocumentId, EventKind, LifecycleState, LogEntry, LogPosition, LogRecord,
    Principal, RepositoryName,
};

// ============================================================================
// Errors and lookups
// ============================================================================

/// Failures reported by a repository
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    /// The document targeted by a write does not exist
    #[error("Document not found: {0}")]
    NotFound(String),

    /// The principal may not perform the operation
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// The document changed since it was read
    #[error("Write conflict on {doc_id}: expected change token {expected}, found {actual}")]
    WriteConflict {
        doc_id: DocumentId,
        expected: u64,
        actual: u64,
    },

    /// Storage or network failure
    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    /// Returns true for optimistic concurrency failures
    pub fn is_write_conflict(&self) -> bool {
        matches!(self, RepositoryError::WriteConflict { .. })
    }
}

/// Result of fetching a single document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentLookup {
    Found(Box<Document>),
    NotFound,
    AccessDenied,
}

impl DocumentLookup {
    /// Returns the document if it was found and readable
    pub fn into_found(self) -> Option<Document> {
        match self {
            DocumentLookup::Found(doc) => Some(*doc),
            DocumentLookup::NotFound | DocumentLookup::AccessDenied => None,
        }
    }
}

// ============================================================================
// DocumentQuery
// ============================================================================

/// Sort order of [`DocumentQuery`] results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DocumentOrder {
    /// Title ascending, then creation date descending, then id
    #[default]
    TitleThenCreatedDesc,
    /// Path ascending
    Path,
}

/// Filter criteria for querying documents
///
/// All optional fields combine with AND logic. Documents the principal may
/// not read are never returned.
#[derive(Debug, Clone)]
pub struct DocumentQuery {
    /// Principal the query runs as
    pub principal: Principal,
    /// Only documents holding an enabled subscription for this principal
    pub subscriber: Option<Principal>,
    /// Only direct children of this document
    pub parent: Option<DocumentId>,
    /// Only members of this collection
    pub collection: Option<DocumentId>,
    /// Only documents at or below this path
    pub path_prefix: Option<DocPath>,
    /// Include trashed and soft-deleted documents
    pub include_trashed: bool,
    pub order: DocumentOrder,
    pub limit: Option<usize>,
}

impl DocumentQuery {
    /// Creates a query returning every live document readable by `principal`
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            subscriber: None,
            parent: None,
            collection: None,
            path_prefix: None,
            include_trashed: false,
            order: DocumentOrder::default(),
            limit: None,
        }
    }

    /// Sets the subscriber filter
    pub fn with_subscriber(mut self, subscriber: Principal) -> Self {
        self.subscriber = Some(subscriber);
        self
    }

    /// Sets the parent filter
    pub fn with_parent(mut self, parent: DocumentId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Sets the collection filter
    pub fn with_collection(mut self, collection: DocumentId) -> Self {
        self.collection = Some(collection);
        self
    }

    /// Sets the path prefix filter
    pub fn with_path_prefix(mut self, path_prefix: DocPath) -> Self {
        self.path_prefix = Some(path_prefix);
        self
    }

    /// Includes trashed documents
    pub fn including_trashed(mut self) -> Self {
        self.include_trashed = true;
        self
    }

    /// Sets the sort order
    pub fn ordered_by(mut self, order: DocumentOrder) -> Self {
        self.order = order;
        self
    }

    /// Sets the maximum number of results
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if `doc` satisfies every criterion
    pub fn matches(&self, doc: &Document) -> bool {
        if !doc.readable_by(&self.principal) {
            return false;
        }
        if !self.include_trashed && doc.is_deleted() {
            return false;
        }
        if let Some(subscriber) = &self.subscriber {
            if !doc.subscription_for(subscriber).is_some_and(|s| s.enabled) {
                return false;
            }
        }
        if let Some(parent) = &self.parent {
            if doc.parent_id.as_ref() != Some(parent) {
                return false;
            }
        }
        if let Some(collection) = &self.collection {
            if !doc.collections.contains(collection) {
                return false;
            }
        }
        if let Some(prefix) = &self.path_prefix {
            if !prefix.contains(&doc.path) {
                return false;
            }
        }
        true
    }

    /// Sorts `docs` in place according to [`order`](Self::order)
    pub fn sort(&self, docs: &mut [Document]) {
        match self.order {
            DocumentOrder::TitleThenCreatedDesc => docs.sort_by(|a, b| {
                a.title
                    .cmp(&b.title)
                    .then_with(|| b.created.cmp(&a.created))
                    .then_with(|| a.id.cmp(&b.id))
            }),
            DocumentOrder::Path => docs.sort_by(|a, b| a.path.cmp(&b.path)),
        }
    }
}

// ============================================================================
// LogQuery
// ============================================================================

/// Window and relevance filter for reading the audit trail
///
/// An entry matches when its position lies in `(lower, upper]` and either:
///
/// - it belongs to the `Drive` category and is not a plain
///   `rootUnregistered` event (those are delivered through the deletion
///   tombstone written alongside them), or
/// - it is a content event, not a transition into the deleted lifecycle
///   state, about a document under one of `root_paths` or listed in
///   `collection_members`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub lower: LogPosition,
    pub upper: LogPosition,
    pub root_paths: Vec<DocPath>,
    pub collection_members: BTreeSet<DocumentId>,
    /// Maximum number of entries to return
    pub limit: usize,
}

impl LogQuery {
    /// Returns true if `entry` falls in the window and is relevant
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if entry.position <= self.lower || entry.position > self.upper {
            return false;
        }
        match &entry.record {
            LogRecord::Tombstone(_) => true,
            LogRecord::Root { event, .. } => *event != EventKind::RootUnregistered,
            LogRecord::Document { event } if event.is_root_management() => {
                *event != EventKind::RootUnregistered
            }
            LogRecord::Document { event } => {
                event.is_content_event()
                    && !(*event == EventKind::LifecycleTransition
                        && entry.lifecycle == LifecycleState::Deleted)
                    && (self.root_paths.iter().any(|root| root.contains(&entry.doc_path))
                        || self.collection_members.contains(&entry.doc_id))
            }
        }
    }
}

/// An audit entry before the repository assigns its position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntryDraft {
    pub timestamp: DateTime<Utc>,
    pub doc_id: DocumentId,
    pub doc_path: DocPath,
    pub lifecycle: LifecycleState,
    pub record: LogRecord,
}

impl LogEntryDraft {
    /// Draft for `record` about `doc`, stamped now
    pub fn for_document(doc: &Document, record: LogRecord) -> Self {
        Self {
            timestamp: Utc::now(),
            doc_id: doc.id.clone(),
            doc_path: doc.path.clone(),
            lifecycle: doc.lifecycle.clone(),
            record,
        }
    }
}

// ============================================================================
// IRepository trait
// ============================================================================

/// Port trait for one document repository
///
/// ## Implementation Notes
///
/// - `query_log` returns matching entries in ascending position order and
///   at most `query.limit` of them.
/// - `save` compares `doc.change_token` with the stored token, fails with
///   [`RepositoryError::WriteConflict`] on mismatch, and returns the stored
///   document with its token incremented.
/// - `create` fails with [`RepositoryError::WriteConflict`] when a document
///   with the same id exists.
/// - Positions are shared by every repository attached to the same audit
///   service, so `append_log` may be called on any of them.
#[async_trait::async_trait]
pub trait IRepository: Send + Sync {
    /// Name of the repository
    fn name(&self) -> &RepositoryName;

    /// Reads audit entries matching `query`, ascending by position
    async fn query_log(&self, query: &LogQuery) -> Result<Vec<LogEntry>, RepositoryError>;

    /// Greatest committed log position
    async fn last_position(&self) -> Result<LogPosition, RepositoryError>;

    /// Greatest log position whose entry was committed strictly before
    /// `timestamp`
    async fn last_position_before(
        &self,
        timestamp: DateTime<Utc>,
    ) -> Result<LogPosition, RepositoryError>;

    /// Fetches a document as seen by `principal`
    async fn get_document(
        &self,
        id: &DocumentId,
        principal: &Principal,
    ) -> Result<DocumentLookup, RepositoryError>;

    /// Queries documents matching `query`
    async fn query_documents(&self, query: &DocumentQuery)
        -> Result<Vec<Document>, RepositoryError>;

    /// Saves a document under optimistic concurrency
    async fn save(&self, doc: &Document) -> Result<Document, RepositoryError>;

    /// Stores a new document and returns it as stored
    async fn create(&self, doc: &Document) -> Result<Document, RepositoryError>;

    /// Appends an entry to the audit trail and returns its position
    async fn append_log(&self, draft: LogEntryDraft) -> Result<LogPosition, RepositoryError>;

    /// Whether the repository runs on a cluster of nodes
    fn clustering_enabled(&self) -> bool;

    /// Worst-case delay for a write to become visible on every node
    fn clustering_delay(&self) -> Duration;

    /// Granularity of log positions derived from this repository's clock
    fn clock_granularity(&self) -> u64 {
        1
    }
}

// ============================================================================
// RepositoryManager
// ============================================================================

/// Ordered set of the repositories the engine can poll
#[derive(Clone, Default)]
pub struct RepositoryManager {
    repositories: Vec<Arc<dyn IRepository>>,
}

impl RepositoryManager {
    /// Creates an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a repository, replacing any previous one with the same name
    pub fn with_repository(mut self, repository: Arc<dyn IRepository>) -> Self {
        self.insert(repository);
        self
    }

    /// Adds a repository, replacing any previous one with the same name
    pub fn insert(&mut self, repository: Arc<dyn IRepository>) {
        match self
            .repositories
            .iter_mut()
            .find(|r| r.name() == repository.name())
        {
            Some(slot) => *slot = repository,
            None => self.repositories.push(repository),
        }
    }

    /// Looks up a repository by name
    pub fn get(&self, name: &RepositoryName) -> Option<Arc<dyn IRepository>> {
        self.repositories
            .iter()
            .find(|r| r.name() == name)
            .cloned()
    }

    /// Names of the repositories, in insertion order
    pub fn names(&self) -> Vec<RepositoryName> {
        self.repositories.iter().map(|r| r.name().clone()).collect()
    }

    /// Iterates over repositories in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn IRepository>> {
        self.repositories.iter()
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}

impl std::fmt::Debug for RepositoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryManager")
            .field("repositories", &self.names())
            .finish()
    }
}
