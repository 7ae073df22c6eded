//! Changes and change summaries delivered to polling clients

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::item::FileSystemItem;
use super::log_entry::EventKind;
use super::newtypes::{DocumentId, FileSystemItemId, LogPosition, RepositoryName};

// ============================================================================
// ChangeKind
// ============================================================================

/// What a client has to do with an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Created,
    Modified,
    Moved,
    Deleted,
    SecurityUpdated,
    RootRegistered,
    RootUnregistered,
}

impl ChangeKind {
    /// Maps an audit event to the change clients receive
    pub fn from_event(event: EventKind) -> Self {
        match event {
            EventKind::DocumentCreated
            | EventKind::DocumentCreatedByCopy
            | EventKind::DocumentProxyPublished
            | EventKind::AddedToCollection => ChangeKind::Created,
            EventKind::DocumentModified
            | EventKind::DocumentRestored
            | EventKind::DocumentUntrashed
            | EventKind::LifecycleTransition
            | EventKind::DocumentLocked
            | EventKind::DocumentUnlocked => ChangeKind::Modified,
            EventKind::DocumentMoved => ChangeKind::Moved,
            EventKind::Deleted => ChangeKind::Deleted,
            EventKind::SecurityUpdated => ChangeKind::SecurityUpdated,
            EventKind::RootRegistered => ChangeKind::RootRegistered,
            EventKind::RootUnregistered => ChangeKind::RootUnregistered,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Moved => "moved",
            ChangeKind::Deleted => "deleted",
            ChangeKind::SecurityUpdated => "securityUpdated",
            ChangeKind::RootRegistered => "rootRegistered",
            ChangeKind::RootUnregistered => "rootUnregistered",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// FileSystemItemChange
// ============================================================================

/// A single change of a file system item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystemItemChange {
    pub kind: ChangeKind,
    /// Audit event the change was derived from
    pub event: EventKind,
    /// Position of the audit entry
    pub position: LogPosition,
    pub timestamp: DateTime<Utc>,
    pub repository: RepositoryName,
    pub doc_id: DocumentId,
    pub item_id: FileSystemItemId,
    pub item_name: String,
    /// Full item, absent for deletions and tombstones
    pub item: Option<FileSystemItem>,
}

impl FileSystemItemChange {
    /// Builds a change from a live item
    pub fn from_item(
        event: EventKind,
        position: LogPosition,
        timestamp: DateTime<Utc>,
        repository: RepositoryName,
        doc_id: DocumentId,
        item: FileSystemItem,
    ) -> Self {
        Self {
            kind: ChangeKind::from_event(event),
            event,
            position,
            timestamp,
            repository,
            doc_id,
            item_id: item.id.clone(),
            item_name: item.name.clone(),
            item: Some(item),
        }
    }

    /// Key clients deduplicate on: `(item id, kind, timestamp)`
    pub fn dedup_key(&self) -> (&FileSystemItemId, ChangeKind, DateTime<Utc>) {
        (&self.item_id, self.kind, self.timestamp)
    }
}

// ============================================================================
// ChangeSummary
// ============================================================================

/// Outcome of a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStatus {
    FoundChanges,
    NoChanges,
    /// The window held too many entries; the client must rescan its tree
    TooManyChanges,
}

impl fmt::Display for SummaryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryStatus::FoundChanges => write!(f, "found_changes"),
            SummaryStatus::NoChanges => write!(f, "no_changes"),
            SummaryStatus::TooManyChanges => write!(f, "too_many_changes"),
        }
    }
}

/// Client-facing summary of one poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub changes: Vec<FileSystemItemChange>,
    pub status: SummaryStatus,
    /// Cursor the client sends back as `lower_bound` on its next poll
    pub next_lower_bound: LogPosition,
    /// Upper bound of the scanned window
    pub upper_bound: LogPosition,
    /// Paths of the active roots, as `repository:path`
    pub active_root_paths: Vec<String>,
}

impl ChangeSummary {
    /// Returns true if the client must fall back to a full rescan
    pub fn has_too_many_changes(&self) -> bool {
        self.status == SummaryStatus::TooManyChanges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_kind_mapping() {
        assert_eq!(
            ChangeKind::from_event(EventKind::DocumentCreatedByCopy),
            ChangeKind::Created
        );
        assert_eq!(
            ChangeKind::from_event(EventKind::DocumentLocked),
            ChangeKind::Modified
        );
        assert_eq!(ChangeKind::from_event(EventKind::DocumentMoved), ChangeKind::Moved);
        assert_eq!(ChangeKind::from_event(EventKind::Deleted), ChangeKind::Deleted);
        assert_eq!(
            ChangeKind::from_event(EventKind::RootRegistered),
            ChangeKind::RootRegistered
        );
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&SummaryStatus::TooManyChanges).unwrap();
        assert_eq!(json, "\"too_many_changes\"");
        assert_eq!(SummaryStatus::NoChanges.to_string(), "no_changes");
    }
}
