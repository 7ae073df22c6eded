//! Audit trail entries
//!
//! The repository keeps an append-only audit trail. The change-feed engine
//! reads it through bounded position windows. Two kinds of records exist:
//!
//! - [`LogRecord::Document`]: a plain event about a document. The engine
//!   projects the live document to find out what the client should see.
//! - [`LogRecord::Root`]: a principal registered or unregistered a
//!   synchronization root. Only that principal is concerned.
//! - [`LogRecord::Tombstone`]: a sync tombstone written when the document
//!   may no longer be reachable (removal, security downgrade, move out of
//!   a root, root unregistration). It carries the item id and name that
//!   were resolved while the document was still visible, and optionally
//!   the only principal it concerns.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::LifecycleState;
use super::errors::DomainError;
use super::newtypes::{DocPath, DocumentId, FileSystemItemId, LogPosition, Principal, RepositoryName};

// ============================================================================
// LogCategory
// ============================================================================

/// Category of an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    /// Regular document events
    Document,
    /// Synchronization root management and sync tombstones
    Drive,
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogCategory::Document => write!(f, "document"),
            LogCategory::Drive => write!(f, "drive"),
        }
    }
}

// ============================================================================
// EventKind
// ============================================================================

/// Audit event names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "documentCreated")]
    DocumentCreated,
    #[serde(rename = "documentCreatedByCopy")]
    DocumentCreatedByCopy,
    #[serde(rename = "documentModified")]
    DocumentModified,
    #[serde(rename = "documentMoved")]
    DocumentMoved,
    #[serde(rename = "documentRestored")]
    DocumentRestored,
    #[serde(rename = "documentUntrashed")]
    DocumentUntrashed,
    #[serde(rename = "lifecycle_transition_event")]
    LifecycleTransition,
    #[serde(rename = "documentLocked")]
    DocumentLocked,
    #[serde(rename = "documentUnlocked")]
    DocumentUnlocked,
    #[serde(rename = "documentProxyPublished")]
    DocumentProxyPublished,
    #[serde(rename = "addedToCollection")]
    AddedToCollection,
    #[serde(rename = "deleted")]
    Deleted,
    #[serde(rename = "securityUpdated")]
    SecurityUpdated,
    #[serde(rename = "rootRegistered")]
    RootRegistered,
    #[serde(rename = "rootUnregistered")]
    RootUnregistered,
}

impl EventKind {
    /// Every event kind, in declaration order
    pub const ALL: [EventKind; 15] = [
        EventKind::DocumentCreated,
        EventKind::DocumentCreatedByCopy,
        EventKind::DocumentModified,
        EventKind::DocumentMoved,
        EventKind::DocumentRestored,
        EventKind::DocumentUntrashed,
        EventKind::LifecycleTransition,
        EventKind::DocumentLocked,
        EventKind::DocumentUnlocked,
        EventKind::DocumentProxyPublished,
        EventKind::AddedToCollection,
        EventKind::Deleted,
        EventKind::SecurityUpdated,
        EventKind::RootRegistered,
        EventKind::RootUnregistered,
    ];

    /// Wire name of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::DocumentCreated => "documentCreated",
            EventKind::DocumentCreatedByCopy => "documentCreatedByCopy",
            EventKind::DocumentModified => "documentModified",
            EventKind::DocumentMoved => "documentMoved",
            EventKind::DocumentRestored => "documentRestored",
            EventKind::DocumentUntrashed => "documentUntrashed",
            EventKind::LifecycleTransition => "lifecycle_transition_event",
            EventKind::DocumentLocked => "documentLocked",
            EventKind::DocumentUnlocked => "documentUnlocked",
            EventKind::DocumentProxyPublished => "documentProxyPublished",
            EventKind::AddedToCollection => "addedToCollection",
            EventKind::Deleted => "deleted",
            EventKind::SecurityUpdated => "securityUpdated",
            EventKind::RootRegistered => "rootRegistered",
            EventKind::RootUnregistered => "rootUnregistered",
        }
    }

    /// Returns true for events about document content or placement that
    /// clients must see when they happen under an active root
    pub fn is_content_event(&self) -> bool {
        matches!(
            self,
            EventKind::DocumentCreated
                | EventKind::DocumentCreatedByCopy
                | EventKind::DocumentModified
                | EventKind::DocumentMoved
                | EventKind::DocumentRestored
                | EventKind::DocumentUntrashed
                | EventKind::LifecycleTransition
                | EventKind::DocumentLocked
                | EventKind::DocumentUnlocked
                | EventKind::DocumentProxyPublished
                | EventKind::AddedToCollection
        )
    }

    /// Returns true for root registration events
    pub fn is_root_management(&self) -> bool {
        matches!(self, EventKind::RootRegistered | EventKind::RootUnregistered)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DomainError::UnknownEvent(s.to_string()))
    }
}

// ============================================================================
// LogRecord
// ============================================================================

/// Pre-resolved item information stored on the audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTombstone {
    /// What happened: `deleted`, `securityUpdated` or `documentMoved`
    pub event: EventKind,
    /// Id of the item as the client knew it
    pub item_id: FileSystemItemId,
    /// Name of the item as the client knew it
    pub item_name: String,
    /// When set, only this principal is concerned
    pub impacted_principal: Option<Principal>,
}

/// Payload of an audit entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogRecord {
    /// Plain document event
    Document { event: EventKind },
    /// Registration change of `principal`'s synchronization root
    Root {
        event: EventKind,
        principal: Principal,
    },
    /// Sync tombstone
    Tombstone(SyncTombstone),
}

impl LogRecord {
    /// Event name of the record
    pub fn event(&self) -> EventKind {
        match self {
            LogRecord::Document { event } | LogRecord::Root { event, .. } => *event,
            LogRecord::Tombstone(t) => t.event,
        }
    }

    /// Category the record is filed under
    pub fn category(&self) -> LogCategory {
        match self {
            LogRecord::Document { event } if event.is_root_management() => LogCategory::Drive,
            LogRecord::Document { .. } => LogCategory::Document,
            LogRecord::Root { .. } | LogRecord::Tombstone(_) => LogCategory::Drive,
        }
    }

    /// Principal the record is restricted to, if any
    pub fn impacted_principal(&self) -> Option<&Principal> {
        match self {
            LogRecord::Document { .. } => None,
            LogRecord::Root { principal, .. } => Some(principal),
            LogRecord::Tombstone(t) => t.impacted_principal.as_ref(),
        }
    }
}

// ============================================================================
// LogEntry
// ============================================================================

/// An immutable audit trail entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Strictly increasing position assigned by the audit service
    pub position: LogPosition,
    /// When the event happened
    pub timestamp: DateTime<Utc>,
    pub repository: RepositoryName,
    pub doc_id: DocumentId,
    /// Document path at event time
    pub doc_path: DocPath,
    /// Document lifecycle state at event time
    pub lifecycle: LifecycleState,
    pub record: LogRecord,
}

impl LogEntry {
    /// Event name of the entry
    pub fn event(&self) -> EventKind {
        self.record.event()
    }

    /// Category of the entry
    pub fn category(&self) -> LogCategory {
        self.record.category()
    }

    /// Tombstone carried by the entry, if any
    pub fn tombstone(&self) -> Option<&SyncTombstone> {
        match &self.record {
            LogRecord::Tombstone(t) => Some(t),
            LogRecord::Document { .. } | LogRecord::Root { .. } => None,
        }
    }

    /// Principal the entry is restricted to, if any
    pub fn impacted_principal(&self) -> Option<&Principal> {
        self.record.impacted_principal()
    }

    /// Returns true if the entry belongs to the root-management category
    pub fn is_root_management(&self) -> bool {
        self.category() == LogCategory::Drive
    }
}
