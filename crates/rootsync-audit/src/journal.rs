//! JournalLogger - writes synchronization events into the audit trail
//!
//! Wraps `IRepository::append_log()` with convenience methods for each
//! synchronization event the change feed relies on. Entries are appended to
//! the repository owning the document. Every method reports its failure:
//! a lost root-management entry or tombstone would hide the change from
//! clients for good, so callers decide whether to fail or to carry on with
//! a warning.

use rootsync_core::domain::{
    Document, EventKind, FileSystemItemId, LogPosition, LogRecord, Principal, SyncTombstone,
};
use rootsync_core::ports::{LogEntryDraft, RepositoryError, RepositoryManager};

/// High-level journal over the repositories' audit trails.
#[derive(Debug, Clone)]
pub struct JournalLogger {
    repositories: RepositoryManager,
}

impl JournalLogger {
    /// Creates a new `JournalLogger` writing to the given repositories.
    pub fn new(repositories: RepositoryManager) -> Self {
        Self { repositories }
    }

    /// Append an entry for `doc` to the trail of its repository.
    async fn append(&self, doc: &Document, record: LogRecord) -> Result<LogPosition, RepositoryError> {
        let event = record.event();
        let Some(repo) = self.repositories.get(&doc.repository) else {
            return Err(RepositoryError::Unavailable(format!(
                "no repository '{}' to journal {} into",
                doc.repository, event
            )));
        };
        match repo.append_log(LogEntryDraft::for_document(doc, record)).await {
            Ok(position) => {
                tracing::debug!(
                    doc_id = %doc.id,
                    event = %event,
                    position = %position,
                    "Journaled audit entry"
                );
                Ok(position)
            }
            Err(e) => {
                tracing::warn!(error = %e, doc_id = %doc.id, event = %event, "Failed to journal audit entry");
                Err(e)
            }
        }
    }

    /// Log a plain document event, as the repository's audit listener would.
    pub async fn log_document_event(
        &self,
        doc: &Document,
        event: EventKind,
    ) -> Result<LogPosition, RepositoryError> {
        self.append(doc, LogRecord::Document { event }).await
    }

    // ========================================================================
    // Root management
    // ========================================================================

    /// Log that `principal` registered `doc` as a synchronization root.
    pub async fn log_root_registered(
        &self,
        doc: &Document,
        principal: &Principal,
    ) -> Result<LogPosition, RepositoryError> {
        let record = LogRecord::Root {
            event: EventKind::RootRegistered,
            principal: principal.clone(),
        };
        self.append(doc, record).await
    }

    /// Log that `principal` unregistered `doc`.
    pub async fn log_root_unregistered(
        &self,
        doc: &Document,
        principal: &Principal,
    ) -> Result<LogPosition, RepositoryError> {
        let record = LogRecord::Root {
            event: EventKind::RootUnregistered,
            principal: principal.clone(),
        };
        self.append(doc, record).await
    }

    // ========================================================================
    // Tombstones
    // ========================================================================

    /// Log a sync tombstone for the item the client knows as
    /// `item_id`/`item_name`.
    pub async fn log_tombstone(
        &self,
        doc: &Document,
        event: EventKind,
        item_id: FileSystemItemId,
        item_name: impl Into<String>,
        impacted_principal: Option<Principal>,
    ) -> Result<LogPosition, RepositoryError> {
        let record = LogRecord::Tombstone(SyncTombstone {
            event,
            item_id,
            item_name: item_name.into(),
            impacted_principal,
        });
        self.append(doc, record).await
    }

    /// Log the deletion of an item, for one principal or for everyone.
    pub async fn log_deleted(
        &self,
        doc: &Document,
        item_id: FileSystemItemId,
        item_name: impl Into<String>,
        impacted_principal: Option<Principal>,
    ) -> Result<LogPosition, RepositoryError> {
        self.log_tombstone(doc, EventKind::Deleted, item_id, item_name, impacted_principal)
            .await
    }

    /// Log that an item may have become invisible after a permission change.
    pub async fn log_security_updated(
        &self,
        doc: &Document,
        item_id: FileSystemItemId,
        item_name: impl Into<String>,
    ) -> Result<LogPosition, RepositoryError> {
        self.log_tombstone(doc, EventKind::SecurityUpdated, item_id, item_name, None)
            .await
    }

    /// Log a move, carrying the item id from before the move.
    pub async fn log_moved(
        &self,
        doc: &Document,
        item_id: FileSystemItemId,
        item_name: impl Into<String>,
    ) -> Result<LogPosition, RepositoryError> {
        self.log_tombstone(doc, EventKind::DocumentMoved, item_id, item_name, None)
            .await
    }
}
