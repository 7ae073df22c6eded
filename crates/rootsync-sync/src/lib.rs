//! rootsync Sync - Change-feed engine
//!
//! Provides:
//! - Per-principal synchronization root registry with a TTL cache
//! - Audit trail scanning over bounded log-position windows
//! - Multi-repository change summaries with a resumable cursor
//! - The `DriveService` facade exposing the caller operations
//!
//! ## Modules
//!
//! - [`registry`] - Root registration, listing and caching
//! - [`scanner`] - Single-repository window scan
//! - [`summary`] - Merging scans into a change summary
//! - [`service`] - Facade wiring registry, scanner, adapters and journal
//! - [`collections`] - The per-principal "Locally Edited" collection
//! - [`retry`] - Bounded exponential backoff on write conflicts

pub mod collections;
pub mod registry;
pub mod retry;
pub mod scanner;
pub mod service;
pub mod summary;

#[cfg(test)]
mod testing;

use std::time::Duration;

use rootsync_adapter::AdapterError;
use rootsync_core::domain::{DocumentId, RepositoryName};
use rootsync_core::ports::RepositoryError;
use thiserror::Error;

pub use collections::LocallyEditedCollections;
pub use registry::{RootChange, SyncRootRegistry};
pub use retry::RetryPolicy;
pub use scanner::{ChangeFeedScanner, ScanOutcome};
pub use service::{DriveService, LocallyEdited};
pub use summary::ChangeSummaryBuilder;

/// Errors that can occur in change-feed operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// The repository failed; the poll must be repeated with the same cursor
    #[error("Repository unavailable: {0}")]
    RepositoryUnavailable(String),

    /// Registration kept losing optimistic concurrency races
    #[error("Write conflict on {doc_id} persisted after {attempts} attempts")]
    TransientWriteConflict { doc_id: DocumentId, attempts: u32 },

    /// The targeted document does not exist
    #[error("Document not found: {0}")]
    NotFound(String),

    /// The principal may not read or write the targeted document
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Only folders and collections can be synchronization roots
    #[error("Document {0} cannot be a synchronization root")]
    NotFolderish(DocumentId),

    /// No repository with this name is attached
    #[error("Unknown repository: {0}")]
    UnknownRepository(RepositoryName),

    /// Caller supplied an unusable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The poll exceeded its time budget and was abandoned
    #[error("Poll timed out after {0:?}")]
    Timeout(Duration),

    /// The adapter chain could not be built or used
    #[error("Adapter error: {0}")]
    Adapter(String),
}

impl SyncError {
    /// Returns true if repeating the call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::TransientWriteConflict { .. }
                | SyncError::RepositoryUnavailable(_)
                | SyncError::Timeout(_)
        )
    }
}

impl From<RepositoryError> for SyncError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(id) => SyncError::NotFound(id),
            RepositoryError::AccessDenied(id) => SyncError::AccessDenied(id),
            RepositoryError::WriteConflict { doc_id, .. } => SyncError::TransientWriteConflict {
                doc_id,
                attempts: 1,
            },
            RepositoryError::Unavailable(msg) => SyncError::RepositoryUnavailable(msg),
        }
    }
}

impl From<AdapterError> for SyncError {
    fn from(e: AdapterError) -> Self {
        match e {
            AdapterError::Repository(e) => e.into(),
            other => SyncError::Adapter(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        let doc_id = DocumentId::new("42".to_string()).unwrap();
        assert!(SyncError::TransientWriteConflict {
            doc_id: doc_id.clone(),
            attempts: 3
        }
        .is_retryable());
        assert!(SyncError::RepositoryUnavailable("down".to_string()).is_retryable());
        assert!(SyncError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!SyncError::NotFolderish(doc_id).is_retryable());
        assert!(!SyncError::NotFound("42".to_string()).is_retryable());
    }

    #[test]
    fn test_repository_errors_map_to_taxonomy() {
        let err: SyncError = RepositoryError::Unavailable("disk".to_string()).into();
        assert!(matches!(err, SyncError::RepositoryUnavailable(_)));

        let err: SyncError = AdapterError::Repository(RepositoryError::AccessDenied(
            "42".to_string(),
        ))
        .into();
        assert!(matches!(err, SyncError::AccessDenied(_)));

        let err: SyncError = AdapterError::InvalidConfig("empty".to_string()).into();
        assert!(matches!(err, SyncError::Adapter(_)));
    }
}
