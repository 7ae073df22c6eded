//! Error types for the adapter chain

use rootsync_core::domain::{DocumentId, RepositoryName};
use rootsync_core::ports::RepositoryError;
use thiserror::Error;

/// Errors raised while projecting documents into file system items
///
/// Ineligible documents are not errors: the chain returns `None` for them.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// No enabled synchronization root (or collection root) was found above
    /// the document; the item has nowhere to live on the client tree
    #[error("no synchronization root above document {doc_id} in {repository}")]
    Rootless {
        repository: RepositoryName,
        doc_id: DocumentId,
    },

    /// The repository failed while the chain walked ancestors
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// The chain configuration is unusable
    #[error("invalid adapter configuration: {0}")]
    InvalidConfig(String),
}

impl AdapterError {
    /// Returns true for the rootless condition, which callers skip and log
    pub fn is_rootless(&self) -> bool {
        matches!(self, AdapterError::Rootless { .. })
    }
}
