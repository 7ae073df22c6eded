//! Domain error types
//!
//! This module defines error types raised when constructing domain values,
//! such as malformed identifiers, paths or file system item ids.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid document identifier
    #[error("Invalid document id: {0}")]
    InvalidDocumentId(String),

    /// Invalid repository name
    #[error("Invalid repository name: {0}")]
    InvalidRepositoryName(String),

    /// Invalid principal name
    #[error("Invalid principal: {0}")]
    InvalidPrincipal(String),

    /// Invalid repository path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid file system item identifier
    #[error("Invalid file system item id: {0}")]
    InvalidItemId(String),

    /// Invalid log position
    #[error("Invalid log position: {0}")]
    InvalidPosition(String),

    /// Unknown audit event name
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidPath("relative/path".to_string());
        assert_eq!(err.to_string(), "Invalid path: relative/path");

        let err = DomainError::InvalidItemId("a#b".to_string());
        assert_eq!(err.to_string(), "Invalid file system item id: a#b");

        let err = DomainError::UnknownEvent("documentExploded".to_string());
        assert_eq!(err.to_string(), "Unknown event: documentExploded");
    }

    #[test]
    fn test_error_equality() {
        let err1 = DomainError::InvalidDocumentId("".to_string());
        let err2 = DomainError::InvalidDocumentId("".to_string());
        let err3 = DomainError::InvalidRepositoryName("".to_string());

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
