//! rootsync Cache - SQLite reference repository
//!
//! SQLite-backed stand-in for the external document repository:
//! - Documents, with their subscriber lists and optimistic change tokens
//! - The audit trail, shared by every repository stored in one database
//! - Authoring helpers that mutate documents and append the audit entries
//!   a repository's audit listener would
//!
//! ## Architecture
//!
//! This crate implements the `IRepository` port from `rootsync-core`
//! using SQLite as the storage backend. It is a driven (secondary) adapter
//! in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Shared store with versioned schema migrations
//! - [`SqliteRepository`] - Full `IRepository` implementation
//! - [`NewDocument`] - Description of a document to create
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use rootsync_cache::DatabasePool;
//! use rootsync_core::config::Config;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::default();
//! let store = DatabasePool::open(&config.store).await?;
//! let repo = store.repository(&config.repositories[0])?;
//! // Use repo as IRepository...
//! # Ok(())
//! # }
//! ```

pub mod authoring;
pub mod pool;
pub mod repository;

pub use authoring::NewDocument;
pub use pool::DatabasePool;
pub use repository::SqliteRepository;

use rootsync_core::ports::RepositoryError;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}

impl From<CacheError> for RepositoryError {
    fn from(e: CacheError) -> Self {
        RepositoryError::Unavailable(e.to_string())
    }
}
