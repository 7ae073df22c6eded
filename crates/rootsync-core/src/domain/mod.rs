//! Domain entities
//!
//! This module contains the core domain types for rootsync:
//! - Newtypes for identifiers, paths and log positions
//! - Repository documents as seen by the engine
//! - Audit trail entries, including sync tombstones
//! - File system items (the client-facing projection of documents)
//! - Changes and change summaries delivered to polling clients
//! - Synchronization root sets
//! - Domain-specific error types

pub mod change;
pub mod document;
pub mod errors;
pub mod item;
pub mod log_entry;
pub mod newtypes;
pub mod roots;

// Re-export commonly used types
pub use change::{ChangeKind, ChangeSummary, FileSystemItemChange, SummaryStatus};
pub use document::{facets, Blob, Document, LifecycleState, LockInfo, Subscription};
pub use errors::DomainError;
pub use item::{FileSystemItem, ItemKind};
pub use log_entry::{EventKind, LogCategory, LogEntry, LogRecord, SyncTombstone};
pub use newtypes::*;
pub use roots::{RepositoryRoots, RootRef, RootSet};
