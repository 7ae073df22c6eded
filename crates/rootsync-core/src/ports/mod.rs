//! Port definitions (hexagonal architecture interfaces)
//!
//! The change-feed engine depends on a single driven port: the document
//! repository with its audit trail. Implementations live in adapter crates
//! (`rootsync-cache` ships a SQLite one).
//!
//! ## Ports Overview
//!
//! - [`IRepository`] - Documents, optimistic writes and the audit trail

pub mod repository;

pub use repository::{
    DocumentLookup, DocumentOrder, DocumentQuery, IRepository, LogEntryDraft, LogQuery,
    RepositoryError, RepositoryManager,
};
