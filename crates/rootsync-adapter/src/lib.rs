//! rootsync Adapter - Projection of documents into file system items
//!
//! Provides:
//! - `AdapterChain`: priority-ordered `(binding, adapter)` pairs built once
//!   from configuration, with parent resolution, lookup by id and child
//!   listing
//! - `FileSystemItemAdapter`: the adapter trait, with the top-level folder,
//!   sync root, collection root and default item adapters
//! - `Hierarchy`: where roots show up below the top-level folder (flat,
//!   user workspace or permission based)
//! - `AdaptContext`: per-request options (deleted items, relaxed roots,
//!   lock information)

pub mod adapters;
pub mod binding;
pub mod chain;
pub mod context;
pub mod error;
pub mod hierarchy;

#[cfg(test)]
mod testing;

pub use adapters::{
    CollectionSyncRootAdapter, DefaultItemAdapter, FileSystemItemAdapter, ParentKind,
    SyncRootFolderAdapter, TopLevelFolder,
};
pub use binding::Binding;
pub use chain::{AdapterChain, AdapterChainBuilder};
pub use context::AdaptContext;
pub use error::AdapterError;
pub use hierarchy::{Hierarchy, VirtualFolder};
