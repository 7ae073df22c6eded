//! Per-request adaptation options

use rootsync_core::domain::Principal;

/// Options of one adaptation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptContext {
    /// Principal the item is built for
    pub principal: Principal,
    /// Adapt trashed documents too
    pub include_deleted: bool,
    /// Treat any document carrying the sync-root facet as a root, and allow
    /// items whose parent cannot be resolved (historical entries)
    pub relax_root_constraint: bool,
    /// Fill lock information on the item
    pub include_lock_info: bool,
}

impl AdaptContext {
    /// Default options for `principal`
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            include_deleted: false,
            relax_root_constraint: false,
            include_lock_info: false,
        }
    }

    pub fn with_deleted(mut self, include_deleted: bool) -> Self {
        self.include_deleted = include_deleted;
        self
    }

    pub fn with_relaxed_roots(mut self, relax: bool) -> Self {
        self.relax_root_constraint = relax;
        self
    }

    pub fn with_lock_info(mut self, include_lock_info: bool) -> Self {
        self.include_lock_info = include_lock_info;
        self
    }
}
