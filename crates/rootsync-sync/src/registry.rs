//! Synchronization root registry
//!
//! The subscriber list stored on documents is the source of truth. The
//! registry derives a per-principal [`RootSet`] from it and keeps it in a
//! concurrent TTL cache; every registration change drops the principal's
//! entry so the next read sees fresh roots.
//!
//! In the user-workspace hierarchy the principal's workspace is a root
//! without registration; it joins every root set and covers its content.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use rootsync_adapter::Hierarchy;
use rootsync_core::config::RegistryConfig;
use rootsync_core::domain::{
    DocPath, Document, DocumentId, Principal, RepositoryName, RepositoryRoots, RootRef, RootSet,
};
use rootsync_core::ports::{
    DocumentLookup, DocumentOrder, DocumentQuery, IRepository, RepositoryManager,
};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::retry::{with_write_retry, RetryPolicy};
use crate::SyncError;

/// Outcome of a registration change
#[derive(Debug, Clone)]
pub struct RootChange {
    /// The document as stored after the call
    pub document: Document,
    /// False when the call was a no-op
    pub changed: bool,
    /// Nested roots of the principal unregistered by this registration
    pub released: Vec<Document>,
}

impl RootChange {
    fn unchanged(document: Document) -> Self {
        Self {
            document,
            changed: false,
            released: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct CachedRoots {
    roots: Arc<RootSet>,
    expires_at: Instant,
}

/// Per-principal synchronization roots with a bounded TTL cache
pub struct SyncRootRegistry {
    repositories: RepositoryManager,
    cache: DashMap<Principal, CachedRoots>,
    ttl: Duration,
    max_entries: usize,
    retry: RetryPolicy,
    hierarchy: Hierarchy,
}

impl SyncRootRegistry {
    pub fn new(repositories: RepositoryManager, config: &RegistryConfig) -> Self {
        Self {
            repositories,
            cache: DashMap::new(),
            ttl: Duration::from_secs(config.cache_ttl_secs),
            max_entries: config.cache_max_entries.max(1),
            retry: RetryPolicy::from_config(config),
            hierarchy: Hierarchy::Flat,
        }
    }

    /// Uses the implicit roots of `hierarchy`
    pub fn with_hierarchy(mut self, hierarchy: Hierarchy) -> Self {
        self.hierarchy = hierarchy;
        self
    }

    pub fn repositories(&self) -> &RepositoryManager {
        &self.repositories
    }

    fn repository(&self, name: &RepositoryName) -> Result<Arc<dyn IRepository>, SyncError> {
        self.repositories
            .get(name)
            .ok_or_else(|| SyncError::UnknownRepository(name.clone()))
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Active roots of `principal` across every repository
    ///
    /// Served from the cache while fresh. A failing repository query fails
    /// the call and leaves the cache as it was.
    pub async fn root_set(&self, principal: &Principal) -> Result<Arc<RootSet>, SyncError> {
        if let Some(entry) = self.cache.get(principal) {
            if entry.expires_at > Instant::now() {
                return Ok(entry.roots.clone());
            }
        }

        let roots = Arc::new(self.compute_roots(principal).await?);
        self.store(principal.clone(), roots.clone());
        Ok(roots)
    }

    /// Active roots of `principal` in one repository
    pub async fn list_roots(
        &self,
        principal: &Principal,
        repository: &RepositoryName,
    ) -> Result<RepositoryRoots, SyncError> {
        Ok(self.root_set(principal).await?.in_repository(repository))
    }

    /// Returns true if `doc` is an active root of `principal`
    pub async fn is_root(&self, principal: &Principal, doc: &Document) -> Result<bool, SyncError> {
        Ok(self.root_set(principal).await?.is_root(&doc.repository, &doc.id))
    }

    async fn compute_roots(&self, principal: &Principal) -> Result<RootSet, SyncError> {
        let mut set = RootSet::empty(principal.clone());
        let query = DocumentQuery::new(principal.clone())
            .with_subscriber(principal.clone())
            .ordered_by(DocumentOrder::TitleThenCreatedDesc);

        let workspace = self.hierarchy.implicit_root_path(principal);

        for repo in self.repositories.iter() {
            let mut roots = RepositoryRoots::default();
            if let Some(path) = &workspace {
                if let Some(doc) = self.find_at(repo.as_ref(), principal, path).await? {
                    roots.roots.push(RootRef {
                        id: doc.id,
                        path: doc.path,
                        is_collection: false,
                    });
                }
            }
            for doc in repo.query_documents(&query).await? {
                if roots.contains_root(&doc.id) {
                    continue;
                }
                if !doc.is_enabled_root_for(principal) {
                    continue;
                }
                if doc.is_collection() {
                    let members = DocumentQuery::new(principal.clone()).with_collection(doc.id.clone());
                    for member in repo.query_documents(&members).await? {
                        roots.collection_members.insert(member.id);
                    }
                }
                roots.roots.push(RootRef {
                    id: doc.id.clone(),
                    path: doc.path.clone(),
                    is_collection: doc.is_collection(),
                });
            }
            if !roots.is_empty() {
                set.repositories.insert(repo.name().clone(), roots);
            }
        }

        debug!(
            principal = %principal,
            repositories = set.repositories.len(),
            "Computed synchronization roots"
        );
        Ok(set)
    }

    async fn find_at(
        &self,
        repo: &dyn IRepository,
        principal: &Principal,
        path: &DocPath,
    ) -> Result<Option<Document>, SyncError> {
        let query = DocumentQuery::new(principal.clone()).with_path_prefix(path.clone());
        Ok(repo
            .query_documents(&query)
            .await?
            .into_iter()
            .find(|doc| &doc.path == path && !doc.is_collection()))
    }

    fn store(&self, principal: Principal, roots: Arc<RootSet>) {
        if self.cache.len() >= self.max_entries && !self.cache.contains_key(&principal) {
            self.evict();
        }
        self.cache.insert(
            principal,
            CachedRoots {
                roots,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drops expired entries, then the one closest to expiry if still full
    fn evict(&self) {
        let now = Instant::now();
        self.cache.retain(|_, entry| entry.expires_at > now);
        if self.cache.len() < self.max_entries {
            return;
        }
        let oldest = self
            .cache
            .iter()
            .min_by_key(|entry| entry.expires_at)
            .map(|entry| entry.key().clone());
        if let Some(principal) = oldest {
            self.cache.remove(&principal);
        }
    }

    /// Drops the cached roots of `principal`
    pub fn invalidate(&self, principal: &Principal) {
        if self.cache.remove(principal).is_some() {
            debug!(principal = %principal, "Invalidated root cache entry");
        }
    }

    /// Drops every cached root set
    pub fn invalidate_all(&self) {
        self.cache.clear();
        debug!("Invalidated root cache");
    }

    /// Number of cached root sets
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Registers `doc_id` as a synchronization root of `principal`
    ///
    /// No-op when the document already is an active root, or is a folder
    /// lying below a folder root or inside the principal's implicit
    /// workspace root. Folder roots of the principal nested below
    /// the document are unregistered and returned in
    /// [`RootChange::released`]; collection roots are kept.
    pub async fn register(
        &self,
        principal: &Principal,
        repository: &RepositoryName,
        doc_id: &DocumentId,
    ) -> Result<RootChange, SyncError> {
        let repo = self.repository(repository)?;
        let repo = repo.as_ref();

        let change = with_write_retry(&self.retry, "register_root", doc_id, move || {
            self.try_register(repo, principal, doc_id)
        })
        .await?;
        if !change.changed {
            return Ok(change);
        }

        let mut released = Vec::new();
        for nested in self.nested_roots(repo, principal, &change.document).await? {
            let nested_id = &nested.id;
            let change = with_write_retry(&self.retry, "release_nested_root", nested_id, move || {
                self.try_unregister(repo, principal, nested_id)
            })
            .await?;
            if change.changed {
                released.push(change.document);
            }
        }

        self.invalidate(principal);
        info!(
            principal = %principal,
            repository = %repository,
            doc_id = %doc_id,
            released = released.len(),
            "Registered synchronization root"
        );
        Ok(RootChange { released, ..change })
    }

    /// Unregisters `doc_id` as a synchronization root of `principal`
    ///
    /// No-op when the document is not an active root of the principal.
    pub async fn unregister(
        &self,
        principal: &Principal,
        repository: &RepositoryName,
        doc_id: &DocumentId,
    ) -> Result<RootChange, SyncError> {
        let repo = self.repository(repository)?;
        let repo = repo.as_ref();

        let change = with_write_retry(&self.retry, "unregister_root", doc_id, move || {
            self.try_unregister(repo, principal, doc_id)
        })
        .await?;
        if change.changed {
            self.invalidate(principal);
            info!(
                principal = %principal,
                repository = %repository,
                doc_id = %doc_id,
                "Unregistered synchronization root"
            );
        }
        Ok(change)
    }

    async fn fetch(
        &self,
        repo: &dyn IRepository,
        principal: &Principal,
        doc_id: &DocumentId,
    ) -> Result<Document, SyncError> {
        match repo.get_document(doc_id, principal).await? {
            DocumentLookup::Found(doc) => Ok(*doc),
            DocumentLookup::NotFound => Err(SyncError::NotFound(doc_id.to_string())),
            DocumentLookup::AccessDenied => Err(SyncError::AccessDenied(doc_id.to_string())),
        }
    }

    /// Enabled roots of `principal` in `repo`, read from the repository
    async fn current_roots(
        &self,
        repo: &dyn IRepository,
        principal: &Principal,
    ) -> Result<Vec<Document>, SyncError> {
        let query = DocumentQuery::new(principal.clone()).with_subscriber(principal.clone());
        let mut roots = repo.query_documents(&query).await?;
        roots.retain(|doc| doc.is_enabled_root_for(principal));
        Ok(roots)
    }

    async fn try_register(
        &self,
        repo: &dyn IRepository,
        principal: &Principal,
        doc_id: &DocumentId,
    ) -> Result<RootChange, SyncError> {
        let mut doc = self.fetch(repo, principal, doc_id).await?;
        if !doc.is_folderish() && !doc.is_collection() {
            return Err(SyncError::NotFolderish(doc.id));
        }
        if doc.is_deleted() {
            return Err(SyncError::InvalidArgument(format!(
                "document {} is in the trash",
                doc.id
            )));
        }
        if doc.is_enabled_root_for(principal) {
            debug!(principal = %principal, doc_id = %doc.id, "Already a synchronization root");
            return Ok(RootChange::unchanged(doc));
        }

        // Collections expose members, not a subtree: a folder root above
        // them does not cover them
        let covered = !doc.is_collection()
            && self
                .current_roots(repo, principal)
                .await?
                .iter()
                .any(|root| !root.is_collection() && root.path.is_ancestor_of(&doc.path));
        let implicit = !doc.is_collection()
            && self
                .hierarchy
                .implicit_root_path(principal)
                .is_some_and(|ws| ws.contains(&doc.path));
        if covered || implicit {
            debug!(principal = %principal, doc_id = %doc.id, "Already below a synchronization root");
            return Ok(RootChange::unchanged(doc));
        }

        doc.subscribe(principal, Utc::now());
        let saved = repo.save(&doc).await?;
        Ok(RootChange {
            document: saved,
            changed: true,
            released: Vec::new(),
        })
    }

    async fn try_unregister(
        &self,
        repo: &dyn IRepository,
        principal: &Principal,
        doc_id: &DocumentId,
    ) -> Result<RootChange, SyncError> {
        let mut doc = self.fetch(repo, principal, doc_id).await?;
        if !doc.unsubscribe(principal) {
            debug!(principal = %principal, doc_id = %doc.id, "Not a synchronization root");
            return Ok(RootChange::unchanged(doc));
        }
        let saved = repo.save(&doc).await?;
        Ok(RootChange {
            document: saved,
            changed: true,
            released: Vec::new(),
        })
    }

    async fn nested_roots(
        &self,
        repo: &dyn IRepository,
        principal: &Principal,
        root: &Document,
    ) -> Result<Vec<Document>, SyncError> {
        if root.is_collection() {
            return Ok(Vec::new());
        }
        let mut nested = self.current_roots(repo, principal).await?;
        nested.retain(|doc| {
            doc.id != root.id && !doc.is_collection() && root.path.is_ancestor_of(&doc.path)
        });
        Ok(nested)
    }
}

impl std::fmt::Debug for SyncRootRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRootRegistry")
            .field("repositories", &self.repositories)
            .field("cached_entries", &self.cache.len())
            .field("ttl", &self.ttl)
            .field("max_entries", &self.max_entries)
            .field("hierarchy", &self.hierarchy.kind())
            .finish()
    }
}
