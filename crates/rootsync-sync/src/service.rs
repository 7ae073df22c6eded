//! Drive service
//!
//! The facade polling clients and repository listeners talk to. It wires
//! the root registry, the adapter chain, the summary builder and the
//! journal, and journals every registration change so that other devices
//! of the principal learn about it through the change feed.

use std::sync::Arc;
use std::time::Duration;

use rootsync_adapter::{AdaptContext, AdapterChain};
use rootsync_audit::JournalLogger;
use rootsync_core::config::Config;
use rootsync_core::domain::{
    ChangeSummary, Document, DocumentId, EventKind, FileSystemItem, FileSystemItemId, LogPosition,
    Principal, RepositoryName, RootSet,
};
use rootsync_core::ports::{IRepository, RepositoryError, RepositoryManager};
use tracing::{debug, error, info, warn};

use crate::collections::LocallyEditedCollections;
use crate::registry::{RootChange, SyncRootRegistry};
use crate::retry::RetryPolicy;
use crate::scanner::ChangeFeedScanner;
use crate::summary::ChangeSummaryBuilder;
use crate::SyncError;

/// Outcome of [`DriveService::add_to_locally_edited`]
#[derive(Debug, Clone)]
pub struct LocallyEdited {
    pub collection: Document,
    pub member: Document,
    /// The collection did not exist before the call
    pub created: bool,
    /// Registration of the collection as a synchronization root
    pub root: RootChange,
}

/// Caller-facing change-feed operations
#[derive(Debug, Clone)]
pub struct DriveService {
    repositories: RepositoryManager,
    chain: Arc<AdapterChain>,
    registry: Arc<SyncRootRegistry>,
    summaries: ChangeSummaryBuilder,
    journal: JournalLogger,
    collections: LocallyEditedCollections,
    default_limit: usize,
    poll_timeout: Option<Duration>,
}

impl DriveService {
    pub fn new(repositories: RepositoryManager, chain: AdapterChain, config: &Config) -> Self {
        let chain = Arc::new(chain);
        let registry = Arc::new(
            SyncRootRegistry::new(repositories.clone(), &config.registry)
                .with_hierarchy(chain.hierarchy().clone()),
        );
        let scanner = ChangeFeedScanner::new(registry.clone(), chain.clone());
        Self {
            summaries: ChangeSummaryBuilder::new(registry.clone(), scanner),
            journal: JournalLogger::new(repositories.clone()),
            collections: LocallyEditedCollections::new(
                &config.collections,
                RetryPolicy::from_config(&config.registry),
            ),
            repositories,
            chain,
            registry,
            default_limit: config.changes.default_limit,
            poll_timeout: config.poll_timeout(),
        }
    }

    /// Builds the service with the adapter chain described by `config`
    pub fn from_config(repositories: RepositoryManager, config: &Config) -> Result<Self, SyncError> {
        let chain = AdapterChain::from_config(&config.adapters)?;
        Ok(Self::new(repositories, chain, config))
    }

    pub fn registry(&self) -> &SyncRootRegistry {
        &self.registry
    }

    pub fn chain(&self) -> &AdapterChain {
        &self.chain
    }

    pub fn repositories(&self) -> &RepositoryManager {
        &self.repositories
    }

    // ========================================================================
    // Roots
    // ========================================================================

    /// Registers a synchronization root and journals the change
    ///
    /// When the journal rejects an entry, the registration is rolled back
    /// and the journal error is returned: a root that other devices never
    /// hear about must not stay registered.
    pub async fn register_root(
        &self,
        principal: &Principal,
        repository: &RepositoryName,
        doc_id: &DocumentId,
    ) -> Result<RootChange, SyncError> {
        let change = self.registry.register(principal, repository, doc_id).await?;
        if !change.changed {
            return Ok(change);
        }
        if let Err(e) = self.journal_registration(principal, &change).await {
            warn!(
                error = %e,
                principal = %principal,
                doc_id = %doc_id,
                "Journaling failed, rolling back registration"
            );
            self.rollback_registration(principal, repository, &change).await;
            return Err(e);
        }
        Ok(change)
    }

    async fn journal_registration(
        &self,
        principal: &Principal,
        change: &RootChange,
    ) -> Result<(), SyncError> {
        self.journal
            .log_root_registered(&change.document, principal)
            .await?;
        for released in &change.released {
            self.journal_unregistration(principal, released).await?;
        }
        Ok(())
    }

    async fn rollback_registration(
        &self,
        principal: &Principal,
        repository: &RepositoryName,
        change: &RootChange,
    ) {
        let mut restore = vec![(&change.document.id, false)];
        restore.extend(change.released.iter().map(|doc| (&doc.id, true)));
        for (doc_id, register) in restore {
            let undone = if register {
                self.registry.register(principal, repository, doc_id).await
            } else {
                self.registry.unregister(principal, repository, doc_id).await
            };
            if let Err(e) = undone {
                warn!(error = %e, doc_id = %doc_id, "Failed to roll back root change");
            }
        }
    }

    /// Unregisters a synchronization root and journals the change
    ///
    /// Besides the plain unregistration entry, a deletion tombstone for the
    /// root item is written so the principal's clients drop the folder.
    /// Journal failures restore the root and are returned.
    pub async fn unregister_root(
        &self,
        principal: &Principal,
        repository: &RepositoryName,
        doc_id: &DocumentId,
    ) -> Result<RootChange, SyncError> {
        let change = self.registry.unregister(principal, repository, doc_id).await?;
        if !change.changed {
            return Ok(change);
        }
        if let Err(e) = self.journal_unregistration(principal, &change.document).await {
            warn!(
                error = %e,
                principal = %principal,
                doc_id = %doc_id,
                "Journaling failed, restoring root"
            );
            if let Err(restore) = self.registry.register(principal, repository, doc_id).await {
                warn!(error = %restore, doc_id = %doc_id, "Failed to restore root");
            }
            return Err(e);
        }
        Ok(change)
    }

    async fn journal_unregistration(
        &self,
        principal: &Principal,
        doc: &Document,
    ) -> Result<(), SyncError> {
        self.journal.log_root_unregistered(doc, principal).await?;
        // The subscription is gone: the root item only adapts with relaxed roots
        let ctx = AdaptContext::new(principal.clone())
            .with_relaxed_roots(true)
            .with_deleted(true);
        let item = self.adapt(doc, &ctx).await.ok_or_else(|| {
            SyncError::Adapter(format!("unregistered root {} does not adapt", doc.id))
        })?;
        self.journal
            .log_deleted(doc, item.id, item.name, Some(principal.clone()))
            .await?;
        Ok(())
    }

    /// Adds a document to the principal's "Locally Edited" collection
    ///
    /// The collection is created on first use and (re-)registered as a
    /// synchronization root on every call, so unregistering it only lasts
    /// until the next file is opened for edition.
    pub async fn add_to_locally_edited(
        &self,
        principal: &Principal,
        repository: &RepositoryName,
        doc_id: &DocumentId,
    ) -> Result<LocallyEdited, SyncError> {
        let repo = self
            .repositories
            .get(repository)
            .ok_or_else(|| SyncError::UnknownRepository(repository.clone()))?;
        let (collection, created) = self
            .collections
            .find_or_create(repo.as_ref(), principal)
            .await?;
        if created {
            self.journal
                .log_document_event(&collection, EventKind::DocumentCreated)
                .await?;
        }
        let (member, _) = self
            .collections
            .add_member(repo.as_ref(), principal, &collection, doc_id)
            .await?;

        let root = self.register_root(principal, repository, &collection.id).await?;
        // Collection members are part of the cached root set
        self.registry.invalidate(principal);
        // Journaled even for existing members: a call retried after a
        // journal failure must still reach the clients
        self.journal
            .log_document_event(&member, EventKind::AddedToCollection)
            .await?;

        info!(
            principal = %principal,
            repository = %repository,
            doc_id = %doc_id,
            collection_id = %collection.id,
            created,
            "Added to locally edited collection"
        );
        Ok(LocallyEdited {
            collection: root.document.clone(),
            member,
            created,
            root,
        })
    }

    /// Active roots of `principal` across repositories
    pub async fn roots(&self, principal: &Principal) -> Result<Arc<RootSet>, SyncError> {
        self.registry.root_set(principal).await
    }

    // ========================================================================
    // Polling
    // ========================================================================

    /// Changes visible to `principal` after `lower_bound`
    ///
    /// An empty `repositories` slice polls every attached repository.
    /// Without `limit`, the configured default applies.
    pub async fn get_change_summary(
        &self,
        principal: &Principal,
        repositories: &[RepositoryName],
        lower_bound: LogPosition,
        limit: Option<usize>,
    ) -> Result<ChangeSummary, SyncError> {
        let limit = limit.unwrap_or(self.default_limit);
        if limit == 0 {
            return Err(SyncError::InvalidArgument("limit must be positive".to_string()));
        }
        let repos: Vec<Arc<dyn IRepository>> = if repositories.is_empty() {
            self.repositories.iter().cloned().collect()
        } else {
            repositories
                .iter()
                .map(|name| {
                    self.repositories
                        .get(name)
                        .ok_or_else(|| SyncError::UnknownRepository(name.clone()))
                })
                .collect::<Result<_, _>>()?
        };

        let summary = self
            .summaries
            .get_change_summary(principal, &repos, lower_bound, limit);
        match self.poll_timeout {
            Some(timeout) => tokio::time::timeout(timeout, summary)
                .await
                .map_err(|_| {
                    warn!(
                        principal = %principal,
                        lower_bound = %lower_bound,
                        timeout_secs = timeout.as_secs(),
                        "Poll timed out"
                    );
                    SyncError::Timeout(timeout)
                })?,
            None => summary.await,
        }
    }

    // ========================================================================
    // Items
    // ========================================================================

    /// The folder at the top of every client tree
    pub fn top_level_folder(&self) -> FileSystemItem {
        self.chain.top_level_item()
    }

    /// Structural check of an item id, without repository access
    pub fn can_handle_id(&self, id: &FileSystemItemId) -> bool {
        self.chain.can_handle_id(id)
    }

    /// Looks up an item on behalf of `principal`
    pub async fn get_file_system_item_by_id(
        &self,
        id: &FileSystemItemId,
        principal: &Principal,
    ) -> Result<Option<FileSystemItem>, SyncError> {
        Ok(self
            .chain
            .get_item_by_id(&self.repositories, id, principal)
            .await?)
    }

    /// Children of a folder item as seen by `principal`
    pub async fn list_children(
        &self,
        folder_id: &FileSystemItemId,
        principal: &Principal,
    ) -> Result<Vec<FileSystemItem>, SyncError> {
        Ok(self
            .chain
            .list_children(&self.repositories, folder_id, principal)
            .await?)
    }

    // ========================================================================
    // Repository listener hooks
    // ========================================================================

    /// Journals the deletion of `doc`, given as it was before removal
    pub async fn on_document_removed(
        &self,
        principal: &Principal,
        doc: &Document,
    ) -> Option<LogPosition> {
        if has_subscribers(doc) {
            self.registry.invalidate_all();
        }
        let Some(item) = self.known_item(principal, doc).await else {
            debug!(doc_id = %doc.id, "Removed document never adapted, no tombstone written");
            return None;
        };
        logged(self.journal.log_deleted(doc, item.id, item.name, None).await)
    }

    /// Journals a permission change on `doc`
    pub async fn on_security_updated(
        &self,
        principal: &Principal,
        doc: &Document,
    ) -> Option<LogPosition> {
        if has_subscribers(doc) {
            self.registry.invalidate_all();
        }
        let Some(item) = self.known_item(principal, doc).await else {
            debug!(doc_id = %doc.id, "Secured document does not adapt, no tombstone written");
            return None;
        };
        logged(self.journal.log_security_updated(doc, item.id, item.name).await)
    }

    /// Journals the move of a document from `before` to `after`
    ///
    /// The tombstone carries the item as clients knew it before the move;
    /// clients for which the new location is out of reach receive a
    /// deletion instead of a move.
    pub async fn on_document_moved(
        &self,
        principal: &Principal,
        before: &Document,
        after: &Document,
    ) -> Option<LogPosition> {
        if before.is_folderish() || has_subscribers(before) {
            // Root paths below the moved folder changed
            self.registry.invalidate_all();
        }
        let Some(item) = self.known_item(principal, before).await else {
            debug!(doc_id = %before.id, "Moved document never adapted, no tombstone written");
            return None;
        };
        logged(self.journal.log_moved(after, item.id, item.name).await)
    }

    /// The item clients most likely hold for `doc`
    ///
    /// Tries the principal's own view first, then falls back to relaxed
    /// roots so documents outside any root still get their item id.
    async fn known_item(&self, principal: &Principal, doc: &Document) -> Option<FileSystemItem> {
        let strict = AdaptContext::new(principal.clone());
        if let Some(item) = self.adapt(doc, &strict).await {
            return Some(item);
        }
        let relaxed = strict.with_relaxed_roots(true).with_deleted(true);
        self.adapt(doc, &relaxed).await
    }

    async fn adapt(&self, doc: &Document, ctx: &AdaptContext) -> Option<FileSystemItem> {
        let Some(repo) = self.repositories.get(&doc.repository) else {
            warn!(repository = %doc.repository, doc_id = %doc.id, "Unknown repository");
            return None;
        };
        match self.chain.get_item(repo.as_ref(), doc, ctx).await {
            Ok(item) => item,
            Err(e) if e.is_rootless() => None,
            Err(e) => {
                warn!(error = %e, doc_id = %doc.id, "Failed to adapt document");
                None
            }
        }
    }
}

/// Listener hooks cannot fail the repository operation that triggered them
fn logged(result: Result<LogPosition, RepositoryError>) -> Option<LogPosition> {
    result
        .map_err(|e| error!(error = %e, "Failed to journal document change"))
        .ok()
}

fn has_subscribers(doc: &Document) -> bool {
    doc.subscribers.iter().any(|s| s.enabled)
}
