//! The adapter chain
//!
//! An ordered list of `(binding, adapter)` pairs assembled once at startup
//! from configuration, plus the top-level folder. Documents are offered to
//! adapters in priority order; the first adapter whose binding matches and
//! whose eligibility predicate passes builds the item.
//!
//! Parent resolution is the only part that reads the repository: plain
//! items hang below their closest adaptable ancestor, and that chain of
//! ancestors must end at a synchronization root (or the item must belong to
//! a collection root). Otherwise the item is rootless.
//!
//! Where roots hang below the top-level folder is up to the configured
//! [`Hierarchy`].

use std::sync::Arc;

use rootsync_core::config::{AdapterKind, AdaptersConfig};
use rootsync_core::domain::{DocPath, Document, FileSystemItem, FileSystemItemId, Principal};
use rootsync_core::ports::{DocumentLookup, DocumentQuery, IRepository, RepositoryManager};
use tracing::{debug, trace, warn};

use crate::adapters::{
    CollectionSyncRootAdapter, DefaultItemAdapter, FileSystemItemAdapter, ParentKind,
    SyncRootFolderAdapter, TopLevelFolder,
};
use crate::binding::Binding;
use crate::context::AdaptContext;
use crate::error::AdapterError;
use crate::hierarchy::Hierarchy;

/// Upper bound on the ancestors walked while resolving a parent
const MAX_ANCESTOR_DEPTH: usize = 256;

// ============================================================================
// AdapterChain
// ============================================================================

/// Immutable adapter chain
pub struct AdapterChain {
    top_level: TopLevelFolder,
    hierarchy: Hierarchy,
    adapters: Vec<(Binding, Arc<dyn FileSystemItemAdapter>)>,
}

impl AdapterChain {
    /// Builds the chain described by `config`
    pub fn from_config(config: &AdaptersConfig) -> Result<Self, AdapterError> {
        AdapterChainBuilder::from_config(config)?.build()
    }

    /// The top-level folder adapter
    pub fn top_level(&self) -> &TopLevelFolder {
        &self.top_level
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    /// The synthesized top-level folder item
    ///
    /// Backed by the principal's workspace in the user-workspace hierarchy,
    /// where it accepts new children.
    pub fn top_level_item(&self) -> FileSystemItem {
        let mut item = self.top_level.item();
        item.can_create_child = matches!(self.hierarchy, Hierarchy::UserWorkspace { .. });
        item
    }

    fn is_workspace(&self, doc: &Document, principal: &Principal) -> bool {
        self.hierarchy
            .implicit_root_path(principal)
            .is_some_and(|ws| ws == doc.path)
    }

    /// Number of bound adapters
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Names of the bound adapters, in evaluation order
    pub fn adapter_names(&self) -> Vec<&str> {
        self.adapters.iter().map(|(_, a)| a.name()).collect()
    }

    /// First adapter whose binding matches `doc` and that accepts it
    pub fn select(
        &self,
        doc: &Document,
        ctx: &AdaptContext,
    ) -> Option<&Arc<dyn FileSystemItemAdapter>> {
        self.adapters
            .iter()
            .find(|(binding, adapter)| binding.matches(doc, ctx) && adapter.is_eligible(doc, ctx))
            .map(|(_, adapter)| adapter)
    }

    /// Adapter able to handle `id`, if any
    pub fn adapter_for_id(&self, id: &FileSystemItemId) -> Option<&Arc<dyn FileSystemItemAdapter>> {
        self.adapters
            .iter()
            .map(|(_, adapter)| adapter)
            .find(|adapter| adapter.can_handle_id(id))
    }

    /// Returns true if some adapter (or the top-level folder) recognizes `id`
    ///
    /// Purely structural, no repository access.
    pub fn can_handle_id(&self, id: &FileSystemItemId) -> bool {
        self.top_level.is_id(id)
            || self.hierarchy.virtual_folder(id).is_some()
            || self.adapter_for_id(id).is_some()
    }

    /// Projects `doc` into a file system item
    ///
    /// Returns `Ok(None)` when no adapter accepts the document and
    /// [`AdapterError::Rootless`] when its parent cannot be resolved (unless
    /// the context relaxes the root constraint).
    pub async fn get_item(
        &self,
        repo: &dyn IRepository,
        doc: &Document,
        ctx: &AdaptContext,
    ) -> Result<Option<FileSystemItem>, AdapterError> {
        if self.top_level.is_anchor(doc) || self.is_workspace(doc, &ctx.principal) {
            return Ok(Some(self.top_level_item()));
        }
        let Some(adapter) = self.select(doc, ctx) else {
            trace!(doc_id = %doc.id, "No adapter accepts document");
            return Ok(None);
        };
        let item = self.build_item(adapter.as_ref(), repo, doc, ctx).await?;
        Ok(Some(item))
    }

    async fn build_item(
        &self,
        adapter: &dyn FileSystemItemAdapter,
        repo: &dyn IRepository,
        doc: &Document,
        ctx: &AdaptContext,
    ) -> Result<FileSystemItem, AdapterError> {
        let parent_id = match adapter.parent_kind() {
            ParentKind::TopLevel => {
                Some(self.hierarchy.root_parent(self.top_level.id(), doc, &ctx.principal))
            }
            ParentKind::Ancestor => self.resolve_parent(repo, doc, ctx).await?,
        };
        Ok(adapter.build(doc, parent_id, ctx))
    }

    /// Resolves the parent item id of a plain item
    ///
    /// Walks ancestors until one adapts through a root adapter. The parent
    /// is the closest adaptable ancestor. Failing that, a collection root
    /// the document belongs to becomes the parent. In the user-workspace
    /// hierarchy the walk also stops at the principal's workspace, which
    /// stands for the top-level folder.
    pub async fn resolve_parent(
        &self,
        repo: &dyn IRepository,
        doc: &Document,
        ctx: &AdaptContext,
    ) -> Result<Option<FileSystemItemId>, AdapterError> {
        let workspace = self.hierarchy.implicit_root_path(&ctx.principal);
        let mut closest: Option<FileSystemItemId> = None;
        let mut current = doc.parent_id.clone();
        let mut depth = 0;

        while let Some(parent_id) = current.take() {
            depth += 1;
            if depth > MAX_ANCESTOR_DEPTH {
                warn!(doc_id = %doc.id, "Ancestor chain too deep");
                break;
            }
            let parent = match repo.get_document(&parent_id, &ctx.principal).await? {
                DocumentLookup::Found(parent) => *parent,
                DocumentLookup::NotFound | DocumentLookup::AccessDenied => break,
            };
            if workspace.as_ref() == Some(&parent.path) {
                return Ok(Some(closest.unwrap_or_else(|| self.top_level.id())));
            }
            let Some(adapter) = self.select(&parent, ctx) else {
                break;
            };
            let parent_item_id = closest.get_or_insert_with(|| adapter.item_id(&parent)).clone();
            if adapter.parent_kind() == ParentKind::TopLevel {
                return Ok(Some(parent_item_id));
            }
            current = parent.parent_id.clone();
        }

        for collection_id in &doc.collections {
            if let DocumentLookup::Found(collection) =
                repo.get_document(collection_id, &ctx.principal).await?
            {
                if let Some(adapter) = self.select(&collection, ctx) {
                    if adapter.parent_kind() == ParentKind::TopLevel {
                        return Ok(Some(adapter.item_id(&collection)));
                    }
                }
            }
        }

        if ctx.relax_root_constraint {
            return Ok(None);
        }
        Err(AdapterError::Rootless {
            repository: doc.repository.clone(),
            doc_id: doc.id.clone(),
        })
    }

    /// Looks up an item by id on behalf of `principal`
    ///
    /// Unknown ids, missing documents, unreadable documents and documents
    /// the named adapter no longer accepts all yield `Ok(None)`.
    pub async fn get_item_by_id(
        &self,
        repos: &RepositoryManager,
        id: &FileSystemItemId,
        principal: &Principal,
    ) -> Result<Option<FileSystemItem>, AdapterError> {
        if self.top_level.is_id(id) {
            return Ok(Some(self.top_level_item()));
        }
        if let Some(folder) = self.hierarchy.virtual_folder(id) {
            return Ok(Some(folder.item(self.top_level.id())));
        }
        let Some(adapter) = self.adapter_for_id(id) else {
            debug!(item_id = %id, "No adapter handles item id");
            return Ok(None);
        };
        let Some((repository, doc_id)) = id.document_ref() else {
            return Ok(None);
        };
        let Some(repo) = repos.get(&repository) else {
            debug!(item_id = %id, repository = %repository, "Unknown repository");
            return Ok(None);
        };
        let doc = match repo.get_document(&doc_id, principal).await? {
            DocumentLookup::Found(doc) => *doc,
            DocumentLookup::NotFound | DocumentLookup::AccessDenied => return Ok(None),
        };

        let ctx = AdaptContext::new(principal.clone());
        if !adapter.is_eligible(&doc, &ctx) {
            return Ok(None);
        }
        match self.build_item(adapter.as_ref(), repo.as_ref(), &doc, &ctx).await {
            Ok(item) => Ok(Some(item)),
            Err(e) if e.is_rootless() => {
                debug!(item_id = %id, "Item is rootless");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Lists the children of a folder item
    ///
    /// The top-level folder lists what the hierarchy puts there: the
    /// principal's roots, the workspace content next to the roots folder, or
    /// the "My Docs" and "Other Docs" folders. A virtual folder lists the
    /// roots the hierarchy hangs below it. A collection root lists its
    /// members. Any other folder lists its adaptable children. Unknown
    /// folders have no children.
    pub async fn list_children(
        &self,
        repos: &RepositoryManager,
        folder_id: &FileSystemItemId,
        principal: &Principal,
    ) -> Result<Vec<FileSystemItem>, AdapterError> {
        let ctx = AdaptContext::new(principal.clone());
        let mut items = Vec::new();

        if self.top_level.is_id(folder_id) {
            match &self.hierarchy {
                Hierarchy::Flat => self.list_roots(repos, folder_id, &ctx, &mut items).await?,
                Hierarchy::UserWorkspace { roots_parent, .. } => {
                    self.list_workspace(repos, &ctx, &mut items).await?;
                    items.push(roots_parent.item(self.top_level.id()));
                }
                Hierarchy::Permission { mine, shared, .. } => {
                    items.push(mine.item(self.top_level.id()));
                    items.push(shared.item(self.top_level.id()));
                }
            }
            return Ok(items);
        }
        if self.hierarchy.virtual_folder(folder_id).is_some() {
            self.list_roots(repos, folder_id, &ctx, &mut items).await?;
            return Ok(items);
        }

        let Some(folder) = self.get_item_by_id(repos, folder_id, principal).await? else {
            return Ok(items);
        };
        let (Some(repository), Some(doc_id)) = (&folder.repository, &folder.doc_id) else {
            return Ok(items);
        };
        let Some(repo) = repos.get(repository) else {
            return Ok(items);
        };
        let Some(doc) = repo.get_document(doc_id, principal).await?.into_found() else {
            return Ok(items);
        };

        let query = if doc.is_collection() {
            DocumentQuery::new(principal.clone()).with_collection(doc.id.clone())
        } else if folder.is_folder() {
            DocumentQuery::new(principal.clone()).with_parent(doc.id.clone())
        } else {
            return Ok(items);
        };
        for child in repo.query_documents(&query).await? {
            if let Some(item) = self.adapt_child(repo.as_ref(), &child, &ctx).await? {
                items.push(item);
            }
        }
        Ok(items)
    }

    /// Roots of the principal whose item hangs below `folder_id`
    async fn list_roots(
        &self,
        repos: &RepositoryManager,
        folder_id: &FileSystemItemId,
        ctx: &AdaptContext,
        items: &mut Vec<FileSystemItem>,
    ) -> Result<(), AdapterError> {
        let query = DocumentQuery::new(ctx.principal.clone()).with_subscriber(ctx.principal.clone());
        for repo in repos.iter() {
            for doc in repo.query_documents(&query).await? {
                if let Some(item) = self.adapt_child(repo.as_ref(), &doc, ctx).await? {
                    if item.parent_id.as_ref() == Some(folder_id) {
                        items.push(item);
                    }
                }
            }
        }
        Ok(())
    }

    /// Children of the principal's workspace, in every repository holding one
    async fn list_workspace(
        &self,
        repos: &RepositoryManager,
        ctx: &AdaptContext,
        items: &mut Vec<FileSystemItem>,
    ) -> Result<(), AdapterError> {
        let Some(path) = self.hierarchy.implicit_root_path(&ctx.principal) else {
            return Ok(());
        };
        let lookup = DocumentQuery::new(ctx.principal.clone()).with_path_prefix(path.clone());
        for repo in repos.iter() {
            let workspace = repo
                .query_documents(&lookup)
                .await?
                .into_iter()
                .find(|doc| doc.path == path);
            let Some(workspace) = workspace else {
                continue;
            };
            let children = DocumentQuery::new(ctx.principal.clone()).with_parent(workspace.id);
            for child in repo.query_documents(&children).await? {
                if let Some(item) = self.adapt_child(repo.as_ref(), &child, ctx).await? {
                    items.push(item);
                }
            }
        }
        Ok(())
    }

    async fn adapt_child(
        &self,
        repo: &dyn IRepository,
        doc: &Document,
        ctx: &AdaptContext,
    ) -> Result<Option<FileSystemItem>, AdapterError> {
        match self.get_item(repo, doc, ctx).await {
            Err(e) if e.is_rootless() => {
                warn!(doc_id = %doc.id, "Skipping rootless child");
                Ok(None)
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for AdapterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterChain")
            .field("top_level", &self.top_level)
            .field("hierarchy", &self.hierarchy.kind())
            .field("adapters", &self.adapter_names())
            .finish()
    }
}

// ============================================================================
// AdapterChainBuilder
// ============================================================================

/// Assembles an [`AdapterChain`]
#[derive(Default)]
pub struct AdapterChainBuilder {
    top_level: Option<TopLevelFolder>,
    hierarchy: Hierarchy,
    entries: Vec<(i32, Binding, Arc<dyn FileSystemItemAdapter>)>,
}

impl AdapterChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pre-loaded with the enabled adapters of `config`
    pub fn from_config(config: &AdaptersConfig) -> Result<Self, AdapterError> {
        let anchor = config
            .top_level
            .anchor_path
            .as_ref()
            .map(|p| DocPath::new(p.clone()))
            .transpose()
            .map_err(|e| AdapterError::InvalidConfig(e.to_string()))?;
        let mut builder = Self::new()
            .top_level(TopLevelFolder::new(
                config.top_level.adapter_name.clone(),
                config.top_level.title.clone(),
                anchor,
            ))
            .hierarchy(Hierarchy::from_config(&config.hierarchy)?);

        for entry in config.entries.iter().filter(|e| e.enabled) {
            let readonly = config.readonly_blob_providers.clone();
            let adapter: Arc<dyn FileSystemItemAdapter> = match entry.kind {
                AdapterKind::SyncRootFolder => {
                    Arc::new(SyncRootFolderAdapter::new(entry.name.clone(), readonly))
                }
                AdapterKind::CollectionSyncRoot => {
                    Arc::new(CollectionSyncRootAdapter::new(entry.name.clone()))
                }
                AdapterKind::DefaultItem => {
                    Arc::new(DefaultItemAdapter::new(entry.name.clone(), readonly))
                }
            };
            builder = builder.adapter(entry.priority, Binding::from(&entry.binding), adapter);
        }
        Ok(builder)
    }

    /// Sets the top-level folder
    pub fn top_level(mut self, top_level: TopLevelFolder) -> Self {
        self.top_level = Some(top_level);
        self
    }

    pub fn hierarchy(mut self, hierarchy: Hierarchy) -> Self {
        self.hierarchy = hierarchy;
        self
    }

    /// Adds an adapter; lower priorities are evaluated first
    pub fn adapter(
        mut self,
        priority: i32,
        binding: Binding,
        adapter: Arc<dyn FileSystemItemAdapter>,
    ) -> Self {
        self.entries.push((priority, binding, adapter));
        self
    }

    /// Freezes the chain
    ///
    /// Fails without a top-level folder or when two adapters share a name.
    pub fn build(mut self) -> Result<AdapterChain, AdapterError> {
        let top_level = self
            .top_level
            .take()
            .ok_or_else(|| AdapterError::InvalidConfig("missing top-level folder".to_string()))?;

        let mut names = vec![top_level.name().to_string()];
        names.extend(self.hierarchy.virtual_folders().iter().map(|f| f.name().to_string()));
        for (_, _, adapter) in &self.entries {
            if names.iter().any(|n| n == adapter.name()) {
                return Err(AdapterError::InvalidConfig(format!(
                    "duplicate adapter name '{}'",
                    adapter.name()
                )));
            }
            names.push(adapter.name().to_string());
        }

        // Stable: equal priorities keep insertion order
        self.entries.sort_by_key(|(priority, _, _)| *priority);
        let adapters: Vec<_> = self
            .entries
            .into_iter()
            .map(|(_, binding, adapter)| (binding, adapter))
            .collect();

        debug!(
            adapters_count = adapters.len(),
            top_level = %top_level.name(),
            hierarchy = ?self.hierarchy.kind(),
            "Adapter chain built"
        );
        Ok(AdapterChain {
            top_level,
            hierarchy: self.hierarchy,
            adapters,
        })
    }
}
