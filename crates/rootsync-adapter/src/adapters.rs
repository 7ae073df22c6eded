//! File system item adapters
//!
//! Each adapter turns a document into a [`FileSystemItem`] once the chain
//! has offered it the document and resolved the parent item id. Adapters
//! hold no mutable state: the same document always yields the same item.

use chrono::{DateTime, Utc};
use rootsync_core::domain::{
    facets, DocPath, Document, FileSystemItem, FileSystemItemId, ItemKind,
};

use crate::context::AdaptContext;

/// How an adapter's items find their parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentKind {
    /// Items are children of the top-level folder (synchronization roots)
    TopLevel,
    /// Items are children of their closest adaptable ancestor
    Ancestor,
}

/// A document-backed adapter of the chain
pub trait FileSystemItemAdapter: Send + Sync {
    /// Name written as the first segment of item ids
    fn name(&self) -> &str;

    /// Where items of this adapter hang on the client tree
    fn parent_kind(&self) -> ParentKind;

    /// Returns true if the adapter can project `doc`
    fn is_eligible(&self, doc: &Document, ctx: &AdaptContext) -> bool;

    /// Builds the item for an eligible document
    fn build(
        &self,
        doc: &Document,
        parent_id: Option<FileSystemItemId>,
        ctx: &AdaptContext,
    ) -> FileSystemItem;

    /// Id of the item this adapter builds for `doc`
    fn item_id(&self, doc: &Document) -> FileSystemItemId {
        FileSystemItemId::for_document(self.name(), &doc.repository, &doc.id)
    }

    /// Structural check: exactly three segments, the first being this
    /// adapter's name
    fn can_handle_id(&self, id: &FileSystemItemId) -> bool {
        id.segments()
            .is_some_and(|(adapter, _, _)| adapter == self.name())
    }
}

// ============================================================================
// Shared eligibility and item construction
// ============================================================================

/// Eligibility shared by document-backed adapters
///
/// Versions, proxies and hidden documents are never synchronized, trashed
/// ones only when asked for. Documents must be folders or carry content
/// whose storage allows updates.
pub fn is_synchronizable(doc: &Document, ctx: &AdaptContext, readonly_providers: &[String]) -> bool {
    if doc.is_version || doc.is_proxy || doc.is_hidden() {
        return false;
    }
    if doc.is_deleted() && !ctx.include_deleted {
        return false;
    }
    if doc.is_folderish() {
        return true;
    }
    match &doc.blob {
        Some(blob) => !blob
            .provider
            .as_ref()
            .is_some_and(|p| readonly_providers.iter().any(|r| r == p)),
        None => false,
    }
}

fn locked_by_other(doc: &Document, ctx: &AdaptContext) -> bool {
    doc.lock
        .as_ref()
        .is_some_and(|lock| lock.owner != ctx.principal)
}

struct Capabilities {
    can_rename: bool,
    can_delete: bool,
    can_update: bool,
    can_create_child: bool,
}

fn folder_item(
    id: FileSystemItemId,
    parent_id: Option<FileSystemItemId>,
    doc: &Document,
    ctx: &AdaptContext,
    caps: Capabilities,
) -> FileSystemItem {
    FileSystemItem {
        id,
        parent_id,
        name: doc.title.clone(),
        kind: ItemKind::Folder,
        repository: Some(doc.repository.clone()),
        doc_id: Some(doc.id.clone()),
        can_rename: caps.can_rename,
        can_delete: caps.can_delete,
        can_update: caps.can_update,
        can_create_child: caps.can_create_child,
        digest: None,
        length: None,
        created: doc.created,
        modified: doc.modified,
        lock: ctx.include_lock_info.then(|| doc.lock.clone()).flatten(),
    }
}

// ============================================================================
// Top-level folder
// ============================================================================

/// Synthesizes the folder at the top of every client tree
///
/// Its children are the principal's synchronization roots. When anchored on
/// a document path, that document adapts to the top-level folder itself.
#[derive(Debug, Clone)]
pub struct TopLevelFolder {
    name: String,
    title: String,
    anchor: Option<DocPath>,
}

impl TopLevelFolder {
    pub fn new(name: impl Into<String>, title: impl Into<String>, anchor: Option<DocPath>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            anchor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id of the top-level folder (`<name>#`)
    pub fn id(&self) -> FileSystemItemId {
        FileSystemItemId::top_level(&self.name)
    }

    /// Returns true if `id` designates the top-level folder
    pub fn is_id(&self, id: &FileSystemItemId) -> bool {
        id.as_str() == self.id().as_str()
    }

    /// Returns true if `doc` is the document the folder is anchored on
    pub fn is_anchor(&self, doc: &Document) -> bool {
        self.anchor.as_ref().is_some_and(|a| a == &doc.path)
    }

    /// The synthesized folder item
    pub fn item(&self) -> FileSystemItem {
        let epoch = DateTime::<Utc>::default();
        FileSystemItem {
            id: self.id(),
            parent_id: None,
            name: self.title.clone(),
            kind: ItemKind::Folder,
            repository: None,
            doc_id: None,
            can_rename: false,
            can_delete: false,
            can_update: false,
            can_create_child: false,
            digest: None,
            length: None,
            created: epoch,
            modified: epoch,
            lock: None,
        }
    }
}

// ============================================================================
// Sync root folder
// ============================================================================

/// Folders a principal registered as synchronization roots
#[derive(Debug, Clone)]
pub struct SyncRootFolderAdapter {
    name: String,
    readonly_providers: Vec<String>,
}

impl SyncRootFolderAdapter {
    pub fn new(name: impl Into<String>, readonly_providers: Vec<String>) -> Self {
        Self {
            name: name.into(),
            readonly_providers,
        }
    }
}

impl FileSystemItemAdapter for SyncRootFolderAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn parent_kind(&self) -> ParentKind {
        ParentKind::TopLevel
    }

    fn is_eligible(&self, doc: &Document, ctx: &AdaptContext) -> bool {
        doc.is_folderish()
            && doc.has_facet(facets::SYNC_ROOT)
            && (ctx.relax_root_constraint || doc.is_enabled_root_for(&ctx.principal))
            && is_synchronizable(doc, ctx, &self.readonly_providers)
    }

    fn build(
        &self,
        doc: &Document,
        parent_id: Option<FileSystemItemId>,
        ctx: &AdaptContext,
    ) -> FileSystemItem {
        let writable = !locked_by_other(doc, ctx);
        // Deleting a root on the client unregisters it
        folder_item(
            self.item_id(doc),
            parent_id,
            doc,
            ctx,
            Capabilities {
                can_rename: false,
                can_delete: true,
                can_update: false,
                can_create_child: writable,
            },
        )
    }
}

// ============================================================================
// Collection sync root
// ============================================================================

/// Collections registered as synchronization roots; their members are
/// exposed as children regardless of where they live
#[derive(Debug, Clone)]
pub struct CollectionSyncRootAdapter {
    name: String,
}

impl CollectionSyncRootAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl FileSystemItemAdapter for CollectionSyncRootAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn parent_kind(&self) -> ParentKind {
        ParentKind::TopLevel
    }

    fn is_eligible(&self, doc: &Document, ctx: &AdaptContext) -> bool {
        doc.is_collection()
            && !doc.is_version
            && !doc.is_proxy
            && (!doc.is_deleted() || ctx.include_deleted)
            && (ctx.relax_root_constraint || doc.is_enabled_root_for(&ctx.principal))
    }

    fn build(
        &self,
        doc: &Document,
        parent_id: Option<FileSystemItemId>,
        ctx: &AdaptContext,
    ) -> FileSystemItem {
        folder_item(
            self.item_id(doc),
            parent_id,
            doc,
            ctx,
            Capabilities {
                can_rename: false,
                can_delete: true,
                can_update: false,
                can_create_child: false,
            },
        )
    }
}

// ============================================================================
// Default item
// ============================================================================

/// Plain folders and files below a synchronization root
#[derive(Debug, Clone)]
pub struct DefaultItemAdapter {
    name: String,
    readonly_providers: Vec<String>,
}

impl DefaultItemAdapter {
    pub fn new(name: impl Into<String>, readonly_providers: Vec<String>) -> Self {
        Self {
            name: name.into(),
            readonly_providers,
        }
    }
}

impl FileSystemItemAdapter for DefaultItemAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn parent_kind(&self) -> ParentKind {
        ParentKind::Ancestor
    }

    fn is_eligible(&self, doc: &Document, ctx: &AdaptContext) -> bool {
        is_synchronizable(doc, ctx, &self.readonly_providers)
    }

    fn build(
        &self,
        doc: &Document,
        parent_id: Option<FileSystemItemId>,
        ctx: &AdaptContext,
    ) -> FileSystemItem {
        let writable = !locked_by_other(doc, ctx);
        let caps = Capabilities {
            can_rename: writable,
            can_delete: writable,
            can_update: writable && !doc.is_folderish(),
            can_create_child: writable && doc.is_folderish(),
        };
        let mut item = folder_item(self.item_id(doc), parent_id, doc, ctx, caps);
        if let (false, Some(blob)) = (doc.is_folderish(), &doc.blob) {
            item.kind = ItemKind::File;
            item.name = blob.name.clone();
            item.digest = Some(blob.digest.clone());
            item.length = Some(blob.length);
        }
        item
    }
}
