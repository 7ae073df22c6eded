//! Authoring helpers
//!
//! Mutations a user of the repository would perform, each appending the
//! plain audit entry the repository's audit listener records for it.
//! Synchronization tombstones are not written here; they belong to the
//! change-feed side (`DriveService` hooks), which knows the item ids.

use std::collections::{BTreeSet, HashMap};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use rootsync_core::domain::{
    facets, Blob, DocPath, Document, DocumentId, EventKind, LifecycleState, LockInfo, LogPosition,
    LogRecord, Principal, Subscription,
};
use rootsync_core::ports::{IRepository, LogEntryDraft};

use crate::SqliteRepository;

/// Description of a document to create
#[derive(Debug, Clone)]
pub struct NewDocument {
    name: String,
    doc_type: String,
    facets: BTreeSet<String>,
    content: Option<Vec<u8>>,
    blob_provider: Option<String>,
}

impl NewDocument {
    /// A folder
    pub fn folder(name: impl Into<String>) -> Self {
        Self::new(name, "Folder").with_facet(facets::FOLDERISH)
    }

    /// A file holding `content`
    pub fn file(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        let mut new = Self::new(name, "File");
        new.content = Some(content.into());
        new
    }

    /// A collection, whose members are referenced by id
    pub fn collection(name: impl Into<String>) -> Self {
        Self::new(name, "Collection").with_facet(facets::COLLECTION)
    }

    fn new(name: impl Into<String>, doc_type: &str) -> Self {
        Self {
            name: name.into(),
            doc_type: doc_type.to_string(),
            facets: BTreeSet::new(),
            content: None,
            blob_provider: None,
        }
    }

    /// Overrides the document type
    pub fn with_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = doc_type.into();
        self
    }

    /// Adds a facet
    pub fn with_facet(mut self, facet: impl Into<String>) -> Self {
        self.facets.insert(facet.into());
        self
    }

    /// Hosts the content on the named storage backend
    pub fn with_blob_provider(mut self, provider: impl Into<String>) -> Self {
        self.blob_provider = Some(provider.into());
        self
    }
}

/// Hex SHA-256 digest of `content`
fn digest(content: &[u8]) -> String {
    Sha256::digest(content)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

impl SqliteRepository {
    /// Fetches a document regardless of readers
    pub async fn document(&self, id: &DocumentId) -> Result<Option<Document>> {
        Ok(self.load(id).await?)
    }

    async fn require(&self, id: &DocumentId) -> Result<Document> {
        self.load(id)
            .await?
            .with_context(|| format!("Document {} not found", id))
    }

    async fn record(&self, doc: &Document, event: EventKind) -> Result<LogPosition> {
        let draft = LogEntryDraft::for_document(doc, LogRecord::Document { event });
        Ok(self.insert_log(&draft).await?)
    }

    /// Creates a document under `parent`, or at the top of the repository
    ///
    /// Logs `documentCreated`.
    pub async fn create_document(
        &self,
        parent: Option<&DocumentId>,
        new: NewDocument,
    ) -> Result<Document> {
        let parent_path = match parent {
            Some(parent_id) => {
                let parent = self.require(parent_id).await?;
                if !parent.is_folderish() {
                    bail!("Document {} cannot hold children", parent_id);
                }
                parent.path
            }
            None => DocPath::root(),
        };
        let path = parent_path
            .join(&new.name)
            .with_context(|| format!("Invalid document name '{}'", new.name))?;
        let id = DocumentId::new(Uuid::new_v4().to_string())?;

        let mut doc = Document::new(id, self.name().clone(), path, new.doc_type);
        doc.parent_id = parent.cloned();
        doc.facets = new.facets;
        if let Some(content) = new.content {
            doc.blob = Some(Blob {
                name: new.name.clone(),
                digest: digest(&content),
                length: content.len() as u64,
                provider: new.blob_provider,
            });
        }

        self.insert(&doc).await.context("Failed to insert document")?;
        self.record(&doc, EventKind::DocumentCreated).await?;
        tracing::debug!(doc_id = %doc.id, path = %doc.path, "Created document");
        Ok(doc)
    }

    /// Replaces the content of a file
    ///
    /// Logs `documentModified`.
    pub async fn update_document(&self, id: &DocumentId, content: &[u8]) -> Result<Document> {
        let mut doc = self.require(id).await?;
        let name = doc
            .blob
            .as_ref()
            .map(|b| b.name.clone())
            .unwrap_or_else(|| doc.title.clone());
        let provider = doc.blob.as_ref().and_then(|b| b.provider.clone());
        doc.blob = Some(Blob {
            name,
            digest: digest(content),
            length: content.len() as u64,
            provider,
        });
        doc.modified = Utc::now();

        let doc = self.overwrite(&doc).await?;
        self.record(&doc, EventKind::DocumentModified).await?;
        Ok(doc)
    }

    /// Moves a document and its subtree under `new_parent`
    ///
    /// Nothing is logged: the move entry must carry the item id from before
    /// the move, so it is journaled by `DriveService::on_document_moved`.
    pub async fn move_document(&self, id: &DocumentId, new_parent: &DocumentId) -> Result<Document> {
        let mut doc = self.require(id).await?;
        let parent = self.require(new_parent).await?;
        if !parent.is_folderish() {
            bail!("Document {} cannot hold children", new_parent);
        }
        if doc.path.contains(&parent.path) {
            bail!("Cannot move {} below itself", id);
        }

        let old_path = doc.path.clone();
        let new_path = parent
            .path
            .join(old_path.name())
            .with_context(|| format!("Invalid target path for {}", id))?;

        for mut descendant in self.load_all().await? {
            if descendant.id == doc.id || !old_path.is_ancestor_of(&descendant.path) {
                continue;
            }
            let suffix = &descendant.path.as_str()[old_path.as_str().len()..];
            descendant.path = DocPath::new(format!("{}{}", new_path.as_str(), suffix))?;
            self.overwrite(&descendant).await?;
        }

        doc.path = new_path;
        doc.parent_id = Some(parent.id.clone());
        doc.modified = Utc::now();
        let doc = self.overwrite(&doc).await?;
        tracing::debug!(doc_id = %doc.id, from = %old_path, to = %doc.path, "Moved document");
        Ok(doc)
    }

    /// Copies a document and its subtree under `new_parent`
    ///
    /// Copies get fresh ids and leave every collection. Subscriptions are
    /// copied along unless the repository resets roots on copy. Logs
    /// `documentCreatedByCopy` for each copy and returns the top one.
    pub async fn copy_document(&self, id: &DocumentId, new_parent: &DocumentId) -> Result<Document> {
        let source = self.require(id).await?;
        let parent = self.require(new_parent).await?;
        if !parent.is_folderish() {
            bail!("Document {} cannot hold children", new_parent);
        }
        if source.path.contains(&parent.path) {
            bail!("Cannot copy {} below itself", id);
        }
        let target = parent
            .path
            .join(source.path.name())
            .with_context(|| format!("Invalid target path for {}", id))?;
        if self.load_all().await?.iter().any(|d| d.path == target) {
            bail!("A document already exists at {}", target);
        }

        let mut subtree: Vec<Document> = self
            .load_all()
            .await?
            .into_iter()
            .filter(|d| source.path.is_ancestor_of(&d.path))
            .collect();
        subtree.sort_by_key(|d| d.path.depth());

        let mut new_ids = HashMap::new();
        new_ids.insert(source.id.clone(), DocumentId::new(Uuid::new_v4().to_string())?);
        let top = self
            .insert_copy(source.clone(), &source.path, &target, Some(parent.id.clone()), &new_ids)
            .await?;
        for original in subtree {
            new_ids.insert(original.id.clone(), DocumentId::new(Uuid::new_v4().to_string())?);
            let parent_id = original
                .parent_id
                .as_ref()
                .and_then(|p| new_ids.get(p))
                .cloned();
            self.insert_copy(original, &source.path, &target, parent_id, &new_ids)
                .await?;
        }
        tracing::debug!(
            doc_id = %id,
            copy_id = %top.id,
            to = %top.path,
            copies = new_ids.len(),
            "Copied document"
        );
        Ok(top)
    }

    async fn insert_copy(
        &self,
        original: Document,
        from: &DocPath,
        to: &DocPath,
        parent_id: Option<DocumentId>,
        new_ids: &HashMap<DocumentId, DocumentId>,
    ) -> Result<Document> {
        let mut copy = original;
        copy.id = new_ids
            .get(&copy.id)
            .cloned()
            .with_context(|| format!("No copy id for {}", copy.id))?;
        let suffix = &copy.path.as_str()[from.as_str().len()..];
        copy.path = DocPath::new(format!("{}{}", to.as_str(), suffix))?;
        copy.parent_id = parent_id;
        copy.collections.clear();
        copy.facets.remove(facets::COLLECTION_MEMBER);
        copy.lock = None;
        copy.change_token = 0;
        copy.created = Utc::now();
        copy.modified = copy.created;
        if self.resets_roots_on_copy() {
            copy.subscribers.clear();
            copy.facets.remove(facets::SYNC_ROOT);
        }

        self.insert(&copy).await.context("Failed to insert copy")?;
        self.record(&copy, EventKind::DocumentCreatedByCopy).await?;
        Ok(copy)
    }

    /// Puts a document in the trash
    ///
    /// Logs a `lifecycle_transition_event` into the deleted state, which the
    /// change feed ignores in favor of deletion tombstones.
    pub async fn trash_document(&self, id: &DocumentId) -> Result<Document> {
        let mut doc = self.require(id).await?;
        doc.is_trashed = true;
        doc.lifecycle = LifecycleState::Deleted;
        let doc = self.overwrite(&doc).await?;
        self.record(&doc, EventKind::LifecycleTransition).await?;
        Ok(doc)
    }

    /// Takes a document out of the trash
    ///
    /// Logs `documentUntrashed`.
    pub async fn untrash_document(&self, id: &DocumentId) -> Result<Document> {
        let mut doc = self.require(id).await?;
        doc.is_trashed = false;
        doc.lifecycle = LifecycleState::Project;
        let doc = self.overwrite(&doc).await?;
        self.record(&doc, EventKind::DocumentUntrashed).await?;
        Ok(doc)
    }

    /// Permanently removes a document and its subtree
    ///
    /// Logs `deleted` and returns the document as it was before removal.
    pub async fn remove_document(&self, id: &DocumentId) -> Result<Document> {
        let doc = self.require(id).await?;
        for descendant in self.load_all().await? {
            if doc.path.is_ancestor_of(&descendant.path) {
                self.delete(&descendant.id).await?;
            }
        }
        self.delete(&doc.id).await?;
        self.record(&doc, EventKind::Deleted).await?;
        tracing::debug!(doc_id = %doc.id, path = %doc.path, "Removed document");
        Ok(doc)
    }

    /// Locks a document on behalf of `owner`
    ///
    /// Logs `documentLocked`.
    pub async fn lock_document(&self, id: &DocumentId, owner: &Principal) -> Result<Document> {
        let mut doc = self.require(id).await?;
        if let Some(lock) = &doc.lock {
            if &lock.owner != owner {
                bail!("Document {} is locked by {}", id, lock.owner);
            }
        }
        doc.lock = Some(LockInfo {
            owner: owner.clone(),
            created: Utc::now(),
        });
        let doc = self.overwrite(&doc).await?;
        self.record(&doc, EventKind::DocumentLocked).await?;
        Ok(doc)
    }

    /// Releases the lock of a document
    ///
    /// Logs `documentUnlocked`.
    pub async fn unlock_document(&self, id: &DocumentId) -> Result<Document> {
        let mut doc = self.require(id).await?;
        if doc.lock.take().is_none() {
            return Ok(doc);
        }
        let doc = self.overwrite(&doc).await?;
        self.record(&doc, EventKind::DocumentUnlocked).await?;
        Ok(doc)
    }

    /// Adds `member` to `collection`
    ///
    /// Logs `addedToCollection` on the member.
    pub async fn add_to_collection(
        &self,
        collection: &DocumentId,
        member: &DocumentId,
    ) -> Result<Document> {
        let target = self.require(collection).await?;
        if !target.is_collection() {
            bail!("Document {} is not a collection", collection);
        }
        let mut doc = self.require(member).await?;
        doc.collections.insert(collection.clone());
        doc.facets.insert(facets::COLLECTION_MEMBER.to_string());
        let doc = self.overwrite(&doc).await?;
        self.record(&doc, EventKind::AddedToCollection).await?;
        Ok(doc)
    }

    /// Restricts who may read a document; an empty list opens it to everyone
    ///
    /// Nothing is logged; permission changes reach the change feed through
    /// security tombstones.
    pub async fn set_readers(&self, id: &DocumentId, readers: &[Principal]) -> Result<Document> {
        let mut doc = self.require(id).await?;
        doc.readers = readers.iter().cloned().collect();
        Ok(self.overwrite(&doc).await?)
    }

    /// Writes a subscription directly, bypassing root registration
    ///
    /// Nothing is logged and no root cache is invalidated.
    pub async fn set_subscription(
        &self,
        id: &DocumentId,
        principal: &Principal,
        enabled: bool,
    ) -> Result<Document> {
        let mut doc = self.require(id).await?;
        doc.facets.insert(facets::SYNC_ROOT.to_string());
        match doc.subscribers.iter_mut().find(|s| &s.principal == principal) {
            Some(existing) => existing.enabled = enabled,
            None => doc.subscribers.push(Subscription {
                principal: principal.clone(),
                enabled,
                since: Utc::now(),
            }),
        }
        Ok(self.overwrite(&doc).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_hex_sha256() {
        assert_eq!(
            digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_new_document_shapes() {
        let folder = NewDocument::folder("docs");
        assert!(folder.facets.contains(facets::FOLDERISH));
        assert!(folder.content.is_none());

        let file = NewDocument::file("a.txt", "hello").with_blob_provider("s3");
        assert_eq!(file.doc_type, "File");
        assert_eq!(file.content.as_deref(), Some(&b"hello"[..]));
        assert_eq!(file.blob_provider.as_deref(), Some("s3"));

        let collection = NewDocument::collection("favorites");
        assert!(collection.facets.contains(facets::COLLECTION));
        assert!(!collection.facets.contains(facets::FOLDERISH));
    }
}
