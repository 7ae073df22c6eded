//! Per-principal collections managed by the engine
//!
//! Files a client opens for local edition land in the principal's
//! "Locally Edited" collection, created on first use and kept registered as
//! a synchronization root so the edited files reach every device.

use chrono::Utc;
use rootsync_core::config::CollectionsConfig;
use rootsync_core::domain::{facets, DocPath, Document, DocumentId, Principal};
use rootsync_core::ports::{DocumentLookup, DocumentQuery, IRepository};
use tracing::{debug, info};
use uuid::Uuid;

use crate::retry::{with_write_retry, RetryPolicy};
use crate::SyncError;

/// Document type of collections created here
const COLLECTION_TYPE: &str = "Collection";

/// Finds, creates and fills the "Locally Edited" collections
#[derive(Debug, Clone)]
pub struct LocallyEditedCollections {
    container: String,
    title: String,
    retry: RetryPolicy,
}

impl LocallyEditedCollections {
    pub fn new(config: &CollectionsConfig, retry: RetryPolicy) -> Self {
        Self {
            container: config.container_path.clone(),
            title: config.locally_edited_title.clone(),
            retry,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// `<container>/<principal>/<title>`
    pub fn path_for(&self, principal: &Principal) -> Result<DocPath, SyncError> {
        DocPath::new(self.container.clone())
            .and_then(|p| p.join(principal.as_str()))
            .and_then(|p| p.join(&self.title))
            .map_err(|e| SyncError::InvalidArgument(e.to_string()))
    }

    /// The principal's collection, created when missing
    ///
    /// Returns the collection and whether it was just created.
    pub async fn find_or_create(
        &self,
        repo: &dyn IRepository,
        principal: &Principal,
    ) -> Result<(Document, bool), SyncError> {
        let path = self.path_for(principal)?;
        if let Some(existing) = self.find(repo, principal, &path).await? {
            return Ok((existing, false));
        }

        let id = DocumentId::new(Uuid::new_v4().to_string())
            .map_err(|e| SyncError::InvalidArgument(e.to_string()))?;
        let mut collection = Document::new(id, repo.name().clone(), path, COLLECTION_TYPE)
            .with_facet(facets::COLLECTION);
        collection.title = self.title.clone();
        collection.readers.insert(principal.clone());
        let created = repo.create(&collection).await?;
        info!(
            principal = %principal,
            repository = %repo.name(),
            doc_id = %created.id,
            path = %created.path,
            "Created locally edited collection"
        );
        Ok((created, true))
    }

    async fn find(
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
            .find(|doc| &doc.path == path && doc.is_collection()))
    }

    /// Adds `member_id` to `collection`
    ///
    /// Returns the member and whether it joined just now.
    pub async fn add_member(
        &self,
        repo: &dyn IRepository,
        principal: &Principal,
        collection: &Document,
        member_id: &DocumentId,
    ) -> Result<(Document, bool), SyncError> {
        with_write_retry(&self.retry, "add_to_collection", member_id, move || async move {
            let mut member = match repo.get_document(member_id, principal).await? {
                DocumentLookup::Found(doc) => *doc,
                DocumentLookup::NotFound => return Err(SyncError::NotFound(member_id.to_string())),
                DocumentLookup::AccessDenied => {
                    return Err(SyncError::AccessDenied(member_id.to_string()))
                }
            };
            if member.collections.contains(&collection.id) {
                debug!(doc_id = %member.id, "Already in the collection");
                return Ok((member, false));
            }
            member.collections.insert(collection.id.clone());
            member.facets.insert(facets::COLLECTION_MEMBER.to_string());
            member.modified = Utc::now();
            Ok((repo.save(&member).await?, true))
        })
        .await
    }
}
