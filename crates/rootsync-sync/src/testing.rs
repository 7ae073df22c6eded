//! In-memory repository with fault injection, used by unit tests

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rootsync_core::domain::{
    facets, Blob, DocPath, Document, DocumentId, EventKind, LogEntry, LogPosition, LogRecord,
    Principal, RepositoryName,
};
use rootsync_core::ports::{
    DocumentLookup, DocumentQuery, IRepository, LogEntryDraft, LogQuery, RepositoryError,
};

pub fn principal(name: &str) -> Principal {
    Principal::new(name.to_string()).unwrap()
}

fn document(id: &str, path: &str, parent: Option<&str>, doc_type: &str) -> Document {
    let mut doc = Document::new(
        DocumentId::new(id.to_string()).unwrap(),
        RepositoryName::new("default".to_string()).unwrap(),
        DocPath::new(path.to_string()).unwrap(),
        doc_type,
    );
    doc.parent_id = parent.map(|p| DocumentId::new(p.to_string()).unwrap());
    doc
}

pub fn folder(id: &str, path: &str, parent: Option<&str>) -> Document {
    document(id, path, parent, "Folder").with_facet(facets::FOLDERISH)
}

pub fn file(id: &str, path: &str, parent: Option<&str>) -> Document {
    let name = path.rsplit('/').next().unwrap_or(id).to_string();
    document(id, path, parent, "File").with_blob(Blob {
        name,
        digest: format!("digest-{id}"),
        length: 3,
        provider: None,
    })
}

pub fn collection(id: &str, path: &str) -> Document {
    document(id, path, None, "Collection").with_facet(facets::COLLECTION)
}

/// Repository whose queries and writes can be made to fail on demand
pub struct FlakyRepository {
    name: RepositoryName,
    docs: Mutex<BTreeMap<DocumentId, Document>>,
    log: Mutex<Vec<LogEntry>>,
    positions: Arc<AtomicI64>,
    clustering_delay: Option<Duration>,
    granularity: u64,
    latency: Option<Duration>,
    /// Makes every read fail with `Unavailable`
    pub fail_queries: AtomicBool,
    /// Makes every audit trail append fail with `Unavailable`
    pub fail_appends: AtomicBool,
    /// Number of upcoming saves that fail with a write conflict
    pub conflicts_remaining: AtomicU32,
    /// Number of `query_documents` calls served
    pub document_queries: AtomicUsize,
    /// Number of `query_log` calls served
    pub log_queries: AtomicUsize,
}

impl FlakyRepository {
    pub fn new(name: &str) -> Self {
        Self::with_positions(name, Arc::new(AtomicI64::new(0)))
    }

    /// Repository drawing positions from a counter shared with others
    pub fn with_positions(name: &str, positions: Arc<AtomicI64>) -> Self {
        Self {
            name: RepositoryName::new(name.to_string()).unwrap(),
            docs: Mutex::new(BTreeMap::new()),
            log: Mutex::new(Vec::new()),
            positions,
            clustering_delay: None,
            granularity: 1,
            latency: None,
            fail_queries: AtomicBool::new(false),
            fail_appends: AtomicBool::new(false),
            conflicts_remaining: AtomicU32::new(0),
            document_queries: AtomicUsize::new(0),
            log_queries: AtomicUsize::new(0),
        }
    }

    pub fn positions(&self) -> Arc<AtomicI64> {
        self.positions.clone()
    }

    pub fn clustered(mut self, delay: Duration) -> Self {
        self.clustering_delay = Some(delay);
        self
    }

    pub fn with_granularity(mut self, granularity: u64) -> Self {
        self.granularity = granularity;
        self
    }

    /// Delays every audit trail read
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Stores `doc`, moved into this repository
    pub fn put(&self, mut doc: Document) {
        doc.repository = self.name.clone();
        self.docs.lock().unwrap().insert(doc.id.clone(), doc);
    }

    pub fn remove(&self, id: &str) {
        self.docs
            .lock()
            .unwrap()
            .remove(&DocumentId::new(id.to_string()).unwrap());
    }

    pub fn doc(&self, id: &str) -> Document {
        self.docs
            .lock()
            .unwrap()
            .get(&DocumentId::new(id.to_string()).unwrap())
            .cloned()
            .unwrap()
    }

    /// Appends a plain document event about `id` at its current path
    pub fn event(&self, id: &str, event: EventKind) -> LogPosition {
        let doc = self.doc(id);
        self.push(LogEntryDraft::for_document(&doc, LogRecord::Document { event }))
    }

    /// Appends `draft` with an explicit timestamp
    pub fn event_at(&self, draft: LogEntryDraft, timestamp: DateTime<Utc>) -> LogPosition {
        self.push(LogEntryDraft { timestamp, ..draft })
    }

    fn push(&self, draft: LogEntryDraft) -> LogPosition {
        let position = LogPosition::new(self.positions.fetch_add(1, Ordering::SeqCst) + 1);
        self.log.lock().unwrap().push(LogEntry {
            position,
            timestamp: draft.timestamp,
            repository: self.name.clone(),
            doc_id: draft.doc_id,
            doc_path: draft.doc_path,
            lifecycle: draft.lifecycle,
            record: draft.record,
        });
        position
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl IRepository for FlakyRepository {
    fn name(&self) -> &RepositoryName {
        &self.name
    }

    async fn query_log(&self, query: &LogQuery) -> Result<Vec<LogEntry>, RepositoryError> {
        self.check()?;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.log_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| query.matches(e))
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn last_position(&self) -> Result<LogPosition, RepositoryError> {
        self.check()?;
        Ok(LogPosition::new(self.positions.load(Ordering::SeqCst)))
    }

    async fn last_position_before(
        &self,
        timestamp: DateTime<Utc>,
    ) -> Result<LogPosition, RepositoryError> {
        self.check()?;
        Ok(self
            .log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.timestamp < timestamp)
            .map(|e| e.position)
            .max()
            .unwrap_or(LogPosition::ZERO))
    }

    async fn get_document(
        &self,
        id: &DocumentId,
        principal: &Principal,
    ) -> Result<DocumentLookup, RepositoryError> {
        self.check()?;
        Ok(match self.docs.lock().unwrap().get(id) {
            Some(doc) if doc.readable_by(principal) => DocumentLookup::Found(Box::new(doc.clone())),
            Some(_) => DocumentLookup::AccessDenied,
            None => DocumentLookup::NotFound,
        })
    }

    async fn query_documents(
        &self,
        query: &DocumentQuery,
    ) -> Result<Vec<Document>, RepositoryError> {
        self.check()?;
        self.document_queries.fetch_add(1, Ordering::SeqCst);
        let mut docs: Vec<Document> = self
            .docs
            .lock()
            .unwrap()
            .values()
            .filter(|d| query.matches(d))
            .cloned()
            .collect();
        query.sort(&mut docs);
        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }
        Ok(docs)
    }

    async fn save(&self, doc: &Document) -> Result<Document, RepositoryError> {
        self.check()?;
        let mut docs = self.docs.lock().unwrap();
        let stored = docs
            .get_mut(&doc.id)
            .ok_or_else(|| RepositoryError::NotFound(doc.id.to_string()))?;
        let injected = self
            .conflicts_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected || stored.change_token != doc.change_token {
            return Err(RepositoryError::WriteConflict {
                doc_id: doc.id.clone(),
                expected: doc.change_token,
                actual: stored.change_token,
            });
        }
        *stored = doc.clone();
        stored.change_token += 1;
        Ok(stored.clone())
    }

    async fn create(&self, doc: &Document) -> Result<Document, RepositoryError> {
        self.check()?;
        let mut docs = self.docs.lock().unwrap();
        if let Some(stored) = docs.get(&doc.id) {
            return Err(RepositoryError::WriteConflict {
                doc_id: doc.id.clone(),
                expected: doc.change_token,
                actual: stored.change_token,
            });
        }
        let mut stored = doc.clone();
        stored.repository = self.name.clone();
        docs.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn append_log(&self, draft: LogEntryDraft) -> Result<LogPosition, RepositoryError> {
        self.check()?;
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("audit trail full".to_string()));
        }
        Ok(self.push(draft))
    }

    fn clustering_enabled(&self) -> bool {
        self.clustering_delay.is_some()
    }

    fn clustering_delay(&self) -> Duration {
        self.clustering_delay.unwrap_or(Duration::ZERO)
    }

    fn clock_granularity(&self) -> u64 {
        self.granularity
    }
}
