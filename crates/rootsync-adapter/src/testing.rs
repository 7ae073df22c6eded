//! In-memory repository used by unit tests

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rootsync_core::domain::{
    facets, Blob, DocPath, Document, DocumentId, LogEntry, LogPosition, Principal, RepositoryName,
};
use rootsync_core::ports::{
    DocumentLookup, DocumentQuery, IRepository, LogEntryDraft, LogQuery, RepositoryError,
};

pub fn principal(name: &str) -> Principal {
    Principal::new(name.to_string()).unwrap()
}

pub fn folder(id: &str, path: &str, parent: Option<&str>) -> Document {
    let mut doc = Document::new(
        DocumentId::new(id.to_string()).unwrap(),
        RepositoryName::new("default".to_string()).unwrap(),
        DocPath::new(path.to_string()).unwrap(),
        "Folder",
    )
    .with_facet(facets::FOLDERISH);
    doc.parent_id = parent.map(|p| DocumentId::new(p.to_string()).unwrap());
    doc
}

pub fn file(id: &str, path: &str, parent: Option<&str>) -> Document {
    let mut doc = Document::new(
        DocumentId::new(id.to_string()).unwrap(),
        RepositoryName::new("default".to_string()).unwrap(),
        DocPath::new(path.to_string()).unwrap(),
        "File",
    )
    .with_blob(Blob {
        name: format!("{id}.txt"),
        digest: format!("digest-{id}"),
        length: 3,
        provider: None,
    });
    doc.parent_id = parent.map(|p| DocumentId::new(p.to_string()).unwrap());
    doc
}

pub struct MemoryRepository {
    name: RepositoryName,
    docs: Mutex<BTreeMap<DocumentId, Document>>,
    log: Mutex<Vec<LogEntry>>,
}

impl MemoryRepository {
    pub fn new(name: &str) -> Self {
        Self {
            name: RepositoryName::new(name.to_string()).unwrap(),
            docs: Mutex::new(BTreeMap::new()),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn put(&self, doc: Document) {
        self.docs.lock().unwrap().insert(doc.id.clone(), doc);
    }

    pub fn doc(&self, id: &str) -> Document {
        self.docs
            .lock()
            .unwrap()
            .get(&DocumentId::new(id.to_string()).unwrap())
            .cloned()
            .unwrap()
    }
}

#[async_trait]
impl IRepository for MemoryRepository {
    fn name(&self) -> &RepositoryName {
        &self.name
    }

    async fn query_log(&self, query: &LogQuery) -> Result<Vec<LogEntry>, RepositoryError> {
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
        Ok(self
            .log
            .lock()
            .unwrap()
            .last()
            .map(|e| e.position)
            .unwrap_or(LogPosition::ZERO))
    }

    async fn last_position_before(
        &self,
        timestamp: DateTime<Utc>,
    ) -> Result<LogPosition, RepositoryError> {
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
        let mut docs = self.docs.lock().unwrap();
        let stored = docs
            .get_mut(&doc.id)
            .ok_or_else(|| RepositoryError::NotFound(doc.id.to_string()))?;
        if stored.change_token != doc.change_token {
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
        let mut docs = self.docs.lock().unwrap();
        if docs.contains_key(&doc.id) {
            return Err(RepositoryError::WriteConflict {
                doc_id: doc.id.clone(),
                expected: doc.change_token,
                actual: doc.change_token,
            });
        }
        docs.insert(doc.id.clone(), doc.clone());
        Ok(doc.clone())
    }

    async fn append_log(&self, draft: LogEntryDraft) -> Result<LogPosition, RepositoryError> {
        let mut log = self.log.lock().unwrap();
        let position = LogPosition::new(log.len() as i64 + 1);
        log.push(LogEntry {
            position,
            timestamp: draft.timestamp,
            repository: self.name.clone(),
            doc_id: draft.doc_id,
            doc_path: draft.doc_path,
            lifecycle: draft.lifecycle,
            record: draft.record,
        });
        Ok(position)
    }

    fn clustering_enabled(&self) -> bool {
        false
    }

    fn clustering_delay(&self) -> Duration {
        Duration::ZERO
    }
}
