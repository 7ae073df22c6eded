//! SQLite implementation of IRepository
//!
//! This module provides the concrete SQLite-based implementation of the
//! repository port defined in rootsync-core. It handles all domain type
//! serialization/deserialization and SQL query construction.
//!
//! ## Type Mapping
//!
//! | Domain Type              | SQL Type | Strategy                                   |
//! |--------------------------|----------|--------------------------------------------|
//! | DocumentId, RepositoryName | TEXT   | String via `.as_str()` / `::new()`         |
//! | DocPath                  | TEXT     | String via `.as_str()` / `DocPath::new()`  |
//! | LogPosition              | INTEGER  | `AUTOINCREMENT` rowid                      |
//! | DateTime<Utc>            | TEXT     | RFC 3339, microseconds, `Z` suffix         |
//! | Document                 | TEXT     | serde_json serialization                   |
//! | LogRecord                | TEXT     | serde_json serialization                   |
//!
//! Timestamps are written at a fixed width so that string comparison
//! orders them chronologically.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use rootsync_core::config::RepositoryConfig;
use rootsync_core::domain::{
    DocPath, Document, DocumentId, LifecycleState, LogEntry, LogPosition, LogRecord, Principal,
    RepositoryName,
};
use rootsync_core::ports::{
    DocumentLookup, DocumentQuery, IRepository, LogEntryDraft, LogQuery, RepositoryError,
};

use crate::CacheError;

/// Rows read per round trip when scanning the audit trail
const LOG_PAGE_SIZE: i64 = 500;

/// SQLite-based implementation of the repository port
///
/// Several repositories may share one pool: documents are partitioned by
/// repository name while the audit trail, and therefore log positions, is
/// shared.
pub struct SqliteRepository {
    pub(crate) pool: SqlitePool,
    name: RepositoryName,
    clustering_enabled: bool,
    clustering_delay: Duration,
    clock_granularity: u64,
    reset_roots_on_copy: bool,
}

impl SqliteRepository {
    /// Creates a non-clustered repository with the given connection pool
    pub fn new(pool: SqlitePool, name: RepositoryName) -> Self {
        Self {
            pool,
            name,
            clustering_enabled: false,
            clustering_delay: Duration::ZERO,
            clock_granularity: 1,
            reset_roots_on_copy: false,
        }
    }

    /// Creates a repository described by a configuration entry
    pub fn from_config(pool: SqlitePool, config: &RepositoryConfig) -> Result<Self, CacheError> {
        let name = RepositoryName::new(config.name.clone()).map_err(|e| {
            CacheError::SerializationError(format!("Invalid repository name: {}", e))
        })?;
        let mut repo = Self::new(pool, name)
            .with_clock_granularity(config.clock_granularity)
            .with_reset_roots_on_copy(config.reset_roots_on_copy);
        if config.clustering_enabled {
            repo = repo.with_clustering(config.clustering_delay());
        }
        Ok(repo)
    }

    /// Marks the repository as clustered with the given replication delay
    pub fn with_clustering(mut self, delay: Duration) -> Self {
        self.clustering_enabled = true;
        self.clustering_delay = delay;
        self
    }

    /// Sets the granularity of log positions
    pub fn with_clock_granularity(mut self, granularity: u64) -> Self {
        self.clock_granularity = granularity.max(1);
        self
    }

    /// Makes copies drop the subscriptions of the copied documents
    pub fn with_reset_roots_on_copy(mut self, reset: bool) -> Self {
        self.reset_roots_on_copy = reset;
        self
    }

    pub fn resets_roots_on_copy(&self) -> bool {
        self.reset_roots_on_copy
    }

    /// Returns a reference to the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ========================================================================
    // Storage primitives shared with the authoring helpers
    // ========================================================================

    /// Loads a document regardless of who reads it
    pub(crate) async fn load(&self, id: &DocumentId) -> Result<Option<Document>, CacheError> {
        let row = sqlx::query(
            "SELECT change_token, data FROM documents WHERE repository = ? AND id = ?",
        )
        .bind(self.name.as_str())
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(document_from_row).transpose()
    }

    /// Loads every document of the repository
    pub(crate) async fn load_all(&self) -> Result<Vec<Document>, CacheError> {
        let rows = sqlx::query("SELECT change_token, data FROM documents WHERE repository = ?")
            .bind(self.name.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(document_from_row).collect()
    }

    /// Inserts a new document
    pub(crate) async fn insert(&self, doc: &Document) -> Result<(), CacheError> {
        let data = document_to_json(doc)?;
        sqlx::query(
            "INSERT INTO documents (repository, id, parent_id, path, change_token, data) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(self.name.as_str())
        .bind(doc.id.as_str())
        .bind(doc.parent_id.as_ref().map(|p| p.as_str()))
        .bind(doc.path.as_str())
        .bind(doc.change_token as i64)
        .bind(&data)
        .execute(&self.pool)
        .await?;

        tracing::trace!(doc_id = %doc.id, path = %doc.path, "Inserted document");
        Ok(())
    }

    /// Overwrites a document without a concurrency check and returns it
    /// with its new change token
    pub(crate) async fn overwrite(&self, doc: &Document) -> Result<Document, CacheError> {
        let data = document_to_json(doc)?;
        sqlx::query(
            "UPDATE documents SET parent_id = ?, path = ?, data = ?, \
             change_token = change_token + 1 WHERE repository = ? AND id = ?",
        )
        .bind(doc.parent_id.as_ref().map(|p| p.as_str()))
        .bind(doc.path.as_str())
        .bind(&data)
        .bind(self.name.as_str())
        .bind(doc.id.as_str())
        .execute(&self.pool)
        .await?;

        self.load(&doc.id).await?.ok_or_else(|| {
            CacheError::QueryFailed(format!("Document {} vanished during update", doc.id))
        })
    }

    /// Deletes a document row
    pub(crate) async fn delete(&self, id: &DocumentId) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM documents WHERE repository = ? AND id = ?")
            .bind(self.name.as_str())
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        tracing::trace!(doc_id = %id, "Deleted document");
        Ok(())
    }

    /// Appends an audit entry
    pub(crate) async fn insert_log(&self, draft: &LogEntryDraft) -> Result<LogPosition, CacheError> {
        let record = serde_json::to_string(&draft.record).map_err(|e| {
            CacheError::SerializationError(format!("Failed to serialize log record: {}", e))
        })?;

        let result = sqlx::query(
            "INSERT INTO audit_log \
             (timestamp, repository, doc_id, doc_path, lifecycle, category, event, record) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(format_datetime(&draft.timestamp))
        .bind(self.name.as_str())
        .bind(draft.doc_id.as_str())
        .bind(draft.doc_path.as_str())
        .bind(draft.lifecycle.as_str())
        .bind(draft.record.category().to_string())
        .bind(draft.record.event().as_str())
        .bind(&record)
        .execute(&self.pool)
        .await?;

        let position = LogPosition::new(result.last_insert_rowid());
        tracing::trace!(
            doc_id = %draft.doc_id,
            event = %draft.record.event(),
            position = %position,
            "Appended audit entry"
        );
        Ok(position)
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Format a timestamp at fixed width
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a DateTime<Utc> from an RFC 3339 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

fn document_to_json(doc: &Document) -> Result<String, CacheError> {
    serde_json::to_string(doc)
        .map_err(|e| CacheError::SerializationError(format!("Failed to serialize document: {}", e)))
}

// ============================================================================
// Row mapping functions
// ============================================================================

/// Reconstruct a Document from a database row
///
/// The `change_token` column is authoritative over the serialized copy.
fn document_from_row(row: &SqliteRow) -> Result<Document, CacheError> {
    let change_token: i64 = row.get("change_token");
    let data: String = row.get("data");

    let mut doc: Document = serde_json::from_str(&data)
        .map_err(|e| CacheError::SerializationError(format!("Invalid document JSON: {}", e)))?;
    doc.change_token = change_token as u64;
    Ok(doc)
}

/// Reconstruct a LogEntry from a database row
fn log_entry_from_row(row: &SqliteRow) -> Result<LogEntry, CacheError> {
    let position: i64 = row.get("position");
    let timestamp_str: String = row.get("timestamp");
    let repository_str: String = row.get("repository");
    let doc_id_str: String = row.get("doc_id");
    let doc_path_str: String = row.get("doc_path");
    let lifecycle_str: String = row.get("lifecycle");
    let record_str: String = row.get("record");

    let repository = RepositoryName::new(repository_str.clone()).map_err(|e| {
        CacheError::SerializationError(format!("Invalid repository '{}': {}", repository_str, e))
    })?;
    let doc_id = DocumentId::new(doc_id_str.clone()).map_err(|e| {
        CacheError::SerializationError(format!("Invalid DocumentId '{}': {}", doc_id_str, e))
    })?;
    let doc_path = DocPath::new(doc_path_str.clone()).map_err(|e| {
        CacheError::SerializationError(format!("Invalid DocPath '{}': {}", doc_path_str, e))
    })?;
    let record: LogRecord = serde_json::from_str(&record_str)
        .map_err(|e| CacheError::SerializationError(format!("Invalid log record JSON: {}", e)))?;

    Ok(LogEntry {
        position: LogPosition::new(position),
        timestamp: parse_datetime(&timestamp_str)?,
        repository,
        doc_id,
        doc_path,
        lifecycle: LifecycleState::from(lifecycle_str),
        record,
    })
}

// ============================================================================
// IRepository implementation
// ============================================================================

#[async_trait::async_trait]
impl IRepository for SqliteRepository {
    fn name(&self) -> &RepositoryName {
        &self.name
    }

    async fn query_log(&self, query: &LogQuery) -> Result<Vec<LogEntry>, RepositoryError> {
        let mut entries = Vec::new();
        if query.limit == 0 {
            return Ok(entries);
        }

        // Relevance is decided by LogQuery::matches; SQL only narrows the window.
        let mut cursor = query.lower;
        loop {
            let rows = sqlx::query(
                "SELECT * FROM audit_log WHERE repository = ? AND position > ? AND position <= ? \
                 ORDER BY position ASC LIMIT ?",
            )
            .bind(self.name.as_str())
            .bind(cursor.as_i64())
            .bind(query.upper.as_i64())
            .bind(LOG_PAGE_SIZE)
            .fetch_all(&self.pool)
            .await
            .map_err(CacheError::from)?;

            for row in &rows {
                let entry = log_entry_from_row(row)?;
                cursor = entry.position;
                if query.matches(&entry) {
                    entries.push(entry);
                    if entries.len() >= query.limit {
                        return Ok(entries);
                    }
                }
            }

            if (rows.len() as i64) < LOG_PAGE_SIZE {
                break;
            }
        }

        Ok(entries)
    }

    async fn last_position(&self) -> Result<LogPosition, RepositoryError> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(position) FROM audit_log")
            .fetch_one(&self.pool)
            .await
            .map_err(CacheError::from)?;
        Ok(max.map(LogPosition::new).unwrap_or(LogPosition::ZERO))
    }

    async fn last_position_before(
        &self,
        timestamp: DateTime<Utc>,
    ) -> Result<LogPosition, RepositoryError> {
        let max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(position) FROM audit_log WHERE timestamp < ?")
                .bind(format_datetime(&timestamp))
                .fetch_one(&self.pool)
                .await
                .map_err(CacheError::from)?;
        Ok(max.map(LogPosition::new).unwrap_or(LogPosition::ZERO))
    }

    async fn get_document(
        &self,
        id: &DocumentId,
        principal: &Principal,
    ) -> Result<DocumentLookup, RepositoryError> {
        Ok(match self.load(id).await? {
            Some(doc) if doc.readable_by(principal) => DocumentLookup::Found(Box::new(doc)),
            Some(_) => DocumentLookup::AccessDenied,
            None => DocumentLookup::NotFound,
        })
    }

    async fn query_documents(
        &self,
        query: &DocumentQuery,
    ) -> Result<Vec<Document>, RepositoryError> {
        let rows = match &query.parent {
            Some(parent) => {
                sqlx::query(
                    "SELECT change_token, data FROM documents \
                     WHERE repository = ? AND parent_id = ?",
                )
                .bind(self.name.as_str())
                .bind(parent.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT change_token, data FROM documents WHERE repository = ?")
                    .bind(self.name.as_str())
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(CacheError::from)?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in &rows {
            let doc = document_from_row(row)?;
            if query.matches(&doc) {
                docs.push(doc);
            }
        }
        query.sort(&mut docs);
        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }
        Ok(docs)
    }

    async fn save(&self, doc: &Document) -> Result<Document, RepositoryError> {
        let data = document_to_json(doc)?;
        let result = sqlx::query(
            "UPDATE documents SET parent_id = ?, path = ?, data = ?, \
             change_token = change_token + 1 \
             WHERE repository = ? AND id = ? AND change_token = ?",
        )
        .bind(doc.parent_id.as_ref().map(|p| p.as_str()))
        .bind(doc.path.as_str())
        .bind(&data)
        .bind(self.name.as_str())
        .bind(doc.id.as_str())
        .bind(doc.change_token as i64)
        .execute(&self.pool)
        .await
        .map_err(CacheError::from)?;

        if result.rows_affected() == 0 {
            let actual: Option<i64> = sqlx::query_scalar(
                "SELECT change_token FROM documents WHERE repository = ? AND id = ?",
            )
            .bind(self.name.as_str())
            .bind(doc.id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(CacheError::from)?;

            return Err(match actual {
                Some(actual) => RepositoryError::WriteConflict {
                    doc_id: doc.id.clone(),
                    expected: doc.change_token,
                    actual: actual as u64,
                },
                None => RepositoryError::NotFound(doc.id.to_string()),
            });
        }

        let mut saved = doc.clone();
        saved.change_token += 1;
        tracing::trace!(doc_id = %doc.id, change_token = saved.change_token, "Saved document");
        Ok(saved)
    }

    async fn create(&self, doc: &Document) -> Result<Document, RepositoryError> {
        if let Some(stored) = self.load(&doc.id).await? {
            return Err(RepositoryError::WriteConflict {
                doc_id: doc.id.clone(),
                expected: doc.change_token,
                actual: stored.change_token,
            });
        }
        let mut stored = doc.clone();
        stored.repository = self.name.clone();
        stored.change_token = 0;
        self.insert(&stored).await?;
        Ok(stored)
    }

    async fn append_log(&self, draft: LogEntryDraft) -> Result<LogPosition, RepositoryError> {
        Ok(self.insert_log(&draft).await?)
    }

    fn clustering_enabled(&self) -> bool {
        self.clustering_enabled
    }

    fn clustering_delay(&self) -> Duration {
        self.clustering_delay
    }

    fn clock_granularity(&self) -> u64 {
        self.clock_granularity
    }
}
