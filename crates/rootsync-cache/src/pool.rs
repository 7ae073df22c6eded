//! SQLite store backing the reference repositories
//!
//! Every configured repository shares one database, and with it the audit
//! trail, so log positions are global across repositories. Opening the
//! store applies the pending schema migrations, tracked through
//! `PRAGMA user_version`.

use std::path::Path;
use std::str::FromStr;

use rootsync_core::config::{RepositoryConfig, StoreConfig};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::{CacheError, SqliteRepository};

/// Schema migrations, applied in order; the number is the schema version
const MIGRATIONS: &[(i64, &str)] = &[
    (1, include_str!("migrations/20261001_initial.sql")),
    (2, include_str!("migrations/20261012_audit_event_index.sql")),
];

/// Shared SQLite store
///
/// File databases run in WAL mode so that polls read while authoring
/// commands write. An in-memory store keeps a single connection, which
/// holds the whole database.
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens the store described by `config`
    ///
    /// Parent directories and the database file are created when missing.
    ///
    /// # Errors
    ///
    /// `CacheError::ConnectionFailed` when the file cannot be opened,
    /// `CacheError::MigrationFailed` when the schema cannot be brought up
    /// to date.
    pub async fn open(config: &StoreConfig) -> Result<Self, CacheError> {
        let path = config.database_path.as_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout());
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to open database {}: {}",
                    path.display(),
                    e
                ))
            })?;

        let store = Self { pool };
        let version = store.migrate().await?;
        tracing::info!(
            path = %path.display(),
            max_connections = config.max_connections,
            schema_version = version,
            "Opened repository store"
        );
        Ok(store)
    }

    /// Opens a store at `path` with default pool settings
    pub async fn at(path: &Path) -> Result<Self, CacheError> {
        Self::open(&StoreConfig {
            database_path: path.to_path_buf(),
            ..StoreConfig::default()
        })
        .await
    }

    /// Creates a throwaway in-memory store
    pub async fn in_memory() -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;
        // Dropping the only connection would drop the database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("Failed to create in-memory database: {}", e))
            })?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!("Opened in-memory repository store");
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Attaches the repository described by `config` to this store
    pub fn repository(&self, config: &RepositoryConfig) -> Result<SqliteRepository, CacheError> {
        SqliteRepository::from_config(self.pool.clone(), config)
    }

    /// Version of the applied schema
    pub async fn schema_version(&self) -> Result<i64, CacheError> {
        Ok(sqlx::query_scalar::<_, i64>("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?)
    }

    /// Applies the migrations newer than the stored schema version
    async fn migrate(&self) -> Result<i64, CacheError> {
        let mut current = self.schema_version().await?;
        for (version, sql) in MIGRATIONS.iter().filter(move |(v, _)| *v > current) {
            let failed = |e: sqlx::Error| {
                CacheError::MigrationFailed(format!("schema version {}: {}", version, e))
            };
            let mut tx = self.pool.begin().await.map_err(failed)?;
            sqlx::raw_sql(sql).execute(&mut *tx).await.map_err(failed)?;
            let bump = format!("PRAGMA user_version = {}", version);
            sqlx::raw_sql(&bump).execute(&mut *tx).await.map_err(failed)?;
            tx.commit().await.map_err(failed)?;
            tracing::debug!(version, "Applied schema migration");
            current = *version;
        }
        Ok(current)
    }
}
