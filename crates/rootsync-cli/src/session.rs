//! Wiring shared by the commands that touch the repository
//!
//! Opens the SQLite database, attaches one repository per configuration
//! entry and builds the drive service on top of them.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rootsync_cache::{DatabasePool, SqliteRepository};
use rootsync_core::config::Config;
use rootsync_core::domain::RepositoryName;
use rootsync_core::ports::{IRepository, RepositoryManager};
use rootsync_sync::DriveService;
use tracing::debug;

pub struct Session {
    pub config: Config,
    pub service: DriveService,
    repositories: Vec<Arc<SqliteRepository>>,
}

impl Session {
    /// Loads the configuration at `config_path` and opens the database
    ///
    /// A missing configuration file means defaults. `db` overrides the
    /// configured database path.
    pub async fn open(config_path: &Path, db: Option<&Path>) -> Result<Self> {
        let config = load_config(config_path)?;
        let mut store = config.store.clone();
        if let Some(db) = db {
            store.database_path = db.to_path_buf();
        }
        let pool = DatabasePool::open(&store)
            .await
            .with_context(|| format!("Failed to open database {}", store.database_path.display()))?;
        Self::with_pool(config, &pool)
    }

    pub fn with_pool(config: Config, pool: &DatabasePool) -> Result<Self> {
        let mut manager = RepositoryManager::new();
        let mut repositories = Vec::with_capacity(config.repositories.len());
        for entry in &config.repositories {
            let repo = Arc::new(
                pool.repository(entry)
                    .with_context(|| format!("Invalid repository '{}'", entry.name))?,
            );
            manager.insert(repo.clone());
            repositories.push(repo);
        }
        debug!(repositories = repositories.len(), "Attached repositories");

        let service =
            DriveService::from_config(manager, &config).context("Failed to build drive service")?;
        Ok(Self {
            config,
            service,
            repositories,
        })
    }

    /// The SQLite repository named `name`
    pub fn repository(&self, name: &RepositoryName) -> Result<&Arc<SqliteRepository>> {
        match self.repositories.iter().find(|r| r.name() == name) {
            Some(repo) => Ok(repo),
            None => bail!("Unknown repository '{}'", name),
        }
    }
}

/// Loads and validates the configuration, defaulting when the file is absent
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        Config::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?
    } else {
        Config::default()
    };
    let errors = config.validate();
    if !errors.is_empty() {
        let messages: Vec<String> = errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        bail!("Invalid configuration: {}", messages.join("; "));
    }
    Ok(config)
}
