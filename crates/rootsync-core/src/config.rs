//! Configuration module for rootsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//! The adapter section is the static snapshot the adapter chain is built from
//! at startup.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{facets, DocPath, ITEM_ID_SEPARATOR};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for rootsync.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub registry: RegistryConfig,
    pub changes: ChangesConfig,
    pub adapters: AdaptersConfig,
    pub repositories: Vec<RepositoryConfig>,
    pub collections: CollectionsConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// Synchronization root registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Seconds a principal's root set stays cached.
    pub cache_ttl_secs: u64,
    /// Maximum number of principals kept in the cache.
    pub cache_max_entries: usize,
    /// Attempts made to save a registration before giving up on write conflicts.
    pub write_retries: u32,
    /// Base delay of the exponential backoff between attempts (in ms).
    pub retry_base_delay_ms: u64,
}

/// Change summary settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangesConfig {
    /// Entry limit used when the caller does not give one.
    pub default_limit: usize,
    /// Poll timeout in seconds; `None` disables it.
    pub poll_timeout_secs: Option<u64>,
}

/// Adapter kinds available to the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// Synchronization roots
    SyncRootFolder,
    /// Collections registered as synchronization roots
    CollectionSyncRoot,
    /// Plain folders and files
    DefaultItem,
}

/// What an adapter entry is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum BindingConfig {
    Unconditional,
    DocType(String),
    Facet(String),
}

/// One adapter of the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterEntry {
    /// Name written as the first segment of item ids.
    pub name: String,
    pub kind: AdapterKind,
    pub binding: BindingConfig,
    /// Lower values are tried first.
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Top-level folder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopLevelConfig {
    /// Adapter name of the synthesized root folder.
    pub adapter_name: String,
    /// Name shown for the root folder.
    pub title: String,
    /// Document path the root folder is anchored on, if any.
    pub anchor_path: Option<String>,
}

/// Shape of the tree below the top-level folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyKind {
    /// Roots are direct children of the top-level folder
    Flat,
    /// The principal's workspace fills the top-level folder, roots sit in
    /// a "My synchronized folders" child
    UserWorkspace,
    /// Roots split between "My Docs" and "Other Docs" by whether they lie
    /// in the principal's workspace
    Permission,
}

/// Top-level hierarchy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyConfig {
    pub kind: HierarchyKind,
    /// Parent path of the per-principal workspaces.
    pub user_workspaces_path: String,
}

/// Adapter chain settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptersConfig {
    pub top_level: TopLevelConfig,
    pub hierarchy: HierarchyConfig,
    pub entries: Vec<AdapterEntry>,
    /// Blob providers whose content cannot be updated; files stored there
    /// are not synchronized.
    pub readonly_blob_providers: Vec<String>,
}

/// Per-repository settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub name: String,
    #[serde(default)]
    pub clustering_enabled: bool,
    /// Worst-case replication delay between cluster nodes (in ms).
    #[serde(default)]
    pub clustering_delay_ms: u64,
    /// Granularity of log positions derived from the repository clock.
    #[serde(default = "default_granularity")]
    pub clock_granularity: u64,
    /// Drop subscriptions from copied documents, so that copying a root
    /// does not create another one.
    #[serde(default)]
    pub reset_roots_on_copy: bool,
}

fn default_granularity() -> u64 {
    1
}

impl RepositoryConfig {
    /// Clustering delay as a [`Duration`].
    pub fn clustering_delay(&self) -> Duration {
        Duration::from_millis(self.clustering_delay_ms)
    }
}

/// Per-principal collections managed by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionsConfig {
    /// Parent path of the per-principal collection containers.
    pub container_path: String,
    /// Title of the collection files opened for local edition are added to.
    pub locally_edited_title: String,
}

/// Reference repository storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database.
    pub database_path: PathBuf,
    /// Connections kept open against the database file.
    pub max_connections: u32,
    /// How long a writer waits on a locked database (in ms).
    pub busy_timeout_ms: u64,
}

impl StoreConfig {
    /// Busy timeout as a [`Duration`].
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/rootsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("rootsync")
            .join("config.yaml")
    }

    /// Settings of the repository named `name`, if configured.
    pub fn repository(&self, name: &str) -> Option<&RepositoryConfig> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// Poll timeout as a [`Duration`], if enabled.
    pub fn poll_timeout(&self) -> Option<Duration> {
        self.changes.poll_timeout_secs.map(Duration::from_secs)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for Config {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            changes: ChangesConfig::default(),
            adapters: AdaptersConfig::default(),
            repositories: vec![RepositoryConfig::default()],
            collections: CollectionsConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 600,
            cache_max_entries: 10_000,
            write_retries: 3,
            retry_base_delay_ms: 100,
        }
    }
}

impl Default for ChangesConfig {
    fn default() -> Self {
        Self {
            default_limit: 1000,
            poll_timeout_secs: None,
        }
    }
}

impl Default for TopLevelConfig {
    fn default() -> Self {
        Self {
            adapter_name: "topLevelFolderItemFactory".to_string(),
            title: "Sync roots".to_string(),
            anchor_path: None,
        }
    }
}

impl Default for AdaptersConfig {
    fn default() -> Self {
        Self {
            top_level: TopLevelConfig::default(),
            hierarchy: HierarchyConfig::default(),
            entries: vec![
                AdapterEntry {
                    name: "collectionSyncRootFolderItemFactory".to_string(),
                    kind: AdapterKind::CollectionSyncRoot,
                    binding: BindingConfig::Facet(facets::COLLECTION.to_string()),
                    priority: 0,
                    enabled: true,
                },
                AdapterEntry {
                    name: "defaultSyncRootFolderItemFactory".to_string(),
                    kind: AdapterKind::SyncRootFolder,
                    binding: BindingConfig::Facet(facets::SYNC_ROOT.to_string()),
                    priority: 10,
                    enabled: true,
                },
                AdapterEntry {
                    name: "defaultFileSystemItemFactory".to_string(),
                    kind: AdapterKind::DefaultItem,
                    binding: BindingConfig::Unconditional,
                    priority: 50,
                    enabled: true,
                },
            ],
            readonly_blob_providers: Vec::new(),
        }
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            clustering_enabled: false,
            clustering_delay_ms: 0,
            clock_granularity: 1,
            reset_roots_on_copy: false,
        }
    }
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            kind: HierarchyKind::Flat,
            user_workspaces_path: "/UserWorkspaces".to_string(),
        }
    }
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            container_path: "/UserCollections".to_string(),
            locally_edited_title: "Locally Edited".to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("rootsync")
                .join("rootsync.db"),
            max_connections: 4,
            busy_timeout_ms: 5000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"registry.cache_ttl_secs"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Checks a name used as an item id segment.
fn check_segment(field: &str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.trim().is_empty() {
        errors.push(ValidationError::new(field, "must not be empty"));
    } else if value.contains(ITEM_ID_SEPARATOR) {
        errors.push(ValidationError::new(
            field,
            format!("must not contain '{ITEM_ID_SEPARATOR}'"),
        ));
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- registry ---
        if self.registry.cache_ttl_secs == 0 {
            errors.push(ValidationError::new(
                "registry.cache_ttl_secs",
                "must be greater than 0",
            ));
        }
        if self.registry.cache_max_entries == 0 {
            errors.push(ValidationError::new(
                "registry.cache_max_entries",
                "must be greater than 0",
            ));
        }
        if self.registry.write_retries == 0 || self.registry.write_retries > 10 {
            errors.push(ValidationError::new(
                "registry.write_retries",
                "must be in range 1..=10",
            ));
        }

        // --- changes ---
        if self.changes.default_limit == 0 {
            errors.push(ValidationError::new(
                "changes.default_limit",
                "must be greater than 0",
            ));
        }
        if self.changes.poll_timeout_secs == Some(0) {
            errors.push(ValidationError::new(
                "changes.poll_timeout_secs",
                "must be greater than 0 when set",
            ));
        }

        // --- adapters ---
        check_segment(
            "adapters.top_level.adapter_name",
            &self.adapters.top_level.adapter_name,
            &mut errors,
        );
        if let Some(anchor) = &self.adapters.top_level.anchor_path {
            if DocPath::new(anchor.clone()).is_err() {
                errors.push(ValidationError::new(
                    "adapters.top_level.anchor_path",
                    format!("not an absolute document path: {anchor}"),
                ));
            }
        }
        if DocPath::new(self.adapters.hierarchy.user_workspaces_path.clone()).is_err() {
            errors.push(ValidationError::new(
                "adapters.hierarchy.user_workspaces_path",
                format!(
                    "not an absolute document path: {}",
                    self.adapters.hierarchy.user_workspaces_path
                ),
            ));
        }
        let mut names = HashSet::new();
        names.insert(self.adapters.top_level.adapter_name.as_str());
        for (i, entry) in self.adapters.entries.iter().enumerate() {
            let field = format!("adapters.entries[{i}].name");
            check_segment(&field, &entry.name, &mut errors);
            if !names.insert(entry.name.as_str()) {
                errors.push(ValidationError::new(
                    field,
                    format!("duplicate adapter name '{}'", entry.name),
                ));
            }
            match &entry.binding {
                BindingConfig::DocType(v) | BindingConfig::Facet(v) if v.trim().is_empty() => {
                    errors.push(ValidationError::new(
                        format!("adapters.entries[{i}].binding"),
                        "binding value must not be empty",
                    ));
                }
                _ => {}
            }
        }
        if !self
            .adapters
            .entries
            .iter()
            .any(|e| e.enabled && e.kind == AdapterKind::SyncRootFolder)
        {
            errors.push(ValidationError::new(
                "adapters.entries",
                "at least one enabled sync_root_folder adapter is required",
            ));
        }

        // --- repositories ---
        if self.repositories.is_empty() {
            errors.push(ValidationError::new(
                "repositories",
                "at least one repository is required",
            ));
        }
        let mut repo_names = HashSet::new();
        for (i, repo) in self.repositories.iter().enumerate() {
            let field = format!("repositories[{i}].name");
            check_segment(&field, &repo.name, &mut errors);
            if !repo_names.insert(repo.name.as_str()) {
                errors.push(ValidationError::new(
                    field,
                    format!("duplicate repository '{}'", repo.name),
                ));
            }
            if repo.clock_granularity == 0 {
                errors.push(ValidationError::new(
                    format!("repositories[{i}].clock_granularity"),
                    "must be greater than 0",
                ));
            }
            if repo.clustering_enabled && repo.clustering_delay_ms == 0 {
                errors.push(ValidationError::new(
                    format!("repositories[{i}].clustering_delay_ms"),
                    "must be greater than 0 when clustering is enabled",
                ));
            }
        }

        // --- collections ---
        if DocPath::new(self.collections.container_path.clone()).is_err() {
            errors.push(ValidationError::new(
                "collections.container_path",
                format!(
                    "not an absolute document path: {}",
                    self.collections.container_path
                ),
            ));
        }
        let title = &self.collections.locally_edited_title;
        if title.trim().is_empty() || title.contains('/') {
            errors.push(ValidationError::new(
                "collections.locally_edited_title",
                "must be a non-empty document name",
            ));
        }

        // --- store ---
        if self.store.max_connections == 0 {
            errors.push(ValidationError::new(
                "store.max_connections",
                "must be greater than 0",
            ));
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError::new(
                "logging.level",
                format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            ));
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`Config`].
///
/// ```
/// use rootsync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .registry_cache_ttl_secs(60)
///     .changes_default_limit(500)
///     .logging_level("debug")
///     .build();
/// assert_eq!(config.changes.default_limit, 500);
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- registry ---

    pub fn registry_cache_ttl_secs(mut self, seconds: u64) -> Self {
        self.config.registry.cache_ttl_secs = seconds;
        self
    }

    pub fn registry_cache_max_entries(mut self, n: usize) -> Self {
        self.config.registry.cache_max_entries = n;
        self
    }

    pub fn registry_write_retries(mut self, n: u32) -> Self {
        self.config.registry.write_retries = n;
        self
    }

    pub fn registry_retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.registry.retry_base_delay_ms = ms;
        self
    }

    // --- changes ---

    pub fn changes_default_limit(mut self, limit: usize) -> Self {
        self.config.changes.default_limit = limit;
        self
    }

    pub fn changes_poll_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.changes.poll_timeout_secs = Some(seconds);
        self
    }

    // --- adapters ---

    pub fn top_level_title(mut self, title: impl Into<String>) -> Self {
        self.config.adapters.top_level.title = title.into();
        self
    }

    pub fn top_level_anchor_path(mut self, path: impl Into<String>) -> Self {
        self.config.adapters.top_level.anchor_path = Some(path.into());
        self
    }

    pub fn hierarchy(mut self, kind: HierarchyKind) -> Self {
        self.config.adapters.hierarchy.kind = kind;
        self
    }

    pub fn user_workspaces_path(mut self, path: impl Into<String>) -> Self {
        self.config.adapters.hierarchy.user_workspaces_path = path.into();
        self
    }

    pub fn adapter_entry(mut self, entry: AdapterEntry) -> Self {
        self.config.adapters.entries.push(entry);
        self
    }

    pub fn readonly_blob_provider(mut self, provider: impl Into<String>) -> Self {
        self.config
            .adapters
            .readonly_blob_providers
            .push(provider.into());
        self
    }

    // --- repositories ---

    /// Adds a repository, replacing any existing one with the same name.
    pub fn repository(mut self, repo: RepositoryConfig) -> Self {
        self.config.repositories.retain(|r| r.name != repo.name);
        self.config.repositories.push(repo);
        self
    }

    // --- collections ---

    pub fn collections_container_path(mut self, path: impl Into<String>) -> Self {
        self.config.collections.container_path = path.into();
        self
    }

    pub fn locally_edited_title(mut self, title: impl Into<String>) -> Self {
        self.config.collections.locally_edited_title = title.into();
        self
    }

    // --- store ---

    pub fn store_database_path(mut self, path: PathBuf) -> Self {
        self.config.store.database_path = path;
        self
    }

    pub fn store_max_connections(mut self, max: u32) -> Self {
        self.config.store.max_connections = max;
        self
    }

    pub fn store_busy_timeout_ms(mut self, ms: u64) -> Self {
        self.config.store.busy_timeout_ms = ms;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
