//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for identifiers and values
//! exchanged with the repository and with polling clients. Each newtype
//! ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Separator between the segments of a [`FileSystemItemId`]
pub const ITEM_ID_SEPARATOR: char = '#';

// ============================================================================
// Name-like identifiers
// ============================================================================

/// Validates a name-like identifier: non-blank and, when `forbid_separator`
/// is set, free of the item id separator.
fn validate_name(value: &str, forbid_separator: bool) -> bool {
    !value.trim().is_empty() && !(forbid_separator && value.contains(ITEM_ID_SEPARATOR))
}

/// Opaque identifier of a repository document
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a DocumentId, rejecting blank values and values containing `#`
    pub fn new(value: String) -> Result<Self, DomainError> {
        if validate_name(&value, true) {
            Ok(Self(value))
        } else {
            Err(DomainError::InvalidDocumentId(value))
        }
    }

    /// Get the id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DocumentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocumentId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for DocumentId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Name of a repository (e.g. `default`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryName(String);

impl RepositoryName {
    /// Create a RepositoryName, rejecting blank values and values containing `#`
    pub fn new(value: String) -> Result<Self, DomainError> {
        if validate_name(&value, true) {
            Ok(Self(value))
        } else {
            Err(DomainError::InvalidRepositoryName(value))
        }
    }

    /// Get the name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RepositoryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RepositoryName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RepositoryName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Name of the user (or service account) a request is made on behalf of
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Create a Principal, rejecting blank names
    pub fn new(value: String) -> Result<Self, DomainError> {
        if validate_name(&value, false) {
            Ok(Self(value))
        } else {
            Err(DomainError::InvalidPrincipal(value))
        }
    }

    /// Get the principal name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Principal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Principal {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for Principal {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

// ============================================================================
// Path types
// ============================================================================

/// Absolute, `/`-separated path of a document inside its repository
///
/// The repository root is `/`. Paths never end with a separator (except the
/// root itself) and contain no empty segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocPath(String);

impl DocPath {
    /// Create a DocPath with validation
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidPath` if the path is not absolute,
    /// has a trailing separator or contains empty segments.
    pub fn new(value: String) -> Result<Self, DomainError> {
        if !value.starts_with('/') {
            return Err(DomainError::InvalidPath(value));
        }
        if value != "/" && (value.ends_with('/') || value.contains("//")) {
            return Err(DomainError::InvalidPath(value));
        }
        Ok(Self(value))
    }

    /// The repository root path `/`
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Get the path as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this is the repository root
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Last segment of the path (empty for the root)
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// Parent path, or `None` for the root
    #[must_use]
    pub fn parent(&self) -> Option<DocPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Append a child segment
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidPath` if `name` is empty or contains `/`.
    pub fn join(&self, name: &str) -> Result<DocPath, DomainError> {
        if name.is_empty() || name.contains('/') {
            return Err(DomainError::InvalidPath(format!("{}/{}", self.0, name)));
        }
        if self.is_root() {
            Ok(Self(format!("/{name}")))
        } else {
            Ok(Self(format!("{}/{}", self.0, name)))
        }
    }

    /// Returns true if `self` is `other` or one of its ancestors
    ///
    /// Matching is segment-aware: `/a/b` contains `/a/b/c` but not `/a/bc`.
    #[must_use]
    pub fn contains(&self, other: &DocPath) -> bool {
        if self.is_root() || self.0 == other.0 {
            return true;
        }
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'/'
    }

    /// Returns true if `self` is a strict ancestor of `other`
    #[must_use]
    pub fn is_ancestor_of(&self, other: &DocPath) -> bool {
        self.0 != other.0 && self.contains(other)
    }

    /// Number of segments below the root
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.is_root() {
            0
        } else {
            self.0.matches('/').count()
        }
    }
}

impl Display for DocPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocPath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for DocPath {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DocPath> for String {
    fn from(path: DocPath) -> Self {
        path.0
    }
}

// ============================================================================
// Log positions
// ============================================================================

/// Position of an entry in the append-only audit trail
///
/// Positions are strictly increasing and shared by all repositories
/// attached to the same audit service. They are the cursor clients persist
/// between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogPosition(i64);

impl LogPosition {
    /// Position before any entry
    pub const ZERO: LogPosition = LogPosition(0);

    /// Create a LogPosition from a raw value
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the inner i64 value
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Round down to a multiple of `granularity` (a granularity of 0 or 1
    /// leaves the position unchanged)
    #[must_use]
    pub fn floor_to(self, granularity: u64) -> Self {
        if granularity <= 1 {
            return self;
        }
        let g = i64::try_from(granularity).unwrap_or(i64::MAX);
        Self(self.0.div_euclid(g) * g)
    }

    /// Subtract `delta`, saturating at [`LogPosition::ZERO`]
    #[must_use]
    pub fn saturating_sub(self, delta: i64) -> Self {
        Self(self.0.saturating_sub(delta).max(0))
    }
}

impl Display for LogPosition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LogPosition {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .parse::<i64>()
            .map_err(|e| DomainError::InvalidPosition(format!("{s}: {e}")))?;
        if value < 0 {
            return Err(DomainError::InvalidPosition(format!("{s}: must not be negative")));
        }
        Ok(Self(value))
    }
}

impl From<i64> for LogPosition {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

// ============================================================================
// File system item identifiers
// ============================================================================

/// Identifier of a [`FileSystemItem`](super::item::FileSystemItem)
///
/// Document-backed items use the deterministic triple
/// `adapter#repository#document`. The synthesized top-level folder uses
/// `adapter#` and therefore never parses as a triple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileSystemItemId(String);

impl FileSystemItemId {
    /// Build the id of a document-backed item
    #[must_use]
    pub fn for_document(adapter: &str, repository: &RepositoryName, doc_id: &DocumentId) -> Self {
        Self(format!(
            "{adapter}{sep}{repository}{sep}{doc_id}",
            sep = ITEM_ID_SEPARATOR
        ))
    }

    /// Build the id of the synthesized top-level folder
    #[must_use]
    pub fn top_level(adapter: &str) -> Self {
        Self(format!("{adapter}{ITEM_ID_SEPARATOR}"))
    }

    /// Wrap a raw id received from a client
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidItemId` if the value is blank or has no
    /// adapter segment.
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let adapter = value.split(ITEM_ID_SEPARATOR).next().unwrap_or("");
        if value.trim().is_empty() || adapter.is_empty() {
            return Err(DomainError::InvalidItemId(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    /// Get the id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First segment: the name of the adapter that produced the id
    #[must_use]
    pub fn adapter_name(&self) -> &str {
        self.0.split(ITEM_ID_SEPARATOR).next().unwrap_or("")
    }

    /// Split a document-backed id into `(adapter, repository, document)`
    ///
    /// Returns `None` unless the id has exactly three non-empty segments.
    #[must_use]
    pub fn segments(&self) -> Option<(&str, &str, &str)> {
        let mut parts = self.0.split(ITEM_ID_SEPARATOR);
        let adapter = parts.next()?;
        let repository = parts.next()?;
        let doc = parts.next()?;
        if parts.next().is_some() || adapter.is_empty() || repository.is_empty() || doc.is_empty()
        {
            return None;
        }
        Some((adapter, repository, doc))
    }

    /// Typed variant of [`segments`](Self::segments)
    #[must_use]
    pub fn document_ref(&self) -> Option<(RepositoryName, DocumentId)> {
        let (_, repository, doc) = self.segments()?;
        let repository = RepositoryName::new(repository.to_string()).ok()?;
        let doc = DocumentId::new(doc.to_string()).ok()?;
        Some((repository, doc))
    }
}

impl Display for FileSystemItemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FileSystemItemId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
