//! Change-feed scanner
//!
//! Reads one repository's audit trail over a `(lower, upper]` position
//! window and turns the relevant entries into file system item changes
//! for one principal.
//!
//! A scan runs through these steps:
//!
//! 1. Query the window with the principal's active roots.
//! 2. If the window holds root-management entries, the roots may be stale:
//!    refresh them and query once more. A second occurrence is accepted.
//! 3. If the query filled the limit, give up with [`ScanOutcome::TooMany`].
//! 4. Drop entries meant for another principal.
//! 5. Assemble changes in position order, adapting live documents where
//!    the entry carries no resolved item.

use std::sync::Arc;

use chrono::Utc;
use rootsync_adapter::{AdaptContext, AdapterChain};
use rootsync_audit::SkipReason;
use rootsync_core::domain::{
    ChangeKind, EventKind, FileSystemItem, FileSystemItemChange, LogEntry, LogPosition, LogRecord,
    Principal, RepositoryRoots, SyncTombstone,
};
use rootsync_core::ports::{DocumentLookup, IRepository, LogQuery};
use tracing::{debug, info, warn};

use crate::registry::SyncRootRegistry;
use crate::SyncError;

/// Result of scanning one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Changes in ascending log position order
    Changes(Vec<FileSystemItemChange>),
    /// The window held at least `limit` relevant entries
    TooMany,
}

/// Scans audit trail windows on behalf of principals
#[derive(Debug, Clone)]
pub struct ChangeFeedScanner {
    registry: Arc<SyncRootRegistry>,
    chain: Arc<AdapterChain>,
}

impl ChangeFeedScanner {
    pub fn new(registry: Arc<SyncRootRegistry>, chain: Arc<AdapterChain>) -> Self {
        Self { registry, chain }
    }

    /// Highest position a cursor may safely advance to
    ///
    /// On a clustered repository, entries younger than twice the
    /// replication delay may not be visible on every node yet and are left
    /// for a later poll.
    pub async fn upper_bound(&self, repo: &dyn IRepository) -> Result<LogPosition, SyncError> {
        if !repo.clustering_enabled() {
            return Ok(repo.last_position().await?);
        }
        let margin = repo.clustering_delay().saturating_mul(2);
        let cutoff = chrono::Duration::from_std(margin)
            .ok()
            .and_then(|margin| Utc::now().checked_sub_signed(margin))
            .ok_or_else(|| {
                SyncError::InvalidArgument(format!(
                    "clustering delay of {} is out of range",
                    repo.name()
                ))
            })?;
        Ok(repo.last_position_before(cutoff).await?)
    }

    /// Scans `(lower, upper]` of `repo` for `principal`
    pub async fn scan(
        &self,
        repo: &dyn IRepository,
        principal: &Principal,
        lower: LogPosition,
        upper: LogPosition,
        limit: usize,
    ) -> Result<ScanOutcome, SyncError> {
        let roots = self.registry.list_roots(principal, repo.name()).await?;
        let mut entries = repo.query_log(&log_query(lower, upper, &roots, limit)).await?;

        if entries.iter().any(LogEntry::is_root_management) {
            debug!(
                principal = %principal,
                repository = %repo.name(),
                "Root management entries in window, refreshing roots"
            );
            self.registry.invalidate(principal);
            let roots = self.registry.list_roots(principal, repo.name()).await?;
            entries = repo.query_log(&log_query(lower, upper, &roots, limit)).await?;
        }

        if entries.len() >= limit {
            info!(
                principal = %principal,
                repository = %repo.name(),
                lower = %lower,
                upper = %upper,
                limit,
                "Too many changes in window"
            );
            return Ok(ScanOutcome::TooMany);
        }

        entries.sort_by_key(|entry| entry.position);
        let mut changes = Vec::with_capacity(entries.len());
        for entry in &entries {
            if let Some(impacted) = entry.impacted_principal() {
                if impacted != principal {
                    skipped(entry, SkipReason::OtherPrincipal);
                    continue;
                }
            }
            if let Some(change) = self.assemble(repo, principal, entry).await? {
                changes.push(change);
            }
        }
        Ok(ScanOutcome::Changes(changes))
    }

    async fn assemble(
        &self,
        repo: &dyn IRepository,
        principal: &Principal,
        entry: &LogEntry,
    ) -> Result<Option<FileSystemItemChange>, SyncError> {
        match &entry.record {
            LogRecord::Tombstone(tombstone) if tombstone.event == EventKind::DocumentMoved => {
                match self.adapt_live(repo, principal, entry).await? {
                    Ok(item) => Ok(Some(live_change(entry, item))),
                    Err(reason) => {
                        debug!(
                            position = %entry.position,
                            doc_id = %entry.doc_id,
                            reason = %reason,
                            "Moved out of reach, emitting deletion"
                        );
                        Ok(Some(tombstone_change(entry, tombstone, ChangeKind::Deleted)))
                    }
                }
            }
            LogRecord::Tombstone(tombstone) => Ok(Some(tombstone_change(
                entry,
                tombstone,
                ChangeKind::from_event(tombstone.event),
            ))),
            LogRecord::Document { .. } | LogRecord::Root { .. } => {
                match self.adapt_live(repo, principal, entry).await? {
                    Ok(item) => Ok(Some(live_change(entry, item))),
                    Err(reason) => {
                        skipped(entry, reason);
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Adapts the current state of the entry's document
    async fn adapt_live(
        &self,
        repo: &dyn IRepository,
        principal: &Principal,
        entry: &LogEntry,
    ) -> Result<Result<FileSystemItem, SkipReason>, SyncError> {
        let doc = match repo.get_document(&entry.doc_id, principal).await? {
            DocumentLookup::Found(doc) => *doc,
            DocumentLookup::NotFound => return Ok(Err(SkipReason::NotFound)),
            DocumentLookup::AccessDenied => return Ok(Err(SkipReason::AccessDenied)),
        };

        let lock_event = matches!(
            entry.event(),
            EventKind::DocumentLocked | EventKind::DocumentUnlocked
        );
        let ctx = AdaptContext::new(principal.clone()).with_lock_info(lock_event);
        match self.chain.get_item(repo, &doc, &ctx).await {
            Ok(Some(item)) => Ok(Ok(item)),
            Ok(None) => Ok(Err(SkipReason::NotAdaptable)),
            Err(e) if e.is_rootless() => Ok(Err(SkipReason::Rootless)),
            Err(e) => Err(e.into()),
        }
    }
}

fn log_query(
    lower: LogPosition,
    upper: LogPosition,
    roots: &RepositoryRoots,
    limit: usize,
) -> LogQuery {
    LogQuery {
        lower,
        upper,
        root_paths: roots
            .roots
            .iter()
            .filter(|root| !root.is_collection)
            .map(|root| root.path.clone())
            .collect(),
        collection_members: roots.collection_members.clone(),
        limit,
    }
}

fn live_change(entry: &LogEntry, item: FileSystemItem) -> FileSystemItemChange {
    FileSystemItemChange::from_item(
        entry.event(),
        entry.position,
        entry.timestamp,
        entry.repository.clone(),
        entry.doc_id.clone(),
        item,
    )
}

fn tombstone_change(
    entry: &LogEntry,
    tombstone: &SyncTombstone,
    kind: ChangeKind,
) -> FileSystemItemChange {
    FileSystemItemChange {
        kind,
        event: tombstone.event,
        position: entry.position,
        timestamp: entry.timestamp,
        repository: entry.repository.clone(),
        doc_id: entry.doc_id.clone(),
        item_id: tombstone.item_id.clone(),
        item_name: tombstone.item_name.clone(),
        item: None,
    }
}

fn skipped(entry: &LogEntry, reason: SkipReason) {
    if reason == SkipReason::Rootless {
        warn!(
            position = %entry.position,
            repository = %entry.repository,
            doc_id = %entry.doc_id,
            event = %entry.event(),
            reason = %reason,
            "Skipping entry"
        );
    } else {
        debug!(
            position = %entry.position,
            repository = %entry.repository,
            doc_id = %entry.doc_id,
            event = %entry.event(),
            reason = %reason,
            "Skipping entry"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use rootsync_core::config::{AdaptersConfig, RegistryConfig};
    use rootsync_core::domain::{Document, FileSystemItemId, LockInfo};
    use rootsync_core::ports::{LogEntryDraft, RepositoryManager};

    use super::*;
    use crate::testing::{file, folder, principal, FlakyRepository};

    const DEFAULT_ADAPTER: &str = "defaultFileSystemItemFactory";

    fn root(id: &str, path: &str, owner: &str) -> Document {
        let mut doc = folder(id, path, None);
        doc.subscribe(&principal(owner), Utc::now());
        doc
    }

    fn scanner_for(repo: Arc<FlakyRepository>) -> ChangeFeedScanner {
        let registry = Arc::new(SyncRootRegistry::new(
            RepositoryManager::new().with_repository(repo),
            &RegistryConfig::default(),
        ));
        let chain = Arc::new(AdapterChain::from_config(&AdaptersConfig::default()).unwrap());
        ChangeFeedScanner::new(registry, chain)
    }

    fn setup() -> (Arc<FlakyRepository>, ChangeFeedScanner) {
        let repo = Arc::new(FlakyRepository::new("default"));
        repo.put(root("42", "/ws", "alice"));
        repo.put(folder("other", "/other", None));
        let scanner = scanner_for(repo.clone());
        (repo, scanner)
    }

    async fn scan_all(
        scanner: &ChangeFeedScanner,
        repo: &FlakyRepository,
        who: &str,
        limit: usize,
    ) -> ScanOutcome {
        let upper = scanner.upper_bound(repo).await.unwrap();
        scanner
            .scan(repo, &principal(who), LogPosition::ZERO, upper, limit)
            .await
            .unwrap()
    }

    fn changes(outcome: ScanOutcome) -> Vec<FileSystemItemChange> {
        match outcome {
            ScanOutcome::Changes(changes) => changes,
            ScanOutcome::TooMany => panic!("unexpected too many changes"),
        }
    }

    fn tombstone(doc: &Document, event: EventKind, impacted: Option<&str>) -> LogEntryDraft {
        LogEntryDraft::for_document(
            doc,
            LogRecord::Tombstone(SyncTombstone {
                event,
                item_id: FileSystemItemId::for_document(DEFAULT_ADAPTER, &doc.repository, &doc.id),
                item_name: doc.title.clone(),
                impacted_principal: impacted.map(principal),
            }),
        )
    }

    #[tokio::test]
    async fn test_created_under_root() {
        let (repo, scanner) = setup();
        repo.put(file("child", "/ws/child.txt", Some("42")));
        repo.event("child", EventKind::DocumentCreated);
        repo.put(file("outside", "/other/x.txt", Some("other")));
        repo.event("outside", EventKind::DocumentCreated);

        let changes = changes(scan_all(&scanner, &repo, "alice", 100).await);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Created);
        assert_eq!(changes[0].item_id.as_str(), "defaultFileSystemItemFactory#default#child");
        assert_eq!(changes[0].item_name, "child.txt");
        let item = changes[0].item.as_ref().unwrap();
        assert_eq!(
            item.parent_id.as_ref().map(|p| p.as_str()),
            Some("defaultSyncRootFolderItemFactory#default#42")
        );
    }

    #[tokio::test]
    async fn test_vanished_and_hidden_documents_are_skipped() {
        let (repo, scanner) = setup();
        repo.put(file("gone", "/ws/gone.txt", Some("42")));
        repo.event("gone", EventKind::DocumentCreated);
        repo.remove("gone");

        let mut secret = file("secret", "/ws/secret.txt", Some("42"));
        secret.readers.insert(principal("bob"));
        repo.put(secret);
        repo.event("secret", EventKind::DocumentModified);

        let mut note = file("note", "/ws/note", Some("42"));
        note.blob = None;
        repo.put(note);
        repo.event("note", EventKind::DocumentCreated);

        assert!(changes(scan_all(&scanner, &repo, "alice", 100).await).is_empty());
    }

    #[tokio::test]
    async fn test_limit_reached_is_too_many() {
        let (repo, scanner) = setup();
        for i in 0..3 {
            let id = format!("f{i}");
            repo.put(file(&id, &format!("/ws/{id}.txt"), Some("42")));
            repo.event(&id, EventKind::DocumentCreated);
        }
        assert_eq!(scan_all(&scanner, &repo, "alice", 3).await, ScanOutcome::TooMany);
        assert_eq!(changes(scan_all(&scanner, &repo, "alice", 4).await).len(), 3);
    }

    #[tokio::test]
    async fn test_root_registration_refreshes_roots_once() {
        let (repo, scanner) = setup();
        let alice = principal("alice");
        // Warm the cache before the registration lands
        scanner.registry.root_set(&alice).await.unwrap();

        let mut other = repo.doc("other");
        other.subscribe(&alice, Utc::now());
        repo.put(other.clone());
        repo.append_log(LogEntryDraft::for_document(
            &other,
            LogRecord::Root {
                event: EventKind::RootRegistered,
                principal: alice.clone(),
            },
        ))
        .await
        .unwrap();
        repo.put(file("x", "/other/x.txt", Some("other")));
        repo.event("x", EventKind::DocumentCreated);

        let before = repo.log_queries.load(Ordering::SeqCst);
        let changes = changes(scan_all(&scanner, &repo, "alice", 100).await);
        assert_eq!(repo.log_queries.load(Ordering::SeqCst) - before, 2);

        let kinds: Vec<_> = changes.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::RootRegistered, ChangeKind::Created]);
        assert_eq!(
            changes[1].item.as_ref().unwrap().parent_id,
            Some(changes[0].item_id.clone())
        );
    }

    #[tokio::test]
    async fn test_tombstones_for_other_principals_are_filtered() {
        let (repo, scanner) = setup();
        let ws = repo.doc("42");
        repo.append_log(tombstone(&ws, EventKind::Deleted, Some("bob")))
            .await
            .unwrap();
        repo.append_log(tombstone(&ws, EventKind::Deleted, Some("alice")))
            .await
            .unwrap();

        let changes = changes(scan_all(&scanner, &repo, "alice", 100).await);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Deleted);
        assert!(changes[0].item.is_none());
        assert_eq!(changes[0].position, LogPosition::new(2));
    }

    #[tokio::test]
    async fn test_moved_tombstone() {
        let (repo, scanner) = setup();
        repo.put(root("43", "/ws2", "alice"));
        let mut doc = file("m", "/ws2/m.txt", Some("43"));
        repo.put(doc.clone());
        repo.append_log(tombstone(&doc, EventKind::DocumentMoved, None))
            .await
            .unwrap();

        let changes_in_reach = changes(scan_all(&scanner, &repo, "alice", 100).await);
        assert_eq!(changes_in_reach.len(), 1);
        assert_eq!(changes_in_reach[0].kind, ChangeKind::Moved);
        assert!(changes_in_reach[0].item.is_some());

        doc.path = "/other/m.txt".parse().unwrap();
        doc.parent_id = Some("other".parse().unwrap());
        repo.put(doc);
        let changes_out = changes(scan_all(&scanner, &repo, "alice", 100).await);
        assert_eq!(changes_out.len(), 1);
        assert_eq!(changes_out[0].kind, ChangeKind::Deleted);
        assert_eq!(changes_out[0].event, EventKind::DocumentMoved);
        assert_eq!(changes_out[0].item_id.as_str(), "defaultFileSystemItemFactory#default#m");
    }

    #[tokio::test]
    async fn test_rootless_entry_is_skipped() {
        let (repo, scanner) = setup();
        repo.put(file("o", "/ws/o.txt", Some("missing")));
        repo.event("o", EventKind::DocumentModified);
        assert!(changes(scan_all(&scanner, &repo, "alice", 100).await).is_empty());
    }

    #[tokio::test]
    async fn test_lock_events_carry_lock_info() {
        let (repo, scanner) = setup();
        let mut doc = file("l", "/ws/l.txt", Some("42"));
        doc.lock = Some(LockInfo {
            owner: principal("bob"),
            created: Utc::now(),
        });
        repo.put(doc);
        repo.event("l", EventKind::DocumentModified);
        repo.event("l", EventKind::DocumentLocked);

        let changes = changes(scan_all(&scanner, &repo, "alice", 100).await);
        assert!(changes[0].item.as_ref().unwrap().lock.is_none());
        let locked = changes[1].item.as_ref().unwrap();
        assert_eq!(locked.lock.as_ref().unwrap().owner, principal("bob"));
        assert!(!locked.can_update);
    }

    #[tokio::test]
    async fn test_upper_bound_respects_clustering_delay() {
        let repo = Arc::new(FlakyRepository::new("default").clustered(Duration::from_secs(30)));
        repo.put(root("42", "/ws", "alice"));
        let ws = repo.doc("42");
        let old = Utc::now() - chrono::Duration::seconds(120);
        let draft = LogEntryDraft::for_document(&ws, LogRecord::Document {
            event: EventKind::DocumentModified,
        });
        repo.event_at(draft.clone(), old);
        repo.event_at(draft, Utc::now());

        let scanner = scanner_for(repo.clone());
        assert_eq!(scanner.upper_bound(repo.as_ref()).await.unwrap(), LogPosition::new(1));
        assert_eq!(repo.last_position().await.unwrap(), LogPosition::new(2));
    }

    #[tokio::test]
    async fn test_unavailable_repository_fails_scan() {
        let (repo, scanner) = setup();
        repo.fail_queries.store(true, Ordering::SeqCst);
        let err = scanner
            .scan(
                repo.as_ref(),
                &principal("alice"),
                LogPosition::ZERO,
                LogPosition::new(10),
                100,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RepositoryUnavailable(_)));
    }
}
