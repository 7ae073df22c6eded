//! Integration tests for the JournalLogger against the SQLite repository
//!
//! These tests verify that journaled entries land in the audit trail with
//! their payloads intact and that the change-feed filter sees them.

use std::collections::BTreeSet;
use std::sync::Arc;

use rootsync_audit::{JournalLogger, SkipReason};
use rootsync_cache::{DatabasePool, NewDocument, SqliteRepository};
use rootsync_core::domain::{
    EventKind, FileSystemItemId, LogCategory, LogPosition, Principal, RepositoryName,
};
use rootsync_core::ports::{IRepository, LogQuery, RepositoryManager};

/// Create an in-memory repository and a journal writing into it
async fn setup() -> (Arc<SqliteRepository>, JournalLogger) {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let repo = Arc::new(SqliteRepository::new(
        pool.pool().clone(),
        RepositoryName::new("default".to_string()).unwrap(),
    ));
    let journal = JournalLogger::new(RepositoryManager::new().with_repository(repo.clone()));
    (repo, journal)
}

fn principal(name: &str) -> Principal {
    Principal::new(name.to_string()).unwrap()
}

/// Window over the whole trail with no roots: only drive entries match
fn drive_entries() -> LogQuery {
    LogQuery {
        lower: LogPosition::ZERO,
        upper: LogPosition::new(i64::MAX),
        root_paths: Vec::new(),
        collection_members: BTreeSet::new(),
        limit: 100,
    }
}

#[tokio::test]
async fn test_registration_entries_round_trip() {
    let (repo, journal) = setup().await;
    let alice = principal("alice");
    let folder = repo
        .create_document(None, NewDocument::folder("ws"))
        .await
        .unwrap();

    let registered = journal.log_root_registered(&folder, &alice).await.unwrap();
    let unregistered = journal.log_root_unregistered(&folder, &alice).await.unwrap();
    assert!(registered < unregistered);

    // Plain unregistrations are never delivered as such
    let entries = repo.query_log(&drive_entries()).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].position, registered);
    assert_eq!(entries[0].event(), EventKind::RootRegistered);
    assert_eq!(entries[0].category(), LogCategory::Drive);
    assert_eq!(entries[0].impacted_principal(), Some(&alice));
    assert_eq!(entries[0].doc_id, folder.id);
}

#[tokio::test]
async fn test_tombstones_are_visible_outside_roots() {
    let (repo, journal) = setup().await;
    let folder = repo
        .create_document(None, NewDocument::folder("ws"))
        .await
        .unwrap();
    let file = repo
        .create_document(Some(&folder.id), NewDocument::file("a.txt", "x"))
        .await
        .unwrap();
    let item_id = FileSystemItemId::for_document(
        "defaultFileSystemItemFactory",
        &file.repository,
        &file.id,
    );

    journal
        .log_deleted(&file, item_id.clone(), "a.txt", None)
        .await
        .unwrap();
    journal
        .log_security_updated(&file, item_id.clone(), "a.txt")
        .await
        .unwrap();

    let entries = repo.query_log(&drive_entries()).await.unwrap();
    let events: Vec<_> = entries.iter().map(|e| e.event()).collect();
    assert_eq!(events, vec![EventKind::Deleted, EventKind::SecurityUpdated]);
    for entry in &entries {
        let tombstone = entry.tombstone().unwrap();
        assert_eq!(tombstone.item_id, item_id);
        assert_eq!(tombstone.item_name, "a.txt");
        assert!(entry.impacted_principal().is_none());
    }
}

#[tokio::test]
async fn test_journal_for_unknown_repository_fails() {
    let (repo, _) = setup().await;
    let folder = repo
        .create_document(None, NewDocument::folder("ws"))
        .await
        .unwrap();
    let before = repo.last_position().await.unwrap();

    let journal = JournalLogger::new(RepositoryManager::new());
    assert!(journal
        .log_root_registered(&folder, &principal("alice"))
        .await
        .is_err());
    assert_eq!(repo.last_position().await.unwrap(), before);
}

#[test]
fn test_skip_reason_is_reexported() {
    assert_eq!(SkipReason::Rootless.to_string(), "rootless");
}
