//! Integration tests for the change feed
//!
//! These tests drive `DriveService` against the SQLite repository, the way
//! a polling client and the repository's listeners would. Each test uses a
//! fresh in-memory database.

use std::sync::Arc;
use std::time::Duration;

use rootsync_cache::{DatabasePool, NewDocument, SqliteRepository};
use rootsync_core::config::Config;
use rootsync_core::domain::{
    ChangeKind, ChangeSummary, Document, EventKind, FileSystemItemId, LogPosition, Principal,
    RepositoryName, SummaryStatus,
};
use rootsync_core::ports::{IRepository, RepositoryManager};
use rootsync_sync::{DriveService, SyncError};

// ============================================================================
// Test helpers
// ============================================================================

const ROOT_ADAPTER: &str = "defaultSyncRootFolderItemFactory";
const ITEM_ADAPTER: &str = "defaultFileSystemItemFactory";

struct Harness {
    repo: Arc<SqliteRepository>,
    service: DriveService,
}

async fn setup() -> Harness {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let repo = Arc::new(SqliteRepository::new(pool.pool().clone(), repo_name()));
    harness(repo)
}

fn harness(repo: Arc<SqliteRepository>) -> Harness {
    let manager = RepositoryManager::new().with_repository(repo.clone());
    let service = DriveService::from_config(manager, &Config::default())
        .expect("Failed to build service");
    Harness { repo, service }
}

fn repo_name() -> RepositoryName {
    RepositoryName::new("default".to_string()).unwrap()
}

fn principal(name: &str) -> Principal {
    Principal::new(name.to_string()).unwrap()
}

fn root_item_id(doc: &Document) -> FileSystemItemId {
    FileSystemItemId::for_document(ROOT_ADAPTER, &doc.repository, &doc.id)
}

fn item_id(doc: &Document) -> FileSystemItemId {
    FileSystemItemId::for_document(ITEM_ADAPTER, &doc.repository, &doc.id)
}

impl Harness {
    async fn poll(&self, who: &str, lower: LogPosition) -> ChangeSummary {
        self.poll_with_limit(who, lower, None).await
    }

    async fn poll_with_limit(
        &self,
        who: &str,
        lower: LogPosition,
        limit: Option<usize>,
    ) -> ChangeSummary {
        self.service
            .get_change_summary(&principal(who), &[], lower, limit)
            .await
            .expect("Poll failed")
    }

    async fn position(&self) -> LogPosition {
        self.repo.last_position().await.unwrap()
    }

    async fn folder(&self, parent: Option<&Document>, name: &str) -> Document {
        self.repo
            .create_document(parent.map(|p| &p.id), NewDocument::folder(name))
            .await
            .unwrap()
    }

    async fn file(&self, parent: &Document, name: &str) -> Document {
        self.repo
            .create_document(Some(&parent.id), NewDocument::file(name, "content"))
            .await
            .unwrap()
    }

    async fn register(&self, who: &str, doc: &Document) {
        self.service
            .register_root(&principal(who), &repo_name(), &doc.id)
            .await
            .unwrap();
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_created_under_root_is_delivered() {
    let h = setup().await;
    let root = h.folder(None, "42").await;
    h.register("alice", &root).await;

    let lower = h.position().await;
    let child = h.file(&root, "child.txt").await;

    let summary = h.poll_with_limit("alice", lower, Some(1000)).await;
    assert_eq!(summary.status, SummaryStatus::FoundChanges);
    assert_eq!(summary.changes.len(), 1);
    let change = &summary.changes[0];
    assert_eq!(change.kind, ChangeKind::Created);
    assert_eq!(change.item_id, item_id(&child));
    assert_eq!(
        change.item_id.document_ref(),
        Some((repo_name(), child.id.clone()))
    );
    assert_eq!(change.item_name, "child.txt");
    assert_eq!(
        change.item.as_ref().unwrap().parent_id,
        Some(root_item_id(&root))
    );
}

#[tokio::test]
async fn test_unregistered_root_is_delivered_as_deletion() {
    let h = setup().await;
    let root = h.folder(None, "42").await;
    h.register("alice", &root).await;
    let lower = h.position().await;

    h.service
        .unregister_root(&principal("alice"), &repo_name(), &root.id)
        .await
        .unwrap();

    let summary = h.poll("alice", lower).await;
    assert_eq!(summary.changes.len(), 1);
    let change = &summary.changes[0];
    assert_eq!(change.kind, ChangeKind::Deleted);
    assert_eq!(change.item_id, root_item_id(&root));
    assert!(change.item.is_none());
    assert!(summary.active_root_paths.is_empty());

    // The folder itself is untouched
    assert!(h.repo.document(&root.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_window_over_limit_is_too_many_changes() {
    let h = setup().await;
    let root = h.folder(None, "42").await;
    h.register("alice", &root).await;
    let doc = h.file(&root, "busy.txt").await;
    let lower = h.position().await;

    for i in 0..1001 {
        h.repo
            .update_document(&doc.id, format!("v{i}").as_bytes())
            .await
            .unwrap();
    }

    let summary = h.poll_with_limit("alice", lower, Some(1000)).await;
    assert_eq!(summary.status, SummaryStatus::TooManyChanges);
    assert!(summary.changes.is_empty());
    assert_eq!(summary.next_lower_bound, h.position().await);

    let summary = h.poll_with_limit("alice", lower, Some(1002)).await;
    assert_eq!(summary.changes.len(), 1001);
}

#[tokio::test]
async fn test_move_to_foreign_root_is_deletion() {
    let h = setup().await;
    let a = h.folder(None, "a").await;
    let b = h.folder(None, "b").await;
    h.register("alice", &a).await;
    h.register("bob", &b).await;
    let doc = h.file(&a, "report.txt").await;
    let lower = h.position().await;

    let after = h.repo.move_document(&doc.id, &b.id).await.unwrap();
    h.service
        .on_document_moved(&principal("alice"), &doc, &after)
        .await
        .expect("move not journaled");

    let alice = h.poll("alice", lower).await;
    assert_eq!(alice.changes.len(), 1);
    assert_eq!(alice.changes[0].kind, ChangeKind::Deleted);
    assert_eq!(alice.changes[0].event, EventKind::DocumentMoved);
    assert_eq!(alice.changes[0].item_id, item_id(&doc));
    assert_eq!(alice.changes[0].item_name, "report.txt");

    let bob = h.poll("bob", lower).await;
    assert_eq!(bob.changes.len(), 1);
    assert_eq!(bob.changes[0].kind, ChangeKind::Moved);
    let item = bob.changes[0].item.as_ref().unwrap();
    assert_eq!(item.parent_id, Some(root_item_id(&b)));
}

#[tokio::test]
async fn test_move_within_roots_is_delivered_as_move() {
    let h = setup().await;
    let root = h.folder(None, "ws").await;
    h.register("alice", &root).await;
    let from = h.folder(Some(&root), "from").await;
    let to = h.folder(Some(&root), "to").await;
    let doc = h.file(&from, "x.txt").await;
    let lower = h.position().await;

    let after = h.repo.move_document(&doc.id, &to.id).await.unwrap();
    h.service
        .on_document_moved(&principal("alice"), &doc, &after)
        .await
        .expect("move not journaled");

    let summary = h.poll("alice", lower).await;
    assert_eq!(summary.changes.len(), 1);
    assert_eq!(summary.changes[0].kind, ChangeKind::Moved);
    assert_eq!(summary.changes[0].item_id, item_id(&doc));
    assert_eq!(
        summary.changes[0].item.as_ref().unwrap().parent_id,
        Some(item_id(&to))
    );
}

#[tokio::test]
async fn test_rootless_entry_heals_once_root_is_resolvable() {
    let h = setup().await;
    let alice = principal("alice");
    let root = h.folder(None, "ws").await;
    h.register("alice", &root).await;
    let cursor = h.poll("alice", LogPosition::ZERO).await.next_lower_bound;

    // The subscription is disabled behind the registry's back: cached roots
    // still cover the folder, but it no longer resolves as a root
    h.repo.set_subscription(&root.id, &alice, false).await.unwrap();
    let child = h.file(&root, "child.txt").await;

    let summary = h.poll("alice", cursor).await;
    assert_eq!(summary.status, SummaryStatus::NoChanges);
    let next = summary.next_lower_bound;

    h.register("alice", &root).await;

    // The registration reaches the client, which then lists the new root
    let summary = h.poll("alice", next).await;
    assert_eq!(summary.changes.len(), 1);
    assert_eq!(summary.changes[0].kind, ChangeKind::RootRegistered);
    let children = h
        .service
        .list_children(&summary.changes[0].item_id, &alice)
        .await
        .unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, item_id(&child));

    // Replaying the earlier window now yields the skipped entry
    let replay = h.poll("alice", cursor).await;
    let kinds: Vec<_> = replay.changes.iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec![ChangeKind::RootRegistered, ChangeKind::Created]);
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_polling_same_window_is_idempotent() {
    let h = setup().await;
    let root = h.folder(None, "ws").await;
    h.register("alice", &root).await;
    let sub = h.folder(Some(&root), "sub").await;
    let doc = h.file(&sub, "a.txt").await;
    h.repo.update_document(&doc.id, b"changed").await.unwrap();
    h.repo.lock_document(&doc.id, &principal("bob")).await.unwrap();

    let first = h.poll("alice", LogPosition::ZERO).await;
    let second = h.poll("alice", LogPosition::ZERO).await;
    assert_eq!(first, second);
    // The root's own creation counts, since the root covers its own path
    assert_eq!(first.changes.len(), 6);
    // Newest first
    assert!(first
        .changes
        .windows(2)
        .all(|pair| pair[0].position > pair[1].position));
}

#[tokio::test]
async fn test_cursor_is_monotonic() {
    let h = setup().await;
    let root = h.folder(None, "ws").await;
    h.register("alice", &root).await;

    let mut cursor = LogPosition::ZERO;
    let mut seen = 0;
    for round in 0..5 {
        if round % 2 == 0 {
            h.file(&root, &format!("f{round}.txt")).await;
        }
        let summary = h.poll("alice", cursor).await;
        assert!(summary.next_lower_bound >= cursor);
        assert!(summary.next_lower_bound <= h.position().await);
        seen += summary.changes.len();
        cursor = summary.next_lower_bound;
    }
    // The root's creation and registration, then three files
    assert_eq!(seen, 5);
    assert_eq!(h.poll("alice", cursor).await.status, SummaryStatus::NoChanges);
}

#[tokio::test]
async fn test_registration_and_content_in_same_window() {
    let h = setup().await;
    let root = h.folder(None, "ws").await;
    let lower = h.position().await;
    // Warm the root cache before the registration
    assert_eq!(h.poll("alice", lower).await.status, SummaryStatus::NoChanges);

    h.register("alice", &root).await;
    let doc = h.file(&root, "new.txt").await;

    let summary = h.poll("alice", lower).await;
    let kinds: Vec<_> = summary.changes.iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec![ChangeKind::Created, ChangeKind::RootRegistered]);
    assert_eq!(summary.changes[0].item_id, item_id(&doc));
    assert_eq!(
        summary.changes[0].item.as_ref().unwrap().parent_id,
        Some(summary.changes[1].item_id.clone())
    );
    assert_eq!(summary.active_root_paths, vec!["default:/ws".to_string()]);
}

#[tokio::test]
async fn test_modification_between_polls_is_not_omitted() {
    let h = setup().await;
    let root = h.folder(None, "ws").await;
    h.register("alice", &root).await;
    let doc = h.file(&root, "a.txt").await;
    let cursor = h.poll("alice", LogPosition::ZERO).await.next_lower_bound;

    h.repo.update_document(&doc.id, b"v2").await.unwrap();
    let trashed = h.file(&root, "b.txt").await;
    h.repo.trash_document(&trashed.id).await.unwrap();

    let summary = h.poll("alice", cursor).await;
    let modified: Vec<_> = summary
        .changes
        .iter()
        .filter(|c| c.kind == ChangeKind::Modified)
        .collect();
    assert_eq!(modified.len(), 1);
    assert_eq!(modified[0].item_id, item_id(&doc));
    assert_eq!(modified[0].item.as_ref().unwrap().length, Some(2));
}

#[tokio::test]
async fn test_removed_document_is_delivered_as_deletion() {
    let h = setup().await;
    let root = h.folder(None, "ws").await;
    h.register("alice", &root).await;
    let doc = h.file(&root, "gone.txt").await;
    let cursor = h.poll("alice", LogPosition::ZERO).await.next_lower_bound;

    let removed = h.repo.remove_document(&doc.id).await.unwrap();
    h.service
        .on_document_removed(&principal("alice"), &removed)
        .await
        .expect("removal not journaled");

    let summary = h.poll("alice", cursor).await;
    assert_eq!(summary.changes.len(), 1);
    assert_eq!(summary.changes[0].kind, ChangeKind::Deleted);
    assert_eq!(summary.changes[0].item_id, item_id(&doc));

    // Bob never had the file but still receives the tombstone
    let summary = h.poll("bob", cursor).await;
    assert_eq!(summary.changes.len(), 1);
}

#[tokio::test]
async fn test_collection_root_exposes_members() {
    let h = setup().await;
    let alice = principal("alice");
    let docs = h.folder(None, "docs").await;
    let member = h.file(&docs, "member.txt").await;
    let favorites = h
        .repo
        .create_document(None, NewDocument::collection("favorites"))
        .await
        .unwrap();
    h.repo.add_to_collection(&favorites.id, &member.id).await.unwrap();

    let lower = h.position().await;
    h.register("alice", &favorites).await;
    h.repo.update_document(&member.id, b"edited").await.unwrap();

    let summary = h.poll("alice", lower).await;
    let kinds: Vec<_> = summary.changes.iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec![ChangeKind::Modified, ChangeKind::RootRegistered]);
    let collection_item = summary.changes[1].item_id.clone();
    assert_eq!(
        summary.changes[0].item.as_ref().unwrap().parent_id,
        Some(collection_item.clone())
    );

    let children = h.service.list_children(&collection_item, &alice).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, item_id(&member));
}

#[tokio::test]
async fn test_clustered_repository_holds_back_cursor() {
    let pool = DatabasePool::in_memory().await.unwrap();
    let repo = Arc::new(
        SqliteRepository::new(pool.pool().clone(), repo_name())
            .with_clustering(Duration::from_secs(3600)),
    );
    let h = harness(repo);
    let root = h.folder(None, "ws").await;
    h.register("alice", &root).await;
    h.file(&root, "a.txt").await;

    let summary = h.poll("alice", LogPosition::ZERO).await;
    assert_eq!(summary.status, SummaryStatus::NoChanges);
    assert_eq!(summary.next_lower_bound, LogPosition::ZERO);
    assert!(h.position().await > LogPosition::ZERO);
}

#[tokio::test]
async fn test_unavailable_repository_fails_poll() {
    let h = setup().await;
    let root = h.folder(None, "ws").await;
    h.register("alice", &root).await;
    h.poll("alice", LogPosition::ZERO).await;

    h.repo.pool().close().await;
    let err = h
        .service
        .get_change_summary(&principal("alice"), &[], LogPosition::ZERO, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::RepositoryUnavailable(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_items_by_id_follow_permissions() {
    let h = setup().await;
    let alice = principal("alice");
    let root = h.folder(None, "ws").await;
    h.register("alice", &root).await;
    let doc = h.file(&root, "private.txt").await;

    let item = h
        .service
        .get_file_system_item_by_id(&item_id(&doc), &alice)
        .await
        .unwrap()
        .expect("item should resolve");
    assert_eq!(item.name, "private.txt");

    h.repo.set_readers(&doc.id, &[principal("bob")]).await.unwrap();
    assert!(h
        .service
        .get_file_system_item_by_id(&item_id(&doc), &alice)
        .await
        .unwrap()
        .is_none());

    let top = h.service.top_level_folder();
    let roots = h.service.list_children(&top.id, &alice).await.unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].id, root_item_id(&root));
    assert!(h
        .service
        .list_children(&roots[0].id, &alice)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_roots_survive_reopening_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rootsync.db");

    let root_id = {
        let pool = DatabasePool::at(&path).await.unwrap();
        let h = harness(Arc::new(SqliteRepository::new(pool.pool().clone(), repo_name())));
        let root = h.folder(None, "ws").await;
        h.register("alice", &root).await;
        pool.pool().close().await;
        root.id
    };

    let pool = DatabasePool::at(&path).await.unwrap();
    let h = harness(Arc::new(SqliteRepository::new(pool.pool().clone(), repo_name())));
    let roots = h.service.roots(&principal("alice")).await.unwrap();
    assert!(roots.is_root(&repo_name(), &root_id));

    // The registration entry is still in the audit trail
    let summary = h.poll("alice", LogPosition::ZERO).await;
    assert!(summary
        .changes
        .iter()
        .any(|c| c.kind == ChangeKind::RootRegistered));
}
