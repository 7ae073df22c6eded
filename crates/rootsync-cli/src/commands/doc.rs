//! Doc commands - Author documents in the local repository
//!
//! Each command mutates the SQLite repository and appends the audit entry
//! the repository would, so the change feed can be exercised end to end.
//! Moves, removals and permission changes also go through the drive
//! service hooks that journal their tombstones. `edit` goes through the
//! drive service only.

use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use rootsync_cache::NewDocument;
use rootsync_core::domain::{Document, DocumentId, Principal, RepositoryName};
use tracing::info;

use crate::output::OutputFormat;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DocKind {
    Folder,
    File,
    Collection,
}

#[derive(Debug, Args)]
pub struct RepositoryArg {
    /// Repository holding the document
    #[arg(long, short, default_value = "default")]
    pub repository: RepositoryName,
}

#[derive(Debug, Subcommand)]
pub enum DocCommand {
    /// Create a document
    Create {
        /// Name of the new document
        name: String,
        /// Parent folder; the repository root when omitted
        #[arg(long)]
        parent: Option<DocumentId>,
        #[arg(long, value_enum, default_value = "folder")]
        kind: DocKind,
        /// Content of a file
        #[arg(long, default_value = "")]
        content: String,
        #[command(flatten)]
        repo: RepositoryArg,
    },
    /// Replace the content of a file
    Update {
        doc_id: DocumentId,
        content: String,
        #[command(flatten)]
        repo: RepositoryArg,
    },
    /// Move a document under another folder
    Move {
        doc_id: DocumentId,
        new_parent: DocumentId,
        /// Principal performing the move
        #[arg(long, short)]
        principal: Principal,
        #[command(flatten)]
        repo: RepositoryArg,
    },
    /// Copy a document and its subtree under another folder
    Copy {
        doc_id: DocumentId,
        new_parent: DocumentId,
        #[command(flatten)]
        repo: RepositoryArg,
    },
    /// Put a document in the trash
    Trash {
        doc_id: DocumentId,
        #[command(flatten)]
        repo: RepositoryArg,
    },
    /// Permanently remove a document and its subtree
    Remove {
        doc_id: DocumentId,
        /// Principal performing the removal
        #[arg(long, short)]
        principal: Principal,
        #[command(flatten)]
        repo: RepositoryArg,
    },
    /// Add a document to a collection
    Collect {
        collection: DocumentId,
        member: DocumentId,
        #[command(flatten)]
        repo: RepositoryArg,
    },
    /// Open a document for local edition, adding it to the principal's
    /// "Locally Edited" collection
    Edit {
        doc_id: DocumentId,
        #[arg(long, short)]
        principal: Principal,
        #[command(flatten)]
        repo: RepositoryArg,
    },
    /// Restrict readers of a document; no reader opens it to everyone
    Share {
        doc_id: DocumentId,
        #[arg(long = "reader")]
        readers: Vec<Principal>,
        /// Principal changing the permissions
        #[arg(long, short)]
        principal: Principal,
        #[command(flatten)]
        repo: RepositoryArg,
    },
}

impl DocCommand {
    pub async fn execute(&self, session: &Session, format: OutputFormat) -> Result<()> {
        let (verb, doc) = match self {
            DocCommand::Create {
                name,
                parent,
                kind,
                content,
                repo,
            } => {
                let new = match kind {
                    DocKind::Folder => NewDocument::folder(name.as_str()),
                    DocKind::File => NewDocument::file(name.as_str(), content.as_bytes()),
                    DocKind::Collection => NewDocument::collection(name.as_str()),
                };
                let doc = session
                    .repository(&repo.repository)?
                    .create_document(parent.as_ref(), new)
                    .await?;
                ("Created", doc)
            }
            DocCommand::Update {
                doc_id,
                content,
                repo,
            } => {
                let doc = session
                    .repository(&repo.repository)?
                    .update_document(doc_id, content.as_bytes())
                    .await?;
                ("Updated", doc)
            }
            DocCommand::Move {
                doc_id,
                new_parent,
                principal,
                repo,
            } => {
                let repository = session.repository(&repo.repository)?;
                let before = existing(repository.document(doc_id).await?, doc_id)?;
                let after = repository.move_document(doc_id, new_parent).await?;
                session
                    .service
                    .on_document_moved(principal, &before, &after)
                    .await;
                ("Moved", after)
            }
            DocCommand::Copy {
                doc_id,
                new_parent,
                repo,
            } => {
                let doc = session
                    .repository(&repo.repository)?
                    .copy_document(doc_id, new_parent)
                    .await?;
                // Copies may carry subscriptions
                session.service.registry().invalidate_all();
                ("Copied", doc)
            }
            DocCommand::Trash { doc_id, repo } => {
                let doc = session
                    .repository(&repo.repository)?
                    .trash_document(doc_id)
                    .await?;
                ("Trashed", doc)
            }
            DocCommand::Remove {
                doc_id,
                principal,
                repo,
            } => {
                let doc = session
                    .repository(&repo.repository)?
                    .remove_document(doc_id)
                    .await?;
                session.service.on_document_removed(principal, &doc).await;
                ("Removed", doc)
            }
            DocCommand::Collect {
                collection,
                member,
                repo,
            } => {
                let doc = session
                    .repository(&repo.repository)?
                    .add_to_collection(collection, member)
                    .await?;
                // Cached collection members are stale now
                session.service.registry().invalidate_all();
                ("Collected", doc)
            }
            DocCommand::Edit {
                doc_id,
                principal,
                repo,
            } => {
                let edited = session
                    .service
                    .add_to_locally_edited(principal, &repo.repository, doc_id)
                    .await
                    .context("Failed to add to the locally edited collection")?;
                if edited.created {
                    info!(collection = %edited.collection.path, "Created collection");
                }
                ("Locally edited", edited.member)
            }
            DocCommand::Share {
                doc_id,
                readers,
                principal,
                repo,
            } => {
                let repository = session.repository(&repo.repository)?;
                let before = existing(repository.document(doc_id).await?, doc_id)?;
                // The tombstone needs the item as the principal saw it
                let position = session.service.on_security_updated(principal, &before).await;
                let doc = repository.set_readers(doc_id, readers).await?;
                info!(doc_id = %doc_id, journaled = position.is_some(), "Updated readers");
                ("Shared", doc)
            }
        };
        report(verb, &doc, format)
    }
}

fn existing(doc: Option<Document>, id: &DocumentId) -> Result<Document> {
    doc.with_context(|| format!("Document {} not found", id))
}

fn report(verb: &str, doc: &Document, format: OutputFormat) -> Result<()> {
    if format.is_json() {
        let json = serde_json::to_value(doc).context("Failed to serialize document")?;
        format.print_json(&json);
    } else {
        format.success(&format!("{} {}:{}", verb, doc.repository, doc.path));
        format.field("Id", doc.id.as_str());
    }
    Ok(())
}
