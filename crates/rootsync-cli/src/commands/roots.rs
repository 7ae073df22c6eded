//! Root commands - Register, unregister and list synchronization roots

use anyhow::{Context, Result};
use clap::Args;
use rootsync_core::domain::{DocumentId, Principal, RepositoryName, RootRef};
use rootsync_sync::RootChange;
use tracing::info;

use crate::output::OutputFormat;
use crate::session::Session;

/// Document a root command acts on
#[derive(Debug, Args)]
pub struct RootTarget {
    /// Document id of the folder or collection
    pub doc_id: DocumentId,
    /// Principal the root belongs to
    #[arg(long, short)]
    pub principal: Principal,
    /// Repository holding the document
    #[arg(long, short, default_value = "default")]
    pub repository: RepositoryName,
}

#[derive(Debug, Args)]
pub struct RegisterCommand {
    #[command(flatten)]
    pub target: RootTarget,
}

impl RegisterCommand {
    pub async fn execute(&self, session: &Session, format: OutputFormat) -> Result<()> {
        let t = &self.target;
        let change = session
            .service
            .register_root(&t.principal, &t.repository, &t.doc_id)
            .await
            .context("Failed to register synchronization root")?;
        info!(doc_id = %t.doc_id, changed = change.changed, "register command");
        report(&change, "Registered", "is already covered by a root", format);
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct UnregisterCommand {
    #[command(flatten)]
    pub target: RootTarget,
}

impl UnregisterCommand {
    pub async fn execute(&self, session: &Session, format: OutputFormat) -> Result<()> {
        let t = &self.target;
        let change = session
            .service
            .unregister_root(&t.principal, &t.repository, &t.doc_id)
            .await
            .context("Failed to unregister synchronization root")?;
        info!(doc_id = %t.doc_id, changed = change.changed, "unregister command");
        report(&change, "Unregistered", "is not a synchronization root", format);
        Ok(())
    }
}

fn report(change: &RootChange, done: &str, unchanged: &str, format: OutputFormat) {
    let doc = &change.document;
    if format.is_json() {
        let released: Vec<_> = change
            .released
            .iter()
            .map(|d| serde_json::json!({"doc_id": d.id.as_str(), "path": d.path.as_str()}))
            .collect();
        format.print_json(&serde_json::json!({
            "changed": change.changed,
            "repository": doc.repository.as_str(),
            "doc_id": doc.id.as_str(),
            "path": doc.path.as_str(),
            "released": released,
        }));
        return;
    }
    if !change.changed {
        format.info(&format!("{} {}", doc.path, unchanged));
        return;
    }
    format.success(&format!("{} {}:{}", done, doc.repository, doc.path));
    for released in &change.released {
        format.info(&format!("Released nested root {}", released.path));
    }
}

#[derive(Debug, Args)]
pub struct RootsCommand {
    /// Principal whose roots are listed
    #[arg(long, short)]
    pub principal: Principal,
}

impl RootsCommand {
    pub async fn execute(&self, session: &Session, format: OutputFormat) -> Result<()> {
        let roots = session
            .service
            .roots(&self.principal)
            .await
            .context("Failed to compute synchronization roots")?;

        if format.is_json() {
            let json = serde_json::to_value(&*roots).context("Failed to serialize roots")?;
            format.print_json(&json);
            return Ok(());
        }

        let count: usize = roots.repositories.values().map(|r| r.roots.len()).sum();
        if count == 0 {
            format.info(&format!("{} has no synchronization roots", self.principal));
            return Ok(());
        }
        format.success(&format!(
            "{} synchronization root{} for {}",
            count,
            if count == 1 { "" } else { "s" },
            self.principal
        ));
        for (repository, repo_roots) in &roots.repositories {
            for root in &repo_roots.roots {
                print_root(format, repository, root);
            }
        }
        Ok(())
    }
}

fn print_root(format: OutputFormat, repository: &RepositoryName, root: &RootRef) {
    let marker = if root.is_collection { " [collection]" } else { "" };
    format.info(&format!("{}:{}  ({}){}", repository, root.path, root.id, marker));
}
