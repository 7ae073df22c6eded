//! Changes command - Poll the change feed
//!
//! Prints the change summary a client would receive for the given cursor,
//! together with the cursor to use on the next poll.

use anyhow::{Context, Result};
use clap::Args;
use rootsync_core::domain::{ChangeSummary, LogPosition, Principal, RepositoryName, SummaryStatus};
use tracing::info;

use crate::output::OutputFormat;
use crate::session::Session;

#[derive(Debug, Args)]
pub struct ChangesCommand {
    /// Principal polling for changes
    #[arg(long, short)]
    pub principal: Principal,
    /// Cursor returned by the previous poll
    #[arg(long, default_value = "0")]
    pub since: LogPosition,
    /// Maximum number of audit entries scanned per repository
    #[arg(long)]
    pub limit: Option<usize>,
    /// Repository to poll (repeatable); all repositories when omitted
    #[arg(long = "repository", short)]
    pub repositories: Vec<RepositoryName>,
}

impl ChangesCommand {
    pub async fn execute(&self, session: &Session, format: OutputFormat) -> Result<()> {
        let summary = session
            .service
            .get_change_summary(&self.principal, &self.repositories, self.since, self.limit)
            .await
            .context("Failed to build change summary")?;

        info!(
            principal = %self.principal,
            since = %self.since,
            status = %summary.status,
            "changes command"
        );

        if format.is_json() {
            let json =
                serde_json::to_value(&summary).context("Failed to serialize change summary")?;
            format.print_json(&json);
            return Ok(());
        }
        print_summary(&summary, format);
        Ok(())
    }
}

fn print_summary(summary: &ChangeSummary, format: OutputFormat) {
    match summary.status {
        SummaryStatus::TooManyChanges => {
            format.warn("Too many changes in the window; rescan the whole tree");
        }
        SummaryStatus::NoChanges => format.success("No changes"),
        SummaryStatus::FoundChanges => {
            format.success(&format!("{} change(s)", summary.changes.len()));
            for change in &summary.changes {
                format.info(&format!(
                    "{:>8}  {:<16} {}  {}",
                    change.position.to_string(),
                    change.kind.to_string(),
                    change.item_name,
                    change.item_id
                ));
            }
        }
    }
    format.info("");
    format.field("Next lower bound", &summary.next_lower_bound.to_string());
    format.field("Upper bound", &summary.upper_bound.to_string());
    if summary.active_root_paths.is_empty() {
        format.field("Active roots", "none");
    } else {
        format.field("Active roots", &summary.active_root_paths.join(", "));
    }
}
