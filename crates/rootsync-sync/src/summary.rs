//! Change summaries across repositories
//!
//! Scans every polled repository, merges the changes and computes the
//! cursor the client sends back on its next poll. A window that overflows
//! in any repository is reported as a whole: the client gets
//! `too_many_changes` and no partial list.

use std::cmp::Reverse;
use std::sync::Arc;

use rootsync_core::domain::{ChangeSummary, LogPosition, Principal, SummaryStatus};
use rootsync_core::ports::IRepository;
use tracing::info;

use crate::registry::SyncRootRegistry;
use crate::scanner::{ChangeFeedScanner, ScanOutcome};
use crate::SyncError;

/// Builds change summaries for polling clients
#[derive(Debug, Clone)]
pub struct ChangeSummaryBuilder {
    registry: Arc<SyncRootRegistry>,
    scanner: ChangeFeedScanner,
}

impl ChangeSummaryBuilder {
    pub fn new(registry: Arc<SyncRootRegistry>, scanner: ChangeFeedScanner) -> Self {
        Self { registry, scanner }
    }

    /// Summarizes the changes of `repositories` after `lower_bound`
    ///
    /// Repositories are scanned in the given order. Any repository failure
    /// fails the whole call, so the client keeps its cursor and repeats the
    /// window.
    pub async fn get_change_summary(
        &self,
        principal: &Principal,
        repositories: &[Arc<dyn IRepository>],
        lower_bound: LogPosition,
        limit: usize,
    ) -> Result<ChangeSummary, SyncError> {
        let mut changes = Vec::new();
        let mut too_many = false;
        let mut min_upper: Option<LogPosition> = None;
        let mut granularity = 1u64;

        for repo in repositories {
            let upper = self.scanner.upper_bound(repo.as_ref()).await?;
            min_upper = Some(min_upper.map_or(upper, |current| current.min(upper)));
            granularity = granularity.max(repo.clock_granularity());
            if too_many {
                continue;
            }
            match self
                .scanner
                .scan(repo.as_ref(), principal, lower_bound, upper, limit)
                .await?
            {
                ScanOutcome::Changes(found) => changes.extend(found),
                ScanOutcome::TooMany => {
                    too_many = true;
                    changes.clear();
                }
            }
        }

        let upper_bound = min_upper.unwrap_or(lower_bound);
        let next_lower_bound = lower_bound.max(upper_bound.floor_to(granularity));

        let status = if too_many {
            SummaryStatus::TooManyChanges
        } else if changes.is_empty() {
            SummaryStatus::NoChanges
        } else {
            // Stable, so same-position changes keep their scan order
            changes.sort_by(|a, b| {
                (&a.repository, Reverse(a.position)).cmp(&(&b.repository, Reverse(b.position)))
            });
            SummaryStatus::FoundChanges
        };

        let active_root_paths = self.registry.root_set(principal).await?.qualified_paths();

        info!(
            principal = %principal,
            repositories = repositories.len(),
            lower_bound = %lower_bound,
            next_lower_bound = %next_lower_bound,
            status = %status,
            changes = changes.len(),
            "Built change summary"
        );

        Ok(ChangeSummary {
            changes,
            status,
            next_lower_bound,
            upper_bound,
            active_root_paths,
        })
    }
}
