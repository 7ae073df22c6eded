//! Bounded retry of optimistic writes
//!
//! Registration changes are saved under optimistic concurrency. A losing
//! writer re-reads and tries again with exponential backoff; past the last
//! attempt the conflict surfaces as [`SyncError::TransientWriteConflict`].

use std::future::Future;
use std::time::Duration;

use rootsync_core::config::RegistryConfig;
use rootsync_core::domain::DocumentId;
use tracing::{info, warn};

use crate::SyncError;

/// Attempt budget and backoff schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy making at most `attempts` attempts (at least one)
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(
            config.write_retries,
            Duration::from_millis(config.retry_base_delay_ms),
        )
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before attempt `attempt + 1`: base, 2x base, 4x base...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Runs `f` until it succeeds, fails with something other than a write
/// conflict, or the policy runs out of attempts
pub async fn with_write_retry<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    doc_id: &DocumentId,
    f: F,
) -> Result<T, SyncError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    for attempt in 0..policy.attempts {
        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(
                        operation = operation_name,
                        doc_id = %doc_id,
                        attempt,
                        "Write succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(SyncError::TransientWriteConflict { .. }) if attempt + 1 < policy.attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    operation = operation_name,
                    doc_id = %doc_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Write conflict, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(SyncError::TransientWriteConflict { .. }) => break,
            Err(err) => return Err(err),
        }
    }

    warn!(
        operation = operation_name,
        doc_id = %doc_id,
        attempts = policy.attempts,
        "Write conflict persisted, giving up"
    );
    Err(SyncError::TransientWriteConflict {
        doc_id: doc_id.clone(),
        attempts: policy.attempts,
    })
}
