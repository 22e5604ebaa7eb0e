//! Long-running operation polling (exponential backoff)
//!
//! Provider calls that return before the change is applied hand back a
//! status endpoint. [`wait_until_completed`] polls it until a terminal
//! status is reported. The budget is wall-clock time, so a short
//! `Retry-After` only means more checks.

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Polling schedule for long-running operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Total time to wait for a terminal status (seconds)
    pub max_wait_secs: u64,
    /// Delay after the first check (milliseconds)
    pub initial_delay_ms: u64,
    /// Upper bound for a single delay (milliseconds)
    pub max_delay_ms: u64,
    /// Exponential multiplier
    pub multiplier: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_wait_secs: 3600,
            initial_delay_ms: 1000,
            max_delay_ms: 15000,
            multiplier: 1.5,
        }
    }
}

impl PollConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    /// Delay to wait after the given (zero-based) attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let delay = self.initial_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        (delay as u64).min(self.max_delay_ms)
    }
}

/// Status reported by a long-running operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    InProgress,
    Succeeded,
    Failed(String),
    Canceled,
}

impl OperationStatus {
    /// Map a provider status string; anything non-terminal counts as in progress
    pub fn from_provider(status: &str, error: Option<String>) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "succeeded" => OperationStatus::Succeeded,
            "failed" => OperationStatus::Failed(
                error.unwrap_or_else(|| "operation reported failure".to_string()),
            ),
            "canceled" | "cancelled" => OperationStatus::Canceled,
            _ => OperationStatus::InProgress,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::InProgress)
    }
}

/// One poll result, optionally carrying the provider's `Retry-After` hint
#[derive(Debug, Clone)]
pub struct PollResponse {
    pub status: OperationStatus,
    pub retry_after: Option<Duration>,
}

impl From<OperationStatus> for PollResponse {
    fn from(status: OperationStatus) -> Self {
        Self {
            status,
            retry_after: None,
        }
    }
}

/// Poll until the operation reaches a terminal status
///
/// # Returns
/// * `Ok(())` - the operation succeeded
/// * `Err(CloudError::OperationFailed)` - the provider reported failure or cancellation
/// * `Err(CloudError::Timeout)` - no terminal status within `max_wait_secs`
pub async fn wait_until_completed<F, Fut>(
    config: &PollConfig,
    operation: &str,
    mut poll: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollResponse>>,
{
    let deadline = Instant::now() + config.max_wait();
    let mut attempt: u32 = 0;

    loop {
        let response = poll().await?;
        match response.status {
            OperationStatus::Succeeded => {
                tracing::debug!("{} completed after {} checks", operation, attempt + 1);
                return Ok(());
            }
            OperationStatus::Failed(message) => {
                return Err(CloudError::OperationFailed {
                    operation: operation.to_string(),
                    message,
                });
            }
            OperationStatus::Canceled => {
                return Err(CloudError::OperationFailed {
                    operation: operation.to_string(),
                    message: "operation was canceled".to_string(),
                });
            }
            OperationStatus::InProgress => {}
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        let delay = response
            .retry_after
            .unwrap_or_else(|| Duration::from_millis(config.delay_for_attempt(attempt)))
            .min(remaining);
        tracing::trace!("{} still in progress, next check in {:?}", operation, delay);
        sleep(delay).await;
        attempt = attempt.saturating_add(1);
    }

    Err(CloudError::Timeout(format!(
        "{} did not complete within {}s ({} checks)",
        operation,
        config.max_wait_secs,
        attempt + 1
    )))
}
