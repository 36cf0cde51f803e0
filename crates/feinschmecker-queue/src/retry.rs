use feinschmecker_core::{FeinschmeckerError, TaskSettings};
use std::time::Duration;

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_cap: Duration,
    /// Wall-clock budget for a single attempt.
    pub execution_budget: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_cap: Duration::from_secs(60),
            execution_budget: Duration::from_secs(300),
        }
    }
}

impl From<&TaskSettings> for RetryPolicy {
    fn from(settings: &TaskSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            backoff_cap: Duration::from_secs(settings.backoff_cap_secs),
            execution_budget: Duration::from_secs(settings.execution_budget_secs),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `min(2^retry, cap)` seconds.
    pub fn backoff(&self, retry: u32) -> Duration {
        let secs = 2u64.checked_pow(retry).unwrap_or(u64::MAX);
        Duration::from_secs(secs).min(self.backoff_cap)
    }

    pub fn is_retryable(&self, err: &FeinschmeckerError) -> bool {
        err.is_transient()
    }

    /// Whether another retry is allowed after `retries` have already been spent.
    pub fn allows_retry(&self, retries: u32) -> bool {
        retries < self.max_retries
    }
}
