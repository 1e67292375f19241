use std::time::Duration;

use super::error::FetchFailure;

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Bounded attempts with a fixed delay between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first). Always at least 1.
    pub max_attempts: u32,
    /// Delay between consecutive attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Decide what to do after `attempt` (1-based) failed with `failure`.
    /// `None` marks a non-retryable failure.
    pub fn decide(&self, attempt: u32, failure: Option<FetchFailure>) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }
        match failure {
            Some(_) => RetryDecision::RetryAfter(self.backoff),
            None => RetryDecision::NoRetry,
        }
    }
}
