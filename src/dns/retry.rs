//! Retry budget and exponential backoff for single DNS queries.

use std::time::Duration;

/// Configuration for retry behavior of one (server, record type) query.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first (default: 2).
    pub max_retries: u32,
    /// Delay before the first retry; doubles for every further one (default: 1s).
    pub base_delay: Duration,
    /// Cap on a single backoff delay (default: 30s).
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy with the given retry budget and the default backoff.
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Create a policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self::with_max_retries(0)
    }

    /// Total attempts, first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Calculate the delay to wait before `attempt` (0-based).
///
/// Attempt 0 starts immediately; attempt `n` waits `base_delay * 2^(n-1)`,
/// capped at `max_delay`.
pub fn calculate_backoff(attempt: u32, policy: &RetryPolicy) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 1u32 << (attempt - 1).min(16);
    policy
        .base_delay
        .saturating_mul(factor)
        .min(policy.max_delay)
}

/// Check if another attempt is allowed after `attempts_made` attempts.
pub fn should_retry(attempts_made: u32, policy: &RetryPolicy) -> bool {
    attempts_made < policy.max_attempts()
}
