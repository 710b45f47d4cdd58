//! Bounded-retry execution for reload operations.
//!
//! The policy is an explicit, inspectable value owned by the refresh task:
//! maximum attempts, fixed or exponential delay, a per-attempt timeout, and
//! the retryable-vs-fatal classification from
//! [`SyncError::is_retryable`](gatesync_types::SyncError::is_retryable).

use gatesync_types::{SyncError, error::Result};
use std::future::Future;
use std::time::Duration;

/// Delay progression between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// The same delay after every failed attempt.
    Fixed,
    /// Delay doubles after each failed attempt, capped at [`MAX_DELAY`].
    Exponential,
}

/// Upper bound on a single inter-attempt delay.
pub const MAX_DELAY: Duration = Duration::from_secs(30);

/// An explicit retry policy for refresh operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    /// A policy that tries exactly once with the given timeout.
    #[must_use]
    pub fn once(attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            backoff: Backoff::Fixed,
            attempt_timeout,
        }
    }

    /// Delay to sleep after the given 1-based failed attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.base_delay.saturating_mul(factor).min(MAX_DELAY)
            }
        }
    }

    /// Runs `op` under this policy.
    ///
    /// Each attempt is bounded by `attempt_timeout`; a timeout counts as one
    /// failed attempt. Retryable errors are retried up to `max_attempts`;
    /// fatal errors return immediately.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error, or the last retryable error once
    /// attempts are exhausted.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_err = None;

        for attempt in 1..=self.max_attempts.max(1) {
            match tokio::time::timeout(self.attempt_timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if e.is_retryable() => {
                    tracing::warn!(
                        op = op_name,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "reload attempt failed"
                    );
                    last_err = Some(e);
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    tracing::warn!(
                        op = op_name,
                        attempt,
                        timeout_ms = self.attempt_timeout.as_millis() as u64,
                        "reload attempt timed out"
                    );
                    last_err = Some(SyncError::Fetch(format!("{op_name}: attempt timed out")));
                }
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.delay_for(attempt)).await;
            }
        }

        Err(last_err.unwrap_or_else(|| SyncError::Fetch(format!("{op_name}: no attempts made"))))
    }
}
