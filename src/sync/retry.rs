//! Bounded exponential backoff for page fetches.

use std::future::Future;
use std::time::Duration;

use crate::session::DriverError;

/// Retry behaviour for one network operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_backoff: Duration,
    /// Backoff ceiling
    pub max_backoff: Duration,
    /// Timeout applied to each attempt on its own
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of a retried operation that never succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
    /// Attempts made
    pub attempts: u32,
    /// Error from the final attempt
    pub last: DriverError,
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DriverError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = match tokio::time::timeout(self.attempt_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(DriverError::Timeout),
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !error.is_transient() || attempt >= max_attempts {
                return Err(RetryFailure {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.backoff(attempt);
            tracing::warn!(
                "{} failed ({}), retry {}/{} in {}ms",
                label,
                error,
                attempt,
                max_attempts - 1,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }
}
