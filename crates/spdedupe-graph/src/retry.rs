//! Retry policy for transient remote failures.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use spdedupe_core::RemoteError;

/// Upper bound on any single backoff.
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Exponential backoff honouring server-provided `Retry-After`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        retry_after.unwrap_or(backoff).min(MAX_DELAY)
    }

    /// Run `op` until it succeeds, fails permanently, exhausts the retries or
    /// the token is cancelled.
    pub async fn run<T, F, Fut>(
        &self,
        what: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(RemoteError::Cancelled);
            }

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_transient() || attempt >= self.max_retries {
                return Err(err);
            }

            let delay = self.delay_for(attempt, err.retry_after());
            attempt += 1;
            warn!(
                request = what,
                attempt,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient failure, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(RemoteError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}
