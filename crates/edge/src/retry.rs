//! Retry with exponential backoff, shared by playlist reloads and segment fetches.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::{EdgeError, EdgeResult};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failure; doubled on each further failure.
    pub base_delay: Duration,
    /// Hard cap on a single delay.
    pub max_delay: Duration,
    /// Adds up to `base_delay / 2` of random delay, still capped by `max_delay`.
    pub jitter: bool,
}

impl RetryPolicy {
    /// Delay to wait after the failed attempt number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let capped = self
            .base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if !self.jitter {
            return capped;
        }

        let jitter_range_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX) / 2;
        let remaining_ms =
            u64::try_from(self.max_delay.saturating_sub(capped).as_millis()).unwrap_or(0);
        let limit_ms = jitter_range_ms.min(remaining_ms);
        if limit_ms == 0 {
            return capped;
        }

        let jitter_ms = rand::thread_rng().gen_range(0..limit_ms);
        (capped + Duration::from_millis(jitter_ms)).min(self.max_delay)
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// the policy runs out of attempts. The last error is returned.
///
/// The closure receives the 0-indexed attempt number.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    mut operation: F,
) -> EdgeResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = EdgeResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        if token.is_cancelled() {
            return Err(EdgeError::Cancelled);
        }

        let error = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => e,
        };

        attempt += 1;
        if attempt >= max_attempts {
            return Err(error);
        }

        let delay = policy.delay_for_attempt(attempt - 1);
        tracing::warn!(
            attempt,
            max = max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Retrying after transient error: {error}"
        );
        tokio::select! {
            _ = token.cancelled() => return Err(EdgeError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
