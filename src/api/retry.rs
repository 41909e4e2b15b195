//! Retry with exponential backoff for JSON API calls.
//!
//! Retries network failures and 5xx responses. Client errors (4xx) and
//! decode failures are returned immediately.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::error::ApiError;

/// Maximum number of retry attempts after the initial request.
pub const MAX_RETRIES: u32 = 3;

/// Base delay between retries (doubles each attempt: 500ms, 1s, 2s).
pub const BASE_DELAY_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: MAX_RETRIES, base_delay: Duration::from_millis(BASE_DELAY_MS) }
    }
}

impl RetryPolicy {
    /// No retries at all.
    #[must_use]
    pub fn none() -> Self {
        Self { max_retries: 0, base_delay: Duration::ZERO }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Run `f` until it succeeds, fails with a non-retryable error, or the
/// policy's retry budget is spent.
pub async fn with_backoff<T, F, Fut>(policy: RetryPolicy, what: &str, f: F) -> Result<T, ApiError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    for attempt in 0..policy.max_retries {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.retryable() => {
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    request = what,
                    "API request failed, retrying in {delay:?}: {e}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
    f().await
}
