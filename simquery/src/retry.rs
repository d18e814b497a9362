//! Classification-aware retry with exponential backoff.
//!
//! Only [`ErrorKind::Server`](crate::error::ErrorKind::Server) and
//! [`ErrorKind::Network`](crate::error::ErrorKind::Network) failures are
//! retried. Client errors, application failures and cancellation propagate on
//! first occurrence.
//!
//! Retries are off by default. Consumers opt in per endpoint through
//! [`FetchOptions::max_retries`](crate::request::FetchOptions::max_retries).

use crate::config::{DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_ATTEMPTS};
use crate::error::FetchError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Largest exponent applied to the base delay.
const MAX_BACKOFF_SHIFT: u32 = 16;

/// Retry budget and backoff for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `2` means at most 3 calls.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each subsequent one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Backoff before retry number `attempt_index` (0-based):
    /// `base_delay * 2^attempt_index`.
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        let factor = 1u32 << attempt_index.min(MAX_BACKOFF_SHIFT);
        self.base_delay.saturating_mul(factor)
    }

    /// Runs `op` until it succeeds, fails terminally, or the budget is spent.
    ///
    /// `op` receives the 0-based attempt number. Backoff sleeps observe
    /// `cancel`; a cancellation during backoff returns
    /// [`FetchError::Cancelled`] without another attempt.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let error = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !error.is_retryable() {
                if !error.is_cancelled() {
                    debug!(attempt, error = %error, "Non-retryable failure");
                }
                return Err(error);
            }

            if attempt >= self.max_attempts {
                if self.max_attempts > 0 {
                    warn!(
                        attempts = attempt + 1,
                        error = %error,
                        "Retries exhausted"
                    );
                }
                return Err(error);
            }

            let delay = self.delay_for(attempt);
            debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying after backoff"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
