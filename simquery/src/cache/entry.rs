//! Cache entry and shared outcome types.

use crate::error::FetchError;
use crate::metrics::RequestMetrics;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;

/// A successful request result: payload plus the metrics it was fetched with.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutput {
    pub payload: Arc<Value>,
    pub metrics: RequestMetrics,
}

/// The value broadcast to every waiter of a coalesced operation.
pub type SharedOutcome = Result<FetchOutput, FetchError>;

/// A stored result.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Arc<Value>,
    pub metrics: RequestMetrics,
    pub cached_at: Instant,
}

impl CacheEntry {
    /// Returns true if the entry is still inside `window` at `now`.
    pub(crate) fn is_fresh(&self, now: Instant, window: std::time::Duration) -> bool {
        now.saturating_duration_since(self.cached_at) < window
    }
}
