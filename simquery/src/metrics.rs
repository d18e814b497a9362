//! Per-request metrics.
//!
//! A [`MetricsCollector`] is started when a request enters the pipeline and
//! finished when it settles. The resulting [`RequestMetrics`] travels with the
//! result to the consumer (snapshot and `on_progress` callback) and into the
//! deduplication cache; it is never aggregated or persisted.

use crate::transport::BackendResponse;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Metrics attached to one completed request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestMetrics {
    /// Wall time measured by the client, including queueing and retries.
    pub client_elapsed: Duration,
    /// Processing time reported by the backend, if it sent one.
    pub server_elapsed: Option<Duration>,
    /// Payload size, if known.
    pub payload_bytes: Option<u64>,
    /// True if the result came from the deduplication cache.
    pub cache_hit: bool,
    /// Whether the backend reported serving from its own cache.
    pub server_cache_hit: Option<bool>,
}

impl RequestMetrics {
    /// Derives the metrics reported for a cache hit on a stored entry.
    ///
    /// Size information is carried over; timings describe only the lookup.
    pub fn as_cache_hit(&self, lookup_elapsed: Duration) -> Self {
        Self {
            client_elapsed: lookup_elapsed,
            server_elapsed: None,
            payload_bytes: self.payload_bytes,
            cache_hit: true,
            server_cache_hit: None,
        }
    }
}

/// Measures one request from submission to completion.
#[derive(Debug, Clone, Copy)]
pub struct MetricsCollector {
    started: Instant,
}

impl MetricsCollector {
    /// Starts measuring now.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Time since the collector was started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Finishes a request that reached the backend.
    pub fn finish(self, key: &str, response: &BackendResponse) -> RequestMetrics {
        let metrics = RequestMetrics {
            client_elapsed: self.elapsed(),
            server_elapsed: response.server_elapsed,
            payload_bytes: response.payload_bytes,
            cache_hit: false,
            server_cache_hit: response.server_cache_hit,
        };
        debug!(
            key = key,
            elapsed_ms = metrics.client_elapsed.as_millis() as u64,
            server_ms = metrics.server_elapsed.map(|d| d.as_millis() as u64),
            bytes = metrics.payload_bytes,
            "Request completed"
        );
        metrics
    }

    /// Finishes a request that was served from the deduplication cache.
    pub fn finish_cache_hit(self, key: &str, stored: &RequestMetrics) -> RequestMetrics {
        let metrics = stored.as_cache_hit(self.elapsed());
        debug!(key = key, bytes = metrics.payload_bytes, "Served from dedup cache");
        metrics
    }
}
