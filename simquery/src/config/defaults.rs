//! Default values for all configuration settings.

use std::path::PathBuf;
use std::time::Duration;

use super::settings::*;

// =============================================================================
// [backend]
// =============================================================================

/// Backend root URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Path prefix under which every endpoint lives.
pub const DEFAULT_API_PREFIX: &str = "/api";

/// Per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// [scheduler]
// =============================================================================

/// Requests allowed to run at once.
///
/// The backend serialises heavy work per worker, so one at a time keeps
/// interactive latency predictable.
pub const DEFAULT_MAX_CONCURRENCY: usize = 1;

/// Pause after a request settles before the next one is admitted.
pub const DEFAULT_DISPATCH_DELAY_MS: u64 = 100;

// =============================================================================
// [cache]
// =============================================================================

/// Span during which an identical request is served from the cache.
pub const DEFAULT_DEDUP_WINDOW_MS: u64 = 5_000;

/// Stored results kept before the oldest is evicted.
pub const DEFAULT_MAX_CACHE_ENTRIES: usize = 50;

// =============================================================================
// [retry]
// =============================================================================

/// Retries after the first attempt. Zero disables retrying.
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 0;

/// Delay before the first retry; doubles per attempt.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;

// =============================================================================
// [logging]
// =============================================================================

pub const DEFAULT_LOG_DIRECTORY: &str = "logs";
pub const DEFAULT_LOG_FILE: &str = "simquery.log";

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            dispatch_delay: Duration::from_millis(DEFAULT_DISPATCH_DELAY_MS),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_millis(DEFAULT_DEDUP_WINDOW_MS),
            max_entries: DEFAULT_MAX_CACHE_ENTRIES,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_LOG_DIRECTORY),
            file: DEFAULT_LOG_FILE.to_string(),
        }
    }
}
