//! INI serialization logic for converting `ConfigFile` → INI string.

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    format!(
        r#"[backend]
; Backend root URL (scheme, host and port)
base_url = {}
; Path prefix prepended to every endpoint
api_prefix = {}
; Per-request timeout in seconds. Timeouts count as network errors.
timeout_secs = {}

[scheduler]
; Requests allowed to run against the backend at once (default: 1)
max_concurrency = {}
; Pause after each request settles before the next is admitted
dispatch_delay_ms = {}

[cache]
; Identical requests within this window are served from memory
dedup_window_ms = {}
; Results kept before the oldest is evicted
max_entries = {}

[retry]
; Retries for server and network failures. 0 disables retrying.
; Client errors (4xx) and application failures are never retried.
max_attempts = {}
; Delay before the first retry; doubles for each subsequent retry
base_delay_ms = {}

[logging]
; Directory for log files (relative paths resolve from the working directory)
directory = {}
file = {}
"#,
        config.backend.base_url,
        config.backend.api_prefix,
        config.backend.timeout_secs,
        config.scheduler.max_concurrency,
        config.scheduler.dispatch_delay.as_millis(),
        config.cache.dedup_window.as_millis(),
        config.cache.max_entries,
        config.retry.max_attempts,
        config.retry.base_delay.as_millis(),
        config.logging.directory.to_string_lossy(),
        config.logging.file,
    )
}
