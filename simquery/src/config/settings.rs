//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use std::path::PathBuf;
use std::time::Duration;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub backend: BackendSettings,
    pub scheduler: SchedulerSettings,
    pub cache: CacheSettings,
    pub retry: RetrySettings,
    pub logging: LoggingSettings,
}

/// Where and how to reach the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSettings {
    /// Scheme, host and port, e.g. `http://localhost:8000`
    pub base_url: String,
    /// Path prefix prepended to every endpoint, e.g. `/api`
    pub api_prefix: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// Admission control for outgoing requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub max_concurrency: usize,
    pub dispatch_delay: Duration,
}

/// Deduplication cache bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub dedup_window: Duration,
    pub max_entries: usize,
}

/// Default retry policy, overridable per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

/// Log file location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
}

/// The subset of configuration needed to build a fetch context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextSettings {
    pub backend: BackendSettings,
    pub scheduler: SchedulerSettings,
    pub cache: CacheSettings,
    pub retry: RetrySettings,
}

impl ConfigFile {
    /// Extracts the runtime settings for a [`FetchContext`](crate::orchestrator::FetchContext).
    pub fn to_context_settings(&self) -> ContextSettings {
        ContextSettings {
            backend: self.backend.clone(),
            scheduler: self.scheduler.clone(),
            cache: self.cache.clone(),
            retry: self.retry.clone(),
        }
    }

    /// Full path of the log file.
    pub fn log_file_path(&self) -> PathBuf {
        self.logging.directory.join(&self.logging.file)
    }
}
