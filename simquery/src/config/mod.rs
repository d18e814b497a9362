//! Configuration for simquery components.
//!
//! User configuration lives in `~/.simquery/config.ini`. It is loaded into a
//! [`ConfigFile`], starting from defaults and overlaying the keys found in
//! the file, then converted into the runtime [`ContextSettings`] used to
//! build a [`FetchContext`](crate::orchestrator::FetchContext).
//!
//! # Example
//!
//! ```
//! use simquery::config::ConfigFile;
//!
//! let config = ConfigFile::default();
//! let settings = config.to_context_settings();
//! assert_eq!(settings.scheduler.max_concurrency, 1);
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    BackendSettings, CacheSettings, ConfigFile, ContextSettings, LoggingSettings, RetrySettings,
    SchedulerSettings,
};
