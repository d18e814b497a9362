//! simquery - request orchestration and caching for simulation analysis backends
//!
//! Interactive analysis front ends issue many overlapping, parameter-driven
//! requests against a backend that serialises heavy work. This library sits
//! between the two:
//!
//! - [`scheduler`] bounds concurrent backend requests and orders them by
//!   priority
//! - [`cache`] serves identical requests from a short dedup window and
//!   coalesces identical in-flight requests into one network call
//! - [`retry`] retries transient failures with exponential backoff
//! - [`orchestrator`] manages one consumer's data need, its cancellation and
//!   the state it renders
//!
//! # High-Level API
//!
//! ```ignore
//! use simquery::config::ConfigFile;
//! use simquery::orchestrator::{FetchContext, FetchOrchestrator};
//! use simquery::request::{FetchOptions, RequestParams};
//!
//! let settings = ConfigFile::load()?.to_context_settings();
//! let ctx = FetchContext::from_settings(&settings)?;
//!
//! let kpis = FetchOrchestrator::new(
//!     ctx.clone(),
//!     "kpis",
//!     RequestParams::new("project-1", "baseline"),
//!     true,
//!     FetchOptions::default(),
//! );
//! let snapshot = kpis.settled().await;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod request;
pub mod retry;
pub mod scheduler;
pub mod topology;
pub mod transport;

pub use error::{ErrorKind, FetchError};

/// Version of the simquery library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
