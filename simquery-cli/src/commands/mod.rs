//! CLI command implementations.
//!
//! - [`config`] - Configuration management (show, init, path)
//! - [`fetch`] - Fetch one endpoint through the request pipeline

pub mod config;
pub mod fetch;
