//! HTTP boundary to the analysis backend.
//!
//! The [`Transport`] trait is the only place the pipeline touches the
//! network. Implementations classify every failure into a
//! [`FetchError`](crate::error::FetchError) once, so retry and state handling
//! never inspect raw responses.
//!
//! - [`ReqwestTransport`] - production implementation using reqwest
//! - Tests implement [`Transport`] directly with scripted responses

mod envelope;
mod http;
#[cfg(test)]
pub(crate) mod mock;
mod types;

pub use envelope::{error_from_status, parse_envelope};
pub use http::{cache_control_value, ReqwestTransport, DEFAULT_USER_AGENT};
pub use types::{BackendResponse, Transport};
