//! Transport types and traits

use crate::error::FetchError;
use crate::request::BackendRequest;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A successful backend response, already unwrapped from its envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    /// The envelope's `data` field.
    pub payload: Value,
    /// Backend-reported processing time, if present.
    pub server_elapsed: Option<Duration>,
    /// Response size in bytes, if known.
    pub payload_bytes: Option<u64>,
    /// Backend-reported cache status, if present.
    pub server_cache_hit: Option<bool>,
}

impl BackendResponse {
    /// Creates a response carrying only a payload.
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            server_elapsed: None,
            payload_bytes: None,
            server_cache_hit: None,
        }
    }
}

/// Asynchronous GET access to the backend.
///
/// Implementations must observe `cancel` and return
/// [`FetchError::Cancelled`] promptly once it fires, and must enforce their
/// own per-request timeout.
pub trait Transport: Send + Sync + 'static {
    /// Performs one GET request.
    ///
    /// # Arguments
    ///
    /// * `request` - Endpoint, query parameters and cache preference
    /// * `cancel` - Cooperative cancellation signal for this operation
    fn get(
        &self,
        request: &BackendRequest,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<BackendResponse, FetchError>> + Send;
}
