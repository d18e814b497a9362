//! Scripted transport for unit tests.

use super::types::{BackendResponse, Transport};
use crate::error::FetchError;
use crate::request::BackendRequest;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type Responder =
    Box<dyn Fn(&BackendRequest, usize) -> Result<BackendResponse, FetchError> + Send + Sync>;

/// Answers every call through a responder closure after optional latency.
///
/// The responder receives the request and the 0-based call number.
pub(crate) struct MockTransport {
    calls: AtomicUsize,
    latency: Duration,
    seen: Mutex<Vec<BackendRequest>>,
    respond: Responder,
}

impl MockTransport {
    pub(crate) fn with(
        respond: impl Fn(&BackendRequest, usize) -> Result<BackendResponse, FetchError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            latency: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        }
    }

    pub(crate) fn ok(payload: Value) -> Self {
        Self::with(move |_, _| Ok(BackendResponse::new(payload.clone())))
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<BackendRequest> {
        self.seen.lock().clone()
    }
}

impl Transport for MockTransport {
    async fn get(
        &self,
        request: &BackendRequest,
        cancel: &CancellationToken,
    ) -> Result<BackendResponse, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(request.clone());

        if !self.latency.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(self.latency) => {}
            }
        }
        (self.respond)(request, call)
    }
}
