//! Consumer-visible state and the per-consumer bookkeeping behind it.

use crate::metrics::RequestMetrics;
use crate::request::{FetchOptions, RequestParams};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Lifecycle of one consumer's data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FetchStatus {
    /// Nothing requested yet, disabled, or the last request was cancelled.
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchStatus::Idle => write!(f, "idle"),
            FetchStatus::Loading => write!(f, "loading"),
            FetchStatus::Success => write!(f, "success"),
            FetchStatus::Error => write!(f, "error"),
        }
    }
}

/// What a consumer renders: `{data, loading, error, metrics}`.
///
/// `data` and `error` are never both set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchSnapshot {
    pub status: FetchStatus,
    pub data: Option<Arc<Value>>,
    pub error: Option<String>,
    pub metrics: Option<RequestMetrics>,
}

impl FetchSnapshot {
    pub fn is_loading(&self) -> bool {
        self.status == FetchStatus::Loading
    }

    pub(super) fn loading(&mut self) {
        self.status = FetchStatus::Loading;
        self.error = None;
    }

    pub(super) fn succeeded(&mut self, data: Arc<Value>, metrics: RequestMetrics) {
        self.status = FetchStatus::Success;
        self.data = Some(data);
        self.error = None;
        self.metrics = Some(metrics);
    }

    pub(super) fn failed(&mut self, message: String) {
        self.status = FetchStatus::Error;
        self.data = None;
        self.error = Some(message);
        self.metrics = None;
    }

    /// Returns to idle without touching data already shown.
    pub(super) fn idle(&mut self) {
        self.status = FetchStatus::Idle;
        self.error = None;
    }
}

/// Why an operation is being started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Trigger {
    Initial,
    ParamsChanged,
    Enabled,
    Refetch,
}

/// Per-consumer state, mutated only through the orchestrator's transitions.
pub(super) struct SubscriberState {
    pub(super) endpoint: String,
    pub(super) params: RequestParams,
    pub(super) options: FetchOptions,
    pub(super) enabled: bool,
    /// Canonical key of the latest operation.
    pub(super) current_key: Option<String>,
    /// Set synchronously when an operation starts, cleared when it settles.
    pub(super) in_flight: bool,
    /// Cancels the latest operation.
    pub(super) abort: Option<CancellationToken>,
    /// Identity of the latest operation; results for older ids are dropped.
    pub(super) operation: u64,
    /// Scope whose topology has already been requested.
    pub(super) topology_scope: Option<(String, String)>,
    pub(super) torn_down: bool,
}

impl SubscriberState {
    pub(super) fn new(
        endpoint: String,
        params: RequestParams,
        options: FetchOptions,
        enabled: bool,
    ) -> Self {
        Self {
            endpoint,
            params,
            options,
            enabled,
            current_key: None,
            in_flight: false,
            abort: None,
            operation: 0,
            topology_scope: None,
            torn_down: false,
        }
    }

    /// Cancels the latest operation, if any, and forgets it.
    pub(super) fn abort_current(&mut self) {
        if let Some(token) = self.abort.take() {
            token.cancel();
        }
        self.in_flight = false;
    }

    /// True if `operation` is still the one whose result should be applied.
    pub(super) fn accepts(&self, operation: u64) -> bool {
        !self.torn_down && self.operation == operation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_clears_data() {
        let mut snapshot = FetchSnapshot::default();
        snapshot.succeeded(Arc::new(json!([1])), RequestMetrics::default());
        assert!(snapshot.data.is_some());

        snapshot.failed("Request failed with status code 500".into());
        assert_eq!(snapshot.status, FetchStatus::Error);
        assert!(snapshot.data.is_none());
        assert!(snapshot.metrics.is_none());
    }

    #[test]
    fn test_success_clears_error() {
        let mut snapshot = FetchSnapshot::default();
        snapshot.failed("boom".into());
        snapshot.loading();
        assert!(snapshot.error.is_none());
        assert!(snapshot.is_loading());

        snapshot.succeeded(Arc::new(json!({})), RequestMetrics::default());
        assert!(snapshot.error.is_none());
    }

    #[test]
    fn test_abort_current_cancels_token() {
        let mut state = SubscriberState::new(
            "kpis".into(),
            RequestParams::new("p", "s"),
            FetchOptions::default(),
            true,
        );
        let token = CancellationToken::new();
        state.abort = Some(token.clone());
        state.in_flight = true;

        state.abort_current();
        assert!(token.is_cancelled());
        assert!(!state.in_flight);
        assert!(state.abort.is_none());
    }

    #[test]
    fn test_accepts_only_latest_live_operation() {
        let mut state = SubscriberState::new(
            "kpis".into(),
            RequestParams::new("p", "s"),
            FetchOptions::default(),
            true,
        );
        state.operation = 3;
        assert!(state.accepts(3));
        assert!(!state.accepts(2));

        state.torn_down = true;
        assert!(!state.accepts(3));
    }
}
