//! Per-consumer fetch orchestration.
//!
//! A [`FetchOrchestrator`] manages one logical data need of one UI
//! consumer: an endpoint plus parameters and options. It derives the
//! canonical key, drives the shared [`FetchContext`] and owns cancellation
//! and state transitions for that consumer.
//!
//! # State machine
//!
//! ```text
//!            trigger (params changed / refetch / enabled)
//!   Idle ──────────────────────────────► Loading
//!    ▲                                    │ │ │
//!    │ cancelled                 success  │ │ │ error
//!    └────────────────────────────────────┘ │ └──────► Error   (data cleared)
//!                                           └────────► Success (data + metrics)
//! ```
//!
//! Triggers are synchronous: the in-flight guard and operation id are set
//! before the call returns, so a burst of identical triggers starts one
//! operation. A newer operation cancels the previous one, and results
//! tagged with a superseded operation id are discarded.
//!
//! After [`teardown`](FetchOrchestrator::teardown) (or drop) nothing mutates
//! the consumer's state.

mod context;
mod state;

pub use context::FetchContext;
pub use state::{FetchSnapshot, FetchStatus};

use crate::cache::FetchOutput;
use crate::error::FetchError;
use crate::request::{BackendRequest, FetchOptions, RequestParams};
use crate::transport::Transport;
use parking_lot::Mutex;
use state::{SubscriberState, Trigger};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

struct Shared {
    state: Mutex<SubscriberState>,
    snapshot: watch::Sender<FetchSnapshot>,
    /// Cancelled at teardown; bounds background work not tied to one operation.
    lifetime: CancellationToken,
}

/// Lifecycle manager for one consumer's data need.
///
/// Must be created and driven from within a Tokio runtime.
pub struct FetchOrchestrator<T: Transport> {
    ctx: FetchContext<T>,
    shared: Arc<Shared>,
}

impl<T: Transport> FetchOrchestrator<T> {
    /// Creates the consumer handle and, if `enabled`, starts the first fetch.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Process-wide fetch context
    /// * `endpoint` - Endpoint path relative to the API prefix
    /// * `params` - Project, scenario, file and filters
    /// * `enabled` - Whether fetching is allowed yet
    /// * `options` - Priority, caching, heavy payload and callbacks
    pub fn new(
        ctx: FetchContext<T>,
        endpoint: impl Into<String>,
        params: RequestParams,
        enabled: bool,
        options: FetchOptions,
    ) -> Self {
        let (snapshot, _) = watch::channel(FetchSnapshot::default());
        let orchestrator = Self {
            ctx,
            shared: Arc::new(Shared {
                state: Mutex::new(SubscriberState::new(
                    endpoint.into(),
                    params,
                    options,
                    enabled,
                )),
                snapshot,
                lifetime: CancellationToken::new(),
            }),
        };
        orchestrator.trigger(Trigger::Initial);
        orchestrator
    }

    /// Current consumer-visible state.
    pub fn snapshot(&self) -> FetchSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    /// Receives every state change.
    pub fn subscribe(&self) -> watch::Receiver<FetchSnapshot> {
        self.shared.snapshot.subscribe()
    }

    /// Waits until the consumer is no longer loading and returns that state.
    pub async fn settled(&self) -> FetchSnapshot {
        let mut receiver = self.subscribe();
        let settled = match receiver.wait_for(|snapshot| !snapshot.is_loading()).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        };
        settled
    }

    /// Canonical key of the latest operation.
    pub fn current_key(&self) -> Option<String> {
        self.shared.state.lock().current_key.clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.shared.state.lock().in_flight
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.state.lock().enabled
    }

    pub fn context(&self) -> &FetchContext<T> {
        &self.ctx
    }

    /// Re-runs the current request.
    ///
    /// Ignored while an identical request is in flight. A fresh result
    /// still in the dedup window is served from the cache unless the
    /// options disable caching.
    pub fn refetch(&self) {
        self.trigger(Trigger::Refetch);
    }

    /// Replaces the request parameters, starting a new fetch if they changed.
    pub fn set_params(&self, params: RequestParams) {
        {
            let mut state = self.shared.state.lock();
            if state.params == params {
                return;
            }
            state.params = params;
        }
        self.trigger(Trigger::ParamsChanged);
    }

    /// Replaces the options, starting a new fetch if the request changed.
    pub fn set_options(&self, options: FetchOptions) {
        self.shared.state.lock().options = options;
        self.trigger(Trigger::ParamsChanged);
    }

    /// Enables or disables fetching.
    ///
    /// Disabling cancels the current operation; enabling starts one.
    pub fn set_enabled(&self, enabled: bool) {
        {
            let mut state = self.shared.state.lock();
            if state.enabled == enabled {
                return;
            }
            state.enabled = enabled;
            if !enabled {
                let was_in_flight = state.in_flight;
                state.abort_current();
                state.operation += 1;
                if was_in_flight {
                    self.shared.snapshot.send_modify(FetchSnapshot::idle);
                }
                return;
            }
        }
        self.trigger(Trigger::Enabled);
    }

    /// Cancels the current operation. The consumer returns to idle without
    /// an error.
    pub fn cancel(&self) {
        let mut state = self.shared.state.lock();
        if !state.in_flight {
            return;
        }
        state.abort_current();
        state.operation += 1;
        self.shared.snapshot.send_modify(FetchSnapshot::idle);
        debug!(endpoint = %state.endpoint, "Fetch cancelled");
    }

    /// Detaches the consumer. Pending work is cancelled and no state changes
    /// afterwards. Also runs on drop.
    pub fn teardown(&self) {
        let mut state = self.shared.state.lock();
        if state.torn_down {
            return;
        }
        state.torn_down = true;
        state.abort_current();
        self.shared.lifetime.cancel();
        debug!(endpoint = %state.endpoint, "Consumer torn down");
    }

    fn trigger(&self, trigger: Trigger) {
        let mut state = self.shared.state.lock();
        if state.torn_down || !state.enabled {
            return;
        }

        let request = BackendRequest::build(&state.endpoint, &state.params, &state.options);
        let key = request.canonical_key();
        if state.in_flight && state.current_key.as_deref() == Some(key.as_str()) {
            debug!(key = %key, trigger = ?trigger, "Ignoring trigger - identical request in flight");
            return;
        }

        state.abort_current();
        state.operation += 1;
        let operation = state.operation;
        let token = CancellationToken::new();
        state.abort = Some(token.clone());
        state.in_flight = true;
        state.current_key = Some(key.clone());
        let options = state.options.clone();

        let (project, scenario) = state.params.scope();
        let scope = (project.to_string(), scenario.to_string());
        let resolve_topology = options.on_classification_detected.is_some()
            && self.ctx.has_topology()
            && state.topology_scope.as_ref() != Some(&scope);
        if resolve_topology {
            state.topology_scope = Some(scope);
        }
        let params = state.params.clone();

        self.shared.snapshot.send_modify(FetchSnapshot::loading);
        drop(state);

        debug!(
            key = %key,
            operation = operation,
            trigger = ?trigger,
            priority = %options.priority,
            "Starting fetch"
        );

        if resolve_topology {
            self.spawn_topology(params, options.clone());
        }

        let ctx = self.ctx.clone();
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let result = ctx.fetch(&request, &options, &token).await;
            apply(&shared, operation, result, &options);
        });
    }

    fn spawn_topology(&self, params: RequestParams, options: FetchOptions) {
        let Some(callback) = options.on_classification_detected else {
            return;
        };
        let ctx = self.ctx.clone();
        let shared = Arc::clone(&self.shared);

        tokio::spawn(async move {
            match ctx.resolve_topology(&params, &shared.lifetime).await {
                Ok(Some(topology)) => {
                    if !shared.state.lock().torn_down {
                        callback(&topology);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    if !e.is_cancelled() {
                        warn!(error = %e, "Topology lookup failed");
                    }
                    let mut state = shared.state.lock();
                    state.topology_scope = None;
                }
            }
        });
    }
}

/// Applies a settled result if its operation is still current.
fn apply(
    shared: &Shared,
    operation: u64,
    result: Result<FetchOutput, FetchError>,
    options: &FetchOptions,
) {
    let progress = {
        let mut state = shared.state.lock();
        if !state.accepts(operation) {
            debug!(
                operation = operation,
                current = state.operation,
                torn_down = state.torn_down,
                "Discarding result for superseded operation"
            );
            return;
        }
        state.in_flight = false;
        state.abort = None;

        match result {
            Ok(output) => {
                let metrics = output.metrics;
                shared
                    .snapshot
                    .send_modify(|s| s.succeeded(output.payload, metrics));
                Some(metrics)
            }
            Err(e) if e.is_cancelled() => {
                shared.snapshot.send_modify(FetchSnapshot::idle);
                None
            }
            Err(e) => {
                warn!(
                    endpoint = %state.endpoint,
                    kind = ?e.kind(),
                    error = %e,
                    "Fetch failed"
                );
                let message = e.user_message();
                shared.snapshot.send_modify(|s| s.failed(message));
                None
            }
        }
    };

    if let (Some(metrics), Some(callback)) = (progress, &options.on_progress) {
        callback(&metrics);
    }
}

impl<T: Transport> Drop for FetchOrchestrator<T> {
    fn drop(&mut self) {
        self.teardown();
    }
}
