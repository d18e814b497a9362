//! The process-wide fetch context.
//!
//! One [`FetchContext`] is built at startup and cloned into every
//! [`FetchOrchestrator`](super::FetchOrchestrator). It owns the shared
//! scheduler queue, the deduplication cache, the transport and the default
//! retry policy. Tests build a fresh context per case.
//!
//! # Request path
//!
//! ```text
//! fetch(request)
//!   ├─ cache hit (use_cache)  ──────────────────────────► FetchOutput
//!   └─ join(key)
//!        ├─ follower ─────────────────── wait ──────────► FetchOutput
//!        └─ leader: spawn operation
//!             retry.run( scheduler.submit( transport.get ) )
//!                                  └── complete(key) ──► all waiters
//! ```

use crate::cache::{DeduplicationCache, FetchOutput, OperationHandle};
use crate::config::ContextSettings;
use crate::error::FetchError;
use crate::metrics::MetricsCollector;
use crate::request::{BackendRequest, FetchOptions, Priority, RequestParams};
use crate::retry::RetryPolicy;
use crate::scheduler::{RequestDescriptor, RequestScheduler};
use crate::topology::{DatasetTopology, TopologyResolver};
use crate::transport::{BackendResponse, ReqwestTransport, Transport};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Shared state behind every orchestrator.
pub struct FetchContext<T> {
    scheduler: RequestScheduler<BackendResponse>,
    cache: DeduplicationCache,
    transport: Arc<T>,
    retry: RetryPolicy,
    topology: Option<Arc<TopologyResolver>>,
}

impl<T> Clone for FetchContext<T> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
            cache: self.cache.clone(),
            transport: Arc::clone(&self.transport),
            retry: self.retry,
            topology: self.topology.clone(),
        }
    }
}

impl FetchContext<ReqwestTransport> {
    /// Builds a context talking to the configured backend over HTTP.
    pub fn from_settings(settings: &ContextSettings) -> Result<Self, FetchError> {
        let transport = ReqwestTransport::new(&settings.backend)?;
        Ok(Self::new(transport, settings))
    }
}

impl<T: Transport> FetchContext<T> {
    /// Builds a context around an existing transport.
    pub fn new(transport: T, settings: &ContextSettings) -> Self {
        Self::from_parts(
            transport,
            RequestScheduler::from_settings(&settings.scheduler),
            DeduplicationCache::new(settings.cache.dedup_window, settings.cache.max_entries),
            RetryPolicy::new(settings.retry.max_attempts, settings.retry.base_delay),
        )
    }

    /// Builds a context from individually configured components.
    pub fn from_parts(
        transport: T,
        scheduler: RequestScheduler<BackendResponse>,
        cache: DeduplicationCache,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            scheduler,
            cache,
            transport: Arc::new(transport),
            retry,
            topology: None,
        }
    }

    /// Enables topology resolution for consumers that ask for it.
    pub fn with_topology(mut self, resolver: TopologyResolver) -> Self {
        self.topology = Some(Arc::new(resolver));
        self
    }

    pub fn scheduler(&self) -> &RequestScheduler<BackendResponse> {
        &self.scheduler
    }

    pub fn cache(&self) -> &DeduplicationCache {
        &self.cache
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn has_topology(&self) -> bool {
        self.topology.is_some()
    }

    /// Fetches one request through cache, coalescing, retry and scheduler.
    ///
    /// `cancel` is the caller's own signal. Cancelling it detaches this
    /// caller; the shared network operation is cancelled only when no other
    /// caller is waiting on it.
    pub async fn fetch(
        &self,
        request: &BackendRequest,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<FetchOutput, FetchError> {
        let key = request.canonical_key();
        let collector = MetricsCollector::start();

        if options.use_cache {
            if let Some(entry) = self.cache.lookup(&key) {
                let metrics = collector.finish_cache_hit(&key, &entry.metrics);
                return Ok(FetchOutput {
                    payload: entry.payload,
                    metrics,
                });
            }
        }

        let (mut ticket, operation) = self.cache.join(&key).into_parts();
        if let Some(operation) = operation {
            let retry = options
                .max_retries
                .map_or(self.retry, |n| self.retry.with_max_attempts(n));
            self.spawn_operation(operation, request.clone(), options.priority, retry, collector);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            outcome = ticket.wait() => outcome,
        }
    }

    /// Runs the network operation for a leader in the background.
    fn spawn_operation(
        &self,
        operation: OperationHandle,
        request: BackendRequest,
        priority: Priority,
        retry: RetryPolicy,
        collector: MetricsCollector,
    ) {
        let scheduler = self.scheduler.clone();
        let transport = Arc::clone(&self.transport);

        tokio::spawn(async move {
            let token = operation.token().clone();
            let key = operation.key().to_string();

            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(FetchError::Cancelled),
                result = retry.run(&token, |attempt| {
                    let transport = Arc::clone(&transport);
                    let request = request.clone();
                    let token = token.clone();
                    scheduler.submit(RequestDescriptor::new(
                        key.clone(),
                        priority,
                        move || async move {
                            if attempt > 0 {
                                debug!(endpoint = %request.endpoint, attempt = attempt, "Retry attempt");
                            }
                            transport.get(&request, &token).await
                        },
                    ))
                }) => result,
            };

            let outcome = result.map(|response| FetchOutput {
                metrics: collector.finish(&key, &response),
                payload: Arc::new(response.payload),
            });
            if let Err(e) = &outcome {
                if !e.is_cancelled() {
                    warn!(key = %key, error = %e, "Request failed");
                }
            }
            operation.complete(outcome);
        });
    }

    /// Resolves the dataset topology for the scope of `params`.
    ///
    /// Returns `Ok(None)` when the context has no topology resolver.
    pub async fn resolve_topology(
        &self,
        params: &RequestParams,
        cancel: &CancellationToken,
    ) -> Result<Option<DatasetTopology>, FetchError> {
        let Some(resolver) = &self.topology else {
            return Ok(None);
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = resolver.resolve(self.transport.as_ref(), params, cancel) => result.map(Some),
        }
    }
}

impl<T> std::fmt::Debug for FetchContext<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchContext")
            .field("scheduler", &self.scheduler)
            .field("cache", &self.cache)
            .field("retry", &self.retry)
            .field("topology", &self.topology.is_some())
            .finish_non_exhaustive()
    }
}
