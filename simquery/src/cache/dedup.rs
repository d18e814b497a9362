//! The deduplication cache.

use super::entry::{CacheEntry, FetchOutput, SharedOutcome};
use super::inflight::{InFlight, Join, OperationHandle, WaitTicket};
use super::stats::CacheStats;
use crate::config::{DEFAULT_DEDUP_WINDOW_MS, DEFAULT_MAX_CACHE_ENTRIES};
use crate::metrics::RequestMetrics;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Only one outcome is ever sent per operation.
const COMPLETION_CHANNEL_CAPACITY: usize = 4;

/// Process-wide result cache keyed by canonical request key.
///
/// Cheap to clone; clones share the same storage. Entries older than the
/// dedup window are treated as misses, and at most `max_entries` results are
/// kept (oldest dropped first).
#[derive(Clone)]
pub struct DeduplicationCache {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<CacheState>,
    window: Duration,
    max_entries: usize,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Keys in insertion order, oldest first.
    order: VecDeque<String>,
    in_flight: HashMap<String, InFlight>,
    next_generation: u64,
    hits: u64,
    misses: u64,
    coalesced: u64,
    evictions: u64,
}

impl CacheState {
    fn remove_entry(&mut self, key: &str) -> bool {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    /// Drops expired entries from the front of the insertion order.
    fn sweep_expired(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.order.front() {
            let expired = self
                .entries
                .get(oldest)
                .map_or(true, |entry| !entry.is_fresh(now, window));
            if !expired {
                break;
            }
            if let Some(key) = self.order.pop_front() {
                self.entries.remove(&key);
            }
        }
    }
}

impl DeduplicationCache {
    /// Creates an empty cache.
    ///
    /// # Arguments
    ///
    /// * `window` - How long a stored result answers identical requests
    /// * `max_entries` - Upper bound on stored results
    pub fn new(window: Duration, max_entries: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(CacheState::default()),
                window,
                max_entries,
            }),
        }
    }

    pub fn window(&self) -> Duration {
        self.shared.window
    }

    pub fn max_entries(&self) -> usize {
        self.shared.max_entries
    }

    /// Returns the stored entry for `key` if it is inside the dedup window.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn lookup(&self, key: &str) -> Option<CacheEntry> {
        let now = Instant::now();
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;

        let fresh = state
            .entries
            .get(key)
            .map(|entry| entry.is_fresh(now, self.shared.window));

        match fresh {
            Some(true) => {
                state.hits += 1;
                state.entries.get(key).cloned()
            }
            Some(false) => {
                state.remove_entry(key);
                state.misses += 1;
                debug!(key = %key, "Cache entry expired");
                None
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    /// Stores a successful result, replacing any previous entry for `key`.
    pub fn record(&self, key: &str, payload: Arc<Value>, metrics: RequestMetrics) {
        let mut state = self.shared.state.lock();
        self.store(&mut state, key, payload, metrics);
    }

    fn store(&self, state: &mut CacheState, key: &str, payload: Arc<Value>, metrics: RequestMetrics) {
        let now = Instant::now();
        state.remove_entry(key);
        state.sweep_expired(now, self.shared.window);

        state.entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                payload,
                metrics,
                cached_at: now,
            },
        );
        state.order.push_back(key.to_string());

        while state.entries.len() > self.shared.max_entries {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
            state.evictions += 1;
            debug!(key = %oldest, "Evicted oldest cache entry");
        }
    }

    /// Returns true if a network operation for `key` is currently running.
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.shared.state.lock().in_flight.contains_key(key)
    }

    /// Registers interest in the network operation for `key`.
    ///
    /// The first caller becomes the leader and must run the operation and
    /// finish it through [`OperationHandle::complete`]. Later callers join it
    /// as followers. Every caller waits on the returned ticket.
    pub fn join(&self, key: &str) -> Join {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;

        if let Some(flight) = state.in_flight.get_mut(key) {
            flight.waiters += 1;
            let generation = flight.generation;
            let waiters = flight.waiters;
            let receiver = flight.sender.subscribe();
            state.coalesced += 1;
            debug!(
                key = %key,
                waiters = waiters,
                "Coalescing request - joining in-flight operation"
            );
            return Join::Follower(WaitTicket::new(self.clone(), key, generation, receiver));
        }

        state.next_generation += 1;
        let generation = state.next_generation;
        let (sender, receiver) = broadcast::channel(COMPLETION_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        state.in_flight.insert(
            key.to_string(),
            InFlight {
                generation,
                sender,
                cancel: cancel.clone(),
                waiters: 1,
            },
        );
        debug!(
            key = %key,
            in_flight_count = state.in_flight.len(),
            "New request - starting operation"
        );

        Join::Leader {
            ticket: WaitTicket::new(self.clone(), key, generation, receiver),
            operation: OperationHandle::new(self.clone(), key, generation, cancel),
        }
    }

    /// Finishes operation `generation` for `key`.
    ///
    /// Broadcasts the outcome to every waiter still attached and stores a
    /// successful result. An outcome for a superseded or abandoned
    /// generation is discarded.
    pub(crate) fn complete(&self, key: &str, generation: u64, outcome: SharedOutcome) {
        let sender = {
            let mut state = self.shared.state.lock();
            let current = state
                .in_flight
                .get(key)
                .is_some_and(|flight| flight.generation == generation);
            if !current {
                None
            } else {
                if let Ok(FetchOutput { payload, metrics }) = &outcome {
                    self.store(&mut state, key, Arc::clone(payload), *metrics);
                }
                state.in_flight.remove(key).map(|flight| flight.sender)
            }
        };

        match sender {
            Some(sender) => {
                let waiters = sender.receiver_count();
                let _ = sender.send(outcome);
                debug!(key = %key, waiters = waiters, "Broadcast result to waiters");
            }
            None => {
                debug!(
                    key = %key,
                    generation = generation,
                    "Discarding result for superseded operation"
                );
            }
        }
    }

    /// Detaches one waiter from operation `generation`.
    ///
    /// Cancels the operation when its last waiter leaves.
    pub(crate) fn release(&self, key: &str, generation: u64) {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;

        let Some(flight) = state.in_flight.get_mut(key) else {
            return;
        };
        if flight.generation != generation {
            return;
        }
        flight.waiters = flight.waiters.saturating_sub(1);
        if flight.waiters > 0 {
            return;
        }
        if let Some(flight) = state.in_flight.remove(key) {
            flight.cancel.cancel();
            debug!(key = %key, "Last waiter left - cancelling operation");
        }
    }

    /// Drops the stored entry for `key`. Returns true if one existed.
    pub fn invalidate(&self, key: &str) -> bool {
        self.shared.state.lock().remove_entry(key)
    }

    /// Drops every stored entry. In-flight operations are unaffected.
    pub fn clear(&self) {
        let mut state = self.shared.state.lock();
        state.entries.clear();
        state.order.clear();
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight_count(&self) -> usize {
        self.shared.state.lock().in_flight.len()
    }

    /// Returns a snapshot of the current statistics.
    pub fn stats(&self) -> CacheStats {
        let state = self.shared.state.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            coalesced: state.coalesced,
            evictions: state.evictions,
            entries: state.entries.len(),
            in_flight: state.in_flight.len(),
        }
    }
}

impl Default for DeduplicationCache {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_DEDUP_WINDOW_MS),
            DEFAULT_MAX_CACHE_ENTRIES,
        )
    }
}

impl std::fmt::Debug for DeduplicationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeduplicationCache")
            .field("window", &self.shared.window)
            .field("max_entries", &self.shared.max_entries)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use serde_json::json;

    fn output(value: Value) -> FetchOutput {
        FetchOutput {
            payload: Arc::new(value),
            metrics: RequestMetrics::default(),
        }
    }

    fn cache() -> DeduplicationCache {
        DeduplicationCache::new(Duration::from_secs(5), 3)
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_miss_then_hit() {
        let cache = cache();
        assert!(cache.lookup("kpis?project_id=p").is_none());

        cache.record(
            "kpis?project_id=p",
            Arc::new(json!({"total": 1})),
            RequestMetrics::default(),
        );

        let entry = cache.lookup("kpis?project_id=p").unwrap();
        assert_eq!(*entry.payload, json!({"total": 1}));
        assert_eq!(entry.key, "kpis?project_id=p");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_window() {
        let cache = cache();
        cache.record("a", Arc::new(json!(1)), RequestMetrics::default());

        tokio::time::advance(Duration::from_millis(4999)).await;
        assert!(cache.lookup("a").is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cache.lookup("a").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicts_oldest_first() {
        let cache = cache();
        for key in ["a", "b", "c", "d"] {
            cache.record(key, Arc::new(json!(key)), RequestMetrics::default());
        }

        assert_eq!(cache.len(), 3);
        assert!(cache.lookup("a").is_none());
        assert!(cache.lookup("b").is_some());
        assert!(cache.lookup("d").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerecord_moves_entry_to_newest() {
        let cache = cache();
        cache.record("a", Arc::new(json!(1)), RequestMetrics::default());
        cache.record("b", Arc::new(json!(2)), RequestMetrics::default());
        cache.record("a", Arc::new(json!(3)), RequestMetrics::default());
        cache.record("c", Arc::new(json!(4)), RequestMetrics::default());
        cache.record("d", Arc::new(json!(5)), RequestMetrics::default());

        assert!(cache.lookup("b").is_none());
        assert_eq!(*cache.lookup("a").unwrap().payload, json!(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_sweeps_expired_entries() {
        let cache = cache();
        cache.record("old", Arc::new(json!(1)), RequestMetrics::default());
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.record("new", Arc::new(json!(2)), RequestMetrics::default());

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = cache();
        cache.record("a", Arc::new(json!(1)), RequestMetrics::default());
        cache.record("b", Arc::new(json!(2)), RequestMetrics::default());

        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_first_join_leads_second_follows() {
        let cache = cache();

        let first = cache.join("k");
        assert!(first.is_leader());
        assert!(cache.is_in_flight("k"));

        let second = cache.join("k");
        assert!(!second.is_leader());
        assert_eq!(cache.stats().coalesced, 1);

        let other = cache.join("other");
        assert!(other.is_leader());
    }

    #[tokio::test]
    async fn test_complete_broadcasts_and_records() {
        let cache = cache();

        let Join::Leader {
            mut ticket,
            operation,
        } = cache.join("k")
        else {
            panic!("expected leader");
        };
        let Join::Follower(mut follower) = cache.join("k") else {
            panic!("expected follower");
        };

        operation.complete(Ok(output(json!([1, 2, 3]))));

        assert_eq!(*ticket.wait().await.unwrap().payload, json!([1, 2, 3]));
        assert_eq!(*follower.wait().await.unwrap().payload, json!([1, 2, 3]));
        assert!(!cache.is_in_flight("k"));
        assert!(cache.lookup("k").is_some());
    }

    #[tokio::test]
    async fn test_error_outcome_not_recorded() {
        let cache = cache();
        let (mut ticket, operation) = cache.join("k").into_parts();
        let operation = operation.unwrap();

        operation.complete(Err(FetchError::Network("reset".into())));

        assert!(ticket.wait().await.is_err());
        assert!(cache.lookup("k").is_none());
    }

    #[tokio::test]
    async fn test_last_ticket_dropped_cancels_operation() {
        let cache = cache();
        let (leader_ticket, operation) = cache.join("k").into_parts();
        let operation = operation.unwrap();
        let follower = cache.join("k");

        drop(leader_ticket);
        assert!(!operation.token().is_cancelled());

        drop(follower);
        assert!(operation.token().is_cancelled());
        assert!(!cache.is_in_flight("k"));

        // A fresh request after abandonment starts a new operation.
        assert!(cache.join("k").is_leader());
    }

    #[tokio::test]
    async fn test_superseded_completion_reaches_no_one() {
        let cache = cache();
        let (first_ticket, first_op) = cache.join("k").into_parts();
        drop(first_ticket);

        let (mut second_ticket, second_op) = cache.join("k").into_parts();

        first_op.unwrap().complete(Ok(output(json!("stale"))));
        assert!(cache.is_in_flight("k"));
        assert!(cache.lookup("k").is_none());

        second_op.unwrap().complete(Ok(output(json!("fresh"))));
        assert_eq!(*second_ticket.wait().await.unwrap().payload, json!("fresh"));
    }

    #[tokio::test]
    async fn test_dropped_operation_settles_waiters() {
        let cache = cache();
        let (mut ticket, operation) = cache.join("k").into_parts();

        drop(operation);

        assert_eq!(ticket.wait().await, Err(FetchError::Cancelled));
        assert!(!cache.is_in_flight("k"));
    }

    #[tokio::test]
    async fn test_concurrent_joins_elect_one_leader() {
        let cache = cache();

        let mut handles = vec![];
        for _ in 0..10 {
            let c = cache.clone();
            handles.push(tokio::spawn(async move { c.join("k") }));
        }

        let joins: Vec<_> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let leaders = joins.iter().filter(|j| j.is_leader()).count();
        assert_eq!(leaders, 1, "Exactly one join should lead");
        assert_eq!(cache.stats().coalesced, 9);
    }
}
