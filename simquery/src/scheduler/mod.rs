//! Admission-controlled priority scheduler.
//!
//! Every network request passes through one process-wide
//! [`RequestScheduler`], which bounds how many run at once and paces
//! dispatch so a burst of consumers cannot overload the backend.
//!
//! # Design
//!
//! ```text
//! submit() ──► [ BinaryHeap by (rank, seq) ] ──► dispatch while active < max
//!                                                     │
//!                        release slot ◄── delay ◄── executor settles
//! ```
//!
//! - Enqueueing happens synchronously inside [`RequestScheduler::submit`], so
//!   call order is the FIFO order among equal priorities.
//! - After an executor settles, the slot is held for the dispatch delay
//!   before the next entry is admitted.
//! - Executor results, including errors, are delivered unmodified. The
//!   scheduler never retries.
//! - Entries whose submitter dropped the result future before dispatch are
//!   discarded without taking a slot.

mod descriptor;
mod queue;

pub use descriptor::RequestDescriptor;

use crate::config::SchedulerSettings;
use crate::error::FetchError;
use parking_lot::Mutex;
use queue::QueueEntry;
use std::collections::BinaryHeap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Descriptors accepted by `submit`.
    pub submitted: u64,
    /// Executors that ran to completion.
    pub completed: u64,
    /// Entries dropped because their submitter went away.
    pub discarded: u64,
    /// Highest number of simultaneously active executors.
    pub peak_active: usize,
}

/// Bounded-concurrency priority scheduler.
///
/// Cheap to clone; clones share the same queue.
pub struct RequestScheduler<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    max_concurrency: usize,
    dispatch_delay: Duration,
}

struct State<T> {
    queue: BinaryHeap<QueueEntry<T>>,
    active: usize,
    next_seq: u64,
    stats: SchedulerStats,
}

impl<T> Clone for RequestScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> RequestScheduler<T> {
    /// Creates a scheduler.
    ///
    /// # Arguments
    ///
    /// * `max_concurrency` - Executors allowed to run at once (minimum 1)
    /// * `dispatch_delay` - Pause after each completion before the slot is
    ///   released
    pub fn new(max_concurrency: usize, dispatch_delay: Duration) -> Self {
        let max_concurrency = max_concurrency.max(1);
        info!(
            max_concurrency = max_concurrency,
            dispatch_delay_ms = dispatch_delay.as_millis() as u64,
            "Created request scheduler"
        );
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: BinaryHeap::new(),
                    active: 0,
                    next_seq: 0,
                    stats: SchedulerStats::default(),
                }),
                max_concurrency,
                dispatch_delay,
            }),
        }
    }

    pub fn from_settings(settings: &SchedulerSettings) -> Self {
        Self::new(settings.max_concurrency, settings.dispatch_delay)
    }

    /// Queues a request and returns a future for its result.
    ///
    /// The entry is enqueued before this returns; awaiting the future is not
    /// required for it to be admitted. Dropping the future before dispatch
    /// withdraws the entry.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(
        &self,
        descriptor: RequestDescriptor<T>,
    ) -> impl Future<Output = Result<T, FetchError>> + Send + 'static {
        let (respond, receiver) = oneshot::channel();
        {
            let mut state = self.inner.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.stats.submitted += 1;
            debug!(
                key = %descriptor.key(),
                priority = %descriptor.priority(),
                queued = state.queue.len() + 1,
                active = state.active,
                "Request queued"
            );
            state.queue.push(QueueEntry {
                descriptor,
                seq,
                respond,
            });
        }
        Self::pump(&self.inner);

        async move { receiver.await.unwrap_or(Err(FetchError::SchedulerClosed)) }
    }

    /// Entries waiting for a slot.
    pub fn queued(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Executors currently holding a slot.
    pub fn active(&self) -> usize {
        self.inner.state.lock().active
    }

    pub fn max_concurrency(&self) -> usize {
        self.inner.max_concurrency
    }

    pub fn stats(&self) -> SchedulerStats {
        self.inner.state.lock().stats
    }

    /// Admits queued entries while slots are free.
    fn pump(inner: &Arc<Inner<T>>) {
        loop {
            let entry = {
                let mut state = inner.state.lock();
                if state.active >= inner.max_concurrency {
                    return;
                }
                let Some(entry) = state.queue.pop() else {
                    return;
                };
                if entry.is_abandoned() {
                    state.stats.discarded += 1;
                    debug!(key = %entry.descriptor.key(), "Discarding abandoned request");
                    continue;
                }
                state.active += 1;
                state.stats.peak_active = state.stats.peak_active.max(state.active);
                entry
            };

            let slot = Slot {
                inner: Arc::clone(inner),
            };
            tokio::spawn(Self::run(slot, entry));
        }
    }

    async fn run(slot: Slot<T>, entry: QueueEntry<T>) {
        let QueueEntry {
            descriptor,
            respond,
            ..
        } = entry;

        debug!(
            key = %descriptor.key(),
            priority = %descriptor.priority(),
            waited_ms = descriptor.submitted_at().elapsed().as_millis() as u64,
            "Dispatching request"
        );

        let result = (descriptor.execute)().await;
        let _ = respond.send(result);

        let delay = slot.inner.dispatch_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        slot.inner.state.lock().stats.completed += 1;
    }
}

impl<T> std::fmt::Debug for RequestScheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("RequestScheduler")
            .field("max_concurrency", &self.inner.max_concurrency)
            .field("dispatch_delay", &self.inner.dispatch_delay)
            .field("queued", &state.queue.len())
            .field("active", &state.active)
            .finish()
    }
}

/// An occupied execution slot.
///
/// Released on drop, so a panicking executor cannot wedge the scheduler.
struct Slot<T: Send + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: Send + 'static> Drop for Slot<T> {
    fn drop(&mut self) {
        {
            let mut state = self.inner.state.lock();
            state.active = state.active.saturating_sub(1);
        }
        RequestScheduler::<T>::pump(&self.inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Priority;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, Instant};

    fn scheduler(max: usize, delay_ms: u64) -> RequestScheduler<u32> {
        RequestScheduler::new(max, Duration::from_millis(delay_ms))
    }

    /// Occupies the only slot until the returned sender fires.
    fn block(
        scheduler: &RequestScheduler<u32>,
    ) -> (
        oneshot::Sender<()>,
        impl Future<Output = Result<u32, FetchError>>,
    ) {
        let (release, wait) = oneshot::channel::<()>();
        let fut = scheduler.submit(RequestDescriptor::new(
            "blocker",
            Priority::High,
            move || async move {
                let _ = wait.await;
                Ok(0)
            },
        ));
        (release, fut)
    }

    #[tokio::test]
    async fn test_idle_scheduler_dispatches_immediately() {
        let scheduler = scheduler(1, 0);
        let result = scheduler
            .submit(RequestDescriptor::new("k", Priority::Normal, || async { Ok(7) }))
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(scheduler.stats().submitted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_slot_never_overlaps() {
        let scheduler = scheduler(1, 10);
        let active = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let futures: Vec<_> = (0..5)
            .map(|i| {
                let active = Arc::clone(&active);
                let overlaps = Arc::clone(&overlaps);
                scheduler.submit(RequestDescriptor::new(
                    format!("k{}", i),
                    Priority::Normal,
                    move || async move {
                        if active.fetch_add(1, Ordering::SeqCst) > 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        sleep(Duration::from_millis(50)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(i)
                    },
                ))
            })
            .collect();

        let results = join_all(futures).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.stats().peak_active, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bound_respected() {
        let scheduler = scheduler(2, 0);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let futures: Vec<_> = (0..6)
            .map(|i| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                scheduler.submit(RequestDescriptor::new(
                    format!("k{}", i),
                    Priority::Normal,
                    move || async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        sleep(Duration::from_millis(20)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(i)
                    },
                ))
            })
            .collect();

        join_all(futures).await;
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_priority_order_behind_busy_slot() {
        let scheduler = scheduler(1, 0);
        let order = Arc::new(Mutex::new(Vec::new()));
        let (release, blocker) = block(&scheduler);

        let submit = |name: &'static str, priority: Priority| {
            let order = Arc::clone(&order);
            scheduler.submit(RequestDescriptor::new(name, priority, move || async move {
                order.lock().push(name);
                Ok(1)
            }))
        };

        let low = submit("low", Priority::Low);
        let high = submit("high", Priority::High);
        let normal = submit("normal", Priority::Normal);
        assert_eq!(scheduler.queued(), 3);

        let _ = release.send(());
        let _ = tokio::join!(blocker, low, high, normal);

        assert_eq!(*order.lock(), vec!["high", "normal", "low"]);
    }

    #[tokio::test]
    async fn test_equal_priority_is_fifo() {
        let scheduler = scheduler(1, 0);
        let order = Arc::new(Mutex::new(Vec::new()));
        let (release, blocker) = block(&scheduler);

        let futures: Vec<_> = (1..=4)
            .map(|i| {
                let order = Arc::clone(&order);
                scheduler.submit(RequestDescriptor::new(
                    format!("k{}", i),
                    Priority::Normal,
                    move || async move {
                        order.lock().push(i);
                        Ok(i)
                    },
                ))
            })
            .collect();

        let _ = release.send(());
        let _ = blocker.await;
        join_all(futures).await;

        assert_eq!(*order.lock(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_error_propagates_without_retry() {
        let scheduler = scheduler(1, 0);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let result = scheduler
            .submit(RequestDescriptor::new("k", Priority::Normal, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::Server {
                    status: 503,
                    detail: None,
                    message: None,
                })
            }))
            .await;

        assert_eq!(
            result,
            Err(FetchError::Server {
                status: 503,
                detail: None,
                message: None
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_delay_between_executions() {
        let scheduler = scheduler(1, 100);
        let starts = Arc::new(Mutex::new(Vec::new()));

        let futures: Vec<_> = (0..2)
            .map(|i| {
                let starts = Arc::clone(&starts);
                scheduler.submit(RequestDescriptor::new(
                    format!("k{}", i),
                    Priority::Normal,
                    move || async move {
                        starts.lock().push(Instant::now());
                        Ok(i)
                    },
                ))
            })
            .collect();

        join_all(futures).await;
        let starts = starts.lock();
        assert!(starts[1] - starts[0] >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_abandoned_entry_is_discarded() {
        let scheduler = scheduler(1, 0);
        let calls = Arc::new(AtomicUsize::new(0));
        let (release, blocker) = block(&scheduler);

        let counter = Arc::clone(&calls);
        let abandoned = scheduler.submit(RequestDescriptor::new(
            "gone",
            Priority::Normal,
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            },
        ));
        drop(abandoned);

        let kept = scheduler.submit(RequestDescriptor::new("kept", Priority::Low, || async {
            Ok(2)
        }));

        let _ = release.send(());
        let _ = blocker.await;
        assert_eq!(kept.await, Ok(2));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.stats().discarded, 1);
    }

    #[tokio::test]
    async fn test_panicking_executor_releases_slot() {
        let scheduler = scheduler(1, 0);

        let panicked = scheduler.submit(RequestDescriptor::new("boom", Priority::Normal, || async {
            let missing: Option<u32> = None;
            Ok(missing.expect("executor failure"))
        }));
        let next = scheduler.submit(RequestDescriptor::new("next", Priority::Normal, || async {
            Ok(3)
        }));

        assert_eq!(panicked.await, Err(FetchError::SchedulerClosed));
        assert_eq!(next.await, Ok(3));
        assert_eq!(scheduler.active(), 0);
    }
}
