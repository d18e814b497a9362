//! Request descriptors accepted by the scheduler.

use crate::error::FetchError;
use crate::request::Priority;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use tokio::time::Instant;

type Executor<T> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T, FetchError>> + Send>;

/// One unit of work for the [`RequestScheduler`](super::RequestScheduler).
///
/// Immutable once submitted. The executor is called at most once, when the
/// entry is dispatched.
pub struct RequestDescriptor<T> {
    key: String,
    priority: Priority,
    submitted_at: Instant,
    pub(super) execute: Executor<T>,
}

impl<T> RequestDescriptor<T> {
    /// Creates a descriptor.
    ///
    /// # Arguments
    ///
    /// * `key` - Canonical request key, used for logging
    /// * `priority` - Dispatch priority
    /// * `execute` - Produces the request future when dispatched
    pub fn new<F, Fut>(key: impl Into<String>, priority: Priority, execute: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        Self {
            key: key.into(),
            priority,
            submitted_at: Instant::now(),
            execute: Box::new(move || execute().boxed()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }
}

impl<T> fmt::Debug for RequestDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("key", &self.key)
            .field("priority", &self.priority)
            .field("submitted_at", &self.submitted_at)
            .finish_non_exhaustive()
    }
}
