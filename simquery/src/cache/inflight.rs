//! In-flight operation tracking.

use super::dedup::DeduplicationCache;
use super::entry::SharedOutcome;
use crate::error::FetchError;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Bookkeeping for one running network operation.
pub(super) struct InFlight {
    pub(super) generation: u64,
    pub(super) sender: broadcast::Sender<SharedOutcome>,
    pub(super) cancel: CancellationToken,
    pub(super) waiters: usize,
}

/// Result of [`DeduplicationCache::join`].
pub enum Join {
    /// No operation was running; the caller must start one.
    Leader {
        ticket: WaitTicket,
        operation: OperationHandle,
    },
    /// An operation was already running; wait on the ticket.
    Follower(WaitTicket),
}

impl Join {
    pub fn is_leader(&self) -> bool {
        matches!(self, Join::Leader { .. })
    }

    /// Splits into the ticket and, for the leader, the operation handle.
    pub fn into_parts(self) -> (WaitTicket, Option<OperationHandle>) {
        match self {
            Join::Leader { ticket, operation } => (ticket, Some(operation)),
            Join::Follower(ticket) => (ticket, None),
        }
    }
}

/// A waiter's claim on an in-flight operation.
///
/// Dropping the ticket detaches the waiter. When the last ticket of an
/// unfinished operation is dropped, the operation is cancelled.
pub struct WaitTicket {
    cache: DeduplicationCache,
    key: String,
    generation: u64,
    receiver: broadcast::Receiver<SharedOutcome>,
}

impl WaitTicket {
    pub(super) fn new(
        cache: DeduplicationCache,
        key: &str,
        generation: u64,
        receiver: broadcast::Receiver<SharedOutcome>,
    ) -> Self {
        Self {
            cache,
            key: key.to_string(),
            generation,
            receiver,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Waits for the shared outcome.
    ///
    /// Returns [`FetchError::Cancelled`] if the operation ended without
    /// publishing one.
    pub async fn wait(&mut self) -> SharedOutcome {
        match self.receiver.recv().await {
            Ok(outcome) => outcome,
            Err(_) => Err(FetchError::Cancelled),
        }
    }
}

impl Drop for WaitTicket {
    fn drop(&mut self) {
        self.cache.release(&self.key, self.generation);
    }
}

/// The leader's handle on the operation it must run.
///
/// Dropping the handle without calling [`complete`](Self::complete) settles
/// every waiter with [`FetchError::Cancelled`].
pub struct OperationHandle {
    cache: DeduplicationCache,
    key: String,
    generation: u64,
    cancel: CancellationToken,
    completed: bool,
}

impl OperationHandle {
    pub(super) fn new(
        cache: DeduplicationCache,
        key: &str,
        generation: u64,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cache,
            key: key.to_string(),
            generation,
            cancel,
            completed: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Cancelled once every waiter has gone away.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Publishes the outcome to all waiters.
    pub fn complete(mut self, outcome: SharedOutcome) {
        self.completed = true;
        self.cache.complete(&self.key, self.generation, outcome);
    }
}

impl Drop for OperationHandle {
    fn drop(&mut self) {
        if !self.completed {
            self.cache
                .complete(&self.key, self.generation, Err(FetchError::Cancelled));
        }
    }
}
