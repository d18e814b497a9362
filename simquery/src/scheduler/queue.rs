//! Priority queue entries.
//!
//! Entries are ordered by `(priority rank, submission sequence)`, so higher
//! priorities run first and equal priorities keep submission order.
//! [`BinaryHeap`](std::collections::BinaryHeap) is a max-heap, so the
//! comparison is reversed.

use super::descriptor::RequestDescriptor;
use crate::error::FetchError;
use std::cmp::Ordering;
use tokio::sync::oneshot;

pub(super) struct QueueEntry<T> {
    pub(super) descriptor: RequestDescriptor<T>,
    pub(super) seq: u64,
    pub(super) respond: oneshot::Sender<Result<T, FetchError>>,
}

impl<T> QueueEntry<T> {
    fn order_key(&self) -> (u8, u64) {
        (self.descriptor.priority().rank(), self.seq)
    }

    /// True once the submitter has dropped its result future.
    pub(super) fn is_abandoned(&self) -> bool {
        self.respond.is_closed()
    }
}

impl<T> PartialEq for QueueEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.order_key() == other.order_key()
    }
}

impl<T> Eq for QueueEntry<T> {}

impl<T> PartialOrd for QueueEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for QueueEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.order_key().cmp(&self.order_key())
    }
}
