//! Short-window deduplication cache with in-flight request coalescing.
//!
//! Two jobs share one lock:
//!
//! - **Completed results** are kept for a short dedup window so a consumer
//!   re-issuing the same request right after another gets the stored payload
//!   without touching the network.
//! - **In-flight operations** are tracked by canonical key so identical
//!   concurrent requests share one network operation.
//!
//! # Architecture
//!
//! ```text
//! Consumer A ─┐                 ┌──────────────────────┐
//!             │  join(key)      │ DeduplicationCache   │
//! Consumer B ─┼───────────────► │  entries  (window)   │
//!             │                 │  in_flight (by key)  │
//! Consumer C ─┘                 └──────────┬───────────┘
//!     ▲                                    │ leader only
//!     │ broadcast                          ▼
//!     └──────────── complete(key) ◄── network operation
//! ```
//!
//! Every waiter holds a [`WaitTicket`]. When the last ticket for a key is
//! dropped before the operation completes, the operation's
//! cancellation token fires.

mod dedup;
mod entry;
mod inflight;
mod stats;

pub use dedup::DeduplicationCache;
pub use entry::{CacheEntry, FetchOutput, SharedOutcome};
pub use inflight::{Join, OperationHandle, WaitTicket};
pub use stats::CacheStats;
