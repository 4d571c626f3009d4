//! Per-key FIFO serialization for mutations.
//!
//! Each product in a collection gets its own queue. A mutation holds its
//! product's [`QueueTurn`] for its whole optimistic/remote/commit cycle, so
//! two mutations on the same product never read the same pre-mutation state,
//! while mutations on different products run concurrently. A collection-wide
//! mutation takes an [`ExclusiveTurn`] instead and runs alone.

mod keyed;

pub use keyed::{ExclusiveTurn, KeyedQueue, QueueTurn};
