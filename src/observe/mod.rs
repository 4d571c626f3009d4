//! Observers - how UI surfaces learn about store changes.
//!
//! Observers never talk to the remote client. They subscribe to a store and
//! receive [`StoreEvent`]s: a fresh read-only snapshot after every change, and
//! errors that have no caller to return to (a background refresh failing, a
//! deferred mutation replayed after sign-in).

#[cfg(feature = "emitter")]
mod emitter_bridge;
mod registry;

use std::sync::Arc;

use crate::core::CollectionSnapshot;
use crate::error::SyncError;

#[cfg(feature = "emitter")]
pub use emitter_bridge::EmitterBridge;
pub use registry::{ObserverId, ObserverRegistry};

#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// Entries, price or status changed. Every observer of one change gets
    /// the same snapshot.
    Changed(Arc<CollectionSnapshot>),
    /// Out-of-band failure.
    Error(SyncError),
}

impl StoreEvent {
    pub fn snapshot(&self) -> Option<&Arc<CollectionSnapshot>> {
        match self {
            StoreEvent::Changed(snapshot) => Some(snapshot),
            StoreEvent::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&SyncError> {
        match self {
            StoreEvent::Changed(_) => None,
            StoreEvent::Error(err) => Some(err),
        }
    }
}
