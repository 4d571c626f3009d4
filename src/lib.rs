mod config;
mod core;
mod error;
mod observe;
mod provider;
mod queue;
mod remote;
mod session;
mod store;

pub use config::StoreConfig;
pub use crate::core::{
    Collection, CollectionKind, CollectionSnapshot, Entry, Lookup, LookupIndex, Patch,
    ProductSnapshot, RemoteCollection, Status,
};
pub use error::{RemoteError, SemanticError, SyncError};
#[cfg(feature = "emitter")]
pub use observe::EmitterBridge;
pub use observe::{ObserverId, ObserverRegistry, StoreEvent};
pub use provider::StoreProvider;
pub use queue::{ExclusiveTurn, KeyedQueue, QueueTurn};
pub use remote::{InMemoryRemote, RemoteCollectionClient};
pub use session::{AuthSession, SessionFlag};
pub use store::{CollectionStore, Intent, Outcome, RefreshOutcome, Replayed};

// Re-export the EventEmitter from the event_emitter_rs crate
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;

// Re-export async_trait so client implementations need not depend on it directly
pub use async_trait::async_trait;
