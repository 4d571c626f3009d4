//! Remote Collection Client - the store's only path to the commerce backend.
//!
//! The store never talks HTTP itself. Applications implement
//! [`RemoteCollectionClient`] over their transport of choice; tests and
//! demos use [`InMemoryRemote`], which behaves like the backend (one line
//! item per product, stock ceilings, server-side totals).

mod in_memory;

use async_trait::async_trait;

use crate::core::{CollectionKind, Entry, RemoteCollection};
use crate::error::RemoteError;

pub use in_memory::InMemoryRemote;

/// Async access to the server-authoritative collections.
///
/// Every call may fail with a transport or a semantic error; the store treats
/// both as a failed mutation and rolls back.
#[async_trait]
pub trait RemoteCollectionClient: Send + Sync {
    /// Full authoritative snapshot of the collection.
    async fn fetch_collection(&self, kind: CollectionKind)
        -> Result<RemoteCollection, RemoteError>;

    /// Add a product. The server assigns the `entry_id` and enforces one
    /// entry per product.
    async fn add_entry(&self, kind: CollectionKind, product_ref: &str)
        -> Result<Entry, RemoteError>;

    /// Set the quantity of an existing entry.
    async fn set_quantity(
        &self,
        kind: CollectionKind,
        entry_id: &str,
        quantity: u32,
    ) -> Result<Entry, RemoteError>;

    async fn remove_entry(&self, kind: CollectionKind, entry_id: &str) -> Result<(), RemoteError>;

    /// Empty the collection.
    async fn clear_collection(&self, kind: CollectionKind) -> Result<(), RemoteError>;
}
