use std::sync::OnceLock;

use serde::Serialize;

use super::collection::Collection;
use super::entry::Entry;
use super::index::{Lookup, LookupIndex};
use super::status::{CollectionKind, Status};

/// Read-only view of a store's state, shared by every observer of one change.
///
/// The lookup index is built lazily on the first query and reused by every
/// observer that reads the same snapshot.
#[derive(Debug, Serialize)]
pub struct CollectionSnapshot {
    kind: CollectionKind,
    revision: u64,
    #[serde(flatten)]
    collection: Collection,
    #[serde(skip)]
    index: OnceLock<LookupIndex>,
}

impl CollectionSnapshot {
    pub fn new(kind: CollectionKind, collection: Collection, revision: u64) -> Self {
        CollectionSnapshot {
            kind,
            revision,
            collection,
            index: OnceLock::new(),
        }
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    /// Increases with every published change of the store.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn status(&self) -> Status {
        self.collection.status()
    }

    pub fn generation(&self) -> u64 {
        self.collection.generation()
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.collection.entries()
    }

    pub fn entry(&self, entry_id: &str) -> Option<&Entry> {
        self.collection.get(entry_id)
    }

    /// Number of line items (the badge count).
    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    pub fn total_quantity(&self) -> u64 {
        self.collection.entries().map(|e| u64::from(e.quantity)).sum()
    }

    pub fn aggregate_price(&self) -> Option<f64> {
        self.collection.aggregate_price()
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.collection.remote_id()
    }

    /// True while the very first fetch is outstanding.
    pub fn is_first_fetch(&self) -> bool {
        self.collection.status() == Status::Loading
    }

    pub fn index(&self) -> &LookupIndex {
        self.index
            .get_or_init(|| LookupIndex::build(self.collection.entries()))
    }

    pub fn lookup(&self, product_ref: &str) -> Option<&Lookup> {
        self.index().get(product_ref)
    }
}
