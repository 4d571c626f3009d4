use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::entry::{Entry, RemoteCollection};
use super::status::Status;

/// Local mirror of one remote collection.
///
/// Entries are keyed by `entry_id` and keep insertion order for display.
/// Every mutator that could introduce a second entry for the same
/// `product_ref` refuses to do so.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Collection {
    entries: IndexMap<String, Entry>,
    aggregate_price: Option<f64>,
    price_stale: bool,
    status: Status,
    generation: u64,
    remote_id: Option<String>,
}

impl Collection {
    pub fn new() -> Self {
        Collection::default()
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    pub fn get(&self, entry_id: &str) -> Option<&Entry> {
        self.entries.get(entry_id)
    }

    pub fn find_by_product(&self, product_ref: &str) -> Option<&Entry> {
        self.entries.values().find(|e| e.product_ref == product_ref)
    }

    pub fn position(&self, entry_id: &str) -> Option<usize> {
        self.entries.get_index_of(entry_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Server total, or `None` while an optimistic change has made it stale.
    pub fn aggregate_price(&self) -> Option<f64> {
        if self.price_stale {
            None
        } else {
            self.aggregate_price
        }
    }

    pub fn is_price_stale(&self) -> bool {
        self.price_stale
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    /// Move to `to` if the transition is legal. Returns whether anything changed.
    pub(crate) fn set_status(&mut self, to: Status) -> bool {
        if self.status == to {
            return false;
        }
        if !self.status.can_transition(to) {
            tracing::warn!(from = ?self.status, to = ?to, "ignoring illegal status transition");
            return false;
        }
        self.status = to;
        true
    }

    /// Start a new fetch generation and return it.
    pub(crate) fn begin_fetch(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Replace entries and price wholesale with an authoritative snapshot.
    pub(crate) fn replace_all(&mut self, remote: RemoteCollection) {
        let mut entries: IndexMap<String, Entry> = IndexMap::with_capacity(remote.entries.len());
        for entry in remote.entries {
            if entries.values().any(|e| e.product_ref == entry.product_ref) {
                tracing::warn!(product_ref = %entry.product_ref, "server sent duplicate product, keeping first");
                continue;
            }
            entries.insert(entry.entry_id.clone(), entry);
        }
        self.entries = entries;
        self.aggregate_price = remote.aggregate_price;
        self.remote_id = remote.remote_id;
        self.price_stale = false;
    }

    /// Drop everything known about the remote collection. The generation
    /// advances so in-flight fetches from before the reset are discarded.
    pub(crate) fn reset(&mut self) {
        self.entries.clear();
        self.aggregate_price = None;
        self.remote_id = None;
        self.price_stale = false;
        self.status = Status::Uninitialized;
        self.generation += 1;
    }

    pub(crate) fn mark_price_stale(&mut self) {
        self.price_stale = true;
    }

    /// Insert `entry` at `index` (clamped). Refused if its product or id is already present.
    pub(crate) fn insert_at(&mut self, index: usize, entry: Entry) -> bool {
        if self.entries.contains_key(&entry.entry_id)
            || self.find_by_product(&entry.product_ref).is_some()
        {
            return false;
        }
        let index = index.min(self.entries.len());
        self.entries
            .shift_insert(index, entry.entry_id.clone(), entry);
        true
    }

    pub(crate) fn remove(&mut self, entry_id: &str) -> Option<(usize, Entry)> {
        self.entries
            .shift_remove_full(entry_id)
            .map(|(index, _, entry)| (index, entry))
    }

    /// Set the quantity of an entry and return the previous one.
    pub(crate) fn set_quantity(&mut self, entry_id: &str, quantity: u32) -> Option<u32> {
        let entry = self.entries.get_mut(entry_id)?;
        let previous = entry.quantity;
        entry.quantity = quantity;
        Some(previous)
    }

    /// Install an authoritative entry returned by a mutation.
    ///
    /// It takes the slot of `replaces` (a provisional or pre-mutation id) if
    /// present, else the slot of the entry for the same product, else the end.
    pub(crate) fn commit_entry(&mut self, replaces: &str, entry: Entry) {
        let slot = self
            .remove(replaces)
            .map(|(index, _)| index)
            .or_else(|| {
                let existing = self.find_by_product(&entry.product_ref)?.entry_id.clone();
                self.remove(&existing).map(|(index, _)| index)
            })
            .unwrap_or(self.entries.len());

        // The server may have answered with an id another stale entry still holds.
        self.entries.shift_remove(&entry.entry_id);
        let slot = slot.min(self.entries.len());
        self.entries
            .shift_insert(slot, entry.entry_id.clone(), entry);
    }
}
