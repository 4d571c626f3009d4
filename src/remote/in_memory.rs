use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;

use super::RemoteCollectionClient;
use crate::core::{CollectionKind, Entry, ProductSnapshot, RemoteCollection};
use crate::error::{RemoteError, SemanticError};

/// In-process stand-in for the commerce backend.
///
/// Holds a product catalog and one collection per kind. It enforces the same
/// rules the real server does: one entry per product, stock ceilings, and
/// server-computed line and aggregate prices. Failures can be queued with
/// [`InMemoryRemote::fail_next`] and every call is recorded.
pub struct InMemoryRemote {
    catalog: RwLock<HashMap<String, ProductSnapshot>>,
    collections: RwLock<HashMap<CollectionKind, Vec<Entry>>>,
    entry_seq: AtomicU64,
    failures: Mutex<VecDeque<RemoteError>>,
    calls: Mutex<Vec<String>>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        InMemoryRemote {
            catalog: RwLock::new(HashMap::new()),
            collections: RwLock::new(HashMap::new()),
            entry_seq: AtomicU64::new(1),
            failures: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Register a product in the catalog (builder form).
    pub fn with_product(self, product_ref: impl Into<String>, product: ProductSnapshot) -> Self {
        self.register_product(product_ref, product);
        self
    }

    pub fn register_product(&self, product_ref: impl Into<String>, product: ProductSnapshot) {
        if let Ok(mut catalog) = self.catalog.write() {
            catalog.insert(product_ref.into(), product);
        }
    }

    /// Make the next call (of any kind) fail with `error`. Queued failures are
    /// consumed in order.
    pub fn fail_next(&self, error: RemoteError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push_back(error);
        }
    }

    /// Calls received so far, e.g. `"add cart p1"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Server-side entries of a collection.
    pub fn entries(&self, kind: CollectionKind) -> Vec<Entry> {
        self.collections
            .read()
            .ok()
            .and_then(|c| c.get(&kind).cloned())
            .unwrap_or_default()
    }

    /// Put an entry straight into a server collection, bypassing the rules.
    pub fn seed(
        &self,
        kind: CollectionKind,
        product_ref: &str,
        quantity: u32,
    ) -> Result<Entry, RemoteError> {
        let product = self.product(product_ref)?;
        let entry = self.new_entry(kind, product_ref, product, quantity);
        self.collections
            .write()
            .map_err(|_| poisoned("seed"))?
            .entry(kind)
            .or_default()
            .push(entry.clone());
        Ok(entry)
    }

    fn record(&self, call: String) -> Result<(), RemoteError> {
        tracing::debug!(%call, "remote call");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        match self.failures.lock() {
            Ok(mut failures) => match failures.pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            },
            Err(_) => Err(poisoned("failure queue")),
        }
    }

    fn product(&self, product_ref: &str) -> Result<ProductSnapshot, RemoteError> {
        let catalog = self.catalog.read().map_err(|_| poisoned("catalog"))?;
        catalog.get(product_ref).cloned().ok_or_else(|| {
            SemanticError::Rejected(format!("unknown product {}", product_ref)).into()
        })
    }

    fn new_entry(
        &self,
        kind: CollectionKind,
        product_ref: &str,
        product: ProductSnapshot,
        quantity: u32,
    ) -> Entry {
        let id = self.entry_seq.fetch_add(1, Ordering::Relaxed);
        let line_price = product.price * f64::from(quantity);
        Entry::new(format!("{}-{}", kind, id), product_ref, product, quantity)
            .with_line_price(line_price)
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned(operation: &str) -> RemoteError {
    RemoteError::Transport(format!("in-memory remote lock poisoned during {}", operation))
}

fn check_stock(entry: &Entry, quantity: u32) -> Result<(), RemoteError> {
    match entry.product.stock {
        Some(stock) if quantity > stock => Err(SemanticError::StockExceeded {
            product_ref: entry.product_ref.clone(),
        }
        .into()),
        _ => Ok(()),
    }
}

fn reprice(entry: &mut Entry) {
    entry.line_price = Some(entry.product.price * f64::from(entry.quantity));
}

#[async_trait]
impl RemoteCollectionClient for InMemoryRemote {
    async fn fetch_collection(
        &self,
        kind: CollectionKind,
    ) -> Result<RemoteCollection, RemoteError> {
        self.record(format!("fetch {}", kind))?;
        let entries = self.entries(kind);
        let total = entries.iter().filter_map(|e| e.line_price).sum();
        Ok(RemoteCollection {
            remote_id: Some(format!("{}-collection", kind)),
            entries,
            aggregate_price: Some(total),
        })
    }

    async fn add_entry(
        &self,
        kind: CollectionKind,
        product_ref: &str,
    ) -> Result<Entry, RemoteError> {
        self.record(format!("add {} {}", kind, product_ref))?;
        let product = self.product(product_ref)?;
        let mut collections = self.collections.write().map_err(|_| poisoned("add"))?;
        let entries = collections.entry(kind).or_default();

        if let Some(existing) = entries.iter_mut().find(|e| e.product_ref == product_ref) {
            if kind.tracks_quantity() {
                check_stock(existing, existing.quantity + 1)?;
                existing.quantity += 1;
                reprice(existing);
            }
            return Ok(existing.clone());
        }

        let entry = self.new_entry(kind, product_ref, product, 1);
        check_stock(&entry, 1)?;
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn set_quantity(
        &self,
        kind: CollectionKind,
        entry_id: &str,
        quantity: u32,
    ) -> Result<Entry, RemoteError> {
        self.record(format!("set {} {} {}", kind, entry_id, quantity))?;
        if quantity == 0 || (!kind.tracks_quantity() && quantity != 1) {
            return Err(SemanticError::Rejected(format!("invalid quantity {}", quantity)).into());
        }
        let mut collections = self.collections.write().map_err(|_| poisoned("set"))?;
        let entry = collections
            .entry(kind)
            .or_default()
            .iter_mut()
            .find(|e| e.entry_id == entry_id)
            .ok_or_else(|| SemanticError::EntryNotFound {
                entry_id: entry_id.to_string(),
            })?;
        check_stock(entry, quantity)?;
        entry.quantity = quantity;
        reprice(entry);
        Ok(entry.clone())
    }

    async fn remove_entry(&self, kind: CollectionKind, entry_id: &str) -> Result<(), RemoteError> {
        self.record(format!("remove {} {}", kind, entry_id))?;
        let mut collections = self.collections.write().map_err(|_| poisoned("remove"))?;
        let entries = collections.entry(kind).or_default();
        let before = entries.len();
        entries.retain(|e| e.entry_id != entry_id);
        if entries.len() == before {
            return Err(SemanticError::EntryNotFound {
                entry_id: entry_id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn clear_collection(&self, kind: CollectionKind) -> Result<(), RemoteError> {
        self.record(format!("clear {}", kind))?;
        let mut collections = self.collections.write().map_err(|_| poisoned("clear"))?;
        collections.remove(&kind);
        Ok(())
    }
}
