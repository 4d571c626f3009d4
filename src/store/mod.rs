//! The collection store: a local mirror of one remote cart or wishlist.
//!
//! Reads are synchronous and come from the latest [`CollectionSnapshot`].
//! Writes go through [`CollectionStore::mutate`], which applies the change
//! locally first, then confirms it remotely and either commits the server's
//! answer or rolls the change back.

mod intent;
mod mutate;
mod refresh;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::StoreConfig;
use crate::core::{
    Collection, CollectionKind, CollectionSnapshot, Entry, Lookup, Patch, Status,
};
use crate::error::SyncError;
use crate::observe::{ObserverId, ObserverRegistry, StoreEvent};
use crate::queue::KeyedQueue;
use crate::remote::RemoteCollectionClient;
use crate::session::AuthSession;

pub use intent::{Intent, Outcome, RefreshOutcome, Replayed};

/// A call made while signed out, kept for replay after sign-in.
enum Deferred {
    Refresh,
    Mutate(Intent),
}

struct StoreState {
    collection: Collection,
    /// Set once a fetch has succeeded since the last teardown.
    loaded: bool,
    /// Bumped on teardown; completions from an older epoch are dropped.
    epoch: u64,
    /// Count of committed mutations, used to spot refreshes they overtook.
    commits: u64,
    revision: u64,
    refresh_scheduled: bool,
    /// Optimistic patches whose remote call has not settled, by token.
    pending: Vec<(u64, Patch)>,
    next_token: u64,
    /// Entry ids a commit replaced, mapped to the id the server gave back.
    renamed: HashMap<String, String>,
    deferred: Vec<Deferred>,
    snapshot: Arc<CollectionSnapshot>,
}

impl StoreState {
    /// The entry `entry_id` names now, following ids a commit replaced.
    fn resolve_entry(&self, entry_id: &str) -> Result<&Entry, SyncError> {
        let mut id = entry_id;
        for _ in 0..=self.renamed.len() {
            if let Some(entry) = self.collection.get(id) {
                return Ok(entry);
            }
            match self.renamed.get(id) {
                Some(next) => id = next.as_str(),
                None => break,
            }
        }
        Err(SyncError::UnknownEntry(entry_id.to_string()))
    }
}

struct StoreInner {
    kind: CollectionKind,
    client: Arc<dyn RemoteCollectionClient>,
    session: Arc<dyn AuthSession>,
    config: StoreConfig,
    state: Mutex<StoreState>,
    queue: KeyedQueue,
    observers: ObserverRegistry,
    delivered: AtomicU64,
    provisional_seq: AtomicU64,
}

/// Handle to one synchronized collection. Clones share the same store.
#[derive(Clone)]
pub struct CollectionStore {
    inner: Arc<StoreInner>,
}

impl CollectionStore {
    pub fn new(
        kind: CollectionKind,
        client: Arc<dyn RemoteCollectionClient>,
        session: Arc<dyn AuthSession>,
        config: StoreConfig,
    ) -> Self {
        let collection = Collection::new();
        let snapshot = Arc::new(CollectionSnapshot::new(kind, collection.clone(), 0));
        CollectionStore {
            inner: Arc::new(StoreInner {
                kind,
                client,
                session,
                config,
                state: Mutex::new(StoreState {
                    collection,
                    loaded: false,
                    epoch: 0,
                    commits: 0,
                    revision: 0,
                    refresh_scheduled: false,
                    pending: Vec::new(),
                    next_token: 0,
                    renamed: HashMap::new(),
                    deferred: Vec::new(),
                    snapshot,
                }),
                queue: KeyedQueue::new(),
                observers: ObserverRegistry::new(),
                delivered: AtomicU64::new(0),
                provisional_seq: AtomicU64::new(1),
            }),
        }
    }

    pub fn kind(&self) -> CollectionKind {
        self.inner.kind
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// The latest published state. Never blocks on remote work.
    pub fn snapshot(&self) -> Arc<CollectionSnapshot> {
        match self.inner.state.lock() {
            Ok(state) => Arc::clone(&state.snapshot),
            Err(poisoned) => Arc::clone(&poisoned.into_inner().snapshot),
        }
    }

    pub fn status(&self) -> Status {
        self.snapshot().status()
    }

    /// Entry id and quantity for `product_ref`, if the collection holds it.
    pub fn lookup(&self, product_ref: &str) -> Option<Lookup> {
        self.snapshot().lookup(product_ref).cloned()
    }

    /// Number of calls waiting for sign-in.
    pub fn deferred_len(&self) -> usize {
        self.with_state(|state| state.deferred.len()).unwrap_or(0)
    }

    // ========================================================================
    // Observers
    // ========================================================================

    /// Register an observer. The first subscription on an uninitialized
    /// store starts a background refresh when `refresh_on_subscribe` is set
    /// and a tokio runtime is available.
    ///
    /// While signed out nothing is fetched, deferred or asked of the session;
    /// [`CollectionStore::on_authenticated`] loads observed stores instead.
    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        let id = self.inner.observers.subscribe(observer);
        if self.inner.config.refresh_on_subscribe {
            self.spawn_initial_refresh();
        }
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.inner.observers.unsubscribe(id)
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }

    fn spawn_initial_refresh(&self) {
        if !self.inner.session.is_authenticated() {
            tracing::debug!(kind = %self.inner.kind, "signed out, initial refresh waits for sign-in");
            return;
        }
        let schedule = self
            .with_state(|state| {
                let idle = state.collection.status() == Status::Uninitialized
                    && !state.refresh_scheduled;
                if idle {
                    state.refresh_scheduled = true;
                }
                idle
            })
            .unwrap_or(false);
        if !schedule {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = self.clone();
                handle.spawn(async move {
                    if let Err(err) = store.refresh_once().await {
                        let _ = store.with_state(|state| state.refresh_scheduled = false);
                        tracing::debug!(kind = %store.kind(), error = %err, "initial refresh failed");
                    }
                });
            }
            Err(_) => {
                let _ = self.with_state(|state| state.refresh_scheduled = false);
                tracing::debug!(kind = %self.inner.kind, "no runtime, initial refresh left to the caller");
            }
        }
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Replay every call deferred while signed out, in the order they were
    /// made. Each runs once; one that fails again is reported, not re-queued.
    ///
    /// Afterwards, an observed store that was never loaded is refreshed.
    pub async fn on_authenticated(&self) -> Vec<Replayed> {
        let deferred = self
            .with_state(|state| std::mem::take(&mut state.deferred))
            .unwrap_or_default();
        tracing::info!(kind = %self.inner.kind, count = deferred.len(), "replaying deferred calls");

        let mut replayed = Vec::with_capacity(deferred.len());
        for call in deferred {
            match call {
                Deferred::Refresh => {
                    let result = self.refresh_once().await;
                    replayed.push(Replayed::Refresh(result));
                }
                Deferred::Mutate(intent) => {
                    let result = self.mutate_once(intent.clone()).await;
                    if let Err(err) = &result {
                        self.inner.observers.notify(&StoreEvent::Error(err.clone()));
                    }
                    replayed.push(Replayed::Mutation(intent, result));
                }
            }
        }

        if self.status() == Status::Uninitialized && !self.inner.observers.is_empty() {
            if let Err(err) = self.refresh_once().await {
                tracing::debug!(kind = %self.inner.kind, error = %err, "refresh after sign-in failed");
            }
        }
        replayed
    }

    /// Drop everything the session owned. In-flight calls that complete
    /// afterwards change nothing.
    pub fn on_signed_out(&self) {
        match self.with_state(|state| self.teardown(state)) {
            Ok(snapshot) => {
                tracing::info!(kind = %self.inner.kind, "session ended, store reset");
                self.notify_changed(snapshot);
            }
            Err(err) => tracing::warn!(kind = %self.inner.kind, error = %err, "teardown failed"),
        }
    }

    fn teardown(&self, state: &mut StoreState) -> Arc<CollectionSnapshot> {
        state.collection.reset();
        state.loaded = false;
        state.epoch += 1;
        state.refresh_scheduled = false;
        state.pending.clear();
        state.renamed.clear();
        state.deferred.clear();
        self.publish(state)
    }

    /// Called when a refresh or mutation finds the session unauthenticated.
    ///
    /// A store still holding data missed its sign-out and is torn down first.
    /// The call is queued for replay and the session asked to sign in.
    fn defer(&self, call: Deferred) -> SyncError {
        let torn_down = self.with_state(|state| {
            let snapshot = (state.loaded || state.collection.status() != Status::Uninitialized)
                .then(|| self.teardown(state));
            let duplicate = matches!(call, Deferred::Refresh)
                && state.deferred.iter().any(|d| matches!(d, Deferred::Refresh));
            if !duplicate {
                state.deferred.push(call);
            }
            snapshot
        });
        match torn_down {
            Ok(Some(snapshot)) => self.notify_changed(snapshot),
            Ok(None) => {}
            Err(err) => return err,
        }
        tracing::info!(kind = %self.inner.kind, "signed out, call deferred until authenticated");
        self.inner.session.request_authentication();
        SyncError::Unauthenticated
    }

    // ========================================================================
    // State plumbing
    // ========================================================================

    fn with_state<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> Result<R, SyncError> {
        let mut state = self
            .inner
            .state
            .lock()
            .map_err(|_| SyncError::LockPoisoned("store state"))?;
        Ok(f(&mut state))
    }

    /// Freeze the current collection into a new snapshot.
    fn publish(&self, state: &mut StoreState) -> Arc<CollectionSnapshot> {
        state.revision += 1;
        let snapshot = Arc::new(CollectionSnapshot::new(
            self.inner.kind,
            state.collection.clone(),
            state.revision,
        ));
        state.snapshot = Arc::clone(&snapshot);
        snapshot
    }

    /// Deliver a snapshot unless a newer one already went out.
    fn notify_changed(&self, snapshot: Arc<CollectionSnapshot>) {
        let revision = snapshot.revision();
        if self.inner.delivered.fetch_max(revision, Ordering::SeqCst) >= revision {
            return;
        }
        self.inner.observers.notify(&StoreEvent::Changed(snapshot));
    }
}

impl std::fmt::Debug for CollectionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionStore")
            .field("kind", &self.inner.kind)
            .field("status", &self.status())
            .field("observers", &self.observer_count())
            .finish()
    }
}
