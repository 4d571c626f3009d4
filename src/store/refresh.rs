use std::sync::Arc;

use tokio::time::timeout;

use super::{CollectionStore, Deferred, RefreshOutcome};
use crate::core::{CollectionSnapshot, RemoteCollection, Status};
use crate::error::SyncError;
use crate::observe::StoreEvent;

/// Refetches allowed when mutations keep committing under a refresh.
const MAX_REFETCH: u32 = 2;

enum Settled {
    Done(Result<RefreshOutcome, SyncError>),
    Refetch,
}

impl CollectionStore {
    /// Replace the local collection with the server's.
    ///
    /// Every call starts a new generation. A response that arrives after a
    /// newer refresh has started is discarded and reported as
    /// [`RefreshOutcome::Discarded`]. A response fetched before a mutation
    /// committed is refetched rather than applied, so it cannot undo that
    /// mutation. Optimistic changes still in flight are laid back over the
    /// fetched collection.
    ///
    /// A failure before anything was ever loaded moves the store to
    /// [`Status::Error`]. A failure after that keeps the last good state and
    /// is also sent to observers as [`StoreEvent::Error`].
    pub async fn refresh(&self) -> Result<RefreshOutcome, SyncError> {
        if !self.inner.session.is_authenticated() {
            return Err(self.defer(Deferred::Refresh));
        }
        self.fetch().await
    }

    /// Used for replays: never defers again.
    pub(super) async fn refresh_once(&self) -> Result<RefreshOutcome, SyncError> {
        if !self.inner.session.is_authenticated() {
            return Err(SyncError::Unauthenticated);
        }
        self.fetch().await
    }

    pub(super) async fn fetch(&self) -> Result<RefreshOutcome, SyncError> {
        let kind = self.inner.kind;
        let limit = self.inner.config.fetch_timeout();
        let mut attempt = 0;
        loop {
            let (generation, commits) = self.begin_fetch()?;
            tracing::debug!(%kind, generation, attempt, "refresh started");

            let response = match timeout(limit, self.inner.client.fetch_collection(kind)).await {
                Ok(result) => result.map_err(SyncError::from),
                Err(_) => Err(SyncError::Timeout(limit)),
            };

            match self.settle_fetch(generation, commits, response, attempt < MAX_REFETCH)? {
                Settled::Done(result) => return result,
                Settled::Refetch => {
                    attempt += 1;
                    tracing::debug!(%kind, generation, "mutation committed during refresh, refetching");
                }
            }
        }
    }

    fn begin_fetch(&self) -> Result<(u64, u64), SyncError> {
        let (generation, commits, snapshot) = self.with_state(|state| {
            state.refresh_scheduled = false;
            let generation = state.collection.begin_fetch();
            // Loading is only shown for the first fetch; later refreshes run
            // behind the data already on screen.
            let snapshot = (!state.loaded && state.collection.set_status(Status::Loading))
                .then(|| self.publish(state));
            (generation, state.commits, snapshot)
        })?;
        if let Some(snapshot) = snapshot {
            self.notify_changed(snapshot);
        }
        Ok((generation, commits))
    }

    fn settle_fetch(
        &self,
        generation: u64,
        commits: u64,
        response: Result<RemoteCollection, SyncError>,
        may_refetch: bool,
    ) -> Result<Settled, SyncError> {
        let kind = self.inner.kind;
        let (settled, snapshot, error) = self.with_state(|state| {
            let latest = state.collection.generation();
            if latest != generation {
                return (
                    Settled::Done(Ok(RefreshOutcome::Discarded { generation, latest })),
                    None,
                    None,
                );
            }
            match response {
                Ok(_) if state.commits != commits && may_refetch => (Settled::Refetch, None, None),
                Ok(remote) => {
                    state.collection.replace_all(remote);
                    // Changes still waiting on the server stay visible.
                    for (_, patch) in &state.pending {
                        patch.clone().apply(&mut state.collection);
                    }
                    state.collection.set_status(Status::Ready);
                    state.loaded = true;
                    (
                        Settled::Done(Ok(RefreshOutcome::Applied { generation })),
                        Some(self.publish(state)),
                        None,
                    )
                }
                Err(err) if state.loaded => (Settled::Done(Err(err.clone())), None, Some(err)),
                Err(err) => {
                    state.collection.set_status(Status::Error);
                    (
                        Settled::Done(Err(err)),
                        Some(self.publish(state)),
                        None,
                    )
                }
            }
        })?;

        match &settled {
            Settled::Done(Ok(RefreshOutcome::Discarded { latest, .. })) => {
                tracing::debug!(%kind, generation, latest, "discarding stale refresh response");
            }
            Settled::Done(Ok(RefreshOutcome::Applied { .. })) => {
                tracing::debug!(%kind, generation, "refresh applied");
            }
            Settled::Done(Err(err)) => {
                tracing::warn!(%kind, generation, error = %err, "refresh failed");
            }
            Settled::Refetch => {}
        }

        self.deliver(snapshot, error);
        Ok(settled)
    }

    fn deliver(&self, snapshot: Option<Arc<CollectionSnapshot>>, error: Option<SyncError>) {
        if let Some(snapshot) = snapshot {
            self.notify_changed(snapshot);
        }
        if let Some(err) = error {
            self.inner.observers.notify(&StoreEvent::Error(err));
        }
    }
}
