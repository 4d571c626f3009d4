use std::future::Future;
use std::sync::atomic::Ordering;

use tokio::time::timeout;

use super::{CollectionStore, Deferred, Intent, Outcome, StoreState};
use crate::core::{Entry, Patch, ProductSnapshot};
use crate::error::{RemoteError, SyncError};

/// An intent confined to one product's queue. `Clear` is the only other kind.
enum ProductIntent {
    Add {
        product_ref: String,
        product: ProductSnapshot,
    },
    Toggle {
        product_ref: String,
        product: ProductSnapshot,
    },
    Increment {
        entry_id: String,
        stock_ceiling: Option<u32>,
    },
    Decrement {
        entry_id: String,
    },
    Remove {
        entry_id: String,
    },
}

impl ProductIntent {
    fn from_intent(intent: Intent) -> Option<Self> {
        Some(match intent {
            Intent::Add {
                product_ref,
                product,
            } => ProductIntent::Add {
                product_ref,
                product,
            },
            Intent::Toggle {
                product_ref,
                product,
            } => ProductIntent::Toggle {
                product_ref,
                product,
            },
            Intent::Increment {
                entry_id,
                stock_ceiling,
            } => ProductIntent::Increment {
                entry_id,
                stock_ceiling,
            },
            Intent::Decrement { entry_id } => ProductIntent::Decrement { entry_id },
            Intent::Remove { entry_id } => ProductIntent::Remove { entry_id },
            Intent::Clear => return None,
        })
    }
}

/// What an intent turns into once resolved against the current state.
enum Step {
    Done(Outcome),
    Insert(Entry),
    SetQuantity { entry_id: String, quantity: u32 },
    Remove { entry_id: String },
}

impl CollectionStore {
    /// Apply `intent` optimistically, confirm it remotely, then commit the
    /// server's answer or roll back.
    ///
    /// Mutations on the same product run one at a time in invocation order;
    /// each holds its product's turn from the optimistic change until commit
    /// or rollback. Mutations on different products run concurrently.
    /// `Clear` runs alone, after every mutation invoked before it.
    ///
    /// Observers see the optimistic state before the remote call resolves.
    /// On failure they see the rolled back state and the error is returned.
    pub async fn mutate(&self, intent: Intent) -> Result<Outcome, SyncError> {
        if !self.inner.session.is_authenticated() {
            return Err(self.defer(Deferred::Mutate(intent)));
        }
        self.run_mutation(intent).await
    }

    /// Used for replays: never defers again.
    pub(super) async fn mutate_once(&self, intent: Intent) -> Result<Outcome, SyncError> {
        if !self.inner.session.is_authenticated() {
            return Err(SyncError::Unauthenticated);
        }
        self.run_mutation(intent).await
    }

    pub async fn add(
        &self,
        product_ref: impl Into<String>,
        product: ProductSnapshot,
    ) -> Result<Outcome, SyncError> {
        self.mutate(Intent::add(product_ref, product)).await
    }

    pub async fn increment(
        &self,
        entry_id: impl Into<String>,
        stock_ceiling: Option<u32>,
    ) -> Result<Outcome, SyncError> {
        self.mutate(Intent::increment(entry_id, stock_ceiling)).await
    }

    pub async fn decrement(&self, entry_id: impl Into<String>) -> Result<Outcome, SyncError> {
        self.mutate(Intent::decrement(entry_id)).await
    }

    pub async fn remove(&self, entry_id: impl Into<String>) -> Result<Outcome, SyncError> {
        self.mutate(Intent::remove(entry_id)).await
    }

    pub async fn toggle(
        &self,
        product_ref: impl Into<String>,
        product: ProductSnapshot,
    ) -> Result<Outcome, SyncError> {
        self.mutate(Intent::toggle(product_ref, product)).await
    }

    pub async fn clear(&self) -> Result<Outcome, SyncError> {
        self.mutate(Intent::Clear).await
    }

    async fn run_mutation(&self, intent: Intent) -> Result<Outcome, SyncError> {
        let name = intent.name();
        let result = match ProductIntent::from_intent(intent) {
            Some(intent) => self.mutate_product(intent).await,
            None => self.clear_all().await,
        };
        match &result {
            Ok(outcome) => {
                tracing::debug!(kind = %self.inner.kind, intent = name, ?outcome, "mutation settled");
                if self.inner.config.refresh_after_mutation && *outcome != Outcome::Unchanged {
                    if let Err(err) = self.fetch().await {
                        tracing::debug!(kind = %self.inner.kind, error = %err, "refresh after mutation failed");
                    }
                }
            }
            Err(err) => {
                tracing::warn!(kind = %self.inner.kind, intent = name, error = %err, "mutation failed");
            }
        }
        result
    }

    async fn mutate_product(&self, intent: ProductIntent) -> Result<Outcome, SyncError> {
        let product_ref = self.queue_key(&intent)?;
        let _turn = self.inner.queue.acquire(&product_ref).await?;

        let (epoch, step) = self.with_state(|state| {
            self.plan(state, &intent, &product_ref)
                .map(|step| (state.epoch, step))
        })??;
        let kind = self.inner.kind;

        match step {
            Step::Done(outcome) => Ok(outcome),
            Step::Insert(provisional) => {
                let position = self.with_state(|state| state.collection.len())?;
                let provisional_id = provisional.entry_id.clone();
                self.confirm(
                    Patch::Insert {
                        index: position,
                        entry: provisional,
                    },
                    epoch,
                    self.inner.client.add_entry(kind, &product_ref),
                    |state, entry: Entry| commit_entry(state, &provisional_id, entry),
                )
                .await
            }
            Step::SetQuantity { entry_id, quantity } => {
                self.confirm(
                    Patch::SetQuantity {
                        entry_id: entry_id.clone(),
                        quantity,
                    },
                    epoch,
                    self.inner.client.set_quantity(kind, &entry_id, quantity),
                    |state, entry: Entry| commit_entry(state, &entry_id, entry),
                )
                .await
            }
            Step::Remove { entry_id } => {
                self.confirm(
                    Patch::Remove {
                        entry_id: entry_id.clone(),
                    },
                    epoch,
                    self.inner.client.remove_entry(kind, &entry_id),
                    |state, ()| {
                        state.collection.remove(&entry_id);
                        state.renamed.retain(|_, to| *to != entry_id);
                        Outcome::Removed {
                            entry_id: entry_id.clone(),
                        }
                    },
                )
                .await
            }
        }
    }

    /// Runs alone: mutations invoked earlier finish first, later ones wait.
    async fn clear_all(&self) -> Result<Outcome, SyncError> {
        let _turn = self.inner.queue.acquire_all().await?;

        let (epoch, patch) =
            self.with_state(|state| (state.epoch, Patch::clear(&state.collection)))?;
        self.confirm(
            patch,
            epoch,
            self.inner.client.clear_collection(self.inner.kind),
            |state, ()| {
                state.renamed.clear();
                Outcome::Cleared
            },
        )
        .await
    }

    /// The product whose queue the intent waits in.
    fn queue_key(&self, intent: &ProductIntent) -> Result<String, SyncError> {
        match intent {
            ProductIntent::Add { product_ref, .. } | ProductIntent::Toggle { product_ref, .. } => {
                Ok(product_ref.clone())
            }
            ProductIntent::Increment { entry_id, .. }
            | ProductIntent::Decrement { entry_id }
            | ProductIntent::Remove { entry_id } => self.with_state(|state| {
                state
                    .resolve_entry(entry_id)
                    .map(|entry| entry.product_ref.clone())
            })?,
        }
    }

    /// Resolve an intent against the state as it is once the product's turn
    /// has come. An entry id still names its entry after an earlier commit
    /// swapped it for the server's, but never a later entry for the same
    /// product.
    fn plan(
        &self,
        state: &StoreState,
        intent: &ProductIntent,
        product_ref: &str,
    ) -> Result<Step, SyncError> {
        let kind = self.inner.kind;
        match intent {
            ProductIntent::Add { product, .. } => {
                match state.collection.find_by_product(product_ref) {
                    Some(entry) if kind.tracks_quantity() => increment_step(entry, product.stock),
                    Some(_) => Ok(Step::Done(Outcome::Unchanged)),
                    None => self.insert_step(product_ref, product),
                }
            }
            ProductIntent::Toggle { product, .. } => {
                match state.collection.find_by_product(product_ref) {
                    Some(entry) => Ok(Step::Remove {
                        entry_id: entry.entry_id.clone(),
                    }),
                    None => self.insert_step(product_ref, product),
                }
            }
            ProductIntent::Increment {
                entry_id,
                stock_ceiling,
            } => {
                let entry = state.resolve_entry(entry_id)?;
                if !kind.tracks_quantity() {
                    return Err(SyncError::Unsupported {
                        kind,
                        operation: "increment",
                    });
                }
                increment_step(entry, *stock_ceiling)
            }
            ProductIntent::Decrement { entry_id } => {
                let entry = state.resolve_entry(entry_id)?;
                if kind.tracks_quantity() && entry.quantity > 1 {
                    Ok(Step::SetQuantity {
                        entry_id: entry.entry_id.clone(),
                        quantity: entry.quantity - 1,
                    })
                } else {
                    Ok(Step::Remove {
                        entry_id: entry.entry_id.clone(),
                    })
                }
            }
            ProductIntent::Remove { entry_id } => Ok(Step::Remove {
                entry_id: state.resolve_entry(entry_id)?.entry_id.clone(),
            }),
        }
    }

    fn insert_step(&self, product_ref: &str, product: &ProductSnapshot) -> Result<Step, SyncError> {
        if product.stock == Some(0) {
            return Err(SyncError::Capacity {
                product_ref: product_ref.to_string(),
                ceiling: 0,
            });
        }
        let seq = self.inner.provisional_seq.fetch_add(1, Ordering::Relaxed);
        let entry_id = format!("{}{}", self.inner.config.provisional_prefix, seq);
        Ok(Step::Insert(Entry::new(
            entry_id,
            product_ref,
            product.clone(),
            1,
        )))
    }

    /// Apply `patch` and publish it, await `remote` within the mutation
    /// timeout, then settle: `commit` the server's answer on success, apply
    /// the inverse patch on failure.
    ///
    /// If the session ended while the call was in flight nothing is touched.
    async fn confirm<T, Fut, C>(
        &self,
        patch: Patch,
        epoch: u64,
        remote: Fut,
        commit: C,
    ) -> Result<Outcome, SyncError>
    where
        Fut: Future<Output = Result<T, RemoteError>>,
        C: FnOnce(&mut StoreState, T) -> Outcome,
    {
        let (token, inverse) = self.apply_optimistic(patch)?;

        let limit = self.inner.config.mutation_timeout();
        let result = match timeout(limit, remote).await {
            Ok(result) => result.map_err(SyncError::from),
            Err(_) => Err(SyncError::Timeout(limit)),
        };

        let (outcome, snapshot) = self.with_state(|state| {
            if state.epoch != epoch {
                return (Err(SyncError::SessionEnded), None);
            }
            state.pending.retain(|(t, _)| *t != token);
            match result {
                Ok(value) => {
                    let outcome = commit(state, value);
                    state.commits += 1;
                    (Ok(outcome), Some(self.publish(state)))
                }
                Err(err) => {
                    let snapshot = inverse
                        .and_then(|inverse| inverse.apply(&mut state.collection))
                        .map(|_| self.publish(state));
                    (Err(err), snapshot)
                }
            }
        })?;

        if let Some(snapshot) = snapshot {
            self.notify_changed(snapshot);
        }
        if let Err(err) = &outcome {
            if err.is_remote() {
                tracing::info!(kind = %self.inner.kind, error = %err, "optimistic change rolled back");
            }
        }
        outcome
    }

    fn apply_optimistic(&self, patch: Patch) -> Result<(u64, Option<Patch>), SyncError> {
        let (token, inverse, snapshot) = self.with_state(|state| {
            let token = state.next_token;
            state.next_token += 1;
            let inverse = patch.clone().apply(&mut state.collection);
            let snapshot = inverse.is_some().then(|| {
                state.pending.push((token, patch));
                self.publish(state)
            });
            (token, inverse, snapshot)
        })?;
        if let Some(snapshot) = snapshot {
            self.notify_changed(snapshot);
        }
        Ok((token, inverse))
    }
}

/// Install the server's entry in place of `replaces`, remembering the swap
/// when the server answered with a different id.
fn commit_entry(state: &mut StoreState, replaces: &str, entry: Entry) -> Outcome {
    if entry.entry_id != replaces {
        state
            .renamed
            .insert(replaces.to_string(), entry.entry_id.clone());
    }
    state.collection.commit_entry(replaces, entry.clone());
    Outcome::Committed(entry)
}

fn increment_step(entry: &Entry, ceiling: Option<u32>) -> Result<Step, SyncError> {
    if let Some(ceiling) = ceiling {
        if entry.quantity >= ceiling {
            return Err(SyncError::Capacity {
                product_ref: entry.product_ref.clone(),
                ceiling,
            });
        }
    }
    Ok(Step::SetQuantity {
        entry_id: entry.entry_id.clone(),
        quantity: entry.quantity + 1,
    })
}
