//! One place that owns the application's cart and wishlist stores.

use std::sync::Arc;

use crate::config::StoreConfig;
use crate::core::CollectionKind;
use crate::remote::RemoteCollectionClient;
use crate::session::AuthSession;
use crate::store::{CollectionStore, Replayed};

/// Owns exactly one store per collection kind, sharing a remote client and
/// a session, and fans session transitions out to both.
///
/// Cloning is cheap; clones hand out the same stores.
#[derive(Clone, Debug)]
pub struct StoreProvider {
    cart: CollectionStore,
    wishlist: CollectionStore,
}

impl StoreProvider {
    pub fn new(
        client: Arc<dyn RemoteCollectionClient>,
        session: Arc<dyn AuthSession>,
        config: StoreConfig,
    ) -> Self {
        StoreProvider {
            cart: CollectionStore::new(
                CollectionKind::Cart,
                Arc::clone(&client),
                Arc::clone(&session),
                config.clone(),
            ),
            wishlist: CollectionStore::new(CollectionKind::Wishlist, client, session, config),
        }
    }

    pub fn cart(&self) -> &CollectionStore {
        &self.cart
    }

    pub fn wishlist(&self) -> &CollectionStore {
        &self.wishlist
    }

    pub fn store(&self, kind: CollectionKind) -> &CollectionStore {
        match kind {
            CollectionKind::Cart => &self.cart,
            CollectionKind::Wishlist => &self.wishlist,
        }
    }

    /// Replay deferred calls on both stores, cart first.
    pub async fn on_authenticated(&self) -> Vec<(CollectionKind, Replayed)> {
        let mut replayed = Vec::new();
        for store in [&self.cart, &self.wishlist] {
            let kind = store.kind();
            replayed.extend(
                store
                    .on_authenticated()
                    .await
                    .into_iter()
                    .map(|r| (kind, r)),
            );
        }
        replayed
    }

    pub fn on_signed_out(&self) {
        self.cart.on_signed_out();
        self.wishlist.on_signed_out();
    }
}
