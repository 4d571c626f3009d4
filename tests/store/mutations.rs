use std::sync::Arc;
use std::time::Duration;

use storefront_sync::{CollectionKind, Outcome, ProductSnapshot, RemoteError, SemanticError, SyncError};

use crate::support::{catalog, lamp, mug, store_with, GatedRemote, Recorder, Release};

#[tokio::test]
async fn add_is_visible_before_the_server_confirms() {
    let remote = Arc::new(GatedRemote::new(catalog()));
    let store = store_with(CollectionKind::Cart, remote.clone());
    remote.hold();

    let task = tokio::spawn({
        let store = store.clone();
        async move { store.add("mug", mug()).await }
    });
    remote.wait_parked(1).await;

    let snapshot = store.snapshot();
    let provisional = snapshot.entries().next().unwrap();
    assert!(provisional.entry_id.starts_with("local-"));
    assert_eq!(provisional.product_ref, "mug");
    assert_eq!(provisional.quantity, 1);
    assert!(snapshot.collection().is_price_stale());
    assert_eq!(remote.parked(), vec!["add cart mug"]);

    remote.release("add", Release::Proceed);
    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome.entry().unwrap().entry_id, "cart-1");

    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.entry("cart-1").unwrap().line_price, Some(12.5));
}

#[tokio::test]
async fn concurrent_adds_of_one_product_make_one_entry() {
    let remote = Arc::new(GatedRemote::new(catalog()));
    let store = store_with(CollectionKind::Cart, remote.clone());
    remote.hold();

    let first = tokio::spawn({
        let store = store.clone();
        async move { store.add("mug", mug()).await }
    });
    let second = tokio::spawn({
        let store = store.clone();
        async move { store.add("mug", mug()).await }
    });

    remote.wait_parked(1).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    // The second add waits for the first to settle.
    assert_eq!(remote.parked(), vec!["add cart mug"]);

    remote.release("add", Release::Proceed);
    remote.wait_parked(1).await;
    assert_eq!(remote.parked(), vec!["set cart cart-1 2"]);
    remote.release("set", Release::Proceed);

    first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(second.entry().unwrap().quantity, 2);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.lookup("mug").unwrap().quantity, 2);
    assert_eq!(remote.backend().entries(CollectionKind::Cart).len(), 1);
}

#[tokio::test]
async fn failed_increment_rolls_back() {
    let backend = catalog();
    let seeded = backend.seed(CollectionKind::Cart, "mug", 3).unwrap();
    let remote = Arc::new(backend);
    let store = store_with(CollectionKind::Cart, remote.clone());
    store.refresh().await.unwrap();
    let recorder = Recorder::attach(&store);

    remote.fail_next(RemoteError::Transport("connection reset".into()));
    let err = store.increment(&seeded.entry_id, Some(5)).await.unwrap_err();

    assert_eq!(err, SyncError::Transport("connection reset".into()));
    assert!(err.is_remote());
    assert_eq!(recorder.quantities("mug"), vec![4, 3]);
    assert_eq!(store.lookup("mug").unwrap().quantity, 3);
    assert_eq!(remote.entries(CollectionKind::Cart)[0].quantity, 3);
}

#[tokio::test]
async fn same_product_mutations_run_in_invocation_order() {
    let backend = catalog();
    backend.seed(CollectionKind::Cart, "mug", 5).unwrap();
    let remote = Arc::new(GatedRemote::new(backend));
    let store = store_with(CollectionKind::Cart, remote.clone());
    store.refresh().await.unwrap();
    let recorder = Recorder::attach(&store);
    remote.hold();

    let increment = tokio::spawn({
        let store = store.clone();
        async move { store.increment("cart-1", Some(10)).await }
    });
    let decrement = tokio::spawn({
        let store = store.clone();
        async move { store.decrement("cart-1").await }
    });

    remote.wait_parked(1).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(remote.parked(), vec!["set cart cart-1 6"]);

    remote.release("set", Release::Proceed);
    remote.wait_parked(1).await;
    assert_eq!(remote.parked(), vec!["set cart cart-1 5"]);
    remote.release("set", Release::Proceed);

    increment.await.unwrap().unwrap();
    decrement.await.unwrap().unwrap();

    // The decrement starts from the incremented value, never from 5.
    assert_eq!(recorder.quantities("mug"), vec![6, 6, 5, 5]);
    assert_eq!(store.lookup("mug").unwrap().quantity, 5);
}

#[tokio::test]
async fn different_products_do_not_wait_for_each_other() {
    let remote = Arc::new(GatedRemote::new(catalog()));
    let store = store_with(CollectionKind::Cart, remote.clone());
    remote.hold();

    let mug_add = tokio::spawn({
        let store = store.clone();
        async move { store.add("mug", mug()).await }
    });
    let lamp_add = tokio::spawn({
        let store = store.clone();
        async move { store.add("lamp", lamp()).await }
    });

    remote.wait_parked(2).await;
    assert_eq!(store.snapshot().len(), 2);

    remote.release("add cart lamp", Release::Proceed);
    lamp_add.await.unwrap().unwrap();
    remote.release("add cart mug", Release::Proceed);
    mug_add.await.unwrap().unwrap();

    let products: Vec<String> = store
        .snapshot()
        .entries()
        .map(|e| e.product_ref.clone())
        .collect();
    assert_eq!(products, vec!["mug", "lamp"]);
}

#[tokio::test]
async fn increment_of_provisional_entry_waits_for_its_add() {
    let remote = Arc::new(GatedRemote::new(catalog()));
    let store = store_with(CollectionKind::Cart, remote.clone());
    remote.hold();

    let add = tokio::spawn({
        let store = store.clone();
        async move { store.add("mug", mug()).await }
    });
    remote.wait_parked(1).await;
    let provisional = store.lookup("mug").unwrap().entry_id;

    let increment = tokio::spawn({
        let store = store.clone();
        async move { store.increment(provisional, Some(5)).await }
    });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(remote.parked(), vec!["add cart mug"]);

    remote.release("add", Release::Proceed);
    add.await.unwrap().unwrap();

    remote.wait_parked(1).await;
    assert_eq!(remote.parked(), vec!["set cart cart-1 2"]);
    remote.release("set", Release::Proceed);
    increment.await.unwrap().unwrap();

    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.entry("cart-1").unwrap().quantity, 2);
}

#[tokio::test]
async fn stock_ceiling_stops_increment_locally() {
    let backend = catalog();
    let seeded = backend.seed(CollectionKind::Cart, "lamp", 2).unwrap();
    let remote = Arc::new(backend);
    let store = store_with(CollectionKind::Cart, remote.clone());
    store.refresh().await.unwrap();

    let err = store.increment(&seeded.entry_id, Some(2)).await.unwrap_err();
    assert_eq!(
        err,
        SyncError::Capacity {
            product_ref: "lamp".into(),
            ceiling: 2
        }
    );

    // Adding a product already in the cart is an increment bounded by its stock.
    let err = store.add("lamp", lamp()).await.unwrap_err();
    assert!(matches!(err, SyncError::Capacity { ceiling: 2, .. }));

    assert_eq!(remote.calls(), vec!["fetch cart"]);
    assert_eq!(store.lookup("lamp").unwrap().quantity, 2);
}

#[tokio::test]
async fn out_of_stock_product_cannot_be_added() {
    let remote = Arc::new(catalog());
    let store = store_with(CollectionKind::Cart, remote.clone());

    let err = store
        .add("sold-out", ProductSnapshot::new("Poster", 8.0).with_stock(0))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        SyncError::Capacity {
            product_ref: "sold-out".into(),
            ceiling: 0
        }
    );
    assert!(store.snapshot().is_empty());
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn server_rejection_rolls_back() {
    let backend = catalog();
    let seeded = backend.seed(CollectionKind::Cart, "lamp", 2).unwrap();
    let remote = Arc::new(backend);
    let store = store_with(CollectionKind::Cart, remote.clone());
    store.refresh().await.unwrap();

    // No local ceiling given, so only the server knows the stock.
    let err = store.increment(&seeded.entry_id, None).await.unwrap_err();

    assert_eq!(
        err,
        SyncError::Semantic(SemanticError::StockExceeded {
            product_ref: "lamp".into()
        })
    );
    assert_eq!(store.lookup("lamp").unwrap().quantity, 2);
}

#[tokio::test]
async fn decrement_at_one_removes_the_entry() {
    let backend = catalog();
    let mug_entry = backend.seed(CollectionKind::Cart, "mug", 2).unwrap();
    let remote = Arc::new(backend);
    let store = store_with(CollectionKind::Cart, remote.clone());
    store.refresh().await.unwrap();

    let outcome = store.decrement(&mug_entry.entry_id).await.unwrap();
    assert_eq!(outcome.entry().unwrap().quantity, 1);

    let outcome = store.decrement(&mug_entry.entry_id).await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Removed {
            entry_id: mug_entry.entry_id.clone()
        }
    );
    assert!(store.snapshot().is_empty());
    assert!(remote.entries(CollectionKind::Cart).is_empty());
    assert_eq!(
        remote.calls(),
        vec![
            "fetch cart".to_string(),
            format!("set cart {} 1", mug_entry.entry_id),
            format!("remove cart {}", mug_entry.entry_id),
        ]
    );
}

#[tokio::test]
async fn unknown_entry_is_rejected_without_remote_call() {
    let remote = Arc::new(catalog());
    let store = store_with(CollectionKind::Cart, remote.clone());

    assert_eq!(
        store.remove("nope").await,
        Err(SyncError::UnknownEntry("nope".into()))
    );
    assert_eq!(
        store.increment("nope", None).await,
        Err(SyncError::UnknownEntry("nope".into()))
    );
    assert!(remote.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_remote_times_out_and_rolls_back() {
    let backend = catalog();
    backend.seed(CollectionKind::Cart, "mug", 2).unwrap();
    let remote = Arc::new(GatedRemote::new(backend));
    let store = store_with(CollectionKind::Cart, remote.clone());
    store.refresh().await.unwrap();
    remote.hold();

    let err = store.increment("cart-1", None).await.unwrap_err();

    assert_eq!(err, SyncError::Timeout(Duration::from_secs(10)));
    assert_eq!(store.lookup("mug").unwrap().quantity, 2);
    assert_eq!(remote.backend().entries(CollectionKind::Cart)[0].quantity, 2);
}

#[tokio::test]
async fn failed_clear_restores_entries_in_order() {
    let backend = catalog();
    backend.seed(CollectionKind::Cart, "mug", 1).unwrap();
    backend.seed(CollectionKind::Cart, "lamp", 2).unwrap();
    let remote = Arc::new(backend);
    let store = store_with(CollectionKind::Cart, remote.clone());
    store.refresh().await.unwrap();
    let before: Vec<_> = store.snapshot().entries().cloned().collect();

    remote.fail_next(RemoteError::Transport("offline".into()));
    assert!(store.clear().await.is_err());
    let after: Vec<_> = store.snapshot().entries().cloned().collect();
    assert_eq!(after, before);

    assert_eq!(store.clear().await, Ok(Outcome::Cleared));
    assert!(store.snapshot().is_empty());
    assert!(remote.entries(CollectionKind::Cart).is_empty());
}

#[tokio::test]
async fn wishlist_holds_products_without_quantities() {
    let remote = Arc::new(catalog());
    let store = store_with(CollectionKind::Wishlist, remote.clone());

    let entry_id = store
        .add("mug", mug())
        .await
        .unwrap()
        .entry()
        .unwrap()
        .entry_id
        .clone();
    assert_eq!(store.add("mug", mug()).await, Ok(Outcome::Unchanged));
    assert_eq!(remote.calls(), vec!["add wishlist mug"]);

    assert_eq!(
        store.increment(&entry_id, None).await,
        Err(SyncError::Unsupported {
            kind: CollectionKind::Wishlist,
            operation: "increment"
        })
    );

    assert!(matches!(
        store.toggle("mug", mug()).await,
        Ok(Outcome::Removed { .. })
    ));
    assert!(store.snapshot().is_empty());

    assert!(matches!(
        store.toggle("mug", mug()).await,
        Ok(Outcome::Committed(_))
    ));
    let entry_id = store.lookup("mug").unwrap().entry_id;
    assert!(matches!(
        store.decrement(entry_id).await,
        Ok(Outcome::Removed { .. })
    ));
    assert!(remote.entries(CollectionKind::Wishlist).is_empty());
}

#[tokio::test]
async fn mixed_mutations_keep_entries_unique_and_positive() {
    let remote = Arc::new(catalog());
    let store = store_with(CollectionKind::Cart, remote.clone());
    let violations = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&violations);
    store.subscribe(move |event| {
        if let Some(snapshot) = event.snapshot() {
            let mut products: Vec<&str> = snapshot.entries().map(|e| e.product_ref.as_str()).collect();
            let count = products.len();
            products.sort_unstable();
            products.dedup();
            if products.len() != count || snapshot.entries().any(|e| e.quantity < 1) {
                sink.lock().unwrap().push(snapshot.revision());
            }
        }
    });

    let _ = tokio::join!(
        store.add("mug", mug()),
        store.add("mug", mug()),
        store.add("lamp", lamp()),
        store.toggle("lamp", lamp()),
        store.add("mug", mug()),
    );
    let mug_id = store.lookup("mug").unwrap().entry_id;
    let _ = tokio::join!(
        store.decrement(mug_id.clone()),
        store.decrement(mug_id.clone()),
        store.decrement(mug_id.clone()),
        store.decrement(mug_id.clone()),
    );

    assert!(violations.lock().unwrap().is_empty());
    assert!(store.lookup("mug").is_none());
    assert!(store.lookup("lamp").is_none());
    assert!(store.snapshot().is_empty());
    assert!(remote.entries(CollectionKind::Cart).is_empty());
}

#[tokio::test]
async fn queued_intent_for_a_removed_entry_never_hits_its_replacement() {
    let backend = catalog();
    backend.seed(CollectionKind::Cart, "mug", 1).unwrap();
    let remote = Arc::new(GatedRemote::new(backend));
    let store = store_with(CollectionKind::Cart, remote.clone());
    store.refresh().await.unwrap();
    remote.hold();

    let increment = tokio::spawn({
        let store = store.clone();
        async move { store.increment("cart-1", Some(5)).await }
    });
    remote.wait_parked(1).await;

    let mut queued = Vec::new();
    for step in ["remove", "add", "decrement"] {
        let store = store.clone();
        queued.push(tokio::spawn(async move {
            match step {
                "remove" => store.remove("cart-1").await,
                "add" => store.add("mug", mug()).await,
                _ => store.decrement("cart-1").await,
            }
        }));
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }
    assert_eq!(remote.parked(), vec!["set cart cart-1 2"]);

    remote.release("set", Release::Proceed);
    remote.wait_parked(1).await;
    assert_eq!(remote.parked(), vec!["remove cart cart-1"]);
    remote.release("remove", Release::Proceed);
    remote.wait_parked(1).await;
    assert_eq!(remote.parked(), vec!["add cart mug"]);
    remote.release("add", Release::Proceed);

    increment.await.unwrap().unwrap();
    let mut results = Vec::new();
    for task in queued {
        results.push(task.await.unwrap());
    }
    assert_eq!(
        results[0],
        Ok(Outcome::Removed {
            entry_id: "cart-1".into()
        })
    );
    assert_eq!(results[1].as_ref().unwrap().entry().unwrap().entry_id, "cart-2");
    assert_eq!(results[2], Err(SyncError::UnknownEntry("cart-1".into())));
    assert!(remote.parked().is_empty());

    let lookup = store.lookup("mug").unwrap();
    assert_eq!(lookup.entry_id, "cart-2");
    assert_eq!(lookup.quantity, 1);
    let server = remote.backend().entries(CollectionKind::Cart);
    assert_eq!(server.len(), 1);
    assert_eq!(server[0].entry_id, "cart-2");
}

#[tokio::test]
async fn clear_waits_for_earlier_mutations_and_holds_back_later_ones() {
    let backend = catalog();
    backend.seed(CollectionKind::Cart, "mug", 1).unwrap();
    let remote = Arc::new(GatedRemote::new(backend));
    let store = store_with(CollectionKind::Cart, remote.clone());
    store.refresh().await.unwrap();
    remote.hold();

    let increment = tokio::spawn({
        let store = store.clone();
        async move { store.increment("cart-1", None).await }
    });
    remote.wait_parked(1).await;
    let clear = tokio::spawn({
        let store = store.clone();
        async move { store.clear().await }
    });
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    let add = tokio::spawn({
        let store = store.clone();
        async move { store.add("lamp", lamp()).await }
    });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(remote.parked(), vec!["set cart cart-1 2"]);
    assert!(store.lookup("lamp").is_none());

    remote.release("set", Release::Proceed);
    remote.wait_parked(1).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(remote.parked(), vec!["clear cart"]);
    assert!(store.snapshot().is_empty());

    remote.release("clear", Release::Proceed);
    remote.wait_parked(1).await;
    assert_eq!(remote.parked(), vec!["add cart lamp"]);
    remote.release("add", Release::Proceed);

    increment.await.unwrap().unwrap();
    assert_eq!(clear.await.unwrap(), Ok(Outcome::Cleared));
    add.await.unwrap().unwrap();

    let local: Vec<_> = store
        .snapshot()
        .entries()
        .map(|e| e.product_ref.clone())
        .collect();
    let server: Vec<_> = remote
        .backend()
        .entries(CollectionKind::Cart)
        .into_iter()
        .map(|e| e.product_ref)
        .collect();
    assert_eq!(local, vec!["lamp"]);
    assert_eq!(local, server);
}
