use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use super::StoreEvent;

/// Handle returned by [`ObserverRegistry::subscribe`].
pub type ObserverId = u64;

type Observer = dyn Fn(&StoreEvent) + Send + Sync;

/// Callback registry for store events.
///
/// Notification takes a snapshot of the registered callbacks and releases the
/// lock before calling them, so an observer may subscribe or unsubscribe from
/// inside its own callback. A callback removed mid-round still runs in that
/// round; one added mid-round first runs on the next.
pub struct ObserverRegistry {
    observers: RwLock<Vec<(ObserverId, Arc<Observer>)>>,
    next_id: AtomicU64,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        ObserverRegistry {
            observers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match self.observers.write() {
            Ok(mut observers) => observers.push((id, Arc::new(observer))),
            Err(poisoned) => poisoned.into_inner().push((id, Arc::new(observer))),
        }
        id
    }

    /// Returns whether the observer was registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = match self.observers.write() {
            Ok(observers) => observers,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        observers.len() != before
    }

    pub fn notify(&self, event: &StoreEvent) {
        let snapshot: Vec<Arc<Observer>> = match self.observers.read() {
            Ok(observers) => observers.iter().map(|(_, o)| Arc::clone(o)).collect(),
            Err(poisoned) => poisoned
                .into_inner()
                .iter()
                .map(|(_, o)| Arc::clone(o))
                .collect(),
        };
        for observer in snapshot {
            observer(event);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
