use std::sync::{Arc, Mutex};

use event_emitter_rs::EventEmitter;

use super::{ObserverId, StoreEvent};
use crate::store::CollectionStore;

/// Forwards store events into an `EventEmitter` for string-keyed, in-process
/// listeners.
///
/// Events are published as `"<kind>.changed"` with the snapshot as a JSON
/// string, and `"<kind>.error"` with the error message. `EventEmitter` runs
/// listeners on their own threads, so delivery is asynchronous.
pub struct EmitterBridge {
    emitter: Arc<Mutex<EventEmitter>>,
}

impl EmitterBridge {
    pub fn new(emitter: EventEmitter) -> Self {
        EmitterBridge {
            emitter: Arc::new(Mutex::new(emitter)),
        }
    }

    /// Register a listener on the underlying emitter. Returns its listener id.
    pub fn on<F>(&self, event: &str, listener: F) -> Option<String>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let mut emitter = self.emitter.lock().ok()?;
        Some(emitter.on(event, listener))
    }

    /// Start forwarding events of `store`.
    pub fn attach(&self, store: &CollectionStore) -> ObserverId {
        let emitter = Arc::clone(&self.emitter);
        let kind = store.kind();
        store.subscribe(move |event| {
            let (name, payload) = match event {
                StoreEvent::Changed(snapshot) => match serde_json::to_string(&**snapshot) {
                    Ok(json) => (format!("{}.changed", kind), json),
                    Err(err) => {
                        tracing::warn!(%kind, error = %err, "could not serialize snapshot");
                        return;
                    }
                },
                StoreEvent::Error(err) => (format!("{}.error", kind), err.to_string()),
            };
            match emitter.lock() {
                Ok(mut emitter) => {
                    emitter.emit(&name, payload);
                }
                Err(_) => tracing::warn!(%kind, "emitter bridge lock poisoned"),
            }
        })
    }
}
