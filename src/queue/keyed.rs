use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{
    Mutex as AsyncMutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock,
};

use crate::error::SyncError;

/// Exclusive turn on one key. Dropping it lets the next waiter run.
pub struct QueueTurn {
    key: String,
    _guard: OwnedMutexGuard<()>,
    _shared: OwnedRwLockReadGuard<()>,
}

impl QueueTurn {
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Turn on every key at once. No [`QueueTurn`] is held while it lives.
pub struct ExclusiveTurn {
    _guard: OwnedRwLockWriteGuard<()>,
}

/// Lazily creates one fair async mutex per key.
///
/// `tokio::sync::Mutex` grants the lock in the order waiters first polled
/// [`KeyedQueue::acquire`], which gives invocation-order FIFO per key. Keys
/// nobody holds or waits for are pruned on the next acquire.
///
/// Every per-key turn also holds a shared barrier, which
/// [`KeyedQueue::acquire_all`] takes exclusively. The barrier is fair too:
/// turns requested after an exclusive one wait for it.
pub struct KeyedQueue {
    queues: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    barrier: Arc<RwLock<()>>,
}

impl KeyedQueue {
    pub fn new() -> Self {
        KeyedQueue {
            queues: Mutex::new(HashMap::new()),
            barrier: Arc::new(RwLock::new(())),
        }
    }

    /// Wait for the turn on `key`.
    ///
    /// The barrier is taken before the key, so an exclusive turn requested
    /// later cannot overtake this one.
    pub async fn acquire(&self, key: &str) -> Result<QueueTurn, SyncError> {
        let queue = self.ensure_queue(key)?;
        let shared = Arc::clone(&self.barrier).read_owned().await;
        if queue.try_lock().is_err() {
            tracing::debug!(%key, "waiting for queued mutation");
        }
        let guard = queue.lock_owned().await;
        Ok(QueueTurn {
            key: key.to_string(),
            _guard: guard,
            _shared: shared,
        })
    }

    /// Wait until every turn already granted or requested has finished, then
    /// hold all keys, including ones nobody has used yet.
    pub async fn acquire_all(&self) -> Result<ExclusiveTurn, SyncError> {
        let guard = Arc::clone(&self.barrier).write_owned().await;
        Ok(ExclusiveTurn { _guard: guard })
    }

    #[cfg(test)]
    fn is_busy(&self, key: &str) -> bool {
        self.queues
            .lock()
            .ok()
            .and_then(|queues| queues.get(key).map(|q| Arc::strong_count(q) > 1))
            .unwrap_or(false)
    }

    /// Number of keys with a live queue.
    pub fn len(&self) -> usize {
        self.queues.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_queue(&self, key: &str) -> Result<Arc<AsyncMutex<()>>, SyncError> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|_| SyncError::LockPoisoned("queue map"))?;
        // Only the map holds idle queues; anyone waiting or running holds a clone.
        queues.retain(|k, q| k == key || Arc::strong_count(q) > 1);
        Ok(queues
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone())
    }
}

impl Default for KeyedQueue {
    fn default() -> Self {
        Self::new()
    }
}
