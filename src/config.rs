use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for a [`CollectionStore`](crate::CollectionStore).
///
/// Missing fields take their defaults when loaded from JSON:
///
/// ```json
/// { "mutation_timeout_ms": 5000, "refresh_after_mutation": true }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Bound on a mutation's remote leg; past it the mutation rolls back.
    pub mutation_timeout_ms: u64,
    /// Bound on a full-collection fetch.
    pub fetch_timeout_ms: u64,
    /// Prefix of local-only ids given to provisional entries.
    pub provisional_prefix: String,
    /// Spawn a refresh when the first observer subscribes to an uninitialized store.
    pub refresh_on_subscribe: bool,
    /// Refresh after every successful mutation to bring the aggregate price back.
    pub refresh_after_mutation: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            mutation_timeout_ms: 10_000,
            fetch_timeout_ms: 15_000,
            provisional_prefix: "local-".to_string(),
            refresh_on_subscribe: true,
            refresh_after_mutation: false,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_mutation_timeout(mut self, timeout: Duration) -> Self {
        self.mutation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_provisional_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.provisional_prefix = prefix.into();
        self
    }

    pub fn with_refresh_on_subscribe(mut self, enabled: bool) -> Self {
        self.refresh_on_subscribe = enabled;
        self
    }

    pub fn with_refresh_after_mutation(mut self, enabled: bool) -> Self {
        self.refresh_after_mutation = enabled;
        self
    }

    pub fn mutation_timeout(&self) -> Duration {
        Duration::from_millis(self.mutation_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}
