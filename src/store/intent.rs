use crate::core::{Entry, ProductSnapshot};
use crate::error::SyncError;

/// What a caller wants done to a collection.
#[derive(Clone, Debug, PartialEq)]
pub enum Intent {
    /// Put a product in the collection. On a cart that already holds the
    /// product this becomes an increment bounded by `product.stock`.
    Add {
        product_ref: String,
        product: ProductSnapshot,
    },
    Increment {
        entry_id: String,
        stock_ceiling: Option<u32>,
    },
    /// Lower the quantity by one, removing the entry when it would reach zero.
    Decrement { entry_id: String },
    Remove { entry_id: String },
    /// Add the product if absent, remove it if present.
    Toggle {
        product_ref: String,
        product: ProductSnapshot,
    },
    Clear,
}

impl Intent {
    pub fn add(product_ref: impl Into<String>, product: ProductSnapshot) -> Self {
        Intent::Add {
            product_ref: product_ref.into(),
            product,
        }
    }

    pub fn increment(entry_id: impl Into<String>, stock_ceiling: Option<u32>) -> Self {
        Intent::Increment {
            entry_id: entry_id.into(),
            stock_ceiling,
        }
    }

    pub fn decrement(entry_id: impl Into<String>) -> Self {
        Intent::Decrement {
            entry_id: entry_id.into(),
        }
    }

    pub fn remove(entry_id: impl Into<String>) -> Self {
        Intent::Remove {
            entry_id: entry_id.into(),
        }
    }

    pub fn toggle(product_ref: impl Into<String>, product: ProductSnapshot) -> Self {
        Intent::Toggle {
            product_ref: product_ref.into(),
            product,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Intent::Add { .. } => "add",
            Intent::Increment { .. } => "increment",
            Intent::Decrement { .. } => "decrement",
            Intent::Remove { .. } => "remove",
            Intent::Toggle { .. } => "toggle",
            Intent::Clear => "clear",
        }
    }
}

/// Result of a mutation the server confirmed.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// The entry as the server now holds it.
    Committed(Entry),
    Removed { entry_id: String },
    Cleared,
    /// Nothing to do, e.g. adding a product a wishlist already holds.
    Unchanged,
}

impl Outcome {
    pub fn entry(&self) -> Option<&Entry> {
        match self {
            Outcome::Committed(entry) => Some(entry),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The response replaced the collection.
    Applied { generation: u64 },
    /// A newer refresh started after this one, so its response was dropped.
    Discarded { generation: u64, latest: u64 },
}

impl RefreshOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, RefreshOutcome::Applied { .. })
    }
}

/// Result of one call deferred while signed out and replayed on sign-in.
#[derive(Clone, Debug, PartialEq)]
pub enum Replayed {
    Refresh(Result<RefreshOutcome, SyncError>),
    Mutation(Intent, Result<Outcome, SyncError>),
}

impl Replayed {
    pub fn is_ok(&self) -> bool {
        match self {
            Replayed::Refresh(result) => result.is_ok(),
            Replayed::Mutation(_, result) => result.is_ok(),
        }
    }
}
