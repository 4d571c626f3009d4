use std::fmt;
use std::time::Duration;

use crate::core::CollectionKind;

/// Rejections the server reports for a well-formed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticError {
    StockExceeded { product_ref: String },
    DuplicateEntry { product_ref: String },
    EntryNotFound { entry_id: String },
    Rejected(String),
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticError::StockExceeded { product_ref } => {
                write!(f, "stock exceeded for product {}", product_ref)
            }
            SemanticError::DuplicateEntry { product_ref } => {
                write!(f, "product {} is already in the collection", product_ref)
            }
            SemanticError::EntryNotFound { entry_id } => {
                write!(f, "entry {} not found on server", entry_id)
            }
            SemanticError::Rejected(message) => write!(f, "rejected: {}", message),
        }
    }
}

impl std::error::Error for SemanticError {}

/// Error returned by a [`RemoteCollectionClient`](crate::RemoteCollectionClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network failure or server unreachable.
    Transport(String),
    /// The server understood the request and refused it.
    Semantic(SemanticError),
    /// The request needs a valid session.
    Unauthenticated,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Transport(message) => write!(f, "transport error: {}", message),
            RemoteError::Semantic(err) => write!(f, "{}", err),
            RemoteError::Unauthenticated => write!(f, "not authenticated"),
        }
    }
}

impl std::error::Error for RemoteError {}

impl From<SemanticError> for RemoteError {
    fn from(err: SemanticError) -> Self {
        RemoteError::Semantic(err)
    }
}

/// Error surfaced by a [`CollectionStore`](crate::CollectionStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    Transport(String),
    Semantic(SemanticError),
    /// No valid session. Nothing was changed locally.
    Unauthenticated,
    /// The local stock ceiling would be exceeded.
    Capacity { product_ref: String, ceiling: u32 },
    /// The intent targets an entry the store does not hold.
    UnknownEntry(String),
    /// The operation makes no sense for this collection kind.
    Unsupported {
        kind: CollectionKind,
        operation: &'static str,
    },
    /// The remote call did not resolve in time and was rolled back.
    Timeout(Duration),
    /// The session ended while the call was in flight.
    SessionEnded,
    LockPoisoned(&'static str),
}

impl SyncError {
    /// Whether the remote side was involved (and a rollback happened).
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            SyncError::Transport(_) | SyncError::Semantic(_) | SyncError::Timeout(_)
        )
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Transport(message) => write!(f, "transport error: {}", message),
            SyncError::Semantic(err) => write!(f, "server rejected request: {}", err),
            SyncError::Unauthenticated => write!(f, "not authenticated"),
            SyncError::Capacity {
                product_ref,
                ceiling,
            } => write!(
                f,
                "product {} is limited to {} in stock",
                product_ref, ceiling
            ),
            SyncError::UnknownEntry(entry_id) => write!(f, "unknown entry {}", entry_id),
            SyncError::Unsupported { kind, operation } => {
                write!(f, "{} is not supported for the {}", operation, kind)
            }
            SyncError::Timeout(after) => {
                write!(f, "remote call timed out after {}ms", after.as_millis())
            }
            SyncError::SessionEnded => write!(f, "session ended before the call completed"),
            SyncError::LockPoisoned(operation) => {
                write!(f, "store lock poisoned during {}", operation)
            }
        }
    }
}

impl std::error::Error for SyncError {}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Transport(message) => SyncError::Transport(message),
            RemoteError::Semantic(err) => SyncError::Semantic(err),
            RemoteError::Unauthenticated => SyncError::Unauthenticated,
        }
    }
}
