use std::fmt;

use serde::{Deserialize, Serialize};

/// Which remote collection a store mirrors.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Cart,
    Wishlist,
}

impl CollectionKind {
    /// Wishlist entries are pinned at quantity 1.
    pub fn tracks_quantity(self) -> bool {
        matches!(self, CollectionKind::Cart)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CollectionKind::Cart => "cart",
            CollectionKind::Wishlist => "wishlist",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Error,
}

impl Status {
    /// Whether `self -> to` is a legal transition.
    ///
    /// `Ready -> Loading` is illegal: background refreshes stay `Ready`.
    /// Teardown may reset any state to `Uninitialized`.
    pub fn can_transition(self, to: Status) -> bool {
        use Status::*;
        match (self, to) {
            (from, to) if from == to => true,
            (_, Uninitialized) => true,
            (_, Error) => true,
            (Uninitialized, Loading) | (Error, Loading) => true,
            (Loading, Ready) => true,
            _ => false,
        }
    }
}
