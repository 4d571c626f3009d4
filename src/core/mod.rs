mod collection;
mod entry;
mod index;
mod patch;
mod snapshot;
mod status;

pub use collection::Collection;
pub use entry::{Entry, ProductSnapshot, RemoteCollection};
pub use index::{Lookup, LookupIndex};
pub use patch::Patch;
pub use snapshot::CollectionSnapshot;
pub use status::{CollectionKind, Status};
