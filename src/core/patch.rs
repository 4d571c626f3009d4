use super::collection::Collection;
use super::entry::Entry;

/// A tentative change to a [`Collection`].
///
/// Every optimistic mutation is expressed as a patch. [`Patch::apply`]
/// returns the inverse, which is what a failed remote call applies to roll
/// the change back.
#[derive(Clone, Debug, PartialEq)]
pub enum Patch {
    Insert { index: usize, entry: Entry },
    Remove { entry_id: String },
    SetQuantity { entry_id: String, quantity: u32 },
    Batch(Vec<Patch>),
}

impl Patch {
    /// Removes every entry, last to first, so the inverse re-inserts them in order.
    pub fn clear(collection: &Collection) -> Patch {
        let mut removals: Vec<Patch> = collection
            .entries()
            .map(|e| Patch::Remove {
                entry_id: e.entry_id.clone(),
            })
            .collect();
        removals.reverse();
        Patch::Batch(removals)
    }

    /// Apply to `collection` and return the inverse, or `None` if nothing changed.
    pub fn apply(self, collection: &mut Collection) -> Option<Patch> {
        let inverse = match self {
            Patch::Insert { index, entry } => {
                let entry_id = entry.entry_id.clone();
                if !collection.insert_at(index, entry) {
                    return None;
                }
                Patch::Remove { entry_id }
            }
            Patch::Remove { entry_id } => {
                let (index, entry) = collection.remove(&entry_id)?;
                Patch::Insert { index, entry }
            }
            Patch::SetQuantity { entry_id, quantity } => {
                // Zero-quantity entries never persist; callers remove instead.
                if quantity == 0 {
                    return None;
                }
                let previous = collection.set_quantity(&entry_id, quantity)?;
                Patch::SetQuantity {
                    entry_id,
                    quantity: previous,
                }
            }
            Patch::Batch(patches) => {
                let mut inverses: Vec<Patch> = patches
                    .into_iter()
                    .filter_map(|patch| patch.apply(collection))
                    .collect();
                if inverses.is_empty() {
                    return None;
                }
                inverses.reverse();
                Patch::Batch(inverses)
            }
        };
        collection.mark_price_stale();
        Some(inverse)
    }
}
