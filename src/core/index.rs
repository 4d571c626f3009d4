use std::collections::HashMap;

use super::entry::Entry;

/// What the index knows about one product.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lookup {
    pub entry_id: String,
    pub quantity: u32,
}

/// Product-keyed view over a collection's entries.
///
/// Built once from a snapshot (O(n)); every query afterwards is O(1).
/// It is never a source of truth.
#[derive(Clone, Debug, Default)]
pub struct LookupIndex {
    by_product: HashMap<String, Lookup>,
}

impl LookupIndex {
    pub fn build<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> Self {
        let by_product = entries
            .into_iter()
            .map(|entry| {
                (
                    entry.product_ref.clone(),
                    Lookup {
                        entry_id: entry.entry_id.clone(),
                        quantity: entry.quantity,
                    },
                )
            })
            .collect();
        LookupIndex { by_product }
    }

    pub fn get(&self, product_ref: &str) -> Option<&Lookup> {
        self.by_product.get(product_ref)
    }

    pub fn contains(&self, product_ref: &str) -> bool {
        self.by_product.contains_key(product_ref)
    }

    /// Quantity in the collection, 0 when absent.
    pub fn quantity_of(&self, product_ref: &str) -> u32 {
        self.get(product_ref).map(|l| l.quantity).unwrap_or(0)
    }

    /// Whether one more unit fits under `ceiling`. No ceiling means unbounded.
    pub fn can_increment(&self, product_ref: &str, ceiling: Option<u32>) -> bool {
        match ceiling {
            Some(ceiling) => self.quantity_of(product_ref) < ceiling,
            None => true,
        }
    }

    pub fn len(&self) -> usize {
        self.by_product.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_product.is_empty()
    }
}
