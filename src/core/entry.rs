use serde::{Deserialize, Serialize};

/// Display data copied from the catalog at the time the entry was fetched.
///
/// Owned by the store and replaced wholesale on every reconciliation.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct ProductSnapshot {
    pub title: String,
    pub image: Option<String>,
    /// Unit price as supplied by the server.
    pub price: f64,
    pub category: Option<String>,
    pub brand: Option<String>,
    /// Known stock ceiling, if the catalog supplied one.
    pub stock: Option<u32>,
}

impl ProductSnapshot {
    pub fn new(title: impl Into<String>, price: f64) -> Self {
        ProductSnapshot {
            title: title.into(),
            price,
            ..Default::default()
        }
    }

    pub fn with_stock(mut self, stock: u32) -> Self {
        self.stock = Some(stock);
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_labels(mut self, category: impl Into<String>, brand: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self.brand = Some(brand.into());
        self
    }
}

/// One line item of a remote collection.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Entry {
    pub entry_id: String,
    pub product_ref: String,
    pub product: ProductSnapshot,
    pub quantity: u32,
    /// Server-computed price of the whole line, when the server sends one.
    #[serde(default)]
    pub line_price: Option<f64>,
}

impl Entry {
    pub fn new(
        entry_id: impl Into<String>,
        product_ref: impl Into<String>,
        product: ProductSnapshot,
        quantity: u32,
    ) -> Self {
        Entry {
            entry_id: entry_id.into(),
            product_ref: product_ref.into(),
            product,
            quantity,
            line_price: None,
        }
    }

    pub fn with_line_price(mut self, line_price: f64) -> Self {
        self.line_price = Some(line_price);
        self
    }
}

/// Authoritative full snapshot returned by the server.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct RemoteCollection {
    /// The server's identity for the whole collection (used by checkout).
    pub remote_id: Option<String>,
    pub entries: Vec<Entry>,
    pub aggregate_price: Option<f64>,
}
