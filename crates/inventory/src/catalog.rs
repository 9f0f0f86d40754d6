//! Read-only views of catalog records owned by the catalog collaborator.

use serde::{Deserialize, Serialize};

use stockledger_core::{LocationId, ProductId};

use crate::stock::StockLevel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub unit_of_measure: String,
    #[serde(default = "default_reorder_threshold")]
    pub reorder_threshold: i64,
    #[serde(default)]
    pub barcode: Option<String>,
}

fn default_reorder_threshold() -> i64 {
    10
}

impl Product {
    pub fn needs_reorder(&self, level: &StockLevel) -> bool {
        level.product_id == self.id && level.quantity <= self.reorder_threshold
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub barcode: Option<String>,
}

/// What a scanned code resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanTarget {
    Product(Product),
    Location(Location),
}
