use serde::Serialize;

use stockledger_inventory::{LedgerEntry, LedgerFilter, Product, StockFilter, StockLevel};

use crate::catalog::Catalog;
use crate::store::StockLedgerStore;

use super::{EngineError, MovementEngine};

/// A stock level at or below its product's reorder threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LowStock {
    pub product: Product,
    pub level: StockLevel,
}

impl<S, C> MovementEngine<S, C>
where
    S: StockLedgerStore,
    C: Catalog,
{
    /// Committed stock levels, ordered by (product, location).
    pub async fn stock(&self, filter: StockFilter) -> Result<Vec<StockLevel>, EngineError> {
        Ok(self.store.stock_levels(filter).await?)
    }

    /// Ledger entries, most recent first, capped at `filter.limit`.
    pub async fn ledger(&self, filter: LedgerFilter) -> Result<Vec<LedgerEntry>, EngineError> {
        Ok(self.store.ledger(filter).await?)
    }

    /// Levels that need replenishing. Keys whose product left the catalog are skipped.
    pub async fn low_stock(&self, filter: StockFilter) -> Result<Vec<LowStock>, EngineError> {
        let mut low = Vec::new();
        let mut product: Option<Product> = None;
        for level in self.store.stock_levels(filter).await? {
            if product.as_ref().is_none_or(|p| p.id != level.product_id) {
                product = self.catalog.product(level.product_id).await?;
            }
            if let Some(p) = product.as_ref().filter(|p| p.needs_reorder(&level)) {
                low.push(LowStock {
                    product: p.clone(),
                    level,
                });
            }
        }
        Ok(low)
    }
}
