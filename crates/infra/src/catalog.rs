//! Catalog collaborator boundary.
//!
//! Products and locations are owned by the catalog service. The engine only
//! asks whether an id (or a scanned code) refers to a known record, so that an
//! unknown key is rejected instead of silently creating a stock row for it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use stockledger_core::{LocationId, ProductId};
use stockledger_inventory::{Location, Product};

use crate::store::StoreError;

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    async fn location(&self, id: LocationId) -> Result<Option<Location>, StoreError>;

    /// Resolve a scanned code: barcode first, then SKU.
    async fn product_by_code(&self, code: &str) -> Result<Option<Product>, StoreError>;

    /// Resolve a scanned code: barcode first, then location code.
    async fn location_by_code(&self, code: &str) -> Result<Option<Location>, StoreError>;
}

#[async_trait]
impl<C> Catalog for Arc<C>
where
    C: Catalog + ?Sized,
{
    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        (**self).product(id).await
    }

    async fn location(&self, id: LocationId) -> Result<Option<Location>, StoreError> {
        (**self).location(id).await
    }

    async fn product_by_code(&self, code: &str) -> Result<Option<Product>, StoreError> {
        (**self).product_by_code(code).await
    }

    async fn location_by_code(&self, code: &str) -> Result<Option<Location>, StoreError> {
        (**self).location_by_code(code).await
    }
}

/// JSON shape of a catalog seed file.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub locations: Vec<Location>,
}

#[derive(Debug, Default)]
struct CatalogState {
    products: HashMap<ProductId, Product>,
    locations: HashMap<LocationId, Location>,
}

/// In-memory catalog. Intended for tests/dev and the memory backend.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCatalog {
    inner: Arc<RwLock<CatalogState>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: CatalogSeed) -> Self {
        let catalog = Self::new();
        for product in seed.products {
            catalog.insert_product(product);
        }
        for location in seed.locations {
            catalog.insert_location(location);
        }
        catalog
    }

    /// Load a seed file (`{"products": [...], "locations": [...]}`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Persistence(format!("cannot read catalog seed {}: {e}", path.display()))
        })?;
        let seed: CatalogSeed = serde_json::from_str(&raw).map_err(|e| {
            StoreError::Persistence(format!("invalid catalog seed {}: {e}", path.display()))
        })?;
        Ok(Self::from_seed(seed))
    }

    pub fn insert_product(&self, product: Product) {
        if let Ok(mut state) = self.inner.write() {
            state.products.insert(product.id, product);
        }
    }

    pub fn insert_location(&self, location: Location) {
        if let Ok(mut state) = self.inner.write() {
            state.locations.insert(location.id, location);
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, CatalogState>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Persistence("catalog lock poisoned".to_string()))
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.read()?.products.get(&id).cloned())
    }

    async fn location(&self, id: LocationId) -> Result<Option<Location>, StoreError> {
        Ok(self.read()?.locations.get(&id).cloned())
    }

    async fn product_by_code(&self, code: &str) -> Result<Option<Product>, StoreError> {
        let state = self.read()?;
        let by_barcode = state
            .products
            .values()
            .find(|p| p.barcode.as_deref() == Some(code));
        Ok(by_barcode
            .or_else(|| state.products.values().find(|p| p.sku == code))
            .cloned())
    }

    async fn location_by_code(&self, code: &str) -> Result<Option<Location>, StoreError> {
        let state = self.read()?;
        let by_barcode = state
            .locations
            .values()
            .find(|l| l.barcode.as_deref() == Some(code));
        Ok(by_barcode
            .or_else(|| state.locations.values().find(|l| l.code == code))
            .cloned())
    }
}

/// Catalog reads against the `products` / `locations` tables.
#[derive(Debug, Clone)]
pub struct PostgresCatalog {
    pool: Arc<PgPool>,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn catalog_error(operation: &str, err: sqlx::Error) -> StoreError {
    StoreError::Persistence(format!("catalog {operation} failed: {err}"))
}

fn product_from_row(row: &PgRow) -> Result<Product, sqlx::Error> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get("id")?),
        sku: row.try_get("sku")?,
        name: row.try_get("name")?,
        unit_of_measure: row.try_get("unit_of_measure")?,
        reorder_threshold: row.try_get("reorder_threshold")?,
        barcode: row.try_get("barcode")?,
    })
}

fn location_from_row(row: &PgRow) -> Result<Location, sqlx::Error> {
    Ok(Location {
        id: LocationId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        code: row.try_get("code")?,
        barcode: row.try_get("barcode")?,
    })
}

#[async_trait]
impl Catalog for PostgresCatalog {
    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        sqlx::query(
            "SELECT id, sku, name, unit_of_measure, reorder_threshold, barcode FROM products WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&*self.pool)
        .await
        .and_then(|row| row.as_ref().map(product_from_row).transpose())
        .map_err(|e| catalog_error("product", e))
    }

    async fn location(&self, id: LocationId) -> Result<Option<Location>, StoreError> {
        sqlx::query("SELECT id, name, code, barcode FROM locations WHERE id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(&*self.pool)
            .await
            .and_then(|row| row.as_ref().map(location_from_row).transpose())
            .map_err(|e| catalog_error("location", e))
    }

    async fn product_by_code(&self, code: &str) -> Result<Option<Product>, StoreError> {
        sqlx::query(
            r#"
            SELECT id, sku, name, unit_of_measure, reorder_threshold, barcode
            FROM products
            WHERE barcode = $1 OR sku = $1
            ORDER BY (barcode = $1) DESC NULLS LAST
            LIMIT 1
            "#,
        )
        .bind(code)
        .fetch_optional(&*self.pool)
        .await
        .and_then(|row| row.as_ref().map(product_from_row).transpose())
        .map_err(|e| catalog_error("product_by_code", e))
    }

    async fn location_by_code(&self, code: &str) -> Result<Option<Location>, StoreError> {
        sqlx::query(
            r#"
            SELECT id, name, code, barcode
            FROM locations
            WHERE barcode = $1 OR code = $1
            ORDER BY (barcode = $1) DESC NULLS LAST
            LIMIT 1
            "#,
        )
        .bind(code)
        .fetch_optional(&*self.pool)
        .await
        .and_then(|row| row.as_ref().map(location_from_row).transpose())
        .map_err(|e| catalog_error("location_by_code", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bolt() -> Product {
        Product {
            id: ProductId::new(),
            sku: "BOLT-M8".to_string(),
            name: "M8 bolt".to_string(),
            unit_of_measure: "pcs".to_string(),
            reorder_threshold: 10,
            barcode: Some("4006381333931".to_string()),
        }
    }

    #[tokio::test]
    async fn codes_resolve_by_barcode_then_sku() {
        let catalog = InMemoryCatalog::new();
        let product = bolt();
        catalog.insert_product(product.clone());

        assert_eq!(
            catalog.product_by_code("4006381333931").await.unwrap(),
            Some(product.clone())
        );
        assert_eq!(catalog.product_by_code("BOLT-M8").await.unwrap(), Some(product));
        assert_eq!(catalog.product_by_code("unknown").await.unwrap(), None);
    }

    #[tokio::test]
    async fn seed_json_populates_both_tables() {
        let location_id = LocationId::new();
        let json = serde_json::json!({
            "products": [bolt()],
            "locations": [{ "id": location_id, "name": "Main", "code": "WH-1" }]
        });
        let seed: CatalogSeed = serde_json::from_value(json).unwrap();
        let catalog = InMemoryCatalog::from_seed(seed);

        let location = catalog.location(location_id).await.unwrap().unwrap();
        assert_eq!(location.code, "WH-1");
        assert_eq!(location.barcode, None);
        assert_eq!(
            catalog.location_by_code("WH-1").await.unwrap().map(|l| l.id),
            Some(location_id)
        );
    }
}
