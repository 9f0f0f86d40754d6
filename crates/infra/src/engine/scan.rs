//! Barcode-driven receipts and deliveries.
//!
//! A scanner reports codes, not ids. Codes are resolved through the catalog
//! (barcode first, then SKU / location code) and the result is fed through the
//! ordinary movement pipeline. Each receipt/delivery attempt lands in the scan log.

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use stockledger_inventory::{
    Location, Movement, MovementRequest, NewScanRecord, Product, ScanAction, ScanHistoryFilter,
    ScanRecord, ScanTarget,
};

use crate::catalog::Catalog;
use crate::store::StockLedgerStore;

use super::{EngineError, MovementEngine, MovementOutcome};

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanMovement {
    pub product_code: String,
    pub location_code: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    /// Recorded as the ledger actor.
    #[serde(default)]
    pub scanned_by: Option<String>,
    #[serde(default)]
    pub scanner_id: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanOutcome {
    pub product: Product,
    pub location: Location,
    #[serde(flatten)]
    pub movement: MovementOutcome,
}

impl<S, C> MovementEngine<S, C>
where
    S: StockLedgerStore,
    C: Catalog,
{
    #[instrument(skip(self, scan), fields(product_code = %scan.product_code, location_code = %scan.location_code), err)]
    pub async fn scan_receipt(&self, scan: ScanMovement) -> Result<ScanOutcome, EngineError> {
        self.apply_scan(ScanAction::Receipt, scan).await
    }

    #[instrument(skip(self, scan), fields(product_code = %scan.product_code, location_code = %scan.location_code), err)]
    pub async fn scan_delivery(&self, scan: ScanMovement) -> Result<ScanOutcome, EngineError> {
        self.apply_scan(ScanAction::Delivery, scan).await
    }

    /// Identify a scanned code; products take precedence over locations.
    pub async fn lookup(&self, code: &str) -> Result<ScanTarget, EngineError> {
        if let Some(product) = self.catalog.product_by_code(code).await? {
            return Ok(ScanTarget::Product(product));
        }
        if let Some(location) = self.catalog.location_by_code(code).await? {
            return Ok(ScanTarget::Location(location));
        }
        Err(EngineError::NotFound(format!("code {code}")))
    }

    /// Scan log, most recent first.
    pub async fn scan_history(&self, filter: ScanHistoryFilter) -> Result<Vec<ScanRecord>, EngineError> {
        Ok(self.store.scan_history(filter).await?)
    }

    /// Every attempt is logged, whatever the outcome. A failed log write does
    /// not turn a committed movement into an error.
    async fn apply_scan(&self, action: ScanAction, scan: ScanMovement) -> Result<ScanOutcome, EngineError> {
        let mut record = NewScanRecord::new(
            action,
            scan.product_code.clone(),
            scan.location_code.clone(),
            scan.quantity,
        );
        record.scanner_id = scan.scanner_id.clone();
        record.scanned_by = scan.scanned_by.clone();

        let result = self.resolve_and_apply(action, scan, &mut record).await;
        let record = match &result {
            Ok(outcome) => record.succeeded(outcome.movement.entry.sequence),
            Err(err) => record.failed(err.to_string()),
        };
        if let Err(err) = self.store.record_scan(record).await {
            warn!(error = %err, action = action.as_str(), "scan log write failed");
        }
        result
    }

    async fn resolve_and_apply(
        &self,
        action: ScanAction,
        scan: ScanMovement,
        record: &mut NewScanRecord,
    ) -> Result<ScanOutcome, EngineError> {
        let product = self
            .catalog
            .product_by_code(&scan.product_code)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("product code {}", scan.product_code)))?;
        record.product_id = Some(product.id);
        let location = self
            .catalog
            .location_by_code(&scan.location_code)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("location code {}", scan.location_code))
            })?;
        record.location_id = Some(location.id);

        let movement = match action {
            ScanAction::Receipt => Movement::Receipt {
                product_id: product.id,
                location_id: location.id,
                quantity: scan.quantity,
            },
            ScanAction::Delivery => Movement::Delivery {
                product_id: product.id,
                location_id: location.id,
                quantity: scan.quantity,
            },
        };

        let mut request = MovementRequest::new(movement)
            .with_note(format!("Scanned {}: {}", action.as_str(), product.name))
            .with_meta(serde_json::json!({
                "source": "scan",
                "scanner_id": scan.scanner_id,
                "product_code": scan.product_code,
                "location_code": scan.location_code,
            }));
        if let Some(actor) = scan.scanned_by {
            request = request.with_actor(actor);
        }
        if let Some(key) = scan.idempotency_key {
            request = request.with_idempotency_key(key);
        }

        let movement = self.apply(request).await?;
        Ok(ScanOutcome {
            product,
            location,
            movement,
        })
    }
}
