use serde::Deserialize;

use stockledger_core::{LocationId, ProductId};
use stockledger_infra::{NewAdjustment, NewTransfer};
use stockledger_inventory::{
    EntryType, LedgerFilter, Movement, MovementRequest, ScanHistoryFilter, StockFilter,
};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct MovementBody {
    /// `receipt`, `delivery` or `adjustment`.
    #[serde(rename = "type")]
    pub kind: EntryType,
    pub product_id: String,
    pub location_id: String,
    /// Positive adds to the location, negative removes from it.
    pub signed_quantity: i64,
    pub actor: Option<String>,
    pub note: Option<String>,
    #[serde(default)]
    pub meta: serde_json::Value,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTransferBody {
    pub product_id: String,
    pub source_location_id: String,
    pub destination_location_id: String,
    pub quantity: i64,
    pub actor: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAdjustmentBody {
    pub product_id: String,
    pub location_id: String,
    pub counted_quantity: i64,
    pub reason: Option<String>,
    pub actor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UndoBody {
    pub actor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StockQuery {
    pub product_id: Option<String>,
    pub location_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LedgerQuery {
    pub product_id: Option<String>,
    pub location_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScanHistoryQuery {
    pub product_id: Option<String>,
    #[serde(alias = "warehouse_id")]
    pub location_id: Option<String>,
    pub limit: Option<usize>,
}

// -------------------------
// Mapping
// -------------------------

type Rejection = axum::response::Response;

impl MovementBody {
    pub fn into_request(self) -> Result<MovementRequest, Rejection> {
        let product_id: ProductId = errors::parse_id(&self.product_id, "product_id")?;
        let location_id: LocationId = errors::parse_id(&self.location_id, "location_id")?;
        let movement = Movement::from_signed(self.kind, product_id, location_id, self.signed_quantity)
            .map_err(|e| errors::engine_error_to_response(e.into()))?;

        let mut request = MovementRequest::new(movement).with_meta(self.meta);
        request.actor = self.actor;
        request.note = self.note;
        request.idempotency_key = self.idempotency_key;
        Ok(request)
    }
}

impl CreateTransferBody {
    pub fn into_input(self) -> Result<NewTransfer, Rejection> {
        Ok(NewTransfer {
            product_id: errors::parse_id(&self.product_id, "product_id")?,
            source_location_id: errors::parse_id(&self.source_location_id, "source_location_id")?,
            destination_location_id: errors::parse_id(
                &self.destination_location_id,
                "destination_location_id",
            )?,
            quantity: self.quantity,
            actor: self.actor,
            note: self.note,
        })
    }
}

impl CreateAdjustmentBody {
    pub fn into_input(self) -> Result<NewAdjustment, Rejection> {
        Ok(NewAdjustment {
            product_id: errors::parse_id(&self.product_id, "product_id")?,
            location_id: errors::parse_id(&self.location_id, "location_id")?,
            counted_quantity: self.counted_quantity,
            reason: self.reason,
            actor: self.actor,
        })
    }
}

impl StockQuery {
    pub fn to_filter(&self) -> Result<StockFilter, Rejection> {
        Ok(StockFilter {
            product_id: errors::parse_opt_id(self.product_id.as_deref(), "product_id")?,
            location_id: errors::parse_opt_id(self.location_id.as_deref(), "location_id")?,
        })
    }
}

impl LedgerQuery {
    pub fn to_filter(&self) -> Result<LedgerFilter, Rejection> {
        Ok(LedgerFilter::new(
            errors::parse_opt_id(self.product_id.as_deref(), "product_id")?,
            errors::parse_opt_id(self.location_id.as_deref(), "location_id")?,
            self.limit,
        ))
    }
}

impl ScanHistoryQuery {
    pub fn to_filter(&self) -> Result<ScanHistoryFilter, Rejection> {
        Ok(ScanHistoryFilter::new(
            errors::parse_opt_id(self.product_id.as_deref(), "product_id")?,
            errors::parse_opt_id(self.location_id.as_deref(), "location_id")?,
            self.limit,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn delivery_with_negative_signed_quantity_maps_to_delivery() {
        let product = ProductId::new();
        let location = LocationId::new();
        let body: MovementBody = serde_json::from_value(serde_json::json!({
            "type": "delivery",
            "product_id": product.to_string(),
            "location_id": location.to_string(),
            "signed_quantity": -30,
            "actor": "picker",
        }))
        .unwrap();

        let request = body.into_request().unwrap();
        assert_eq!(request.movement.delta(), -30);
        assert_eq!(request.actor(), "picker");
        assert!(matches!(request.movement, Movement::Delivery { quantity: 30, .. }));
    }

    #[test]
    fn wrong_sign_and_transfer_type_are_rejected() {
        let body = |kind: &str, qty: i64| -> MovementBody {
            serde_json::from_value(serde_json::json!({
                "type": kind,
                "product_id": ProductId::new().to_string(),
                "location_id": LocationId::new().to_string(),
                "signed_quantity": qty,
            }))
            .unwrap()
        };

        let err = body("receipt", -5).into_request().unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let err = body("transfer", 5).into_request().unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn scan_history_query_accepts_warehouse_alias() {
        let location = LocationId::new();
        let query: ScanHistoryQuery = serde_json::from_value(serde_json::json!({
            "warehouse_id": location.to_string(),
            "limit": 5000,
        }))
        .unwrap();

        let filter = query.to_filter().unwrap();
        assert_eq!(filter.location_id, Some(location));
        assert_eq!(filter.product_id, None);
        assert_eq!(filter.limit, ScanHistoryFilter::MAX_LIMIT);
    }
}
