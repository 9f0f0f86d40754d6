//! Scan log: one record per scanner-driven movement attempt, failed ones included.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, LocationId, ProductId, ScanId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanAction {
    Receipt,
    Delivery,
}

impl ScanAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanAction::Receipt => "receipt",
            ScanAction::Delivery => "delivery",
        }
    }
}

impl core::str::FromStr for ScanAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "receipt" => Ok(ScanAction::Receipt),
            "delivery" => Ok(ScanAction::Delivery),
            other => Err(DomainError::validation(format!("unknown scan action: {other}"))),
        }
    }
}

/// A scan attempt before the store has assigned its id and timestamp.
///
/// Ids are filled in as far as the codes resolved; `sequence` points at the
/// ledger entry a successful scan wrote (or replayed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewScanRecord {
    pub action: ScanAction,
    pub product_code: String,
    pub location_code: String,
    pub quantity: i64,
    pub scanner_id: Option<String>,
    pub scanned_by: Option<String>,
    pub product_id: Option<ProductId>,
    pub location_id: Option<LocationId>,
    pub sequence: Option<u64>,
    pub success: bool,
    pub error: Option<String>,
}

impl NewScanRecord {
    pub fn new(
        action: ScanAction,
        product_code: impl Into<String>,
        location_code: impl Into<String>,
        quantity: i64,
    ) -> Self {
        Self {
            action,
            product_code: product_code.into(),
            location_code: location_code.into(),
            quantity,
            scanner_id: None,
            scanned_by: None,
            product_id: None,
            location_id: None,
            sequence: None,
            success: false,
            error: None,
        }
    }

    pub fn succeeded(mut self, sequence: u64) -> Self {
        self.success = true;
        self.sequence = Some(sequence);
        self.error = None;
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.sequence = None;
        self.error = Some(error.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: ScanId,
    #[serde(flatten)]
    pub scan: NewScanRecord,
    pub scanned_at: DateTime<Utc>,
}

/// Restriction and page size for scan history reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanHistoryFilter {
    pub product_id: Option<ProductId>,
    pub location_id: Option<LocationId>,
    pub limit: usize,
}

impl ScanHistoryFilter {
    pub const DEFAULT_LIMIT: usize = 100;
    pub const MAX_LIMIT: usize = 1000;

    pub fn new(
        product_id: Option<ProductId>,
        location_id: Option<LocationId>,
        limit: Option<usize>,
    ) -> Self {
        Self {
            product_id,
            location_id,
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }

    /// Unresolved ids never match an id filter.
    pub fn matches(&self, record: &ScanRecord) -> bool {
        self.product_id
            .is_none_or(|p| record.scan.product_id == Some(p))
            && self
                .location_id
                .is_none_or(|l| record.scan.location_id == Some(l))
    }
}

impl Default for ScanHistoryFilter {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(product_id: Option<ProductId>) -> ScanRecord {
        let mut scan = NewScanRecord::new(ScanAction::Receipt, "4006381333931", "WH-1", 2);
        scan.product_id = product_id;
        ScanRecord {
            id: ScanId::new(),
            scan: scan.failed("product code 4006381333931 not found"),
            scanned_at: Utc::now(),
        }
    }

    #[test]
    fn filter_skips_records_whose_codes_did_not_resolve() {
        let product = ProductId::new();
        let filter = ScanHistoryFilter::new(Some(product), None, None);
        assert!(filter.matches(&record(Some(product))));
        assert!(!filter.matches(&record(None)));
        assert!(ScanHistoryFilter::default().matches(&record(None)));
    }

    #[test]
    fn limit_defaults_to_one_hundred_and_is_clamped() {
        assert_eq!(ScanHistoryFilter::default().limit, 100);
        assert_eq!(ScanHistoryFilter::new(None, None, Some(0)).limit, 1);
        assert_eq!(ScanHistoryFilter::new(None, None, Some(9999)).limit, 1000);
    }

    #[test]
    fn outcome_helpers_keep_success_and_error_exclusive() {
        let scan = NewScanRecord::new(ScanAction::Delivery, "BOLT-M8", "WH-1", 1)
            .failed("insufficient stock")
            .succeeded(7);
        assert!(scan.success);
        assert_eq!(scan.sequence, Some(7));
        assert_eq!(scan.error, None);

        let json = serde_json::to_value(&record(None)).unwrap();
        assert_eq!(json["action"], "receipt");
        assert_eq!(json["success"], false);
        assert_eq!("delivery".parse::<ScanAction>(), Ok(ScanAction::Delivery));
    }
}
