use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, LocationId, ProductId};

/// Identity of one stock level: a product at a location.
///
/// The derived ordering is the global lock order used when a transaction
/// touches more than one key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub location_id: LocationId,
}

impl StockKey {
    pub fn new(product_id: ProductId, location_id: LocationId) -> Self {
        Self {
            product_id,
            location_id,
        }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.product_id, self.location_id)
    }
}

/// Current quantity of one product at one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub quantity: i64,
    pub updated_at: DateTime<Utc>,
}

impl StockLevel {
    /// A level that has never been moved; rows are created lazily from this.
    pub fn empty(key: StockKey, now: DateTime<Utc>) -> Self {
        Self {
            product_id: key.product_id,
            location_id: key.location_id,
            quantity: 0,
            updated_at: now,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.location_id)
    }

    /// Return the level after applying `delta`, refusing to go below zero.
    pub fn with_delta(&self, delta: i64, now: DateTime<Utc>) -> DomainResult<Self> {
        let quantity = checked_apply(self.quantity, delta)?;
        Ok(Self {
            quantity,
            updated_at: now,
            ..self.clone()
        })
    }
}

/// `current + delta`, rejecting zero deltas, overflow and negative results.
pub fn checked_apply(current: i64, delta: i64) -> DomainResult<i64> {
    if delta == 0 {
        return Err(DomainError::validation("quantity delta cannot be zero"));
    }
    let next = current
        .checked_add(delta)
        .ok_or_else(|| DomainError::validation("quantity overflow"))?;
    if next < 0 {
        return Err(DomainError::insufficient_stock(current, delta));
    }
    Ok(next)
}

/// Optional product/location restriction for stock snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockFilter {
    pub product_id: Option<ProductId>,
    pub location_id: Option<LocationId>,
}

impl StockFilter {
    pub fn matches(&self, key: &StockKey) -> bool {
        self.product_id.is_none_or(|p| p == key.product_id)
            && self.location_id.is_none_or(|l| l == key.location_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrement_below_zero_is_insufficient_stock() {
        assert_eq!(checked_apply(100, -30), Ok(70));
        assert_eq!(
            checked_apply(70, -90),
            Err(DomainError::InsufficientStock {
                available: 70,
                delta: -90
            })
        );
    }

    #[test]
    fn zero_delta_and_overflow_are_validation_errors() {
        assert!(matches!(checked_apply(5, 0), Err(DomainError::Validation(_))));
        assert!(matches!(
            checked_apply(i64::MAX, 1),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn draining_to_exactly_zero_is_allowed() {
        let key = StockKey::new(ProductId::new(), LocationId::new());
        let level = StockLevel::empty(key, Utc::now())
            .with_delta(12, Utc::now())
            .unwrap();
        let drained = level.with_delta(-12, Utc::now()).unwrap();
        assert_eq!(drained.quantity, 0);
        assert_eq!(drained.key(), key);
    }

    #[test]
    fn filter_matches_on_both_dimensions() {
        let key = StockKey::new(ProductId::new(), LocationId::new());
        assert!(StockFilter::default().matches(&key));
        assert!(
            StockFilter {
                product_id: Some(key.product_id),
                location_id: None
            }
            .matches(&key)
        );
        assert!(
            !StockFilter {
                product_id: Some(key.product_id),
                location_id: Some(LocationId::new())
            }
            .matches(&key)
        );
    }
}
