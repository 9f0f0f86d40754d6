//! Primitive single-key movements.
//!
//! Each kind carries its own sign convention instead of inferring direction
//! from a free-form type string: receipts and deliveries take a positive
//! quantity, adjustments take a signed delta.

use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, LocationId, ProductId};

use crate::ledger::{EntryType, NewLedgerEntry};
use crate::stock::StockKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Movement {
    /// Goods arriving at a location.
    Receipt {
        product_id: ProductId,
        location_id: LocationId,
        quantity: i64,
    },
    /// Goods leaving a location.
    Delivery {
        product_id: ProductId,
        location_id: LocationId,
        quantity: i64,
    },
    /// Manual correction by a signed delta.
    Adjustment {
        product_id: ProductId,
        location_id: LocationId,
        delta: i64,
    },
}

impl Movement {
    /// Build a movement from a kind tag and a delta signed relative to the location.
    ///
    /// Transfers and undos are not primitive movements; they go through their
    /// own workflows.
    pub fn from_signed(
        kind: EntryType,
        product_id: ProductId,
        location_id: LocationId,
        signed_quantity: i64,
    ) -> DomainResult<Self> {
        let movement = match kind {
            EntryType::Receipt => Movement::Receipt {
                product_id,
                location_id,
                quantity: signed_quantity,
            },
            EntryType::Delivery => Movement::Delivery {
                product_id,
                location_id,
                quantity: signed_quantity.checked_neg().ok_or_else(|| {
                    DomainError::validation("delivery quantity out of range")
                })?,
            },
            EntryType::Adjustment => Movement::Adjustment {
                product_id,
                location_id,
                delta: signed_quantity,
            },
            EntryType::Transfer | EntryType::Undo => {
                return Err(DomainError::validation(format!(
                    "{} is not a primitive movement",
                    kind.as_str()
                )));
            }
        };
        movement.validate()?;
        Ok(movement)
    }

    pub fn entry_type(&self) -> EntryType {
        match self {
            Movement::Receipt { .. } => EntryType::Receipt,
            Movement::Delivery { .. } => EntryType::Delivery,
            Movement::Adjustment { .. } => EntryType::Adjustment,
        }
    }

    pub fn key(&self) -> StockKey {
        match *self {
            Movement::Receipt {
                product_id,
                location_id,
                ..
            }
            | Movement::Delivery {
                product_id,
                location_id,
                ..
            }
            | Movement::Adjustment {
                product_id,
                location_id,
                ..
            } => StockKey::new(product_id, location_id),
        }
    }

    /// Signed change applied to the location's stock level.
    pub fn delta(&self) -> i64 {
        match *self {
            Movement::Receipt { quantity, .. } => quantity,
            Movement::Delivery { quantity, .. } => -quantity,
            Movement::Adjustment { delta, .. } => delta,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        match *self {
            Movement::Receipt { quantity, .. } if quantity <= 0 => Err(
                DomainError::validation("receipt quantity must be positive"),
            ),
            Movement::Delivery { quantity, .. } if quantity <= 0 => Err(
                DomainError::validation("delivery quantity must be positive"),
            ),
            Movement::Adjustment { delta: 0, .. } => {
                Err(DomainError::validation("adjustment delta cannot be zero"))
            }
            _ => Ok(()),
        }
    }

    /// Ledger line for this movement once the new quantity is known.
    pub fn ledger_entry(&self, quantity_after: i64, request: &MovementRequest) -> NewLedgerEntry {
        let key = self.key();
        let (from, to) = match self {
            Movement::Receipt { .. } => (None, Some(key.location_id)),
            Movement::Delivery { .. } => (Some(key.location_id), None),
            Movement::Adjustment { .. } => (Some(key.location_id), Some(key.location_id)),
        };
        NewLedgerEntry {
            entry_type: self.entry_type(),
            product_id: key.product_id,
            location_id: key.location_id,
            location_from: from,
            location_to: to,
            delta_quantity: self.delta(),
            quantity_after,
            actor: request.actor().to_string(),
            note: request.note.clone(),
            meta: request.meta.clone(),
            idempotency_key: request.idempotency_key.clone(),
            reverses: None,
        }
    }
}

/// A movement plus the audit context it is recorded with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementRequest {
    pub movement: Movement,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub meta: serde_json::Value,
    /// Client-supplied token; a retried request with the same key is not applied twice.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl MovementRequest {
    pub const DEFAULT_ACTOR: &'static str = "system";

    pub fn new(movement: Movement) -> Self {
        Self {
            movement,
            actor: None,
            note: None,
            meta: serde_json::Value::Null,
            idempotency_key: None,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn actor(&self) -> &str {
        self.actor
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(Self::DEFAULT_ACTOR)
    }

    /// Validation performed before any lock is taken.
    pub fn validate(&self) -> DomainResult<()> {
        self.movement.validate()?;
        if let Some(key) = &self.idempotency_key {
            if key.trim().is_empty() {
                return Err(DomainError::validation("idempotency key cannot be blank"));
            }
            if key.len() > 200 {
                return Err(DomainError::validation("idempotency key too long"));
            }
        }
        Ok(())
    }

    /// Whether a previously committed entry was produced by an identical request.
    ///
    /// Used on idempotent replay: same key but different parameters is a client error.
    pub fn same_as(&self, entry: &crate::ledger::LedgerEntry) -> bool {
        let key = self.movement.key();
        entry.entry_type == self.movement.entry_type()
            && entry.product_id == key.product_id
            && entry.location_id == key.location_id
            && entry.delta_quantity == self.movement.delta()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (ProductId, LocationId) {
        (ProductId::new(), LocationId::new())
    }

    #[test]
    fn delivery_sign_is_owned_by_the_variant() {
        let (p, l) = ids();
        let m = Movement::from_signed(EntryType::Delivery, p, l, -30).unwrap();
        assert_eq!(
            m,
            Movement::Delivery {
                product_id: p,
                location_id: l,
                quantity: 30
            }
        );
        assert_eq!(m.delta(), -30);
    }

    #[test]
    fn wrong_sign_for_kind_is_rejected() {
        let (p, l) = ids();
        assert!(matches!(
            Movement::from_signed(EntryType::Receipt, p, l, -5),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            Movement::from_signed(EntryType::Delivery, p, l, 5),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            Movement::from_signed(EntryType::Adjustment, p, l, 0),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn transfer_and_undo_are_not_primitive() {
        let (p, l) = ids();
        for kind in [EntryType::Transfer, EntryType::Undo] {
            assert!(matches!(
                Movement::from_signed(kind, p, l, 1),
                Err(DomainError::Validation(_))
            ));
        }
    }

    #[test]
    fn ledger_entry_records_direction() {
        let (p, l) = ids();
        let request = MovementRequest::new(Movement::Delivery {
            product_id: p,
            location_id: l,
            quantity: 4,
        })
        .with_actor("picker-7");
        let entry = request.movement.ledger_entry(6, &request);
        assert_eq!(entry.location_from, Some(l));
        assert_eq!(entry.location_to, None);
        assert_eq!(entry.delta_quantity, -4);
        assert_eq!(entry.quantity_after, 6);
        assert_eq!(entry.actor, "picker-7");
    }

    #[test]
    fn blank_actor_falls_back_to_default() {
        let (p, l) = ids();
        let request = MovementRequest::new(Movement::Receipt {
            product_id: p,
            location_id: l,
            quantity: 1,
        })
        .with_actor("  ");
        assert_eq!(request.actor(), MovementRequest::DEFAULT_ACTOR);
    }

    #[test]
    fn movement_serializes_with_type_tag() {
        let (p, l) = ids();
        let json = serde_json::to_value(Movement::Receipt {
            product_id: p,
            location_id: l,
            quantity: 3,
        })
        .unwrap();
        assert_eq!(json["type"], "receipt");
        assert_eq!(json["quantity"], 3);
    }
}
