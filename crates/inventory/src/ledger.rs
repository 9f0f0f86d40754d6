//! Append-only ledger records and the pure rules evaluated over them.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{BatchId, DomainError, LocationId, ProductId};

use crate::stock::StockKey;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Receipt,
    Delivery,
    Transfer,
    Adjustment,
    Undo,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Receipt => "receipt",
            EntryType::Delivery => "delivery",
            EntryType::Transfer => "transfer",
            EntryType::Adjustment => "adjustment",
            EntryType::Undo => "undo",
        }
    }
}

impl core::str::FromStr for EntryType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "receipt" => Ok(EntryType::Receipt),
            "delivery" => Ok(EntryType::Delivery),
            "transfer" => Ok(EntryType::Transfer),
            "adjustment" => Ok(EntryType::Adjustment),
            "undo" => Ok(EntryType::Undo),
            other => Err(DomainError::validation(format!(
                "unknown movement type: {other}"
            ))),
        }
    }
}

/// A ledger line before the store has assigned its sequence, batch and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub entry_type: EntryType,
    pub product_id: ProductId,
    /// The location whose stock level this entry changed.
    pub location_id: LocationId,
    pub location_from: Option<LocationId>,
    pub location_to: Option<LocationId>,
    pub delta_quantity: i64,
    pub quantity_after: i64,
    pub actor: String,
    pub note: Option<String>,
    pub meta: serde_json::Value,
    pub idempotency_key: Option<String>,
    pub reverses: Option<u64>,
}

impl NewLedgerEntry {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.location_id)
    }

    /// The two legs of a transfer: decrement at source, then increment at destination.
    #[allow(clippy::too_many_arguments)]
    pub fn transfer_legs(
        product_id: ProductId,
        source: LocationId,
        destination: LocationId,
        quantity: i64,
        source_after: i64,
        destination_after: i64,
        actor: &str,
        note: Option<String>,
        meta: serde_json::Value,
    ) -> [NewLedgerEntry; 2] {
        let leg = |location_id, delta_quantity, quantity_after| NewLedgerEntry {
            entry_type: EntryType::Transfer,
            product_id,
            location_id,
            location_from: Some(source),
            location_to: Some(destination),
            delta_quantity,
            quantity_after,
            actor: actor.to_string(),
            note: note.clone(),
            meta: meta.clone(),
            idempotency_key: None,
            reverses: None,
        };
        [
            leg(source, -quantity, source_after),
            leg(destination, quantity, destination_after),
        ]
    }
}

/// Immutable, committed record of one primitive quantity change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Strictly increasing commit order; also the entry's identity.
    pub sequence: u64,
    pub batch_id: BatchId,
    pub entry_type: EntryType,
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub location_from: Option<LocationId>,
    pub location_to: Option<LocationId>,
    pub delta_quantity: i64,
    pub quantity_after: i64,
    pub actor: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub meta: serde_json::Value,
    pub idempotency_key: Option<String>,
    /// Sequence of the entry this undo compensates.
    pub reverses: Option<u64>,
}

impl LedgerEntry {
    pub fn from_new(
        new: NewLedgerEntry,
        sequence: u64,
        batch_id: BatchId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sequence,
            batch_id,
            entry_type: new.entry_type,
            product_id: new.product_id,
            location_id: new.location_id,
            location_from: new.location_from,
            location_to: new.location_to,
            delta_quantity: new.delta_quantity,
            quantity_after: new.quantity_after,
            actor: new.actor,
            note: new.note,
            created_at,
            meta: new.meta,
            idempotency_key: new.idempotency_key,
            reverses: new.reverses,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.location_id)
    }
}

/// Restriction and page size for ledger reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerFilter {
    pub product_id: Option<ProductId>,
    pub location_id: Option<LocationId>,
    pub limit: usize,
}

impl LedgerFilter {
    pub const DEFAULT_LIMIT: usize = 50;
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

    /// A location matches when it is the changed key or either side of the movement.
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.product_id.is_none_or(|p| p == entry.product_id)
            && self.location_id.is_none_or(|l| {
                l == entry.location_id
                    || entry.location_from == Some(l)
                    || entry.location_to == Some(l)
            })
    }
}

impl Default for LedgerFilter {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

/// Sum of every delta per key, in ledger order.
pub fn fold_balances<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> BTreeMap<StockKey, i64> {
    let mut balances = BTreeMap::new();
    for entry in entries {
        *balances.entry(entry.key()).or_insert(0) += entry.delta_quantity;
    }
    balances
}

/// Entries of the most recent batch that has not been undone yet.
///
/// `entries` must be in ascending sequence order. Undo entries and entries that
/// an undo already reversed are skipped, so repeated calls walk backwards.
pub fn latest_undoable_batch(entries: &[LedgerEntry]) -> Vec<LedgerEntry> {
    let reversed: HashSet<u64> = entries.iter().filter_map(|e| e.reverses).collect();
    let target = entries
        .iter()
        .rev()
        .find(|e| e.entry_type != EntryType::Undo && !reversed.contains(&e.sequence))
        .map(|e| e.batch_id);

    match target {
        Some(batch_id) => entries
            .iter()
            .filter(|e| e.batch_id == batch_id)
            .cloned()
            .collect(),
        None => Vec::new(),
    }
}

/// Undo lines for a batch, newest first, each inverting one original delta.
///
/// `quantity_after` is left at zero; the engine fills it in once it has read
/// the live level under lock.
pub fn compensating_entries(batch: &[LedgerEntry], actor: &str) -> Vec<NewLedgerEntry> {
    batch
        .iter()
        .rev()
        .map(|original| NewLedgerEntry {
            entry_type: EntryType::Undo,
            product_id: original.product_id,
            location_id: original.location_id,
            location_from: Some(original.location_id),
            location_to: Some(original.location_id),
            delta_quantity: -original.delta_quantity,
            quantity_after: 0,
            actor: actor.to_string(),
            note: Some(format!(
                "undo of {} #{}",
                original.entry_type.as_str(),
                original.sequence
            )),
            meta: serde_json::json!({ "reversed_batch": original.batch_id }),
            idempotency_key: None,
            reverses: Some(original.sequence),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(
        sequence: u64,
        batch_id: BatchId,
        entry_type: EntryType,
        key: StockKey,
        delta: i64,
        reverses: Option<u64>,
    ) -> LedgerEntry {
        LedgerEntry {
            sequence,
            batch_id,
            entry_type,
            product_id: key.product_id,
            location_id: key.location_id,
            location_from: None,
            location_to: Some(key.location_id),
            delta_quantity: delta,
            quantity_after: 0,
            actor: "test".to_string(),
            note: None,
            created_at: Utc::now(),
            meta: serde_json::Value::Null,
            idempotency_key: None,
            reverses,
        }
    }

    #[test]
    fn undo_target_is_the_whole_latest_batch() {
        let w1 = StockKey::new(ProductId::new(), LocationId::new());
        let w2 = StockKey::new(w1.product_id, LocationId::new());
        let receipt = BatchId::new();
        let transfer = BatchId::new();
        let ledger = vec![
            entry(1, receipt, EntryType::Receipt, w1, 70, None),
            entry(2, transfer, EntryType::Transfer, w1, -20, None),
            entry(3, transfer, EntryType::Transfer, w2, 20, None),
        ];

        let batch = latest_undoable_batch(&ledger);
        assert_eq!(batch.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![2, 3]);

        let undo = compensating_entries(&batch, "ops");
        assert_eq!(undo.len(), 2);
        assert_eq!(undo[0].reverses, Some(3));
        assert_eq!(undo[0].delta_quantity, -20);
        assert_eq!(undo[0].location_id, w2.location_id);
        assert_eq!(undo[1].reverses, Some(2));
        assert_eq!(undo[1].delta_quantity, 20);
    }

    #[test]
    fn repeated_undo_walks_backwards() {
        let key = StockKey::new(ProductId::new(), LocationId::new());
        let first = BatchId::new();
        let second = BatchId::new();
        let undo = BatchId::new();
        let ledger = vec![
            entry(1, first, EntryType::Receipt, key, 10, None),
            entry(2, second, EntryType::Receipt, key, 5, None),
            entry(3, undo, EntryType::Undo, key, -5, Some(2)),
        ];

        let batch = latest_undoable_batch(&ledger);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].sequence, 1);
    }

    #[test]
    fn nothing_left_to_undo() {
        let key = StockKey::new(ProductId::new(), LocationId::new());
        assert!(latest_undoable_batch(&[]).is_empty());
        let ledger = vec![
            entry(1, BatchId::new(), EntryType::Receipt, key, 10, None),
            entry(2, BatchId::new(), EntryType::Undo, key, -10, Some(1)),
        ];
        assert!(latest_undoable_batch(&ledger).is_empty());
    }

    #[test]
    fn ledger_filter_clamps_limit_and_matches_either_side() {
        assert_eq!(LedgerFilter::new(None, None, Some(0)).limit, 1);
        assert_eq!(LedgerFilter::new(None, None, Some(5000)).limit, 1000);
        assert_eq!(LedgerFilter::default().limit, 50);

        let key = StockKey::new(ProductId::new(), LocationId::new());
        let mut e = entry(1, BatchId::new(), EntryType::Transfer, key, 3, None);
        let source = LocationId::new();
        e.location_from = Some(source);
        assert!(LedgerFilter::new(None, Some(source), None).matches(&e));
        assert!(!LedgerFilter::new(Some(ProductId::new()), None, None).matches(&e));
    }

    #[test]
    fn entry_type_parses_known_tags_only() {
        assert_eq!("undo".parse::<EntryType>(), Ok(EntryType::Undo));
        assert!("scan_receipt".parse::<EntryType>().is_err());
    }

    proptest! {
        #[test]
        fn undoing_every_batch_folds_back_to_zero(deltas in proptest::collection::vec(1i64..500, 1..20)) {
            let key = StockKey::new(ProductId::new(), LocationId::new());
            let mut ledger: Vec<LedgerEntry> = deltas
                .iter()
                .enumerate()
                .map(|(i, d)| entry(i as u64 + 1, BatchId::new(), EntryType::Receipt, key, *d, None))
                .collect();

            loop {
                let batch = latest_undoable_batch(&ledger);
                if batch.is_empty() {
                    break;
                }
                let undo_batch = BatchId::new();
                for new in compensating_entries(&batch, "prop") {
                    let seq = ledger.len() as u64 + 1;
                    ledger.push(LedgerEntry::from_new(new, seq, undo_batch, Utc::now()));
                }
            }

            prop_assert_eq!(ledger.len(), deltas.len() * 2);
            prop_assert_eq!(fold_balances(&ledger).get(&key).copied(), Some(0));
        }
    }
}
