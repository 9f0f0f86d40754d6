use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument};

use stockledger_inventory::{compensating_entries, LedgerEntry, StockLevel};

use crate::catalog::Catalog;
use crate::store::{LockKey, StockLedgerStore, StockLedgerTx};

use super::{resolve_actor, EngineError, MovementEngine};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UndoOutcome {
    /// Entries of the batch that was reversed, in their original order.
    pub reversed: Vec<LedgerEntry>,
    /// Compensating entries that were appended.
    pub entries: Vec<LedgerEntry>,
}

impl<S, C> MovementEngine<S, C>
where
    S: StockLedgerStore,
    C: Catalog,
{
    /// Reverse the most recent batch that has not been undone yet.
    ///
    /// The originals stay in the ledger; a compensating `undo` entry is appended
    /// for each of them. Repeated calls walk further back in history.
    #[instrument(skip(self, actor), err)]
    pub async fn undo_last(&self, actor: Option<String>) -> Result<UndoOutcome, EngineError> {
        let actor = resolve_actor(actor);

        let outcome = self
            .with_retry("undo_last", || self.try_undo(&actor))
            .await?;

        self.publish(&outcome.entries);
        info!(
            reversed = outcome.reversed.len(),
            batch_id = ?outcome.reversed.first().map(|e| e.batch_id),
            "batch undone"
        );
        Ok(outcome)
    }

    async fn try_undo(&self, actor: &str) -> Result<UndoOutcome, EngineError> {
        let peek = self.store.latest_undoable_batch().await?;
        if peek.is_empty() {
            return Err(EngineError::NothingToUndo);
        }

        let locks = self
            .locks(peek.iter().map(|e| LockKey::Stock(e.key())))
            .exclusive_ledger();
        let mut tx = self.store.begin(locks).await?;

        let batch = tx.latest_undoable_batch().await?;
        if batch.is_empty() {
            return Err(EngineError::NothingToUndo);
        }
        let same_batch = batch.len() == peek.len()
            && batch.iter().zip(&peek).all(|(a, b)| a.sequence == b.sequence);
        if !same_batch {
            // Another undo won the race for the batch we locked; start over.
            return Err(EngineError::Conflict(
                "latest batch changed while acquiring locks".to_string(),
            ));
        }

        let now = Utc::now();
        let mut levels: BTreeMap<_, StockLevel> = BTreeMap::new();
        for mut entry in compensating_entries(&batch, actor) {
            let key = entry.key();
            let current = match levels.remove(&key) {
                Some(level) => level,
                None => tx.stock(key).await?,
            };
            let next = current.with_delta(entry.delta_quantity, now)?;
            entry.quantity_after = next.quantity;
            tx.append(entry).await?;
            levels.insert(key, next);
        }
        for level in levels.into_values() {
            tx.put_stock(level).await?;
        }

        let entries = tx.commit().await?;
        Ok(UndoOutcome {
            reversed: batch,
            entries,
        })
    }
}
