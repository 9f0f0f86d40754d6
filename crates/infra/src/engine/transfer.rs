use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use stockledger_core::{Aggregate, ExpectedVersion, LocationId, ProductId, TransferId};
use stockledger_inventory::{
    CreateTransfer, LedgerEntry, NewLedgerEntry, StockKey, Transfer, TransferCommand,
};

use crate::catalog::Catalog;
use crate::store::{LockKey, StockLedgerStore, StockLedgerTx};

use super::{resolve_actor, EngineError, MovementEngine};

/// Input for `create_transfer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransfer {
    pub product_id: ProductId,
    pub source_location_id: LocationId,
    pub destination_location_id: LocationId,
    pub quantity: i64,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Executed transfer plus the two ledger legs it wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferOutcome {
    pub transfer: Transfer,
    pub entries: Vec<LedgerEntry>,
}

impl<S, C> MovementEngine<S, C>
where
    S: StockLedgerStore,
    C: Catalog,
{
    #[instrument(skip(self, input), fields(product_id = %input.product_id, quantity = input.quantity), err)]
    pub async fn create_transfer(&self, input: NewTransfer) -> Result<Transfer, EngineError> {
        let transfer_id = TransferId::new();
        let command = TransferCommand::Create(CreateTransfer {
            transfer_id,
            product_id: input.product_id,
            source_location_id: input.source_location_id,
            destination_location_id: input.destination_location_id,
            quantity: input.quantity,
            actor: resolve_actor(input.actor),
            note: input.note,
            occurred_at: Utc::now(),
        });

        // Pure validation first so malformed input never reaches the catalog or a lock.
        Transfer::empty(transfer_id).handle(&command)?;
        self.ensure_known(StockKey::new(input.product_id, input.source_location_id))
            .await?;
        self.ensure_known(StockKey::new(input.product_id, input.destination_location_id))
            .await?;

        let transfer = self
            .with_retry("create_transfer", || async {
                let mut tx = self
                    .store
                    .begin(self.locks([LockKey::Transfer(transfer_id)]))
                    .await?;
                let mut transfer = Transfer::empty(transfer_id);
                transfer.execute(&command)?;
                tx.put_transfer(&transfer, ExpectedVersion::Any).await?;
                tx.commit().await?;
                Ok(transfer)
            })
            .await?;

        info!(transfer_id = %transfer.id, "transfer created");
        Ok(transfer)
    }

    pub async fn get_transfer(&self, id: TransferId) -> Result<Transfer, EngineError> {
        self.store
            .transfer(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("transfer {id}")))
    }

    /// Move an open transfer one step along draft → waiting → ready.
    #[instrument(skip(self), err)]
    pub async fn advance_transfer(&self, id: TransferId) -> Result<Transfer, EngineError> {
        self.transition_transfer(id, "advance_transfer", || TransferCommand::Advance {
            occurred_at: Utc::now(),
        })
        .await
    }

    /// Cancel an open transfer. Pure status change; stock is never touched.
    #[instrument(skip(self), err)]
    pub async fn cancel_transfer(&self, id: TransferId) -> Result<Transfer, EngineError> {
        let transfer = self
            .transition_transfer(id, "cancel_transfer", || TransferCommand::Cancel {
                occurred_at: Utc::now(),
            })
            .await?;
        info!(transfer_id = %id, "transfer cancelled");
        Ok(transfer)
    }

    async fn transition_transfer(
        &self,
        id: TransferId,
        operation: &'static str,
        command: impl Fn() -> TransferCommand,
    ) -> Result<Transfer, EngineError> {
        self.with_retry(operation, || async {
            let mut tx = self.store.begin(self.locks([LockKey::Transfer(id)])).await?;
            let mut transfer = tx
                .transfer(id)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("transfer {id}")))?;
            let expected = ExpectedVersion::Exact(transfer.version);
            transfer.execute(&command())?;
            tx.put_transfer(&transfer, expected).await?;
            tx.commit().await?;
            Ok(transfer)
        })
        .await
    }

    /// Decrement the source and increment the destination in one transaction.
    ///
    /// Both stock keys and the transfer document are locked together, so either
    /// both legs and the `done` status commit, or nothing does.
    #[instrument(skip(self), err)]
    pub async fn execute_transfer(&self, id: TransferId) -> Result<TransferOutcome, EngineError> {
        let peek = self.get_transfer(id).await?;
        if !peek.status.is_open() {
            return Err(EngineError::InvalidTransition(format!(
                "cannot execute transfer in status {}",
                peek.status.as_str()
            )));
        }
        peek.validate_movement()?;

        let locks = [
            LockKey::Transfer(id),
            LockKey::Stock(peek.source_key()),
            LockKey::Stock(peek.destination_key()),
        ];

        let outcome = self
            .with_retry("execute_transfer", || async {
                let mut tx = self.store.begin(self.locks(locks)).await?;
                let mut transfer = tx
                    .transfer(id)
                    .await?
                    .ok_or_else(|| EngineError::NotFound(format!("transfer {id}")))?;
                let expected = ExpectedVersion::Exact(transfer.version);
                let now = Utc::now();
                transfer.execute(&TransferCommand::Execute {
                    batch_id: tx.batch_id(),
                    occurred_at: now,
                })?;

                let source = tx.stock(transfer.source_key()).await?;
                let source_next = source.with_delta(-transfer.quantity, now)?;
                let destination = tx.stock(transfer.destination_key()).await?;
                let destination_next = destination.with_delta(transfer.quantity, now)?;

                let legs = NewLedgerEntry::transfer_legs(
                    transfer.product_id,
                    transfer.source_location_id,
                    transfer.destination_location_id,
                    transfer.quantity,
                    source_next.quantity,
                    destination_next.quantity,
                    &transfer.actor,
                    transfer.note.clone(),
                    serde_json::json!({ "transfer_id": transfer.id }),
                );

                tx.put_stock(source_next).await?;
                tx.put_stock(destination_next).await?;
                for leg in legs {
                    tx.append(leg).await?;
                }
                tx.put_transfer(&transfer, expected).await?;
                let entries = tx.commit().await?;
                Ok(TransferOutcome { transfer, entries })
            })
            .await?;

        self.publish(&outcome.entries);
        info!(
            transfer_id = %id,
            quantity = outcome.transfer.quantity,
            "transfer executed"
        );
        Ok(outcome)
    }
}
