use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use stockledger_core::{AdjustmentId, Aggregate, ExpectedVersion, LocationId, ProductId};
use stockledger_inventory::{
    Adjustment, AdjustmentCommand, CreateAdjustment, ExecuteAdjustment, LedgerEntry, Movement,
    MovementRequest, StockKey,
};

use crate::catalog::Catalog;
use crate::store::{LockKey, StockLedgerStore, StockLedgerTx};

use super::{resolve_actor, EngineError, MovementEngine};

/// Input for `create_adjustment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAdjustment {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub counted_quantity: i64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
}

/// Executed adjustment and its ledger entry (absent when the variance was zero).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjustmentOutcome {
    pub adjustment: Adjustment,
    pub entry: Option<LedgerEntry>,
}

impl<S, C> MovementEngine<S, C>
where
    S: StockLedgerStore,
    C: Catalog,
{
    /// Record a physical count against the current level. No stock changes yet.
    #[instrument(skip(self, input), fields(product_id = %input.product_id, location_id = %input.location_id), err)]
    pub async fn create_adjustment(&self, input: NewAdjustment) -> Result<Adjustment, EngineError> {
        if input.counted_quantity < 0 {
            return Err(EngineError::Validation(
                "counted quantity cannot be negative".to_string(),
            ));
        }
        let key = StockKey::new(input.product_id, input.location_id);
        self.ensure_known(key).await?;

        let adjustment_id = AdjustmentId::new();
        let actor = resolve_actor(input.actor);

        let adjustment = self
            .with_retry("create_adjustment", || async {
                let mut tx = self
                    .store
                    .begin(self.locks([LockKey::Adjustment(adjustment_id), LockKey::Stock(key)]))
                    .await?;
                let snapshot = tx.stock(key).await?;

                let mut adjustment = Adjustment::empty(adjustment_id);
                adjustment.execute(&AdjustmentCommand::Create(CreateAdjustment {
                    adjustment_id,
                    product_id: key.product_id,
                    location_id: key.location_id,
                    system_quantity: snapshot.quantity,
                    counted_quantity: input.counted_quantity,
                    reason: input.reason.clone(),
                    actor: actor.clone(),
                    occurred_at: Utc::now(),
                }))?;
                tx.put_adjustment(&adjustment, ExpectedVersion::Any).await?;
                tx.commit().await?;
                Ok(adjustment)
            })
            .await?;

        info!(
            adjustment_id = %adjustment.id,
            system_quantity = adjustment.system_quantity,
            variance = adjustment.variance,
            "adjustment created"
        );
        Ok(adjustment)
    }

    pub async fn get_adjustment(&self, id: AdjustmentId) -> Result<Adjustment, EngineError> {
        self.store
            .adjustment(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("adjustment {id}")))
    }

    /// Bring the stock level to the counted quantity.
    ///
    /// The variance is evaluated against the live level read under lock. With
    /// `StalePolicy::RejectOnDrift` a changed level aborts with
    /// `StaleAdjustment`; with `Recompute` the delta becomes `counted - live`.
    #[instrument(skip(self), err)]
    pub async fn execute_adjustment(&self, id: AdjustmentId) -> Result<AdjustmentOutcome, EngineError> {
        let peek = self.get_adjustment(id).await?;
        let key = peek.key();
        let policy = self.config.adjustment_policy;

        let outcome = self
            .with_retry("execute_adjustment", || async {
                let mut tx = self
                    .store
                    .begin(self.locks([LockKey::Adjustment(id), LockKey::Stock(key)]))
                    .await?;
                let mut adjustment = tx
                    .adjustment(id)
                    .await?
                    .ok_or_else(|| EngineError::NotFound(format!("adjustment {id}")))?;
                adjustment.ensure_executable()?;
                let expected = ExpectedVersion::Exact(adjustment.version);
                let now = Utc::now();

                let live = tx.stock(key).await?;
                let variance = adjustment.variance_against(live.quantity, policy)?;
                let batch_id = (variance != 0).then(|| tx.batch_id());

                adjustment.execute(&AdjustmentCommand::Execute(ExecuteAdjustment {
                    live_quantity: live.quantity,
                    policy,
                    batch_id,
                    occurred_at: now,
                }))?;

                if variance != 0 {
                    let next = live.with_delta(variance, now)?;
                    let request = MovementRequest::new(Movement::Adjustment {
                        product_id: key.product_id,
                        location_id: key.location_id,
                        delta: variance,
                    })
                    .with_actor(adjustment.actor.clone())
                    .with_meta(serde_json::json!({
                        "adjustment_id": adjustment.id,
                        "counted_quantity": adjustment.counted_quantity,
                        "snapshot_quantity": adjustment.system_quantity,
                    }));
                    let request = match &adjustment.reason {
                        Some(reason) => request.with_note(reason.clone()),
                        None => request,
                    };
                    tx.put_stock(next.clone()).await?;
                    tx.append(request.movement.ledger_entry(next.quantity, &request))
                        .await?;
                }

                tx.put_adjustment(&adjustment, expected).await?;
                let entries = tx.commit().await?;
                Ok(AdjustmentOutcome {
                    adjustment,
                    entry: entries.into_iter().next(),
                })
            })
            .await?;

        if let Some(entry) = &outcome.entry {
            self.publish(std::slice::from_ref(entry));
        }
        info!(
            adjustment_id = %id,
            variance = outcome.adjustment.executed_variance.unwrap_or_default(),
            drifted = outcome.adjustment.drifted(),
            "adjustment executed"
        );
        Ok(outcome)
    }
}
