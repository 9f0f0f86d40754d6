//! Movement Engine.
//!
//! The engine is the only writer of stock levels and ledger entries. Every
//! operation follows the same pipeline:
//!
//! ```text
//! request
//!   ↓
//! 1. Validate input (no locks held)
//!   ↓
//! 2. Check product/location against the catalog
//!   ↓
//! 3. Begin a store transaction with every lock it needs, in global order
//!   ↓
//! 4. Read current levels, compute new levels, reject anything below zero
//!   ↓
//! 5. Stage stock writes + ledger entries (+ workflow document), commit together
//!   ↓
//! 6. Broadcast committed entries to feed subscribers
//! ```
//!
//! Steps 3–5 run inside a bounded retry loop: a lock timeout or serialization
//! conflict restarts them from scratch, re-reading state. Every other error is
//! returned immediately and leaves the store unchanged.

mod adjustment;
mod error;
mod queries;
mod scan;
mod transfer;
mod undo;

use std::future::Future;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use stockledger_inventory::{LedgerEntry, MovementRequest, StockKey};

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::retry::BackoffPolicy;
use crate::store::{LockKey, LockSet, StockLedgerStore, StockLedgerTx};

pub use adjustment::{AdjustmentOutcome, NewAdjustment};
pub use error::EngineError;
pub use queries::LowStock;
pub use scan::{ScanMovement, ScanOutcome};
pub use transfer::{NewTransfer, TransferOutcome};
pub use undo::UndoOutcome;

/// Result of one primitive movement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovementOutcome {
    pub old_quantity: i64,
    pub new_quantity: i64,
    pub entry: LedgerEntry,
    /// The request carried an idempotency key that had already been committed;
    /// nothing was written and `entry` is the original.
    pub replayed: bool,
}

#[derive(Debug)]
pub struct MovementEngine<S, C> {
    store: S,
    catalog: C,
    config: EngineConfig,
    feed: broadcast::Sender<LedgerEntry>,
}

impl<S, C> MovementEngine<S, C> {
    pub fn new(store: S, catalog: C, config: EngineConfig) -> Self {
        let (feed, _) = broadcast::channel(config.feed_capacity.max(1));
        Self {
            store,
            catalog,
            config,
            feed,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Receive every ledger entry committed from now on (lossy for slow receivers).
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEntry> {
        self.feed.subscribe()
    }

    fn publish(&self, entries: &[LedgerEntry]) {
        for entry in entries {
            // No subscribers is fine.
            let _ = self.feed.send(entry.clone());
        }
    }

    fn locks(&self, keys: impl IntoIterator<Item = LockKey>) -> LockSet {
        LockSet::new(keys, self.config.lock_timeout())
    }
}

impl<S, C> MovementEngine<S, C>
where
    S: StockLedgerStore,
    C: Catalog,
{
    /// Run `attempt` until it succeeds, fails permanently, or retries run out.
    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let policy = &self.config.retry;
        let mut n = 1;
        loop {
            match attempt().await {
                Err(err) if err.is_retryable() && policy.should_retry(n) => {
                    let delay = policy.delay_for_attempt(n);
                    debug!(operation, attempt = n, delay_ms = delay.as_millis() as u64, error = %err, "retrying after conflict");
                    tokio::time::sleep(delay).await;
                    n += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        warn!(operation, attempts = n, error = %err, "giving up after conflicts");
                    }
                    return Err(err);
                }
                Ok(value) => return Ok(value),
            }
        }
    }

    /// Reject keys the catalog does not know before any lock is taken.
    async fn ensure_known(&self, key: StockKey) -> Result<(), EngineError> {
        if self.catalog.product(key.product_id).await?.is_none() {
            return Err(EngineError::NotFound(format!("product {}", key.product_id)));
        }
        if self.catalog.location(key.location_id).await?.is_none() {
            return Err(EngineError::NotFound(format!("location {}", key.location_id)));
        }
        Ok(())
    }

    /// Apply one receipt, delivery or manual adjustment.
    #[instrument(
        skip(self, request),
        fields(
            kind = request.movement.entry_type().as_str(),
            product_id = %request.movement.key().product_id,
            location_id = %request.movement.key().location_id,
            delta = request.movement.delta()
        ),
        err
    )]
    pub async fn apply(&self, request: MovementRequest) -> Result<MovementOutcome, EngineError> {
        request.validate()?;
        self.ensure_known(request.movement.key()).await?;

        let outcome = self
            .with_retry("apply", || self.try_apply(&request))
            .await?;

        if outcome.replayed {
            info!(sequence = outcome.entry.sequence, "idempotent replay");
        } else {
            info!(
                sequence = outcome.entry.sequence,
                old_quantity = outcome.old_quantity,
                new_quantity = outcome.new_quantity,
                "movement committed"
            );
        }
        Ok(outcome)
    }

    async fn try_apply(&self, request: &MovementRequest) -> Result<MovementOutcome, EngineError> {
        let key = request.movement.key();
        let mut tx = self.store.begin(self.locks([LockKey::Stock(key)])).await?;

        if let Some(idempotency_key) = &request.idempotency_key {
            if let Some(original) = tx.entry_by_idempotency_key(idempotency_key).await? {
                tx.rollback().await?;
                if !request.same_as(&original) {
                    return Err(EngineError::Validation(format!(
                        "idempotency key {idempotency_key} was used for a different movement"
                    )));
                }
                return Ok(MovementOutcome {
                    old_quantity: original.quantity_after - original.delta_quantity,
                    new_quantity: original.quantity_after,
                    entry: original,
                    replayed: true,
                });
            }
        }

        let current = tx.stock(key).await?;
        let next = current.with_delta(request.movement.delta(), Utc::now())?;

        tx.put_stock(next.clone()).await?;
        tx.append(request.movement.ledger_entry(next.quantity, request))
            .await?;
        let committed = tx.commit().await?;
        self.publish(&committed);

        let entry = committed
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::Invariant("commit returned no ledger entry".to_string()))?;

        Ok(MovementOutcome {
            old_quantity: current.quantity,
            new_quantity: next.quantity,
            entry,
            replayed: false,
        })
    }
}

/// Blank or missing actors are recorded as the default system actor.
fn resolve_actor(actor: Option<String>) -> String {
    actor
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| MovementRequest::DEFAULT_ACTOR.to_string())
}
