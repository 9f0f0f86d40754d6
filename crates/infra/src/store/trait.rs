use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use stockledger_core::{AdjustmentId, BatchId, ExpectedVersion, TransferId};
use stockledger_inventory::{
    Adjustment, LedgerEntry, LedgerFilter, NewLedgerEntry, NewScanRecord, ScanHistoryFilter,
    ScanRecord, StockFilter, StockKey, StockLevel, Transfer,
};

/// Stock store / ledger operation error.
///
/// These are **infrastructure errors** (storage, lock contention) as opposed to
/// domain errors (validation, insufficient stock).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Lock wait exceeded, serialization failure, deadlock, stale document version
    /// or a concurrent duplicate idempotency key. Safe to retry from scratch.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Opaque storage failure.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// The caller broke the transaction protocol (e.g. wrote a key it never locked).
    #[error("invalid store usage: {0}")]
    InvalidState(String),
}

/// One lockable resource.
///
/// The derived `Ord` is the global acquisition order: documents first, then stock
/// keys ordered by (product, location). Every transaction acquires in this order,
/// so two transfers moving stock in opposite directions cannot deadlock.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    Transfer(TransferId),
    Adjustment(AdjustmentId),
    Stock(StockKey),
}

/// How a transaction coordinates with the ledger tail.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LedgerAccess {
    /// Ordinary writers; run in parallel with each other.
    Shared,
    /// Undo: no other writer may append while the latest batch is read and reversed.
    Exclusive,
}

/// Everything a transaction locks up front, before its first read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSet {
    keys: Vec<LockKey>,
    ledger: LedgerAccess,
    wait: Duration,
}

impl LockSet {
    pub fn new(keys: impl IntoIterator<Item = LockKey>, wait: Duration) -> Self {
        let mut keys: Vec<LockKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();
        Self {
            keys,
            ledger: LedgerAccess::Shared,
            wait,
        }
    }

    pub fn exclusive_ledger(mut self) -> Self {
        self.ledger = LedgerAccess::Exclusive;
        self
    }

    /// Keys in acquisition order.
    pub fn keys(&self) -> &[LockKey] {
        &self.keys
    }

    pub fn ledger(&self) -> LedgerAccess {
        self.ledger
    }

    /// Upper bound on the time spent waiting for locks.
    pub fn wait(&self) -> Duration {
        self.wait
    }

    pub fn contains(&self, key: &LockKey) -> bool {
        self.keys.binary_search(key).is_ok()
    }

    pub fn stock_keys(&self) -> impl Iterator<Item = StockKey> + '_ {
        self.keys.iter().filter_map(|k| match k {
            LockKey::Stock(s) => Some(*s),
            _ => None,
        })
    }
}

/// Durable (product, location) → quantity mapping plus the append-only ledger.
///
/// ## Transactions
///
/// Every mutation goes through a [`StockLedgerTx`] obtained from `begin`. The
/// transaction acquires all of its locks up front, in [`LockKey`] order, with a
/// bounded wait; exceeding the wait surfaces as [`StoreError::Conflict`].
/// Stock writes, ledger appends and workflow document writes staged in one
/// transaction are applied together on `commit` or not at all.
///
/// ## Reads
///
/// The non-transactional reads return committed state only and never block
/// writers for longer than a snapshot copy.
#[async_trait]
pub trait StockLedgerStore: Send + Sync {
    type Tx: StockLedgerTx;

    async fn begin(&self, locks: LockSet) -> Result<Self::Tx, StoreError>;

    /// Committed stock levels matching `filter`, ordered by key.
    async fn stock_levels(&self, filter: StockFilter) -> Result<Vec<StockLevel>, StoreError>;

    /// Committed ledger entries matching `filter`, most recent first.
    async fn ledger(&self, filter: LedgerFilter) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Unlocked peek at the batch the next undo would reverse.
    async fn latest_undoable_batch(&self) -> Result<Vec<LedgerEntry>, StoreError>;

    async fn transfer(&self, id: TransferId) -> Result<Option<Transfer>, StoreError>;

    async fn adjustment(&self, id: AdjustmentId) -> Result<Option<Adjustment>, StoreError>;

    /// Append to the scan log. Written outside any movement transaction so
    /// that rejected scans are kept too.
    async fn record_scan(&self, scan: NewScanRecord) -> Result<ScanRecord, StoreError>;

    /// Scan log records matching `filter`, most recent first.
    async fn scan_history(&self, filter: ScanHistoryFilter) -> Result<Vec<ScanRecord>, StoreError>;
}

/// A unit of work holding its locks until `commit` or `rollback`.
///
/// Dropping a transaction without committing discards everything it staged.
#[async_trait]
pub trait StockLedgerTx: Send {
    /// Batch shared by every ledger entry this transaction appends.
    fn batch_id(&self) -> BatchId;

    /// Current level for a locked key; an unseen key reads as quantity 0.
    async fn stock(&mut self, key: StockKey) -> Result<StockLevel, StoreError>;

    async fn put_stock(&mut self, level: StockLevel) -> Result<(), StoreError>;

    async fn append(&mut self, entry: NewLedgerEntry) -> Result<(), StoreError>;

    async fn entry_by_idempotency_key(&mut self, key: &str)
    -> Result<Option<LedgerEntry>, StoreError>;

    /// Latest undoable batch as seen under this transaction's ledger lock.
    async fn latest_undoable_batch(&mut self) -> Result<Vec<LedgerEntry>, StoreError>;

    async fn transfer(&mut self, id: TransferId) -> Result<Option<Transfer>, StoreError>;

    async fn put_transfer(
        &mut self,
        transfer: &Transfer,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    async fn adjustment(&mut self, id: AdjustmentId) -> Result<Option<Adjustment>, StoreError>;

    async fn put_adjustment(
        &mut self,
        adjustment: &Adjustment,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    /// Apply everything staged atomically; returns the appended entries in sequence order.
    async fn commit(self) -> Result<Vec<LedgerEntry>, StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> StockLedgerStore for Arc<S>
where
    S: StockLedgerStore + ?Sized,
{
    type Tx = S::Tx;

    async fn begin(&self, locks: LockSet) -> Result<Self::Tx, StoreError> {
        (**self).begin(locks).await
    }

    async fn stock_levels(&self, filter: StockFilter) -> Result<Vec<StockLevel>, StoreError> {
        (**self).stock_levels(filter).await
    }

    async fn ledger(&self, filter: LedgerFilter) -> Result<Vec<LedgerEntry>, StoreError> {
        (**self).ledger(filter).await
    }

    async fn latest_undoable_batch(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        (**self).latest_undoable_batch().await
    }

    async fn transfer(&self, id: TransferId) -> Result<Option<Transfer>, StoreError> {
        (**self).transfer(id).await
    }

    async fn adjustment(&self, id: AdjustmentId) -> Result<Option<Adjustment>, StoreError> {
        (**self).adjustment(id).await
    }

    async fn record_scan(&self, scan: NewScanRecord) -> Result<ScanRecord, StoreError> {
        (**self).record_scan(scan).await
    }

    async fn scan_history(&self, filter: ScanHistoryFilter) -> Result<Vec<ScanRecord>, StoreError> {
        (**self).scan_history(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockledger_core::{LocationId, ProductId};

    #[test]
    fn lock_set_sorts_documents_before_stock_and_dedups() {
        let a = StockKey::new(ProductId::new(), LocationId::new());
        let b = StockKey::new(ProductId::new(), LocationId::new());
        let t = TransferId::new();
        let set = LockSet::new(
            [LockKey::Stock(b), LockKey::Stock(a), LockKey::Transfer(t), LockKey::Stock(a)],
            Duration::from_millis(10),
        );

        assert_eq!(set.keys().len(), 3);
        assert_eq!(set.keys()[0], LockKey::Transfer(t));
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        assert_eq!(set.keys()[1], LockKey::Stock(lo));
        assert_eq!(set.keys()[2], LockKey::Stock(hi));
        assert!(set.contains(&LockKey::Stock(a)));
        assert_eq!(set.stock_keys().count(), 2);
    }

    #[test]
    fn opposite_transfers_share_one_order() {
        let p = ProductId::new();
        let w1 = StockKey::new(p, LocationId::new());
        let w2 = StockKey::new(p, LocationId::new());
        let wait = Duration::from_millis(1);
        let forward = LockSet::new([LockKey::Stock(w1), LockKey::Stock(w2)], wait);
        let backward = LockSet::new([LockKey::Stock(w2), LockKey::Stock(w1)], wait);
        assert_eq!(forward, backward);
    }
}
