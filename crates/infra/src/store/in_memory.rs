use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard};
use tracing::debug;

use stockledger_core::{AdjustmentId, BatchId, ExpectedVersion, ScanId, TransferId};
use stockledger_inventory::{
    Adjustment, LedgerEntry, LedgerFilter, NewLedgerEntry, NewScanRecord, ScanHistoryFilter,
    ScanRecord, StockFilter, StockKey, StockLevel, Transfer, latest_undoable_batch,
};

use super::r#trait::{LedgerAccess, LockKey, LockSet, StockLedgerStore, StockLedgerTx, StoreError};

#[derive(Debug, Default)]
struct State {
    stock: BTreeMap<StockKey, StockLevel>,
    ledger: Vec<LedgerEntry>,
    /// Idempotency key → index into `ledger`.
    idempotency: HashMap<String, usize>,
    transfers: HashMap<TransferId, Transfer>,
    adjustments: HashMap<AdjustmentId, Adjustment>,
    scans: Vec<ScanRecord>,
}

#[derive(Debug, Default)]
struct LockTable {
    keys: Mutex<HashMap<LockKey, Arc<tokio::sync::Mutex<()>>>>,
    ledger: Arc<tokio::sync::RwLock<()>>,
}

impl LockTable {
    fn mutex_for(&self, key: LockKey) -> Result<Arc<tokio::sync::Mutex<()>>, StoreError> {
        let mut keys = self
            .keys
            .lock()
            .map_err(|_| StoreError::Persistence("lock table poisoned".to_string()))?;
        Ok(keys.entry(key).or_default().clone())
    }

    /// Drop map entries nobody else references. Holding the map lock while
    /// checking the count keeps a concurrent `mutex_for` from racing the removal.
    fn evict_idle(&self, released: &[LockKey]) {
        let Ok(mut keys) = self.keys.lock() else {
            return;
        };
        for key in released {
            if keys.get(key).is_some_and(|m| Arc::strong_count(m) == 1) {
                keys.remove(key);
            }
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.keys.lock().map(|k| k.len()).unwrap_or_default()
    }
}

/// Locks held by one transaction; released on drop.
#[derive(Debug)]
struct Held {
    table: Arc<LockTable>,
    _shared: Option<OwnedRwLockReadGuard<()>>,
    _exclusive: Option<OwnedRwLockWriteGuard<()>>,
    keys: Vec<(LockKey, OwnedMutexGuard<()>)>,
}

impl Drop for Held {
    fn drop(&mut self) {
        let released: Vec<LockKey> = self.keys.drain(..).map(|(key, _guard)| key).collect();
        self.table.evict_idle(&released);
    }
}

/// In-memory stock store and ledger.
///
/// Intended for tests/dev. Per-key async mutexes give the same linearization a
/// row lock gives in Postgres; the ledger tail is guarded by a reader/writer
/// lock so that undo excludes concurrent appends.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStockLedger {
    state: Arc<RwLock<State>>,
    locks: Arc<LockTable>,
}

impl InMemoryStockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    async fn acquire(&self, locks: &LockSet) -> Result<Held, StoreError> {
        let acquire = async {
            let (shared, exclusive) = match locks.ledger() {
                LedgerAccess::Shared => (Some(self.locks.ledger.clone().read_owned().await), None),
                LedgerAccess::Exclusive => {
                    (None, Some(self.locks.ledger.clone().write_owned().await))
                }
            };
            let mut keys = Vec::with_capacity(locks.keys().len());
            for key in locks.keys() {
                let mutex = self.locks.mutex_for(*key)?;
                keys.push((*key, mutex.lock_owned().await));
            }
            Ok(Held {
                table: self.locks.clone(),
                _shared: shared,
                _exclusive: exclusive,
                keys,
            })
        };

        match tokio::time::timeout(locks.wait(), acquire).await {
            Ok(held) => held,
            Err(_) => {
                self.locks.evict_idle(locks.keys());
                debug!(wait_ms = locks.wait().as_millis() as u64, "lock wait exceeded");
                Err(StoreError::Conflict(format!(
                    "lock wait exceeded {} ms",
                    locks.wait().as_millis()
                )))
            }
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Persistence("state lock poisoned".to_string()))
    }
}

#[async_trait]
impl StockLedgerStore for InMemoryStockLedger {
    type Tx = InMemoryTx;

    async fn begin(&self, locks: LockSet) -> Result<Self::Tx, StoreError> {
        let held = self.acquire(&locks).await?;
        Ok(InMemoryTx {
            state: self.state.clone(),
            locks,
            batch_id: BatchId::new(),
            stock: BTreeMap::new(),
            entries: Vec::new(),
            transfers: Vec::new(),
            adjustments: Vec::new(),
            _held: held,
        })
    }

    async fn stock_levels(&self, filter: StockFilter) -> Result<Vec<StockLevel>, StoreError> {
        let state = self.read()?;
        Ok(state
            .stock
            .iter()
            .filter(|(key, _)| filter.matches(key))
            .map(|(_, level)| level.clone())
            .collect())
    }

    async fn ledger(&self, filter: LedgerFilter) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.read()?;
        Ok(state
            .ledger
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(filter.limit)
            .cloned()
            .collect())
    }

    async fn latest_undoable_batch(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.read()?;
        Ok(latest_undoable_batch(&state.ledger))
    }

    async fn transfer(&self, id: TransferId) -> Result<Option<Transfer>, StoreError> {
        Ok(self.read()?.transfers.get(&id).cloned())
    }

    async fn adjustment(&self, id: AdjustmentId) -> Result<Option<Adjustment>, StoreError> {
        Ok(self.read()?.adjustments.get(&id).cloned())
    }

    async fn record_scan(&self, scan: NewScanRecord) -> Result<ScanRecord, StoreError> {
        let record = ScanRecord {
            id: ScanId::new(),
            scan,
            scanned_at: Utc::now(),
        };
        self.state
            .write()
            .map_err(|_| StoreError::Persistence("state lock poisoned".to_string()))?
            .scans
            .push(record.clone());
        Ok(record)
    }

    async fn scan_history(&self, filter: ScanHistoryFilter) -> Result<Vec<ScanRecord>, StoreError> {
        let state = self.read()?;
        Ok(state
            .scans
            .iter()
            .rev()
            .filter(|r| filter.matches(r))
            .take(filter.limit)
            .cloned()
            .collect())
    }
}

/// Transaction over [`InMemoryStockLedger`]: writes are staged locally and
/// applied under the state write lock on commit.
#[derive(Debug)]
pub struct InMemoryTx {
    state: Arc<RwLock<State>>,
    locks: LockSet,
    batch_id: BatchId,
    stock: BTreeMap<StockKey, StockLevel>,
    entries: Vec<NewLedgerEntry>,
    transfers: Vec<(Transfer, ExpectedVersion)>,
    adjustments: Vec<(Adjustment, ExpectedVersion)>,
    _held: Held,
}

impl InMemoryTx {
    fn ensure_locked(&self, key: LockKey) -> Result<(), StoreError> {
        if self.locks.contains(&key) {
            Ok(())
        } else {
            Err(StoreError::InvalidState(format!("{key:?} is not locked")))
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Persistence("state lock poisoned".to_string()))
    }

    fn apply(self) -> Result<Vec<LedgerEntry>, StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Persistence("state lock poisoned".to_string()))?;

        for (transfer, expected) in &self.transfers {
            let current = state.transfers.get(&transfer.id).map_or(0, |t| t.version);
            expected
                .check(current)
                .map_err(|e| StoreError::Conflict(e.to_string()))?;
        }
        for (adjustment, expected) in &self.adjustments {
            let current = state.adjustments.get(&adjustment.id).map_or(0, |a| a.version);
            expected
                .check(current)
                .map_err(|e| StoreError::Conflict(e.to_string()))?;
        }
        let mut seen = std::collections::HashSet::new();
        for key in self.entries.iter().filter_map(|e| e.idempotency_key.as_deref()) {
            if state.idempotency.contains_key(key) || !seen.insert(key) {
                return Err(StoreError::Conflict(format!(
                    "idempotency key already used: {key}"
                )));
            }
        }

        let now = Utc::now();
        let mut committed = Vec::with_capacity(self.entries.len());
        for new in self.entries {
            let index = state.ledger.len();
            let entry = LedgerEntry::from_new(new, index as u64 + 1, self.batch_id, now);
            if let Some(key) = &entry.idempotency_key {
                state.idempotency.insert(key.clone(), index);
            }
            state.ledger.push(entry.clone());
            committed.push(entry);
        }
        for (key, level) in self.stock {
            state.stock.insert(key, level);
        }
        for (transfer, _) in self.transfers {
            state.transfers.insert(transfer.id, transfer);
        }
        for (adjustment, _) in self.adjustments {
            state.adjustments.insert(adjustment.id, adjustment);
        }

        Ok(committed)
    }
}

#[async_trait]
impl StockLedgerTx for InMemoryTx {
    fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    async fn stock(&mut self, key: StockKey) -> Result<StockLevel, StoreError> {
        self.ensure_locked(LockKey::Stock(key))?;
        if let Some(level) = self.stock.get(&key) {
            return Ok(level.clone());
        }
        let committed = self.read()?.stock.get(&key).cloned();
        Ok(committed.unwrap_or_else(|| StockLevel::empty(key, Utc::now())))
    }

    async fn put_stock(&mut self, level: StockLevel) -> Result<(), StoreError> {
        self.ensure_locked(LockKey::Stock(level.key()))?;
        if level.quantity < 0 {
            return Err(StoreError::InvalidState(format!(
                "refusing negative quantity {} for {}",
                level.quantity,
                level.key()
            )));
        }
        self.stock.insert(level.key(), level);
        Ok(())
    }

    async fn append(&mut self, entry: NewLedgerEntry) -> Result<(), StoreError> {
        self.ensure_locked(LockKey::Stock(entry.key()))?;
        self.entries.push(entry);
        Ok(())
    }

    async fn entry_by_idempotency_key(
        &mut self,
        key: &str,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        let state = self.read()?;
        Ok(state
            .idempotency
            .get(key)
            .and_then(|index| state.ledger.get(*index))
            .cloned())
    }

    async fn latest_undoable_batch(&mut self) -> Result<Vec<LedgerEntry>, StoreError> {
        if self.locks.ledger() != LedgerAccess::Exclusive {
            return Err(StoreError::InvalidState(
                "undo target read without the exclusive ledger lock".to_string(),
            ));
        }
        Ok(latest_undoable_batch(&self.read()?.ledger))
    }

    async fn transfer(&mut self, id: TransferId) -> Result<Option<Transfer>, StoreError> {
        self.ensure_locked(LockKey::Transfer(id))?;
        if let Some((staged, _)) = self.transfers.iter().rev().find(|(t, _)| t.id == id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.read()?.transfers.get(&id).cloned())
    }

    async fn put_transfer(
        &mut self,
        transfer: &Transfer,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        self.ensure_locked(LockKey::Transfer(transfer.id))?;
        self.transfers.push((transfer.clone(), expected));
        Ok(())
    }

    async fn adjustment(&mut self, id: AdjustmentId) -> Result<Option<Adjustment>, StoreError> {
        self.ensure_locked(LockKey::Adjustment(id))?;
        if let Some((staged, _)) = self.adjustments.iter().rev().find(|(a, _)| a.id == id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.read()?.adjustments.get(&id).cloned())
    }

    async fn put_adjustment(
        &mut self,
        adjustment: &Adjustment,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        self.ensure_locked(LockKey::Adjustment(adjustment.id))?;
        self.adjustments.push((adjustment.clone(), expected));
        Ok(())
    }

    async fn commit(self) -> Result<Vec<LedgerEntry>, StoreError> {
        self.apply()
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use stockledger_core::{LocationId, ProductId};
    use stockledger_inventory::{EntryType, ScanAction};

    fn receipt(key: StockKey, delta: i64, after: i64, idem: Option<&str>) -> NewLedgerEntry {
        NewLedgerEntry {
            entry_type: EntryType::Receipt,
            product_id: key.product_id,
            location_id: key.location_id,
            location_from: None,
            location_to: Some(key.location_id),
            delta_quantity: delta,
            quantity_after: after,
            actor: "test".to_string(),
            note: None,
            meta: serde_json::Value::Null,
            idempotency_key: idem.map(str::to_string),
            reverses: None,
        }
    }

    fn lock(key: StockKey) -> LockSet {
        LockSet::new([LockKey::Stock(key)], Duration::from_millis(50))
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let store = InMemoryStockLedger::new();
        let key = StockKey::new(ProductId::new(), LocationId::new());

        let mut tx = store.begin(lock(key)).await.unwrap();
        let level = tx.stock(key).await.unwrap().with_delta(5, Utc::now()).unwrap();
        tx.put_stock(level).await.unwrap();
        tx.append(receipt(key, 5, 5, None)).await.unwrap();
        drop(tx);

        assert!(store.stock_levels(StockFilter::default()).await.unwrap().is_empty());
        assert!(store.ledger(LedgerFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_assigns_sequences_and_shared_batch() {
        let store = InMemoryStockLedger::new();
        let key = StockKey::new(ProductId::new(), LocationId::new());

        let mut tx = store.begin(lock(key)).await.unwrap();
        let batch = tx.batch_id();
        tx.put_stock(StockLevel {
            quantity: 8,
            ..StockLevel::empty(key, Utc::now())
        })
        .await
        .unwrap();
        tx.append(receipt(key, 5, 5, None)).await.unwrap();
        tx.append(receipt(key, 3, 8, None)).await.unwrap();
        let committed = tx.commit().await.unwrap();

        assert_eq!(committed.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![1, 2]);
        assert!(committed.iter().all(|e| e.batch_id == batch));
        let newest_first = store.ledger(LedgerFilter::default()).await.unwrap();
        assert_eq!(newest_first[0].sequence, 2);
    }

    #[tokio::test]
    async fn writing_an_unlocked_key_is_rejected() {
        let store = InMemoryStockLedger::new();
        let locked = StockKey::new(ProductId::new(), LocationId::new());
        let other = StockKey::new(ProductId::new(), LocationId::new());

        let mut tx = store.begin(lock(locked)).await.unwrap();
        assert!(matches!(
            tx.stock(other).await,
            Err(StoreError::InvalidState(_))
        ));
        assert!(matches!(
            tx.put_stock(StockLevel {
                quantity: -1,
                ..StockLevel::empty(locked, Utc::now())
            })
            .await,
            Err(StoreError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn second_locker_times_out_with_conflict() {
        let store = InMemoryStockLedger::new();
        let key = StockKey::new(ProductId::new(), LocationId::new());

        let _held = store.begin(lock(key)).await.unwrap();
        let blocked = store
            .begin(LockSet::new([LockKey::Stock(key)], Duration::from_millis(20)))
            .await;
        assert!(matches!(blocked, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn lock_table_forgets_released_keys() {
        let store = InMemoryStockLedger::new();
        let key = StockKey::new(ProductId::new(), LocationId::new());

        for _ in 0..3 {
            let tx = store
                .begin(LockSet::new(
                    [LockKey::Transfer(TransferId::new()), LockKey::Stock(key)],
                    Duration::from_millis(50),
                ))
                .await
                .unwrap();
            assert_eq!(store.locks.tracked(), 2);
            tx.commit().await.unwrap();
        }
        assert_eq!(store.locks.tracked(), 0);

        let held = store.begin(lock(key)).await.unwrap();
        let blocked = store
            .begin(LockSet::new(
                [LockKey::Adjustment(AdjustmentId::new()), LockKey::Stock(key)],
                Duration::from_millis(20),
            ))
            .await;
        assert!(matches!(blocked, Err(StoreError::Conflict(_))));
        // The holder's entry survives the timed-out waiter's cleanup.
        assert_eq!(store.locks.tracked(), 1);
        drop(held);
        assert_eq!(store.locks.tracked(), 0);
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_conflicts_at_commit() {
        let store = InMemoryStockLedger::new();
        let a = StockKey::new(ProductId::new(), LocationId::new());
        let b = StockKey::new(ProductId::new(), LocationId::new());

        let mut tx = store.begin(lock(a)).await.unwrap();
        tx.append(receipt(a, 1, 1, Some("req-1"))).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin(lock(b)).await.unwrap();
        assert_eq!(
            tx.entry_by_idempotency_key("req-1").await.unwrap().map(|e| e.sequence),
            Some(1)
        );
        tx.append(receipt(b, 1, 1, Some("req-1"))).await.unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::Conflict(_))));
        assert_eq!(store.ledger(LedgerFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn scan_history_is_newest_first_and_filtered() {
        let store = InMemoryStockLedger::new();
        let location = LocationId::new();

        let mut hit = NewScanRecord::new(ScanAction::Receipt, "4006381333931", "WH-1", 3);
        hit.location_id = Some(location);
        store.record_scan(hit.succeeded(1)).await.unwrap();
        store
            .record_scan(
                NewScanRecord::new(ScanAction::Delivery, "nope", "WH-1", 1)
                    .failed("product code nope not found"),
            )
            .await
            .unwrap();

        let all = store.scan_history(ScanHistoryFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(!all[0].scan.success);
        assert_eq!(all[1].scan.sequence, Some(1));

        let at_location = store
            .scan_history(ScanHistoryFilter::new(None, Some(location), Some(10)))
            .await
            .unwrap();
        assert_eq!(at_location.len(), 1);
        assert_eq!(at_location[0].scan.action, ScanAction::Receipt);
    }

    #[tokio::test]
    async fn undo_target_requires_exclusive_ledger_lock() {
        let store = InMemoryStockLedger::new();
        let key = StockKey::new(ProductId::new(), LocationId::new());

        let mut tx = store.begin(lock(key)).await.unwrap();
        assert!(matches!(
            tx.latest_undoable_batch().await,
            Err(StoreError::InvalidState(_))
        ));
        drop(tx);

        let mut tx = store.begin(lock(key).exclusive_ledger()).await.unwrap();
        assert!(tx.latest_undoable_batch().await.unwrap().is_empty());
    }
}
