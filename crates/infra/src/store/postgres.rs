//! Postgres-backed stock store and ledger.
//!
//! ## Locking
//!
//! `begin` opens a transaction, bounds every lock wait with `lock_timeout`, then
//! acquires:
//!
//! 1. a table lock on `ledger_entries`: `ROW EXCLUSIVE` for ordinary writers
//!    (they do not conflict with each other) or `SHARE ROW EXCLUSIVE` for undo
//!    (excludes every concurrent append while the latest batch is reversed);
//! 2. one transaction-scoped advisory lock per [`LockKey`], in key order.
//!
//! Advisory locks cover stock keys that have no row yet, so the first receipt
//! for a (product, location) pair is linearized the same way as later ones.
//!
//! ## Error Mapping
//!
//! | SQLSTATE | Meaning | StoreError |
//! |----------|---------|------------|
//! | `55P03` | lock_timeout exceeded | `Conflict` |
//! | `40001` | serialization failure | `Conflict` |
//! | `40P01` | deadlock detected | `Conflict` |
//! | `23505` | unique violation (idempotency key, undo target) | `Conflict` |
//! | n/a | pool acquire timed out | `Conflict` |
//! | other | | `Persistence` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use stockledger_core::{
    AdjustmentId, BatchId, ExpectedVersion, LocationId, ProductId, ScanId, TransferId,
};
use stockledger_inventory::{
    Adjustment, LedgerEntry, LedgerFilter, NewLedgerEntry, NewScanRecord, ScanHistoryFilter,
    ScanRecord, StockFilter, StockKey, StockLevel, Transfer,
};

use super::r#trait::{LedgerAccess, LockKey, LockSet, StockLedgerStore, StockLedgerTx, StoreError};

const LEDGER_COLUMNS: &str = r#"
    sequence, batch_id, entry_type, product_id, location_id, location_from, location_to,
    delta_quantity, quantity_after, actor, note, created_at, meta, idempotency_key, reverses
"#;

const TRANSFER_COLUMNS: &str = r#"
    id, product_id, source_location_id, destination_location_id, quantity, status, actor,
    note, executed_batch, version, created_at, updated_at
"#;

const ADJUSTMENT_COLUMNS: &str = r#"
    id, product_id, location_id, system_quantity, counted_quantity, variance, reason, actor,
    status, executed_system_quantity, executed_variance, executed_batch, version, created_at,
    updated_at
"#;

const SCAN_COLUMNS: &str = r#"
    id, action, product_code, location_code, quantity, scanner_id, scanned_by, product_id,
    location_id, sequence, success, error, scanned_at
"#;

/// Postgres-backed stock store and append-only ledger.
///
/// `Send + Sync`; all operations go through the shared SQLx pool.
#[derive(Debug, Clone)]
pub struct PostgresStockLedger {
    pool: Arc<PgPool>,
}

impl PostgresStockLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect a pool with the given bounds.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&*self.pool)
            .await
            .map_err(|e| StoreError::Persistence(format!("migration failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StockLedgerStore for PostgresStockLedger {
    type Tx = PostgresTx;

    #[instrument(skip(self, locks), fields(keys = locks.keys().len(), ledger = ?locks.ledger()), err)]
    async fn begin(&self, locks: LockSet) -> Result<Self::Tx, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", locks.wait().as_millis().max(1)))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;

        let table_lock = match locks.ledger() {
            LedgerAccess::Shared => "LOCK TABLE ledger_entries IN ROW EXCLUSIVE MODE",
            LedgerAccess::Exclusive => "LOCK TABLE ledger_entries IN SHARE ROW EXCLUSIVE MODE",
        };
        sqlx::query(table_lock)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_ledger", e))?;

        for key in locks.keys() {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
                .bind(advisory_name(key))
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("lock_key", e))?;
        }
        debug!("locks acquired");

        Ok(PostgresTx {
            tx,
            locks,
            batch_id: BatchId::new(),
            appended: Vec::new(),
        })
    }

    #[instrument(skip(self), err)]
    async fn stock_levels(&self, filter: StockFilter) -> Result<Vec<StockLevel>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, location_id, quantity, updated_at
            FROM stock_levels
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::uuid IS NULL OR location_id = $2)
            ORDER BY product_id, location_id
            "#,
        )
        .bind(filter.product_id.map(Uuid::from))
        .bind(filter.location_id.map(Uuid::from))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("stock_levels", e))?;

        rows.iter().map(stock_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn ledger(&self, filter: LedgerFilter) -> Result<Vec<LedgerEntry>, StoreError> {
        let sql = format!(
            r#"
            SELECT {LEDGER_COLUMNS}
            FROM ledger_entries
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::uuid IS NULL OR location_id = $2 OR location_from = $2 OR location_to = $2)
            ORDER BY sequence DESC
            LIMIT $3
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(filter.product_id.map(Uuid::from))
            .bind(filter.location_id.map(Uuid::from))
            .bind(filter.limit as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ledger", e))?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn latest_undoable_batch(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query(&latest_batch_sql())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("latest_undoable_batch", e))?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn transfer(&self, id: TransferId) -> Result<Option<Transfer>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_transfer", e))?;
        row.as_ref().map(transfer_from_row).transpose()
    }

    async fn adjustment(&self, id: AdjustmentId) -> Result<Option<Adjustment>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ADJUSTMENT_COLUMNS} FROM adjustments WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_adjustment", e))?;
        row.as_ref().map(adjustment_from_row).transpose()
    }

    #[instrument(skip(self, scan), fields(action = scan.action.as_str(), success = scan.success), err)]
    async fn record_scan(&self, scan: NewScanRecord) -> Result<ScanRecord, StoreError> {
        let record = ScanRecord {
            id: ScanId::new(),
            scan,
            scanned_at: Utc::now(),
        };
        let s = &record.scan;
        sqlx::query(
            r#"
            INSERT INTO scan_log (
                id, action, product_code, location_code, quantity, scanner_id, scanned_by,
                product_id, location_id, sequence, success, error, scanned_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(Uuid::from(record.id))
        .bind(s.action.as_str())
        .bind(&s.product_code)
        .bind(&s.location_code)
        .bind(s.quantity)
        .bind(&s.scanner_id)
        .bind(&s.scanned_by)
        .bind(s.product_id.map(Uuid::from))
        .bind(s.location_id.map(Uuid::from))
        .bind(s.sequence.map(|seq| seq as i64))
        .bind(s.success)
        .bind(&s.error)
        .bind(record.scanned_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("record_scan", e))?;
        Ok(record)
    }

    #[instrument(skip(self), err)]
    async fn scan_history(&self, filter: ScanHistoryFilter) -> Result<Vec<ScanRecord>, StoreError> {
        let sql = format!(
            r#"
            SELECT {SCAN_COLUMNS}
            FROM scan_log
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::uuid IS NULL OR location_id = $2)
            ORDER BY scanned_at DESC, id DESC
            LIMIT $3
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(filter.product_id.map(Uuid::from))
            .bind(filter.location_id.map(Uuid::from))
            .bind(filter.limit as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("scan_history", e))?;

        rows.iter().map(scan_from_row).collect()
    }
}

/// Open Postgres transaction holding its advisory and table locks.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
    locks: LockSet,
    batch_id: BatchId,
    appended: Vec<LedgerEntry>,
}

impl core::fmt::Debug for PostgresTx {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PostgresTx")
            .field("batch_id", &self.batch_id)
            .field("locks", &self.locks)
            .field("appended", &self.appended.len())
            .finish()
    }
}

impl PostgresTx {
    fn ensure_locked(&self, key: LockKey) -> Result<(), StoreError> {
        if self.locks.contains(&key) {
            Ok(())
        } else {
            Err(StoreError::InvalidState(format!("{key:?} is not locked")))
        }
    }
}

#[async_trait]
impl StockLedgerTx for PostgresTx {
    fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    async fn stock(&mut self, key: StockKey) -> Result<StockLevel, StoreError> {
        self.ensure_locked(LockKey::Stock(key))?;
        let row = sqlx::query(
            r#"
            SELECT product_id, location_id, quantity, updated_at
            FROM stock_levels
            WHERE product_id = $1 AND location_id = $2
            "#,
        )
        .bind(Uuid::from(key.product_id))
        .bind(Uuid::from(key.location_id))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("read_stock", e))?;

        match row {
            Some(row) => stock_from_row(&row),
            None => Ok(StockLevel::empty(key, Utc::now())),
        }
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
        sqlx::query(
            r#"
            INSERT INTO stock_levels (product_id, location_id, quantity, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (product_id, location_id)
            DO UPDATE SET quantity = EXCLUDED.quantity, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(Uuid::from(level.product_id))
        .bind(Uuid::from(level.location_id))
        .bind(level.quantity)
        .bind(level.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("write_stock", e))?;
        Ok(())
    }

    async fn append(&mut self, entry: NewLedgerEntry) -> Result<(), StoreError> {
        self.ensure_locked(LockKey::Stock(entry.key()))?;
        let row = sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                batch_id, entry_type, product_id, location_id, location_from, location_to,
                delta_quantity, quantity_after, actor, note, meta, idempotency_key, reverses
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING sequence, created_at
            "#,
        )
        .bind(Uuid::from(self.batch_id))
        .bind(entry.entry_type.as_str())
        .bind(Uuid::from(entry.product_id))
        .bind(Uuid::from(entry.location_id))
        .bind(entry.location_from.map(Uuid::from))
        .bind(entry.location_to.map(Uuid::from))
        .bind(entry.delta_quantity)
        .bind(entry.quantity_after)
        .bind(&entry.actor)
        .bind(&entry.note)
        .bind(&entry.meta)
        .bind(&entry.idempotency_key)
        .bind(entry.reverses.map(|s| s as i64))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_entry", e))?;

        let sequence: i64 = row.try_get("sequence").map_err(decode_error)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode_error)?;
        self.appended.push(LedgerEntry::from_new(
            entry,
            sequence as u64,
            self.batch_id,
            created_at,
        ));
        Ok(())
    }

    async fn entry_by_idempotency_key(
        &mut self,
        key: &str,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger_entries WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("idempotency_lookup", e))?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn latest_undoable_batch(&mut self) -> Result<Vec<LedgerEntry>, StoreError> {
        if self.locks.ledger() != LedgerAccess::Exclusive {
            return Err(StoreError::InvalidState(
                "undo target read without the exclusive ledger lock".to_string(),
            ));
        }
        let rows = sqlx::query(&latest_batch_sql())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("latest_undoable_batch", e))?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn transfer(&mut self, id: TransferId) -> Result<Option<Transfer>, StoreError> {
        self.ensure_locked(LockKey::Transfer(id))?;
        let row = sqlx::query(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_transfer", e))?;
        row.as_ref().map(transfer_from_row).transpose()
    }

    async fn put_transfer(
        &mut self,
        transfer: &Transfer,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        self.ensure_locked(LockKey::Transfer(transfer.id))?;
        let result = match expected {
            ExpectedVersion::Any => sqlx::query(
                r#"
                INSERT INTO transfers (
                    id, product_id, source_location_id, destination_location_id, quantity,
                    status, actor, note, executed_batch, version, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(Uuid::from(transfer.id))
            .bind(Uuid::from(transfer.product_id))
            .bind(Uuid::from(transfer.source_location_id))
            .bind(Uuid::from(transfer.destination_location_id))
            .bind(transfer.quantity)
            .bind(transfer.status.as_str())
            .bind(&transfer.actor)
            .bind(&transfer.note)
            .bind(transfer.executed_batch.map(Uuid::from))
            .bind(transfer.version as i64)
            .bind(transfer.created_at)
            .bind(transfer.updated_at)
            .execute(&mut *self.tx)
            .await,
            ExpectedVersion::Exact(current) => sqlx::query(
                r#"
                UPDATE transfers
                SET status = $2, executed_batch = $3, version = $4, updated_at = $5
                WHERE id = $1 AND version = $6
                "#,
            )
            .bind(Uuid::from(transfer.id))
            .bind(transfer.status.as_str())
            .bind(transfer.executed_batch.map(Uuid::from))
            .bind(transfer.version as i64)
            .bind(transfer.updated_at)
            .bind(current as i64)
            .execute(&mut *self.tx)
            .await,
        }
        .map_err(|e| map_sqlx_error("write_transfer", e))?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Conflict(format!(
                "transfer {} changed concurrently (expected {expected:?})",
                transfer.id
            )));
        }
        Ok(())
    }

    async fn adjustment(&mut self, id: AdjustmentId) -> Result<Option<Adjustment>, StoreError> {
        self.ensure_locked(LockKey::Adjustment(id))?;
        let row = sqlx::query(&format!(
            "SELECT {ADJUSTMENT_COLUMNS} FROM adjustments WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_adjustment", e))?;
        row.as_ref().map(adjustment_from_row).transpose()
    }

    async fn put_adjustment(
        &mut self,
        adjustment: &Adjustment,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        self.ensure_locked(LockKey::Adjustment(adjustment.id))?;
        let result = match expected {
            ExpectedVersion::Any => sqlx::query(
                r#"
                INSERT INTO adjustments (
                    id, product_id, location_id, system_quantity, counted_quantity, variance,
                    reason, actor, status, executed_system_quantity, executed_variance,
                    executed_batch, version, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                "#,
            )
            .bind(Uuid::from(adjustment.id))
            .bind(Uuid::from(adjustment.product_id))
            .bind(Uuid::from(adjustment.location_id))
            .bind(adjustment.system_quantity)
            .bind(adjustment.counted_quantity)
            .bind(adjustment.variance)
            .bind(&adjustment.reason)
            .bind(&adjustment.actor)
            .bind(adjustment.status.as_str())
            .bind(adjustment.executed_system_quantity)
            .bind(adjustment.executed_variance)
            .bind(adjustment.executed_batch.map(Uuid::from))
            .bind(adjustment.version as i64)
            .bind(adjustment.created_at)
            .bind(adjustment.updated_at)
            .execute(&mut *self.tx)
            .await,
            ExpectedVersion::Exact(current) => sqlx::query(
                r#"
                UPDATE adjustments
                SET status = $2, executed_system_quantity = $3, executed_variance = $4,
                    executed_batch = $5, version = $6, updated_at = $7
                WHERE id = $1 AND version = $8
                "#,
            )
            .bind(Uuid::from(adjustment.id))
            .bind(adjustment.status.as_str())
            .bind(adjustment.executed_system_quantity)
            .bind(adjustment.executed_variance)
            .bind(adjustment.executed_batch.map(Uuid::from))
            .bind(adjustment.version as i64)
            .bind(adjustment.updated_at)
            .bind(current as i64)
            .execute(&mut *self.tx)
            .await,
        }
        .map_err(|e| map_sqlx_error("write_adjustment", e))?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Conflict(format!(
                "adjustment {} changed concurrently (expected {expected:?})",
                adjustment.id
            )));
        }
        Ok(())
    }

    async fn commit(self) -> Result<Vec<LedgerEntry>, StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(self.appended)
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn advisory_name(key: &LockKey) -> String {
    match key {
        LockKey::Transfer(id) => format!("stockledger:transfer:{id}"),
        LockKey::Adjustment(id) => format!("stockledger:adjustment:{id}"),
        LockKey::Stock(k) => format!("stockledger:stock:{}:{}", k.product_id, k.location_id),
    }
}

fn latest_batch_sql() -> String {
    format!(
        r#"
        SELECT {LEDGER_COLUMNS}
        FROM ledger_entries
        WHERE batch_id = (
            SELECT e.batch_id
            FROM ledger_entries e
            WHERE e.entry_type <> 'undo'
              AND NOT EXISTS (SELECT 1 FROM ledger_entries u WHERE u.reverses = e.sequence)
            ORDER BY e.sequence DESC
            LIMIT 1
        )
        ORDER BY sequence ASC
        "#
    )
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("55P03") | Some("40001") | Some("40P01") | Some("23505") => {
                    StoreError::Conflict(msg)
                }
                _ => StoreError::Persistence(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Conflict(format!("connection wait exceeded in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Persistence(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Persistence(format!("sqlx error in {operation}: {err}")),
    }
}

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::Persistence(format!("failed to decode row: {err}"))
}

fn parse<T>(value: &str) -> Result<T, StoreError>
where
    T: core::str::FromStr<Err = stockledger_core::DomainError>,
{
    value
        .parse()
        .map_err(|e: stockledger_core::DomainError| StoreError::Persistence(e.to_string()))
}

fn stock_from_row(row: &PgRow) -> Result<StockLevel, StoreError> {
    Ok(StockLevel {
        product_id: ProductId::from_uuid(row.try_get("product_id").map_err(decode_error)?),
        location_id: LocationId::from_uuid(row.try_get("location_id").map_err(decode_error)?),
        quantity: row.try_get("quantity").map_err(decode_error)?,
        updated_at: row.try_get("updated_at").map_err(decode_error)?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<LedgerEntry, StoreError> {
    let entry_type: String = row.try_get("entry_type").map_err(decode_error)?;
    let location_from: Option<Uuid> = row.try_get("location_from").map_err(decode_error)?;
    let location_to: Option<Uuid> = row.try_get("location_to").map_err(decode_error)?;
    let sequence: i64 = row.try_get("sequence").map_err(decode_error)?;
    let reverses: Option<i64> = row.try_get("reverses").map_err(decode_error)?;

    Ok(LedgerEntry {
        sequence: sequence as u64,
        batch_id: BatchId::from_uuid(row.try_get("batch_id").map_err(decode_error)?),
        entry_type: parse(&entry_type)?,
        product_id: ProductId::from_uuid(row.try_get("product_id").map_err(decode_error)?),
        location_id: LocationId::from_uuid(row.try_get("location_id").map_err(decode_error)?),
        location_from: location_from.map(LocationId::from_uuid),
        location_to: location_to.map(LocationId::from_uuid),
        delta_quantity: row.try_get("delta_quantity").map_err(decode_error)?,
        quantity_after: row.try_get("quantity_after").map_err(decode_error)?,
        actor: row.try_get("actor").map_err(decode_error)?,
        note: row.try_get("note").map_err(decode_error)?,
        created_at: row.try_get("created_at").map_err(decode_error)?,
        meta: row.try_get("meta").map_err(decode_error)?,
        idempotency_key: row.try_get("idempotency_key").map_err(decode_error)?,
        reverses: reverses.map(|s| s as u64),
    })
}

fn transfer_from_row(row: &PgRow) -> Result<Transfer, StoreError> {
    let status: String = row.try_get("status").map_err(decode_error)?;
    let executed_batch: Option<Uuid> = row.try_get("executed_batch").map_err(decode_error)?;
    let version: i64 = row.try_get("version").map_err(decode_error)?;

    Ok(Transfer {
        id: TransferId::from_uuid(row.try_get("id").map_err(decode_error)?),
        product_id: ProductId::from_uuid(row.try_get("product_id").map_err(decode_error)?),
        source_location_id: LocationId::from_uuid(
            row.try_get("source_location_id").map_err(decode_error)?,
        ),
        destination_location_id: LocationId::from_uuid(
            row.try_get("destination_location_id").map_err(decode_error)?,
        ),
        quantity: row.try_get("quantity").map_err(decode_error)?,
        status: parse(&status)?,
        actor: row.try_get("actor").map_err(decode_error)?,
        note: row.try_get("note").map_err(decode_error)?,
        created_at: row.try_get("created_at").map_err(decode_error)?,
        updated_at: row.try_get("updated_at").map_err(decode_error)?,
        executed_batch: executed_batch.map(BatchId::from_uuid),
        version: version as u64,
    })
}

fn adjustment_from_row(row: &PgRow) -> Result<Adjustment, StoreError> {
    let status: String = row.try_get("status").map_err(decode_error)?;
    let executed_batch: Option<Uuid> = row.try_get("executed_batch").map_err(decode_error)?;
    let version: i64 = row.try_get("version").map_err(decode_error)?;

    Ok(Adjustment {
        id: AdjustmentId::from_uuid(row.try_get("id").map_err(decode_error)?),
        product_id: ProductId::from_uuid(row.try_get("product_id").map_err(decode_error)?),
        location_id: LocationId::from_uuid(row.try_get("location_id").map_err(decode_error)?),
        system_quantity: row.try_get("system_quantity").map_err(decode_error)?,
        counted_quantity: row.try_get("counted_quantity").map_err(decode_error)?,
        variance: row.try_get("variance").map_err(decode_error)?,
        reason: row.try_get("reason").map_err(decode_error)?,
        actor: row.try_get("actor").map_err(decode_error)?,
        status: parse(&status)?,
        executed_system_quantity: row
            .try_get("executed_system_quantity")
            .map_err(decode_error)?,
        executed_variance: row.try_get("executed_variance").map_err(decode_error)?,
        executed_batch: executed_batch.map(BatchId::from_uuid),
        created_at: row.try_get("created_at").map_err(decode_error)?,
        updated_at: row.try_get("updated_at").map_err(decode_error)?,
        version: version as u64,
    })
}

fn scan_from_row(row: &PgRow) -> Result<ScanRecord, StoreError> {
    let action: String = row.try_get("action").map_err(decode_error)?;
    let product_id: Option<Uuid> = row.try_get("product_id").map_err(decode_error)?;
    let location_id: Option<Uuid> = row.try_get("location_id").map_err(decode_error)?;
    let sequence: Option<i64> = row.try_get("sequence").map_err(decode_error)?;

    Ok(ScanRecord {
        id: ScanId::from_uuid(row.try_get("id").map_err(decode_error)?),
        scan: NewScanRecord {
            action: parse(&action)?,
            product_code: row.try_get("product_code").map_err(decode_error)?,
            location_code: row.try_get("location_code").map_err(decode_error)?,
            quantity: row.try_get("quantity").map_err(decode_error)?,
            scanner_id: row.try_get("scanner_id").map_err(decode_error)?,
            scanned_by: row.try_get("scanned_by").map_err(decode_error)?,
            product_id: product_id.map(ProductId::from_uuid),
            location_id: location_id.map(LocationId::from_uuid),
            sequence: sequence.map(|seq| seq as u64),
            success: row.try_get("success").map_err(decode_error)?,
            error: row.try_get("error").map_err(decode_error)?,
        },
        scanned_at: row.try_get("scanned_at").map_err(decode_error)?,
    })
}
