//! Stock Store + Ledger boundary.
//!
//! This module defines the transactional persistence abstraction the movement
//! engine writes through, plus its in-memory and Postgres implementations.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryStockLedger, InMemoryTx};
pub use postgres::{PostgresStockLedger, PostgresTx};
pub use r#trait::{LedgerAccess, LockKey, LockSet, StockLedgerStore, StockLedgerTx, StoreError};
