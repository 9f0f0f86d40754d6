//! Infrastructure layer: stock store backends, catalog adapters, the movement
//! engine and its configuration.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod retry;
pub mod store;


pub use catalog::{Catalog, CatalogSeed, InMemoryCatalog, PostgresCatalog};
pub use config::EngineConfig;
pub use engine::{
    AdjustmentOutcome, EngineError, LowStock, MovementEngine, MovementOutcome, NewAdjustment,
    NewTransfer, ScanMovement, ScanOutcome, TransferOutcome, UndoOutcome,
};
pub use retry::{BackoffPolicy, RetryPolicy};
pub use store::{InMemoryStockLedger, PostgresStockLedger, StockLedgerStore, StockLedgerTx, StoreError};
