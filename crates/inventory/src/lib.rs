//! Stock ledger domain module.
//!
//! This crate contains the business rules for stock levels, movements, the
//! append-only ledger, and the transfer/adjustment workflows, implemented purely
//! as deterministic domain logic (no IO, no HTTP, no storage).

pub mod adjustment;
pub mod catalog;
pub mod ledger;
pub mod movement;
pub mod scan;
pub mod stock;
pub mod transfer;

pub use adjustment::{
    Adjustment, AdjustmentCommand, AdjustmentCreated, AdjustmentEvent, AdjustmentExecuted,
    AdjustmentStatus, CreateAdjustment, ExecuteAdjustment, StalePolicy,
};
pub use catalog::{Location, Product, ScanTarget};
pub use ledger::{
    EntryType, LedgerEntry, LedgerFilter, NewLedgerEntry, compensating_entries, fold_balances,
    latest_undoable_batch,
};
pub use movement::{Movement, MovementRequest};
pub use scan::{NewScanRecord, ScanAction, ScanHistoryFilter, ScanRecord};
pub use stock::{StockFilter, StockKey, StockLevel, checked_apply};
pub use transfer::{
    CreateTransfer, Transfer, TransferCommand, TransferEvent, TransferStatus,
};
