use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;

use stockledger_core::{AdjustmentId, TransferId};
use stockledger_infra::{
    AdjustmentOutcome, Catalog, EngineConfig, EngineError, InMemoryCatalog, InMemoryStockLedger,
    LowStock, MovementEngine, MovementOutcome, NewAdjustment, NewTransfer, PostgresCatalog,
    PostgresStockLedger, ScanMovement, ScanOutcome, StockLedgerStore, TransferOutcome,
    UndoOutcome,
};
use stockledger_inventory::{
    Adjustment, LedgerEntry, LedgerFilter, MovementRequest, ScanHistoryFilter, ScanRecord,
    ScanTarget, StockFilter, StockLevel, Transfer,
};

use crate::config::{AppConfig, StoreBackend};

/// Object-safe view of the movement engine, so handlers do not depend on the
/// storage backend chosen at startup.
#[async_trait]
pub trait LedgerService: Send + Sync {
    async fn stock(&self, filter: StockFilter) -> Result<Vec<StockLevel>, EngineError>;
    async fn low_stock(&self, filter: StockFilter) -> Result<Vec<LowStock>, EngineError>;
    async fn ledger(&self, filter: LedgerFilter) -> Result<Vec<LedgerEntry>, EngineError>;

    async fn apply(&self, request: MovementRequest) -> Result<MovementOutcome, EngineError>;

    async fn create_transfer(&self, input: NewTransfer) -> Result<Transfer, EngineError>;
    async fn get_transfer(&self, id: TransferId) -> Result<Transfer, EngineError>;
    async fn advance_transfer(&self, id: TransferId) -> Result<Transfer, EngineError>;
    async fn execute_transfer(&self, id: TransferId) -> Result<TransferOutcome, EngineError>;
    async fn cancel_transfer(&self, id: TransferId) -> Result<Transfer, EngineError>;

    async fn create_adjustment(&self, input: NewAdjustment) -> Result<Adjustment, EngineError>;
    async fn get_adjustment(&self, id: AdjustmentId) -> Result<Adjustment, EngineError>;
    async fn execute_adjustment(&self, id: AdjustmentId)
    -> Result<AdjustmentOutcome, EngineError>;

    async fn undo_last(&self, actor: Option<String>) -> Result<UndoOutcome, EngineError>;

    async fn scan_receipt(&self, scan: ScanMovement) -> Result<ScanOutcome, EngineError>;
    async fn scan_delivery(&self, scan: ScanMovement) -> Result<ScanOutcome, EngineError>;
    async fn lookup(&self, code: &str) -> Result<ScanTarget, EngineError>;
    async fn scan_history(&self, filter: ScanHistoryFilter) -> Result<Vec<ScanRecord>, EngineError>;

    fn subscribe(&self) -> broadcast::Receiver<LedgerEntry>;
}

#[async_trait]
impl<S, C> LedgerService for MovementEngine<S, C>
where
    S: StockLedgerStore + 'static,
    C: Catalog + 'static,
{
    async fn stock(&self, filter: StockFilter) -> Result<Vec<StockLevel>, EngineError> {
        MovementEngine::stock(self, filter).await
    }

    async fn low_stock(&self, filter: StockFilter) -> Result<Vec<LowStock>, EngineError> {
        MovementEngine::low_stock(self, filter).await
    }

    async fn ledger(&self, filter: LedgerFilter) -> Result<Vec<LedgerEntry>, EngineError> {
        MovementEngine::ledger(self, filter).await
    }

    async fn apply(&self, request: MovementRequest) -> Result<MovementOutcome, EngineError> {
        MovementEngine::apply(self, request).await
    }

    async fn create_transfer(&self, input: NewTransfer) -> Result<Transfer, EngineError> {
        MovementEngine::create_transfer(self, input).await
    }

    async fn get_transfer(&self, id: TransferId) -> Result<Transfer, EngineError> {
        MovementEngine::get_transfer(self, id).await
    }

    async fn advance_transfer(&self, id: TransferId) -> Result<Transfer, EngineError> {
        MovementEngine::advance_transfer(self, id).await
    }

    async fn execute_transfer(&self, id: TransferId) -> Result<TransferOutcome, EngineError> {
        MovementEngine::execute_transfer(self, id).await
    }

    async fn cancel_transfer(&self, id: TransferId) -> Result<Transfer, EngineError> {
        MovementEngine::cancel_transfer(self, id).await
    }

    async fn create_adjustment(&self, input: NewAdjustment) -> Result<Adjustment, EngineError> {
        MovementEngine::create_adjustment(self, input).await
    }

    async fn get_adjustment(&self, id: AdjustmentId) -> Result<Adjustment, EngineError> {
        MovementEngine::get_adjustment(self, id).await
    }

    async fn execute_adjustment(
        &self,
        id: AdjustmentId,
    ) -> Result<AdjustmentOutcome, EngineError> {
        MovementEngine::execute_adjustment(self, id).await
    }

    async fn undo_last(&self, actor: Option<String>) -> Result<UndoOutcome, EngineError> {
        MovementEngine::undo_last(self, actor).await
    }

    async fn scan_receipt(&self, scan: ScanMovement) -> Result<ScanOutcome, EngineError> {
        MovementEngine::scan_receipt(self, scan).await
    }

    async fn scan_delivery(&self, scan: ScanMovement) -> Result<ScanOutcome, EngineError> {
        MovementEngine::scan_delivery(self, scan).await
    }

    async fn lookup(&self, code: &str) -> Result<ScanTarget, EngineError> {
        MovementEngine::lookup(self, code).await
    }

    async fn scan_history(&self, filter: ScanHistoryFilter) -> Result<Vec<ScanRecord>, EngineError> {
        MovementEngine::scan_history(self, filter).await
    }

    fn subscribe(&self) -> broadcast::Receiver<LedgerEntry> {
        MovementEngine::subscribe(self)
    }
}

/// Shared state handed to every handler.
pub struct AppServices {
    ledger: Box<dyn LedgerService>,
    backend: &'static str,
}

impl AppServices {
    pub fn new(ledger: impl LedgerService + 'static, backend: &'static str) -> Self {
        Self {
            ledger: Box::new(ledger),
            backend,
        }
    }

    /// In-memory store over the given catalog (dev/test).
    pub fn in_memory(catalog: InMemoryCatalog, config: EngineConfig) -> Self {
        Self::new(
            MovementEngine::new(InMemoryStockLedger::new(), catalog, config),
            "memory",
        )
    }

    pub fn ledger(&self) -> &dyn LedgerService {
        self.ledger.as_ref()
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    match config.store.backend {
        StoreBackend::Memory => {
            let catalog = match &config.catalog.seed_path {
                Some(path) => {
                    tracing::info!(path = %path.display(), "seeding in-memory catalog");
                    InMemoryCatalog::load(path)?
                }
                None => {
                    tracing::warn!("no catalog seed configured; every movement will be NotFound");
                    InMemoryCatalog::new()
                }
            };
            Ok(AppServices::in_memory(catalog, config.engine.clone()))
        }
        StoreBackend::Postgres => {
            let database = config
                .database
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("database configuration missing"))?;
            let store = PostgresStockLedger::connect(
                &database.url,
                database.max_connections,
                database.min_connections,
            )
            .await?;
            tracing::info!("running database migrations");
            store.migrate().await?;
            let catalog = PostgresCatalog::new(store.pool().clone());
            Ok(AppServices::new(
                MovementEngine::new(store, catalog, config.engine.clone()),
                "postgres",
            ))
        }
    }
}

/// Server-sent events of every committed ledger entry.
pub fn ledger_sse_stream(
    services: Arc<AppServices>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.ledger().subscribe();
    let stream = BroadcastStream::new(rx).map(|msg| {
        let event = match msg {
            Ok(entry) => {
                let data = serde_json::to_string(&entry).unwrap_or_else(|_| "{}".to_string());
                SseEvent::default().event("ledger_entry").data(data)
            }
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "stream subscriber lagged");
                SseEvent::default()
                    .event("lagged")
                    .data(format!("{{\"skipped\":{skipped}}}"))
            }
        };
        Ok(event)
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
