use axum::{
    routing::{get, post},
    Router,
};

pub mod adjustments;
pub mod ledger;
pub mod scan;
pub mod stock;
pub mod system;
pub mod transfers;

/// Router for every stock ledger endpoint.
pub fn router() -> Router {
    Router::new()
        .route("/stream", get(system::stream))
        .route("/stock", get(stock::list_stock))
        .route("/stock/low", get(stock::list_low_stock))
        .route("/movement", post(stock::post_movement))
        .route("/ledger", get(ledger::list_ledger))
        .route("/undo-last", post(ledger::undo_last))
        .nest("/transfer", transfers::router())
        .nest("/adjustment", adjustments::router())
        .nest("/scan", scan::router())
}
