use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use stockledger_infra::ScanMovement;

use crate::app::dto;
use crate::app::errors::{self, ApiJson};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/receipt", post(scan_receipt))
        .route("/delivery", post(scan_delivery))
        .route("/lookup/:code", get(lookup))
        .route("/history", get(scan_history))
}

pub async fn scan_receipt(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<ScanMovement>,
) -> axum::response::Response {
    match services.ledger().scan_receipt(body).await {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn scan_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<ScanMovement>,
) -> axum::response::Response {
    match services.ledger().scan_delivery(body).await {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn lookup(
    Extension(services): Extension<Arc<AppServices>>,
    Path(code): Path<String>,
) -> axum::response::Response {
    match services.ledger().lookup(&code).await {
        Ok(target) => (StatusCode::OK, Json(target)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Accepts `warehouse_id` as an alias of `location_id`.
pub async fn scan_history(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ScanHistoryQuery>,
) -> axum::response::Response {
    let filter = match query.to_filter() {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    match services.ledger().scan_history(filter).await {
        Ok(items) => (
            StatusCode::OK,
            Json(serde_json::json!({ "count": items.len(), "items": items })),
        )
            .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
