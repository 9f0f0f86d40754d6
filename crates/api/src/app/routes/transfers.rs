use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use stockledger_core::TransferId;

use crate::app::errors::{self, ApiJson};
use crate::app::dto;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_transfer))
        .route("/:id", get(get_transfer))
        .route("/:id/advance", post(advance_transfer))
        .route("/:id/execute", post(execute_transfer))
        .route("/:id/cancel", post(cancel_transfer))
}

pub async fn create_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::CreateTransferBody>,
) -> axum::response::Response {
    let input = match body.into_input() {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    match services.ledger().create_transfer(input).await {
        Ok(transfer) => (StatusCode::CREATED, Json(transfer)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: TransferId = match errors::parse_id(&id, "transfer id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.ledger().get_transfer(id).await {
        Ok(transfer) => (StatusCode::OK, Json(transfer)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn advance_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: TransferId = match errors::parse_id(&id, "transfer id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.ledger().advance_transfer(id).await {
        Ok(transfer) => (StatusCode::OK, Json(transfer)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn execute_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: TransferId = match errors::parse_id(&id, "transfer id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.ledger().execute_transfer(id).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn cancel_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: TransferId = match errors::parse_id(&id, "transfer id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.ledger().cancel_transfer(id).await {
        Ok(transfer) => (StatusCode::OK, Json(transfer)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
