use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use stockledger_core::AdjustmentId;

use crate::app::errors::{self, ApiJson};
use crate::app::dto;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_adjustment))
        .route("/:id", get(get_adjustment))
        .route("/:id/execute", post(execute_adjustment))
}

pub async fn create_adjustment(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::CreateAdjustmentBody>,
) -> axum::response::Response {
    let input = match body.into_input() {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    match services.ledger().create_adjustment(input).await {
        Ok(adjustment) => (StatusCode::CREATED, Json(adjustment)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_adjustment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: AdjustmentId = match errors::parse_id(&id, "adjustment id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.ledger().get_adjustment(id).await {
        Ok(adjustment) => (StatusCode::OK, Json(adjustment)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Response carries both the creation-time and execution-time variance.
pub async fn execute_adjustment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: AdjustmentId = match errors::parse_id(&id, "adjustment id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.ledger().execute_adjustment(id).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
