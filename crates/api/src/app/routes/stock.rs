use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::app::errors::{self, ApiJson};
use crate::app::dto;
use crate::app::services::AppServices;

pub async fn list_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::StockQuery>,
) -> axum::response::Response {
    let filter = match query.to_filter() {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    match services.ledger().stock(filter).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::StockQuery>,
) -> axum::response::Response {
    let filter = match query.to_filter() {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    match services.ledger().low_stock(filter).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn post_movement(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::MovementBody>,
) -> axum::response::Response {
    let request = match body.into_request() {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    match services.ledger().apply(request).await {
        Ok(outcome) if outcome.replayed => (StatusCode::OK, Json(outcome)).into_response(),
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
