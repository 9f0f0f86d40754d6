use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub async fn list_ledger(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::LedgerQuery>,
) -> axum::response::Response {
    let filter = match query.to_filter() {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    match services.ledger().ledger(filter).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Body is optional; `{ "actor": "..." }` attributes the compensating entries.
pub async fn undo_last(
    Extension(services): Extension<Arc<AppServices>>,
    body: Option<Json<dto::UndoBody>>,
) -> axum::response::Response {
    let actor = body.and_then(|Json(b)| b.actor);
    match services.ledger().undo_last(actor).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
