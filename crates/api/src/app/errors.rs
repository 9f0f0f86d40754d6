use async_trait::async_trait;
use axum::extract::{rejection::JsonRejection, FromRequest, Request};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::de::DeserializeOwned;
use serde_json::json;

use stockledger_infra::EngineError;

pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    let status = match &err {
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Conflict(_)
        | EngineError::InvalidTransition(_)
        | EngineError::StaleAdjustment { .. } => StatusCode::CONFLICT,
        EngineError::InsufficientStock { .. } | EngineError::NothingToUndo => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        EngineError::Invariant(_) | EngineError::Persistence(_) => {
            tracing::error!(error = %err, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let mut body = json!({
        "error": err.code(),
        "message": err.to_string(),
    });
    match err {
        EngineError::InsufficientStock { available, delta } => {
            body["available"] = json!(available);
            body["delta"] = json!(delta);
        }
        EngineError::StaleAdjustment { snapshot, live } => {
            body["snapshot_quantity"] = json!(snapshot);
            body["live_quantity"] = json!(live);
        }
        _ => {}
    }
    (status, axum::Json(body)).into_response()
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// `Json` body extractor whose rejections use the JSON error shape.
///
/// Unknown variants, missing fields and wrong types are validation errors (400).
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = axum::response::Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection_to_response(rejection)),
        }
    }
}

fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}

/// Parse a path or query identifier, answering 400 on malformed input.
pub fn parse_id<T: std::str::FromStr>(
    raw: &str,
    what: &'static str,
) -> Result<T, axum::response::Response> {
    raw.parse().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid {what}: {raw}"),
        )
    })
}

/// Parse an optional query identifier.
pub fn parse_opt_id<T: std::str::FromStr>(
    raw: Option<&str>,
    what: &'static str,
) -> Result<Option<T>, axum::response::Response> {
    raw.filter(|s| !s.is_empty())
        .map(|s| parse_id(s, what))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        let cases = [
            (EngineError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (EngineError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (EngineError::Conflict("x".into()), StatusCode::CONFLICT),
            (EngineError::InvalidTransition("x".into()), StatusCode::CONFLICT),
            (
                EngineError::StaleAdjustment { snapshot: 1, live: 2 },
                StatusCode::CONFLICT,
            ),
            (
                EngineError::InsufficientStock { available: 1, delta: -2 },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (EngineError::NothingToUndo, StatusCode::UNPROCESSABLE_ENTITY),
            (
                EngineError::Persistence("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(engine_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn malformed_ids_are_bad_requests() {
        let err = parse_id::<stockledger_core::ProductId>("nope", "product_id").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            parse_opt_id::<stockledger_core::ProductId>(Some(""), "product_id").unwrap(),
            None
        );
    }
}
