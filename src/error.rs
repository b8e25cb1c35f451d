use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// ApiError
///
/// The full error taxonomy of the catalog's query layer. Every component
/// returns its own kind and the handlers map each variant to exactly one
/// boundary response; no handler recovers from any of them locally.
///
/// The four client-facing kinds are deliberately distinct on the wire:
/// a throttled request must never look like a generic client error, and a
/// denied mutation must never look like a validation problem.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request input (e.g., a bad `extent` string). The caller must
    /// fix the request; retrying the same request cannot succeed.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The visibility policy denied the operation, or reports it as
    /// intentionally unsupported for this resource. Terminal; no storage
    /// side effect has occurred.
    #[error("operation not authorized")]
    Authorization,

    /// The per-method quota for this requester is exhausted. Carries the
    /// number of seconds until the current window elapses so the client
    /// knows when backing off will help.
    #[error("too many requests")]
    Throttled { retry_after_secs: u64 },

    /// No visible record with the given identifier. Indistinguishable from
    /// "exists but not visible to this requester", so existence never leaks.
    #[error("not found")]
    NotFound,

    /// Repository/storage failure. Logged at the call site; the response
    /// body stays generic.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl IntoResponse for ApiError {
    /// Maps each error kind to its boundary status code:
    /// 400 / 403 / 429 (+ Retry-After) / 404 / 500.
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": msg })),
            )
                .into_response(),
            ApiError::Authorization => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "operation not authorized" })),
            )
                .into_response(),
            ApiError::Throttled { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after_secs.to_string())],
                Json(json!({
                    "error": "too many requests",
                    "retry_after": retry_after_secs,
                })),
            )
                .into_response(),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "not found" })),
            )
                .into_response(),
            ApiError::Storage(e) => {
                tracing::error!("repository error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                )
                    .into_response()
            }
        }
    }
}
