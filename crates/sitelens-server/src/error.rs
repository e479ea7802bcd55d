use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level errors that map directly to HTTP responses on the POST
/// transport.
///
/// The GET image-beacon transport never surfaces these on the wire — its
/// handler swallows them behind the pixel. Every variant resolves to a
/// documented response shape; raw errors never bubble past the endpoint.
#[derive(Debug, Error)]
pub enum AppError {
    /// Client-input error: malformed JSON, schema violation, unparseable
    /// timestamp. Rejected before any pipeline side effect.
    #[error("validation error: {0}")]
    Validation(String),

    /// The durable store rejected or timed out on the write — the one infra
    /// failure the POST transport is allowed to report.
    #[error("store unavailable: {0}")]
    StoreUnavailable(anyhow::Error),

    /// Precondition violation after validation passed — a server fault.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": msg })),
            )
                .into_response(),
            AppError::StoreUnavailable(e) => {
                tracing::error!(error = %e, "durable store write failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({
                        "error": "store_unavailable",
                        "message": "Event could not be persisted, retry later"
                    })),
                )
                    .into_response()
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "internal_error",
                        "message": "Internal server error"
                    })),
                )
                    .into_response()
            }
        }
    }
}
