use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use sitelens_core::event::TrackPayload;

use crate::{error::AppError, pipeline, state::AppState};

/// `POST /metrics` — ingest one telemetry event.
///
/// Serves both the `sendBeacon` transport and the fetch-keepalive fallback;
/// the two encode identically and are indistinguishable here.
///
/// Responses: `204` on success, `400 {"error"}` on malformed JSON or schema
/// violation (no pipeline side effects), `503 {"error","message"}` when the
/// durable store rejects the write. Unlike the GET transport, POST is not
/// required to disguise its outcome.
#[tracing::instrument(skip(state, headers, body))]
pub async fn collect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: TrackPayload = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("invalid payload: {e}")))?;

    let client_ip = extract_client_ip(&headers);
    let user_agent = extract_user_agent(&headers);

    let event = payload
        .validate(client_ip, user_agent)
        .map_err(|e| AppError::Validation(e.to_string()))?;

    pipeline::process_event(&state, event).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Extract the real client IP from `X-Forwarded-For` (first entry).
///
/// Falls back to `"unknown"` when the header is absent — identity hashing
/// still works, the traffic just dedups within the unattributed bucket.
pub(crate) fn extract_client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

pub(crate) fn extract_user_agent(headers: &HeaderMap) -> String {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}
