use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

/// `GET /health` — liveness check.
///
/// Returns `200 OK` when the durable store is reachable, `503` otherwise.
/// The payload carries the internal drop counters: the image-beacon path is
/// wire-silent by design, so this is where its failures become visible.
#[tracing::instrument(skip(state))]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.db.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
                "pixel_drops": state.pixel_drops(),
                "store_failures": state.store_failures()
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "health check: durable store unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "version": env!("CARGO_PKG_VERSION"),
                    "pixel_drops": state.pixel_drops(),
                    "store_failures": state.store_failures()
                })),
            )
                .into_response()
        }
    }
}
