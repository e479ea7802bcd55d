use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

/// `GET /api/active` — distinct sessions active right now.
///
/// Consumed by the dashboard. A presence-backend failure returns
/// `null` — the "unknown" sentinel — never zero, which is a legitimate
/// real value.
#[tracing::instrument(skip(state))]
pub async fn active(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let counted = tokio::time::timeout(
        state.config.dependency_timeout(),
        state.presence.count_active(),
    )
    .await;

    match counted {
        Ok(Ok(count)) => Json(json!({ "active_visitors": count })),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "presence backend error — active count unknown");
            Json(json!({ "active_visitors": null }))
        }
        Err(_) => {
            tracing::warn!("presence backend timed out — active count unknown");
            Json(json!({ "active_visitors": null }))
        }
    }
}
