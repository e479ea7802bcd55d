use std::sync::Arc;

use axum::{
    extract::{RawQuery, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
};
use base64::Engine;
use tracing::warn;

use sitelens_core::event::TrackPayload;

use crate::{pipeline, routes::collect, state::AppState};

const TRANSPARENT_GIF: &[u8] = &[
    71, 73, 70, 56, 57, 97, 1, 0, 1, 0, 128, 0, 0, 0, 0, 0, 255, 255, 255, 33, 249, 4, 1, 0, 0, 0,
    0, 44, 0, 0, 0, 0, 1, 0, 1, 0, 0, 2, 2, 68, 1, 0, 59,
];

/// `GET /metrics?data=<base64(JSON)>` — the image-beacon fallback.
///
/// Used only when both POST transports are blocked. The response is always
/// `200` with the 1×1 transparent GIF so the request is indistinguishable
/// from an ordinary image load: a decode failure, a schema violation, and a
/// store outage all produce the identical wire bytes as success. The only
/// record of the failure path is the pixel-drop counter and a warning log.
#[tracing::instrument(skip(state, query, headers))]
pub async fn pixel(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    match decode(query.as_deref()) {
        Ok(payload) => {
            let client_ip = collect::extract_client_ip(&headers);
            let user_agent = collect::extract_user_agent(&headers);
            match payload.validate(client_ip, user_agent) {
                Ok(event) => {
                    if let Err(e) = pipeline::process_event(&state, event).await {
                        state.record_pixel_drop();
                        warn!(error = %e, "image beacon dropped after validation");
                    }
                }
                Err(e) => {
                    state.record_pixel_drop();
                    warn!(error = %e, "image beacon failed validation");
                }
            }
        }
        Err(reason) => {
            state.record_pixel_drop();
            warn!(reason, "image beacon failed to decode");
        }
    }

    pixel_response()
}

/// `RawQuery` never rejects, so even a mangled query string ends in the
/// pixel rather than a framework 400.
fn decode(query: Option<&str>) -> Result<TrackPayload, &'static str> {
    let query = query.ok_or("missing query string")?;
    let data = url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "data")
        .map(|(_, value)| value.into_owned())
        .ok_or("missing data parameter")?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.as_bytes())
        .map_err(|_| "invalid base64")?;
    serde_json::from_slice(&bytes).map_err(|_| "invalid JSON document")
}

fn pixel_response() -> Response {
    let mut response = Response::new(axum::body::Body::from(TRANSPARENT_GIF.to_vec()));
    *response.status_mut() = StatusCode::OK;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("image/gif"));
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    response
        .headers_mut()
        .insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}
