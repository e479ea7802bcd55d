use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const MAX_PATH_BYTES: usize = 2048;
const MAX_REFERRER_BYTES: usize = 2048;
const MAX_TEXT_FIELD_BYTES: usize = 256;
const MAX_SESSION_TOKEN_BYTES: usize = 128;

/// The logical telemetry document the tracker sends.
///
/// All three transports carry this same shape: the beacon POST and the
/// fetch-keepalive POST send it as the JSON body, the image-beacon GET sends
/// it base64-encoded in the `data` query parameter. The endpoint cannot and
/// need not distinguish which POST transport the client used.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackPayload {
    /// "pageview" or a custom event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Client-asserted ISO-8601 event time. The server validates
    /// parseability only; it never trusts it for identity or rotation.
    pub timestamp: String,
    pub path: String,
    pub referrer: Option<String>,
    pub event_name: Option<String>,
    /// Client-asserted descriptors; filled from the User-Agent header
    /// server-side when absent.
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device_type: Option<String>,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
    pub viewport_width: Option<u32>,
    pub viewport_height: Option<u32>,
    pub language: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
    /// Cumulative on-page duration reported by the tracker.
    pub duration_ms: Option<u64>,
    /// Deepest scroll position reached, percent 0–100.
    pub scroll_depth: Option<u8>,
    pub visibility_changes: Option<u32>,
    pub session_token: String,
}

/// A validated event, ready for the ingestion pipeline.
///
/// `client_ip` and `user_agent` are read from the request envelope, never
/// from client-asserted payload fields.
#[derive(Debug, Clone)]
pub struct TelemetryEvent {
    pub payload: TrackPayload,
    pub timestamp: DateTime<Utc>,
    pub client_ip: String,
    pub user_agent: String,
}

/// Session-scoped engagement increments carried by one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngagementDelta {
    pub duration_ms: u64,
    pub scroll_depth: u8,
    pub visibility_changes: u32,
}

impl TrackPayload {
    /// Validate the payload and bind it to its request envelope.
    ///
    /// A failure here is a client-input error — rejected before any pipeline
    /// side effect, and a distinct outcome from infra failures downstream.
    pub fn validate(
        self,
        client_ip: String,
        user_agent: String,
    ) -> Result<TelemetryEvent, CoreError> {
        if self.event_type.trim().is_empty() {
            return Err(CoreError::InvalidPayload("type is required".to_string()));
        }
        if self.path.is_empty() {
            return Err(CoreError::InvalidPayload("path is required".to_string()));
        }
        if self.path.len() > MAX_PATH_BYTES {
            return Err(CoreError::InvalidPayload("path exceeds max length".to_string()));
        }
        if self.session_token.trim().is_empty() {
            return Err(CoreError::InvalidPayload(
                "session_token is required".to_string(),
            ));
        }
        if self.session_token.len() > MAX_SESSION_TOKEN_BYTES {
            return Err(CoreError::InvalidPayload(
                "session_token exceeds max length".to_string(),
            ));
        }
        if let Some(ref referrer) = self.referrer {
            if referrer.len() > MAX_REFERRER_BYTES {
                return Err(CoreError::InvalidPayload(
                    "referrer exceeds max length".to_string(),
                ));
            }
        }
        for (name, value) in [
            ("browser", &self.browser),
            ("os", &self.os),
            ("device_type", &self.device_type),
            ("language", &self.language),
            ("utm_source", &self.utm_source),
            ("utm_medium", &self.utm_medium),
            ("utm_campaign", &self.utm_campaign),
            ("utm_term", &self.utm_term),
            ("utm_content", &self.utm_content),
        ] {
            if value.as_ref().is_some_and(|v| v.len() > MAX_TEXT_FIELD_BYTES) {
                return Err(CoreError::InvalidPayload(format!(
                    "{name} exceeds max length"
                )));
            }
        }
        if self.scroll_depth.is_some_and(|d| d > 100) {
            return Err(CoreError::InvalidPayload(
                "scroll_depth must be 0-100".to_string(),
            ));
        }

        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|_| {
                CoreError::InvalidPayload("timestamp must be ISO-8601".to_string())
            })?
            .with_timezone(&Utc);

        Ok(TelemetryEvent {
            payload: self,
            timestamp,
            client_ip,
            user_agent,
        })
    }
}

impl TelemetryEvent {
    pub fn engagement_delta(&self) -> EngagementDelta {
        EngagementDelta {
            duration_ms: self.payload.duration_ms.unwrap_or(0),
            scroll_depth: self.payload.scroll_depth.unwrap_or(0),
            visibility_changes: self.payload.visibility_changes.unwrap_or(0),
        }
    }
}

/// Combine width/height into the stored "WxH" form.
pub fn combine_dimensions(width: Option<u32>, height: Option<u32>) -> Option<String> {
    match (width, height) {
        (Some(w), Some(h)) => Some(format!("{w}x{h}")),
        _ => None,
    }
}

/// The durable row — one per successfully decoded event, immutable after
/// insert. `is_unique` reflects the dedup decision at write time and is
/// never retroactively recomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedPageview {
    pub id: String,
    pub event_type: String,
    pub event_name: Option<String>,
    pub event_ts: DateTime<Utc>,
    pub path: String,
    pub referrer_url: Option<String>,
    pub referrer_domain: Option<String>,
    pub referrer_category: String,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device_type: Option<String>,
    pub screen: Option<String>,
    pub viewport: Option<String>,
    pub language: Option<String>,
    pub country: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
    pub duration_ms: Option<i64>,
    pub scroll_depth: Option<i32>,
    pub visibility_changes: Option<i32>,
    pub is_unique: bool,
    pub is_bot: bool,
    pub created_at: DateTime<Utc>,
}
