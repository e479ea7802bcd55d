use chrono::Utc;
use tracing::warn;

use sitelens_core::event::{combine_dimensions, PersistedPageview, TelemetryEvent};
use sitelens_core::referrer::classify_referrer;
use sitelens_core::visitor::visitor_identity;

use crate::error::AppError;
use crate::state::AppState;
use crate::ua;

/// Run one validated event through the ingestion pipeline:
/// bot filter → identity hash → dedup check → GeoIP → session merge →
/// presence mark → persistence.
///
/// Only the durable-store write can fail the call. Session and presence
/// backends degrade gracefully — an engagement aggregate lost to a cache
/// outage must not cost the pageview row.
pub async fn process_event(state: &AppState, event: TelemetryEvent) -> Result<(), AppError> {
    let timeout = state.config.dependency_timeout();

    let is_bot = ua::is_automated(&event.user_agent);

    // Bots never touch the dedup cache: they are persisted for raw volume
    // but can never occupy a uniqueness slot.
    let is_unique = if is_bot {
        false
    } else {
        // Headerless clients hash under a fixed placeholder so they still
        // dedup amongst themselves rather than faulting the hasher.
        let hash_ua = if event.user_agent.is_empty() {
            "unknown"
        } else {
            event.user_agent.as_str()
        };
        let identity = visitor_identity(&event.client_ip, hash_ua, Utc::now().date_naive())
            .map_err(|e| AppError::Internal(e.into()))?;
        state
            .dedup
            .check_and_record(&identity.cache_key(), state.config.dedup_ttl())
            .await
    };

    let country = state.geo.lookup(&event.client_ip);

    if !is_bot {
        let token = event.payload.session_token.as_str();

        let merged = tokio::time::timeout(
            timeout,
            state
                .sessions
                .apply(token, event.engagement_delta(), state.config.session_ttl()),
        )
        .await;
        match merged {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "session store error — aggregates skipped"),
            Err(_) => warn!("session store timed out — aggregates skipped"),
        }

        let marked = tokio::time::timeout(
            timeout,
            state.presence.mark_active(token, state.config.presence_ttl()),
        )
        .await;
        match marked {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "presence tracker error — mark skipped"),
            Err(_) => warn!("presence tracker timed out — mark skipped"),
        }
    }

    let row = build_row(&event, is_unique, is_bot, country);

    let written = tokio::time::timeout(timeout, state.db.insert_pageview(&row)).await;
    match written {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            state.record_store_failure();
            Err(AppError::StoreUnavailable(e))
        }
        Err(_) => {
            state.record_store_failure();
            Err(AppError::StoreUnavailable(anyhow::anyhow!(
                "insert timed out after {}ms",
                timeout.as_millis()
            )))
        }
    }
}

/// Assemble the durable row. All derived values are final before the store
/// call — the write itself performs no conditional logic.
fn build_row(
    event: &TelemetryEvent,
    is_unique: bool,
    is_bot: bool,
    country: Option<String>,
) -> PersistedPageview {
    let payload = &event.payload;
    let (referrer_category, referrer_domain) = classify_referrer(payload.referrer.as_deref());

    // Client-asserted descriptors win; the User-Agent fills the gaps.
    let parsed_ua = ua::parse_user_agent(&event.user_agent);
    let browser = payload
        .browser
        .clone()
        .or_else(|| parsed_ua.as_ref().map(|u| u.browser.clone()));
    let os = payload
        .os
        .clone()
        .or_else(|| parsed_ua.as_ref().map(|u| u.os.clone()));
    let device_type = payload
        .device_type
        .clone()
        .or_else(|| parsed_ua.as_ref().map(|u| u.device_type.clone()));

    PersistedPageview {
        id: uuid::Uuid::new_v4().to_string(),
        event_type: payload.event_type.clone(),
        event_name: payload.event_name.clone(),
        event_ts: event.timestamp,
        path: payload.path.clone(),
        referrer_url: payload.referrer.clone(),
        referrer_domain,
        referrer_category: referrer_category.as_str().to_string(),
        browser,
        os,
        device_type,
        screen: combine_dimensions(payload.screen_width, payload.screen_height),
        viewport: combine_dimensions(payload.viewport_width, payload.viewport_height),
        language: payload.language.clone(),
        country,
        utm_source: payload.utm_source.clone(),
        utm_medium: payload.utm_medium.clone(),
        utm_campaign: payload.utm_campaign.clone(),
        utm_term: payload.utm_term.clone(),
        utm_content: payload.utm_content.clone(),
        duration_ms: payload.duration_ms.map(|v| v as i64),
        scroll_depth: payload.scroll_depth.map(i32::from),
        visibility_changes: payload.visibility_changes.map(|v| v as i32),
        is_unique,
        is_bot,
        created_at: Utc::now(),
    }
}
