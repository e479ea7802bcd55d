use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use sitelens_cache::{CacheSet, MemoryBackend};
use sitelens_core::cache::PresenceTracker;
use sitelens_core::config::Config;
use sitelens_duckdb::DuckDbBackend;
use sitelens_server::app::build_app;
use sitelens_server::geo::GeoResolver;
use sitelens_server::state::AppState;

const CHROME_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

fn test_config() -> Config {
    Config {
        port: 0,
        data_dir: "/tmp/sitelens-test".to_string(),
        geoip_path: None,
        cors_origins: vec![],
        cache_url: None,
        dedup_ttl_secs: 86_400,
        session_ttl_secs: 1_800,
        presence_ttl_secs: 300,
        dependency_timeout_ms: 2_000,
        duckdb_memory_limit: "1GB".to_string(),
    }
}

async fn setup_with(cache: CacheSet) -> (Arc<AppState>, axum::Router) {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let state = Arc::new(AppState::new(db, test_config(), cache, GeoResolver::disabled()));
    let app = build_app(Arc::clone(&state));
    (state, app)
}

async fn setup() -> (Arc<AppState>, axum::Router) {
    let backend = Arc::new(MemoryBackend::new());
    setup_with(CacheSet {
        dedup: backend.clone(),
        sessions: backend.clone(),
        presence: backend,
    })
    .await
}

fn track(token: &str) -> Request<Body> {
    let body = json!({
        "type": "pageview",
        "timestamp": "2025-06-01T12:00:00Z",
        "path": "/home",
        "session_token": token
    });
    Request::builder()
        .method("POST")
        .uri("/metrics")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "1.2.3.4")
        .header("user-agent", CHROME_UA)
        .body(Body::from(body.to_string()))
        .expect("build request")
}

fn active_request() -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri("/api/active")
        .body(Body::empty())
        .expect("build request")
}

async fn json_body(response: axum::http::Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse JSON")
}

// ============================================================
// BDD: Active visitors counts distinct live sessions
// ============================================================
#[tokio::test]
async fn test_active_count_tracks_distinct_sessions() {
    let (_state, app) = setup().await;

    for token in ["sess_a", "sess_b", "sess_a"] {
        let response = app.clone().oneshot(track(token)).await.expect("request");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    let response = app.oneshot(active_request()).await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["active_visitors"], json!(2));
}

// ============================================================
// BDD: Presence backend failure reports "unknown", never zero
// ============================================================
struct ErroringPresence;

#[async_trait]
impl PresenceTracker for ErroringPresence {
    async fn mark_active(&self, _token: &str, _ttl: Duration) -> anyhow::Result<()> {
        anyhow::bail!("connection refused")
    }

    async fn count_active(&self) -> anyhow::Result<u64> {
        anyhow::bail!("connection refused")
    }
}

#[tokio::test]
async fn test_presence_outage_reports_null_sentinel() {
    let backend = Arc::new(MemoryBackend::new());
    let cache = CacheSet {
        dedup: backend.clone(),
        sessions: backend,
        presence: Arc::new(ErroringPresence),
    };
    let (_state, app) = setup_with(cache).await;

    // Ingestion still succeeds — a presence outage never costs the row.
    let response = app.clone().oneshot(track("sess_a")).await.expect("request");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.oneshot(active_request()).await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["active_visitors"], Value::Null);
}

// ============================================================
// BDD: Health endpoint reports store status and drop counters
// ============================================================
#[tokio::test]
async fn test_health_reports_ok_with_counters() {
    let (_state, app) = setup().await;

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build request");
    let response = app.oneshot(request).await.expect("request");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["pixel_drops"], json!(0));
    assert_eq!(body["store_failures"], json!(0));
}
