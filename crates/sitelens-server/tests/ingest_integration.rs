use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::Engine;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use sitelens_cache::{CacheSet, MemoryBackend};
use sitelens_core::cache::DedupCache;
use sitelens_core::config::Config;
use sitelens_duckdb::DuckDbBackend;
use sitelens_server::app::build_app;
use sitelens_server::geo::GeoResolver;
use sitelens_server::state::AppState;

const CHROME_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Build a test Config with sensible defaults for integration tests.
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

fn memory_cache() -> CacheSet {
    let backend = Arc::new(MemoryBackend::new());
    CacheSet {
        dedup: backend.clone(),
        sessions: backend.clone(),
        presence: backend,
    }
}

/// Fresh in-memory store + memory cache + app for each test.
async fn setup() -> (Arc<AppState>, axum::Router) {
    setup_with(test_config(), memory_cache()).await
}

async fn setup_with(config: Config, cache: CacheSet) -> (Arc<AppState>, axum::Router) {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let state = Arc::new(AppState::new(db, config, cache, GeoResolver::disabled()));
    let app = build_app(Arc::clone(&state));
    (state, app)
}

fn payload(token: &str) -> Value {
    json!({
        "type": "pageview",
        "timestamp": "2025-06-01T12:00:00Z",
        "path": "/home",
        "referrer": "https://www.google.com/search?q=rust",
        "screen_width": 1920,
        "screen_height": 1080,
        "duration_ms": 1000,
        "scroll_depth": 25,
        "session_token": token
    })
}

/// Helper: POST /metrics with the given JSON body.
fn track_request(body: &str) -> Request<Body> {
    track_request_from(body, "1.2.3.4", CHROME_UA)
}

fn track_request_from(body: &str, ip: &str, ua: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/metrics")
        .header("content-type", "application/json")
        .header("x-forwarded-for", ip)
        .header("user-agent", ua)
        .body(Body::from(body.to_string()))
        .expect("build request")
}

fn image_beacon_request(body: &Value, ip: &str) -> Request<Body> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(body.to_string());
    // The tracker URL-escapes the base64 value (encodeURIComponent).
    let escaped: String = url::form_urlencoded::byte_serialize(encoded.as_bytes()).collect();
    Request::builder()
        .method("GET")
        .uri(format!("/metrics?data={escaped}"))
        .header("x-forwarded-for", ip)
        .header("user-agent", CHROME_UA)
        .body(Body::empty())
        .expect("build request")
}

/// Helper: extract JSON body from response.
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
// BDD: Ingest a valid pageview over POST
// ============================================================
#[tokio::test]
async fn test_valid_post_returns_204_and_writes_once() {
    let (state, app) = setup().await;

    let response = app
        .oneshot(track_request(&payload("sess_1").to_string()))
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(state.db.count_pageviews().await.expect("count"), 1);

    let rows = state.db.recent_pageviews(10).await.expect("read");
    assert!(rows[0].is_unique, "first sight of this visitor today");
    assert!(!rows[0].is_bot);
    assert_eq!(rows[0].referrer_category, "search");
    assert_eq!(rows[0].referrer_domain.as_deref(), Some("google.com"));
    assert_eq!(rows[0].country, None, "geo disabled in tests");
}

// ============================================================
// BDD: Second event from the same visitor is not unique
// ============================================================
#[tokio::test]
async fn test_returning_visitor_is_not_unique() {
    let (state, app) = setup().await;

    for token in ["sess_1", "sess_2"] {
        let response = app
            .clone()
            .oneshot(track_request(&payload(token).to_string()))
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    let rows = state.db.recent_pageviews(10).await.expect("read");
    assert_eq!(rows.len(), 2);
    let unique_rows = rows.iter().filter(|r| r.is_unique).count();
    assert_eq!(unique_rows, 1, "exactly one unique winner per identity");
}

#[tokio::test]
async fn test_distinct_ips_are_distinct_visitors() {
    let (state, app) = setup().await;

    for ip in ["1.2.3.4", "5.6.7.8"] {
        app.clone()
            .oneshot(track_request_from(&payload("sess_1").to_string(), ip, CHROME_UA))
            .await
            .expect("request");
    }

    let rows = state.db.recent_pageviews(10).await.expect("read");
    assert!(rows.iter().all(|r| r.is_unique));
}

// ============================================================
// BDD: Client-input errors are rejected with no side effects
// ============================================================
#[tokio::test]
async fn test_malformed_json_returns_400_and_no_write() {
    let (state, app) = setup().await;

    let response = app
        .oneshot(track_request("{not json"))
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].is_string());
    assert_eq!(state.db.count_pageviews().await.expect("count"), 0);
}

#[tokio::test]
async fn test_unknown_field_is_a_schema_violation() {
    let (state, app) = setup().await;

    let mut body = payload("sess_1");
    body["surprise"] = json!(true);
    let response = app
        .oneshot(track_request(&body.to_string()))
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(state.db.count_pageviews().await.expect("count"), 0);
}

#[tokio::test]
async fn test_unparseable_timestamp_returns_400() {
    let (state, app) = setup().await;

    let mut body = payload("sess_1");
    body["timestamp"] = json!("yesterday at noon");
    let response = app
        .oneshot(track_request(&body.to_string()))
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(state.db.count_pageviews().await.expect("count"), 0);
}

// ============================================================
// BDD: Bot traffic is persisted but excluded from uniqueness
// ============================================================
#[tokio::test]
async fn test_bot_event_is_persisted_and_excluded() {
    let (state, app) = setup().await;

    let bot_ua = "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";
    let response = app
        .oneshot(track_request_from(&payload("sess_bot").to_string(), "1.2.3.4", bot_ua))
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let rows = state.db.recent_pageviews(10).await.expect("read");
    assert_eq!(rows.len(), 1, "bot rows still count raw volume");
    assert!(rows[0].is_bot);
    assert!(!rows[0].is_unique);

    // Bots never occupy an active-visitor seat.
    let response = app_for(&state)
        .oneshot(active_request())
        .await
        .expect("request");
    let body = json_body(response).await;
    assert_eq!(body["active_visitors"], json!(0));
}

fn app_for(state: &Arc<AppState>) -> axum::Router {
    build_app(Arc::clone(state))
}

fn active_request() -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri("/api/active")
        .body(Body::empty())
        .expect("build request")
}

// ============================================================
// BDD: Dedup cache outage fails open to "unique"
// ============================================================
struct ErroringDedup;

#[async_trait]
impl DedupCache for ErroringDedup {
    async fn check_and_record(&self, _key: &str, _ttl: Duration) -> anyhow::Result<bool> {
        anyhow::bail!("connection refused")
    }
}

#[tokio::test]
async fn test_cache_outage_assumes_unique_and_never_errors() {
    let memory = Arc::new(MemoryBackend::new());
    let cache = CacheSet {
        dedup: Arc::new(ErroringDedup),
        sessions: memory.clone(),
        presence: memory,
    };
    let (state, app) = setup_with(test_config(), cache).await;

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(track_request(&payload("sess_1").to_string()))
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    let rows = state.db.recent_pageviews(10).await.expect("read");
    assert_eq!(rows.len(), 2);
    assert!(
        rows.iter().all(|r| r.is_unique),
        "outage must undercount returns, not zero uniques"
    );
}

// ============================================================
// BDD: Concurrent mixed-transport requests are independent
// ============================================================
#[tokio::test]
async fn test_three_concurrent_requests_each_write_once() {
    let (state, app) = setup().await;

    let post_a = app
        .clone()
        .oneshot(track_request_from(&payload("sess_a").to_string(), "1.1.1.1", CHROME_UA));
    let post_b = app
        .clone()
        .oneshot(track_request_from(&payload("sess_b").to_string(), "2.2.2.2", CHROME_UA));
    let get_c = app
        .clone()
        .oneshot(image_beacon_request(&payload("sess_c"), "3.3.3.3"));

    let (ra, rb, rc) = tokio::join!(post_a, post_b, get_c);
    assert_eq!(ra.expect("post a").status(), StatusCode::NO_CONTENT);
    assert_eq!(rb.expect("post b").status(), StatusCode::NO_CONTENT);
    assert_eq!(rc.expect("get c").status(), StatusCode::OK);

    assert_eq!(state.db.count_pageviews().await.expect("count"), 3);
}

// ============================================================
// BDD: CORS and CSP are attached to success and failure alike
// ============================================================
#[tokio::test]
async fn test_cors_headers_mirror_origin_by_default() {
    let (_state, app) = setup().await;

    let request = Request::builder()
        .method("POST")
        .uri("/metrics")
        .header("content-type", "application/json")
        .header("origin", "https://blog.example")
        .header("x-forwarded-for", "1.2.3.4")
        .header("user-agent", CHROME_UA)
        .body(Body::from(payload("sess_1").to_string()))
        .expect("build request");

    let response = app.oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("https://blog.example")
    );
    assert_eq!(
        response
            .headers()
            .get("content-security-policy")
            .and_then(|v| v.to_str().ok()),
        Some("default-src 'none'")
    );
}

#[tokio::test]
async fn test_validation_failure_still_carries_cors_headers() {
    let (_state, app) = setup().await;

    let request = Request::builder()
        .method("POST")
        .uri("/metrics")
        .header("content-type", "application/json")
        .header("origin", "https://blog.example")
        .body(Body::from("{not json"))
        .expect("build request");

    let response = app.oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn test_disallowed_origin_gets_same_shape_without_allow_header() {
    let mut config = test_config();
    config.cors_origins = vec!["https://ok.example".to_string()];
    let (_state, app) = setup_with(config, memory_cache()).await;

    let request = Request::builder()
        .method("POST")
        .uri("/metrics")
        .header("content-type", "application/json")
        .header("origin", "https://evil.example")
        .header("x-forwarded-for", "1.2.3.4")
        .header("user-agent", CHROME_UA)
        .body(Body::from(payload("sess_1").to_string()))
        .expect("build request");

    let response = app.oneshot(request).await.expect("request");
    // The response is generically shaped — nothing reveals why the origin
    // was not allowed.
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!response.headers().contains_key("access-control-allow-origin"));
}
