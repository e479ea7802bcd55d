use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use sitelens_server::{app::build_app, geo::GeoResolver, state::AppState};

/// `sitelens health` — liveness probe for Docker HEALTHCHECK.
///
/// Calls `GET http://localhost:$SITELENS_PORT/health`.
/// Exits 0 if the server responds with HTTP 200, exits 1 otherwise.
fn run_health_check() -> ! {
    let port = std::env::var("SITELENS_PORT").unwrap_or_else(|_| "3000".to_string());
    let url = format!("http://localhost:{}/health", port);
    match ureq::get(&url).call() {
        Ok(resp) if resp.status() == 200 => std::process::exit(0),
        _ => std::process::exit(1),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Health-check subcommand — handled before runtime-heavy init so the
    // binary stays fast as a Docker HEALTHCHECK probe.
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("health") {
        run_health_check();
    }

    // Structured JSON logging. Level controlled via RUST_LOG env var.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sitelens=info".parse()?),
        )
        .json()
        .init();

    let cfg = sitelens_core::config::Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    // Ensure data directory exists before opening DuckDB.
    std::fs::create_dir_all(&cfg.data_dir)?;
    let db_path = format!("{}/sitelens.db", cfg.data_dir);
    let db = sitelens_duckdb::DuckDbBackend::open(&db_path, &cfg.duckdb_memory_limit)?;

    // A configured GeoIP database that cannot be opened is a configuration
    // failure and aborts startup; no configured path runs with geo disabled.
    let geo = GeoResolver::from_config(cfg.geoip_path.as_deref())?;
    match &cfg.geoip_path {
        Some(path) => info!(geoip_path = %path, "GeoIP database loaded"),
        None => info!("No GeoIP database configured — events stored with NULL country"),
    }

    let cache = sitelens_cache::connect(cfg.cache_url.as_deref()).await?;
    match &cfg.cache_url {
        Some(url) => info!(cache_url = %url, "Redis cache backend connected"),
        None => info!("In-process cache backend active (single-node dedup scope)"),
    }

    let addr = format!("0.0.0.0:{}", cfg.port);
    let state = Arc::new(AppState::new(db, cfg.clone(), cache, geo));
    let app = build_app(Arc::clone(&state));

    info!(port = cfg.port, "sitelens listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
