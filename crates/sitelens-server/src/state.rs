use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sitelens_cache::{CacheSet, FailOpenDedup};
use sitelens_core::cache::{PresenceTracker, SessionStore};
use sitelens_core::config::Config;
use sitelens_duckdb::DuckDbBackend;

use crate::geo::GeoResolver;

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
///
/// Requests are shared-nothing: everything here is either read-only (config,
/// GeoIP reader) or an injected collaborator reached through its narrow
/// contract. The only in-process mutation is the diagnostic counters.
pub struct AppState {
    pub db: Arc<DuckDbBackend>,

    pub config: Arc<Config>,

    /// Dedup cache behind the fail-open decorator — handlers can only get
    /// the degraded-safe answer, never a backend error.
    pub dedup: FailOpenDedup,

    pub sessions: Arc<dyn SessionStore>,

    pub presence: Arc<dyn PresenceTracker>,

    pub geo: GeoResolver,

    /// Times the GET image-beacon swallowed a failure behind the pixel.
    /// The wire gives no signal by design, so this counter is the only way
    /// to see the invisible path from the inside.
    pixel_drops: AtomicU64,

    /// Durable-store write failures across both transports.
    store_failures: AtomicU64,
}

impl AppState {
    pub fn new(db: DuckDbBackend, config: Config, cache: CacheSet, geo: GeoResolver) -> Self {
        let dedup = FailOpenDedup::new(cache.dedup, config.dependency_timeout());
        Self {
            db: Arc::new(db),
            config: Arc::new(config),
            dedup,
            sessions: cache.sessions,
            presence: cache.presence,
            geo,
            pixel_drops: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
        }
    }

    pub fn record_pixel_drop(&self) {
        self.pixel_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pixel_drops(&self) -> u64 {
        self.pixel_drops.load(Ordering::Relaxed)
    }

    pub fn record_store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn store_failures(&self) -> u64 {
        self.store_failures.load(Ordering::Relaxed)
    }
}
