pub mod fail_open;
pub mod memory;
pub mod redis_backend;

use std::sync::Arc;

use sitelens_core::cache::{DedupCache, PresenceTracker, SessionStore};

pub use fail_open::FailOpenDedup;
pub use memory::MemoryBackend;
pub use redis_backend::RedisBackend;

/// The three cache collaborators, ready for injection into the server.
#[derive(Clone)]
pub struct CacheSet {
    pub dedup: Arc<dyn DedupCache>,
    pub sessions: Arc<dyn SessionStore>,
    pub presence: Arc<dyn PresenceTracker>,
}

/// Connect the configured backend: a `redis://` URL selects Redis, `None`
/// the in-process memory backend.
///
/// A Redis URL that cannot be reached is a startup failure — degrading to
/// memory silently would change the dedup scope from the cluster to one
/// process.
pub async fn connect(cache_url: Option<&str>) -> anyhow::Result<CacheSet> {
    match cache_url {
        Some(url) => {
            let backend = Arc::new(RedisBackend::connect(url).await?);
            Ok(CacheSet {
                dedup: backend.clone(),
                sessions: backend.clone(),
                presence: backend,
            })
        }
        None => {
            let backend = Arc::new(MemoryBackend::new());
            Ok(CacheSet {
                dedup: backend.clone(),
                sessions: backend.clone(),
                presence: backend,
            })
        }
    }
}
