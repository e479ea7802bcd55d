use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use sitelens_core::cache::{DedupCache, PresenceTracker, SessionRecord, SessionStore};
use sitelens_core::event::EngagementDelta;

/// In-process cache backend.
///
/// The default when no Redis URL is configured, and what integration tests
/// run against. Entries carry their expiry instant and are pruned lazily on
/// access, so "today" resets without a background sweep.
#[derive(Default)]
pub struct MemoryBackend {
    dedup: Mutex<HashMap<String, Instant>>,
    sessions: Mutex<HashMap<String, (SessionRecord, Instant)>>,
    presence: Mutex<HashMap<String, Instant>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DedupCache for MemoryBackend {
    async fn check_and_record(&self, key: &str, ttl: Duration) -> anyhow::Result<bool> {
        let now = Instant::now();
        let mut map = self.dedup.lock().await;
        // The map lock makes read-then-insert a single atomic step, matching
        // Redis SET NX semantics: at most one caller per key sees "absent".
        match map.get(key) {
            Some(expiry) if *expiry > now => Ok(false),
            _ => {
                map.insert(key.to_string(), now + ttl);
                Ok(true)
            }
        }
    }
}

#[async_trait]
impl SessionStore for MemoryBackend {
    async fn apply(
        &self,
        token: &str,
        delta: EngagementDelta,
        ttl: Duration,
    ) -> anyhow::Result<()> {
        let now = Instant::now();
        let mut map = self.sessions.lock().await;

        let live = map.get(token).filter(|(_, expiry)| *expiry > now);
        let merged = match live {
            Some((record, _)) => SessionRecord {
                max_scroll_depth: record.max_scroll_depth.max(delta.scroll_depth),
                duration_ms: record.duration_ms.max(delta.duration_ms),
                visibility_changes: record.visibility_changes + u64::from(delta.visibility_changes),
                last_seen: Utc::now(),
            },
            None => SessionRecord {
                max_scroll_depth: delta.scroll_depth,
                duration_ms: delta.duration_ms,
                visibility_changes: u64::from(delta.visibility_changes),
                last_seen: Utc::now(),
            },
        };

        map.insert(token.to_string(), (merged, now + ttl));
        Ok(())
    }

    async fn get(&self, token: &str) -> anyhow::Result<Option<SessionRecord>> {
        let now = Instant::now();
        let map = self.sessions.lock().await;
        Ok(map
            .get(token)
            .filter(|(_, expiry)| *expiry > now)
            .map(|(record, _)| record.clone()))
    }
}

#[async_trait]
impl PresenceTracker for MemoryBackend {
    async fn mark_active(&self, token: &str, ttl: Duration) -> anyhow::Result<()> {
        let mut map = self.presence.lock().await;
        map.insert(token.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn count_active(&self) -> anyhow::Result<u64> {
        let now = Instant::now();
        let mut map = self.presence.lock().await;
        map.retain(|_, expiry| *expiry > now);
        Ok(map.len() as u64)
    }
}
