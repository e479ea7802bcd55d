//! Cache collaborator contracts.
//!
//! The dedup cache, session store, and presence tracker are external
//! services reached through these narrow traits and injected into the
//! server at construction time, so tests can substitute fakes and no
//! component holds ambient global state.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::event::EngagementDelta;

/// Presence-only "seen today" record per visitor identity.
///
/// `check_and_record` must be atomic set-if-absent: for a given key within
/// one TTL window, at most one caller observes `true`. Entries end by
/// expiry, never by explicit delete.
///
/// Implementations return `Err` on backend failure; the fail-open decorator
/// in `sitelens-cache` is the one place that turns those errors into the
/// documented assume-unique default.
#[async_trait]
pub trait DedupCache: Send + Sync + 'static {
    /// Returns `true` if `key` was absent and is now recorded (first sight
    /// within the rotation window), `false` if it was already present.
    async fn check_and_record(&self, key: &str, ttl: Duration) -> anyhow::Result<bool>;
}

/// Session-scoped running aggregates, keyed by the client session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub max_scroll_depth: u8,
    pub duration_ms: u64,
    pub visibility_changes: u64,
    pub last_seen: DateTime<Utc>,
}

/// Tracks session aggregates across the beacon calls of one page lifetime.
///
/// `apply` merges monotonically — scroll depth is max'd, cumulative duration
/// never decreases, visibility changes are summed — so out-of-order beacon
/// delivery cannot move aggregates backward. An unknown token is not an
/// error: it creates the session.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    async fn apply(
        &self,
        token: &str,
        delta: EngagementDelta,
        ttl: Duration,
    ) -> anyhow::Result<()>;

    /// Current aggregates for a live session, if any.
    async fn get(&self, token: &str) -> anyhow::Result<Option<SessionRecord>>;
}

/// Short-TTL "active right now" markers, one per session token.
#[async_trait]
pub trait PresenceTracker: Send + Sync + 'static {
    async fn mark_active(&self, token: &str, ttl: Duration) -> anyhow::Result<()>;

    /// Number of distinct sessions currently active. An `Err` here means
    /// "unknown" — callers must not collapse it to zero, which is a
    /// legitimate real value.
    async fn count_active(&self) -> anyhow::Result<u64>;
}
