use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;

use sitelens_core::cache::{DedupCache, PresenceTracker, SessionRecord, SessionStore};
use sitelens_core::event::EngagementDelta;

const DEDUP_PREFIX: &str = "sitelens:uniq:";
const SESSION_PREFIX: &str = "sitelens:sess:";
const PRESENCE_KEY: &str = "sitelens:active";

/// Monotonic session merge, executed atomically server-side so concurrent
/// beacons for one token cannot interleave read-modify-write.
/// KEYS[1] = session key; ARGV = scroll, duration_ms, visibility_delta,
/// now_unix_secs, ttl_secs.
const SESSION_MERGE_SCRIPT: &str = r#"
local scroll = tonumber(redis.call('HGET', KEYS[1], 'scroll') or '0')
local duration = tonumber(redis.call('HGET', KEYS[1], 'duration') or '0')
if tonumber(ARGV[1]) > scroll then scroll = tonumber(ARGV[1]) end
if tonumber(ARGV[2]) > duration then duration = tonumber(ARGV[2]) end
redis.call('HSET', KEYS[1], 'scroll', scroll, 'duration', duration, 'last_seen', ARGV[4])
redis.call('HINCRBY', KEYS[1], 'visibility', ARGV[3])
redis.call('EXPIRE', KEYS[1], ARGV[5])
return 1
"#;

/// Redis-backed dedup cache, session store, and presence tracker.
///
/// One multiplexed connection shared by clone; all three concerns expire by
/// TTL, never by explicit delete.
pub struct RedisBackend {
    conn: MultiplexedConnection,
    merge: redis::Script,
}

impl RedisBackend {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(Self {
            conn,
            merge: redis::Script::new(SESSION_MERGE_SCRIPT),
        })
    }
}

#[async_trait]
impl DedupCache for RedisBackend {
    async fn check_and_record(&self, key: &str, ttl: Duration) -> anyhow::Result<bool> {
        let mut conn = self.conn.clone();
        // SET NX EX: true when the key was set (first sight), false when it
        // already existed. The atomicity lives in Redis, not in the caller.
        let was_set: bool = redis::cmd("SET")
            .arg(format!("{DEDUP_PREFIX}{key}"))
            .arg("")
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(was_set)
    }
}

#[async_trait]
impl SessionStore for RedisBackend {
    async fn apply(
        &self,
        token: &str,
        delta: EngagementDelta,
        ttl: Duration,
    ) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _merged: i64 = self
            .merge
            .key(format!("{SESSION_PREFIX}{token}"))
            .arg(u32::from(delta.scroll_depth))
            .arg(delta.duration_ms)
            .arg(delta.visibility_changes)
            .arg(Utc::now().timestamp())
            .arg(ttl.as_secs().max(1))
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, token: &str) -> anyhow::Result<Option<SessionRecord>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(format!("{SESSION_PREFIX}{token}"))
            .query_async(&mut conn)
            .await?;
        if fields.is_empty() {
            return Ok(None);
        }

        let num = |name: &str| -> u64 {
            fields
                .get(name)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0)
        };
        let last_seen = DateTime::from_timestamp(num("last_seen") as i64, 0)
            .unwrap_or_else(Utc::now);

        Ok(Some(SessionRecord {
            max_scroll_depth: num("scroll").min(100) as u8,
            duration_ms: num("duration"),
            visibility_changes: num("visibility"),
            last_seen,
        }))
    }
}

#[async_trait]
impl PresenceTracker for RedisBackend {
    async fn mark_active(&self, token: &str, ttl: Duration) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        // Sorted set scored by expiry: counting is a range trim + cardinality.
        let expires_at = Utc::now().timestamp() + ttl.as_secs() as i64;
        let _: () = redis::cmd("ZADD")
            .arg(PRESENCE_KEY)
            .arg(expires_at)
            .arg(token)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn count_active(&self) -> anyhow::Result<u64> {
        let mut conn = self.conn.clone();
        let now = Utc::now().timestamp();
        let _: () = redis::cmd("ZREMRANGEBYSCORE")
            .arg(PRESENCE_KEY)
            .arg("-inf")
            .arg(now)
            .query_async(&mut conn)
            .await?;
        let count: u64 = redis::cmd("ZCARD")
            .arg(PRESENCE_KEY)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }
}
