use std::sync::Arc;

use anyhow::Result;
use duckdb::Connection;
use tokio::sync::Mutex;
use tracing::info;

use sitelens_core::event::PersistedPageview;

use crate::schema::init_sql;

/// The durable store.
///
/// DuckDB is single-writer: concurrent reads are fine, but concurrent writes
/// cause contention. The connection lives behind `Arc<tokio::sync::Mutex<_>>`
/// so the async runtime serialises writes while the struct stays cheap to
/// clone and share across Axum handlers.
pub struct DuckDbBackend {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

/// Slim row shape for dashboard reads and integration tests.
#[derive(Debug, Clone)]
pub struct StoredPageview {
    pub id: String,
    pub event_type: String,
    pub path: String,
    pub referrer_domain: Option<String>,
    pub referrer_category: String,
    pub country: Option<String>,
    pub is_unique: bool,
    pub is_bot: bool,
}

impl DuckDbBackend {
    /// Open (or create) a DuckDB database file at `path`.
    ///
    /// `memory_limit` is a DuckDB size string such as `"1GB"` or `"512MB"`,
    /// read from `Config.duckdb_memory_limit` at the call site.
    pub fn open(path: &str, memory_limit: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(&init_sql(memory_limit))?;
        info!(
            "DuckDB opened at {} with memory_limit={}, threads=2",
            path, memory_limit
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an **in-memory** DuckDB database.
    ///
    /// Intended for tests only — data is discarded when the struct is
    /// dropped.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(&init_sql("1GB"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Cheap liveness probe for the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT 1")?;
        let one: i64 = stmt.query_row([], |row| row.get(0))?;
        anyhow::ensure!(one == 1, "unexpected ping result");
        Ok(())
    }

    /// Persist one event row.
    ///
    /// Every derived value (`is_unique`, `is_bot`, country, referrer
    /// category/domain) is computed by the pipeline before this call; the
    /// write itself is a single parameterized insert with no conditional
    /// logic, keeping the critical section short under concurrent load.
    pub async fn insert_pageview(&self, row: &PersistedPageview) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO pageviews (
                id, event_type, event_name, event_ts, path,
                referrer_url, referrer_domain, referrer_category,
                browser, os, device_type,
                screen, viewport, language, country,
                utm_source, utm_medium, utm_campaign, utm_term, utm_content,
                duration_ms, scroll_depth, visibility_changes,
                is_unique, is_bot, created_at
            ) VALUES (
                ?1,  ?2,  ?3,  ?4,  ?5,
                ?6,  ?7,  ?8,
                ?9,  ?10, ?11,
                ?12, ?13, ?14, ?15,
                ?16, ?17, ?18, ?19, ?20,
                ?21, ?22, ?23,
                ?24, ?25, ?26
            )"#,
            duckdb::params![
                row.id,
                row.event_type,
                row.event_name,
                row.event_ts.to_rfc3339(),
                row.path,
                row.referrer_url,
                row.referrer_domain,
                row.referrer_category,
                row.browser,
                row.os,
                row.device_type,
                row.screen,
                row.viewport,
                row.language,
                row.country,
                row.utm_source,
                row.utm_medium,
                row.utm_campaign,
                row.utm_term,
                row.utm_content,
                row.duration_ms,
                row.scroll_depth,
                row.visibility_changes,
                row.is_unique,
                row.is_bot,
                row.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn count_pageviews(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT COUNT(*) FROM pageviews")?;
        let count: i64 = stmt.query_row([], |row| row.get(0))?;
        Ok(count)
    }

    /// Most recent rows, newest first. The dashboard collaborator reads
    /// through this; integration tests use it to assert persisted fields.
    pub async fn recent_pageviews(&self, limit: i64) -> Result<Vec<StoredPageview>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, event_type, path, referrer_domain, referrer_category, \
                    country, is_unique, is_bot \
             FROM pageviews \
             ORDER BY created_at DESC, id DESC \
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(duckdb::params![limit], |row| {
            Ok(StoredPageview {
                id: row.get(0)?,
                event_type: row.get(1)?,
                path: row.get(2)?,
                referrer_domain: row.get(3)?,
                referrer_category: row.get(4)?,
                country: row.get(5)?,
                is_unique: row.get(6)?,
                is_bot: row.get(7)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
