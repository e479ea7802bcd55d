/// DuckDB initialization SQL.
///
/// Executed once at database open time via `Connection::execute_batch`.
/// All statements use `IF NOT EXISTS` so they are safe to re-run on every
/// startup.
///
/// `memory_limit` is passed at runtime from `Config.duckdb_memory_limit`
/// (env `SITELENS_DUCKDB_MEMORY`, default `"1GB"`). An explicit limit is
/// required — the DuckDB default (80% of system RAM) is not acceptable for
/// a server process. `SET threads = 2` bounds the background pool for
/// single-writer embedded use.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- PAGEVIEWS (insert-only)
-- ===========================================
-- One row per successfully decoded event, immutable after insert. There is
-- deliberately no IP, user-agent, or visitor-identity column: uniqueness is
-- decided before the write and only the boolean survives.
CREATE TABLE IF NOT EXISTS pageviews (
    id                  VARCHAR PRIMARY KEY,       -- uuid v4
    event_type          VARCHAR NOT NULL,          -- 'pageview' or custom
    event_name          VARCHAR,
    event_ts            TIMESTAMP NOT NULL,        -- client-asserted, validated
    path                VARCHAR NOT NULL,
    referrer_url        VARCHAR,
    referrer_domain     VARCHAR,
    referrer_category   VARCHAR NOT NULL,          -- direct / search / social / external
    browser             VARCHAR,
    os                  VARCHAR,
    device_type         VARCHAR,
    screen              VARCHAR,                   -- 'WxH'
    viewport            VARCHAR,                   -- 'WxH'
    language            VARCHAR,
    country             VARCHAR,                   -- ISO 3166-1 alpha-2, NULL when unresolved
    utm_source          VARCHAR,
    utm_medium          VARCHAR,
    utm_campaign        VARCHAR,
    utm_term            VARCHAR,
    utm_content         VARCHAR,
    duration_ms         BIGINT,
    scroll_depth        INTEGER,
    visibility_changes  INTEGER,
    is_unique           BOOLEAN NOT NULL,          -- dedup decision at write time
    is_bot              BOOLEAN NOT NULL,
    created_at          TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_pageviews_created  ON pageviews(created_at);
CREATE INDEX IF NOT EXISTS idx_pageviews_path     ON pageviews(path);
CREATE INDEX IF NOT EXISTS idx_pageviews_country  ON pageviews(country);
"#
    )
}
