use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    /// Path to the MaxMind database. `None` disables geo resolution;
    /// a configured path that cannot be opened is fatal at startup.
    pub geoip_path: Option<String>,
    /// Allow-listed origins for CORS. Empty list mirrors any origin
    /// (the tracker script is embedded on third-party sites).
    pub cors_origins: Vec<String>,
    /// Cache backend URL (`redis://...`). `None` selects the in-process
    /// memory backend.
    pub cache_url: Option<String>,
    /// Dedup entry lifetime — aligned with the identity rotation window.
    pub dedup_ttl_secs: u64,
    /// Session inactivity lifetime.
    pub session_ttl_secs: u64,
    /// Active-visitor marker lifetime.
    pub presence_ttl_secs: u64,
    /// Upper bound on any single cache or store call.
    pub dependency_timeout_ms: u64,
    pub duckdb_memory_limit: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            port: std::env::var("SITELENS_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: std::env::var("SITELENS_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            geoip_path: std::env::var("SITELENS_GEOIP_PATH").ok().filter(|p| !p.is_empty()),
            cors_origins: std::env::var("SITELENS_CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            cache_url: std::env::var("SITELENS_CACHE_URL").ok().filter(|u| !u.is_empty()),
            dedup_ttl_secs: std::env::var("SITELENS_DEDUP_TTL_SECS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()
                .unwrap_or(86_400),
            session_ttl_secs: std::env::var("SITELENS_SESSION_TTL_SECS")
                .unwrap_or_else(|_| "1800".to_string())
                .parse()
                .unwrap_or(1_800),
            presence_ttl_secs: std::env::var("SITELENS_PRESENCE_TTL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
            dependency_timeout_ms: std::env::var("SITELENS_DEPENDENCY_TIMEOUT_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .unwrap_or(2_000),
            duckdb_memory_limit: std::env::var("SITELENS_DUCKDB_MEMORY")
                .unwrap_or_else(|_| "1GB".to_string()),
        })
    }

    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn presence_ttl(&self) -> Duration {
        Duration::from_secs(self.presence_ttl_secs)
    }

    pub fn dependency_timeout(&self) -> Duration {
        Duration::from_millis(self.dependency_timeout_ms)
    }
}
