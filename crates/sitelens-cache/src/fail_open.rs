use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use sitelens_core::cache::DedupCache;

/// Fail-open wrapper around the dedup cache.
///
/// Every call site gets the documented degradation uniformly: a backend
/// error or a call exceeding the bounded timeout yields `true`
/// (assume unique) instead of propagating. Undercounting a returning
/// visitor during an outage beats zeroing the unique-visitor metric for
/// the outage's duration.
pub struct FailOpenDedup {
    inner: Arc<dyn DedupCache>,
    timeout: Duration,
}

impl FailOpenDedup {
    pub fn new(inner: Arc<dyn DedupCache>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Never errors and never hangs past `timeout`.
    pub async fn check_and_record(&self, key: &str, ttl: Duration) -> bool {
        match tokio::time::timeout(self.timeout, self.inner.check_and_record(key, ttl)).await {
            Ok(Ok(unique)) => unique,
            Ok(Err(e)) => {
                warn!(error = %e, "dedup cache error — assuming unique");
                true
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "dedup cache timed out — assuming unique");
                true
            }
        }
    }
}
