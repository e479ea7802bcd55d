use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use crate::error::IdentityError;

/// A daily-rotating pseudonymous visitor identity.
///
/// 256-bit SHA-256 digest over `(ip, user_agent, utc_calendar_day)`. The
/// digest is computed fresh per request and never persisted — only its
/// membership in the dedup cache is recorded. Hashing the calendar day (not
/// a timestamp) is the rotation mechanism: the same client collides all day
/// and rotates to a new identity at midnight UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisitorIdentity([u8; 32]);

impl VisitorIdentity {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex form used as the dedup-cache key.
    pub fn cache_key(&self) -> String {
        hex::encode(self.0)
    }
}

/// Derive the visitor identity for one request.
///
/// `ip` and `user_agent` must be non-empty — both come from the request
/// envelope, so an empty value here means validation was skipped upstream
/// and the caller gets a hard error, not a silent fallback.
pub fn visitor_identity(
    ip: &str,
    user_agent: &str,
    utc_day: NaiveDate,
) -> Result<VisitorIdentity, IdentityError> {
    if ip.is_empty() {
        return Err(IdentityError::EmptyIp);
    }
    if user_agent.is_empty() {
        return Err(IdentityError::EmptyUserAgent);
    }

    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hasher.update(b"|");
    hasher.update(user_agent.as_bytes());
    hasher.update(b"|");
    hasher.update(utc_day.format("%Y-%m-%d").to_string().as_bytes());

    Ok(VisitorIdentity(hasher.finalize().into()))
}
