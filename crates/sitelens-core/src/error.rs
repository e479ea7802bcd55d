use thiserror::Error;

/// Errors surfaced by the pure domain layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The client payload failed schema or field validation. Rejected before
    /// any pipeline side effect; the transport layer decides how (or whether)
    /// to surface it on the wire.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Precondition violation inside the visitor identity hasher.
///
/// Only reachable if validation was skipped, so callers treat it as a server
/// fault rather than a client error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("client ip must be non-empty")]
    EmptyIp,
    #[error("user agent must be non-empty")]
    EmptyUserAgent,
}
