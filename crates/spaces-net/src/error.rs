use thiserror::Error;

use spaces_store::StoreError;

/// Failure classes of a backend call.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP 401.  The stored session has already been wiped when this is
    /// returned; callers must not retry.
    #[error("session expired")]
    SessionExpired,

    /// HTTP 403.  Recoverable; the caller decides how to surface it.
    #[error("access denied")]
    Forbidden,

    #[error("backend returned HTTP {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Decode(String),

    /// Signup or login answered 2xx with an `{"error": ...}` body.
    #[error("{0}")]
    AuthRejected(String),

    #[error("local store error: {0}")]
    Local(#[from] StoreError),
}

impl GatewayError {
    pub fn is_forbidden(&self) -> bool {
        matches!(self, GatewayError::Forbidden)
    }

    /// True when the whole client must stop: nothing else will succeed
    /// without a new login.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, GatewayError::SessionExpired)
    }
}

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("no active session")]
    NoSession,

    #[error("invalid socket url: {0}")]
    Url(#[from] url::ParseError),

    #[error("unsupported url scheme: {0}")]
    Scheme(String),
}
