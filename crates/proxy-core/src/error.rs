use thiserror::Error;

use crate::legacy::DecodeError;

/// Every way a proxied request can fail.
///
/// Each variant maps onto an HTTP status, a status phrase and a human-readable
/// reason; the edge service turns any of them into the same JSON error body.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("bad request: {reason}")]
    BadRequest { reason: String },

    #[error("unauthorized: {reason}")]
    Unauthorized { reason: String },

    #[error("not found: {reason}")]
    NotFound { reason: String },

    /// A malformed upstream payload is answered as if the request was invalid.
    #[error("malformed upstream payload: {0}")]
    Decode(#[from] DecodeError),

    #[error("upstream call failed: {reason}")]
    Upstream { reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

/// Result alias for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

impl ProxyError {
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::BadRequest {
            reason: reason.into(),
        }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::NotFound {
            reason: reason.into(),
        }
    }

    pub fn upstream(reason: impl Into<String>) -> Self {
        Self::Upstream {
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Numeric HTTP status for this error.
    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest { .. } | Self::Decode(_) => 400,
            Self::Unauthorized { .. } => 401,
            Self::NotFound { .. } => 404,
            Self::Upstream { .. } | Self::Internal { .. } => 500,
        }
    }

    pub fn status_text(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } | Self::Decode(_) => "Bad Request",
            Self::Unauthorized { .. } => "Unauthorized",
            Self::NotFound { .. } => "Not Found",
            Self::Upstream { .. } | Self::Internal { .. } => "Unknown Error",
        }
    }

    /// Caller-facing explanation. Never includes upstream credentials.
    pub fn reason(&self) -> String {
        match self {
            Self::BadRequest { reason }
            | Self::Unauthorized { reason }
            | Self::NotFound { reason }
            | Self::Upstream { reason }
            | Self::Internal { reason } => reason.clone(),
            Self::Decode(err) => format!("Invalid upstream response: {err}"),
        }
    }

    /// True for errors caused by the caller rather than by this service or the upstream.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status())
    }
}
