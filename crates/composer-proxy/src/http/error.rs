use axum::http::StatusCode;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use proxy_core::{DecodeError, ProxyError};
use serde_json::json;

use super::{JSON_UTF8, NO_STORE};

/// Response boundary for every handler and middleware failure.
///
/// Serializes the error as `{status, statusText, reason}` and always marks the
/// response as uncacheable.
#[derive(Debug)]
pub struct ApiError(pub ProxyError);

impl From<ProxyError> for ApiError {
    fn from(err: ProxyError) -> Self {
        Self(err)
    }
}

impl From<DecodeError> for ApiError {
    fn from(err: DecodeError) -> Self {
        Self(ProxyError::from(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        if err.is_client_error() {
            tracing::debug!(status = err.status(), error = %err, "request rejected");
        } else {
            tracing::error!(status = err.status(), error = %err, "request failed");
        }

        let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "status": err.status(),
            "statusText": err.status_text(),
            "reason": err.reason(),
        });
        let body = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
        (
            status,
            [(CONTENT_TYPE, JSON_UTF8), (CACHE_CONTROL, NO_STORE)],
            body,
        )
            .into_response()
    }
}
