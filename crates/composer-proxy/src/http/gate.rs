use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use proxy_core::{Credentials, ProxyError};

use super::error::ApiError;
use crate::server::ProxyState;

const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Runs in front of every route, including the not-found fallback.
///
/// Order matters: transport first, then the login challenge, then credential
/// parsing and the username policy. Accepted credentials are handed to the
/// route through request extensions.
pub async fn require_license(
    State(state): State<Arc<ProxyState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if state.config.require_https && !is_secure(request.uri(), request.headers()) {
        return Err(ProxyError::bad_request("Please use a HTTPS connection.").into());
    }

    let Some(header) = request.headers().get(AUTHORIZATION) else {
        tracing::debug!(path = %request.uri().path(), "no credentials, sending challenge");
        return Ok(challenge(&state.config.realm));
    };
    let header = header
        .to_str()
        .map_err(|_| ProxyError::bad_request("Malformed authorization header."))?;
    let credentials = Credentials::from_header(header)?;
    state.authorizer.authorize(&credentials.user)?;

    request.extensions_mut().insert(credentials);
    Ok(next.run(request).await)
}

/// TLS terminates in front of this service, so the edge's `X-Forwarded-Proto` decides.
fn is_secure(uri: &Uri, headers: &HeaderMap) -> bool {
    if uri.scheme_str() == Some("https") {
        return true;
    }
    headers
        .get(FORWARDED_PROTO)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}

fn challenge(realm: &str) -> Response {
    let value = HeaderValue::from_str(&format!("Basic realm=\"{realm}\", charset=\"UTF-8\""))
        .unwrap_or_else(|_| HeaderValue::from_static("Basic"));
    let mut response = (StatusCode::UNAUTHORIZED, Body::from("You need to login.")).into_response();
    response.headers_mut().insert(WWW_AUTHENTICATE, value);
    response
}
