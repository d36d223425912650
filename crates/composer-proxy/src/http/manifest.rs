use std::sync::Arc;

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use proxy_core::{FeedType, Manifest, ProxyError};

use super::error::ApiError;
use super::{JSON_UTF8, NO_STORE};
use crate::server::ProxyState;

/// `GET /{feed}` and `GET /{feed}/packages.json`
///
/// A segment that does not even decode (e.g. invalid UTF-8) is just another
/// unknown repository.
pub async fn feed(
    State(state): State<Arc<ProxyState>>,
    feed: Result<Path<String>, PathRejection>,
) -> Result<Response, ApiError> {
    let Ok(Path(feed)) = feed else {
        return Err(ProxyError::not_found("Unknown repository").into());
    };
    let feed: FeedType = feed.parse()?;
    let (status, manifest) = proxy_manifest(&state, feed).await?;

    tracing::info!(
        feed = %feed,
        packages = manifest.packages.len(),
        versions = manifest.version_count(),
        "serving manifest"
    );
    let body = serde_json::to_string_pretty(&manifest)
        .map_err(|err| ProxyError::internal(format!("failed to encode manifest: {err}")))?;
    Ok((status, [(CONTENT_TYPE, JSON_UTF8), (CACHE_CONTROL, NO_STORE)], body).into_response())
}

/// Fetches the published manifest for `feed` and routes its downloads through this proxy.
///
/// The upstream (success) status is returned alongside so it can be passed on.
pub async fn proxy_manifest(
    state: &ProxyState,
    feed: FeedType,
) -> Result<(StatusCode, Manifest), ProxyError> {
    let url = state
        .manifests
        .get(&feed)
        .ok_or_else(|| ProxyError::not_found("Unknown repository"))?;
    let (status, bytes) = state.upstream.fetch_manifest(url).await?;
    let manifest = Manifest::from_slice(&bytes)?
        .into_rewritten(&state.download_endpoint, &state.config.installer_dependency)?;
    Ok((status, manifest))
}
