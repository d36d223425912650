use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::{Router, middleware, serve};
use proxy_core::{Authorizer, FeedType, ProxyError};
use tokio::net::TcpListener;
use url::Url;

use crate::config::ProxyConfig;
use crate::http::error::ApiError;
use crate::http::{download, gate, manifest};
use crate::upstream::Upstream;

/// Immutable per-process state shared by every request.
pub struct ProxyState {
    pub config: ProxyConfig,
    pub authorizer: Authorizer,
    pub upstream: Upstream,
    pub download_endpoint: Url,
    pub manifests: HashMap<FeedType, Url>,
}

impl ProxyState {
    pub fn new(config: ProxyConfig) -> Result<Self> {
        config.validate().context("invalid proxy configuration")?;
        let download_endpoint = config.download_endpoint()?;
        let manifests = config.manifest_urls()?;
        let upstream = Upstream::new(config.api_endpoint.clone())?;
        let authorizer = Authorizer::new(config.license_user.clone());
        Ok(Self {
            config,
            authorizer,
            upstream,
            download_endpoint,
            manifests,
        })
    }
}

/// Route table. Every route, the fallbacks included, sits behind the license gate.
///
/// Only `GET` is served; other methods on a known path fall through to the
/// same JSON 404 as an unknown path.
pub fn router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/download", get(download::download))
        .route("/{feed}", get(manifest::feed))
        .route("/{feed}/packages.json", get(manifest::feed))
        .fallback(unknown_route)
        .method_not_allowed_fallback(unknown_route)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            gate::require_license,
        ))
        .with_state(state)
}

async fn unknown_route() -> ApiError {
    ProxyError::not_found("Unknown repository").into()
}

pub struct ProxyServer {
    listener: TcpListener,
    router: Router,
}

impl ProxyServer {
    pub async fn bind(config: ProxyConfig, addr: SocketAddr) -> Result<Self> {
        let state = Arc::new(ProxyState::new(config)?);
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        Ok(Self {
            listener,
            router: router(state),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves until `shutdown` resolves, then drains in-flight requests.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(addr = %self.local_addr()?, "starting composer proxy");
        serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .context("server terminated unexpectedly")?;
        Ok(())
    }
}
