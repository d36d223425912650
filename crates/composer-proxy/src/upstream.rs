use anyhow::{Context, Result};
use bytes::Bytes;
use proxy_core::{ProxyError, ProxyResult};
use reqwest::header::ACCEPT;
use reqwest::{Client, Response, StatusCode};
use url::Url;

const USER_AGENT: &str = concat!("composer-proxy/", env!("CARGO_PKG_VERSION"));

/// Outbound calls to the manifest host and the vendor API.
///
/// No retries: a failed call is reported to the caller as-is.
#[derive(Clone)]
pub struct Upstream {
    client: Client,
    api_endpoint: Url,
}

impl Upstream {
    pub fn new(api_endpoint: Url) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build upstream HTTP client")?;
        Ok(Self {
            client,
            api_endpoint,
        })
    }

    /// Fetches a published manifest document with its status. Non-success statuses are errors.
    pub async fn fetch_manifest(&self, url: &Url) -> ProxyResult<(StatusCode, Bytes)> {
        tracing::debug!(url = %url, "fetching manifest");
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(|err| {
                ProxyError::upstream(format!("failed to fetch manifest {url}: {err}"))
            })?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ProxyError::upstream(format!("failed to read manifest {url}: {err}")))?;
        Ok((status, bytes))
    }

    /// Asks the vendor API where the latest build of `slug` lives.
    ///
    /// The body is returned whatever the status, since the vendor reports
    /// unknown slugs and rejected keys through the payload itself.
    pub async fn download_info(&self, slug: &str, key: &str) -> ProxyResult<String> {
        let url = self.download_info_url(slug, key);
        tracing::debug!(url = %redact_key(&url), "requesting download info");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| {
                ProxyError::upstream(format!("download info request failed: {}", err.without_url()))
            })?;
        tracing::debug!(status = %response.status(), slug, "download info answered");
        response.text().await.map_err(|err| {
            ProxyError::upstream(format!("failed to read download info: {}", err.without_url()))
        })
    }

    /// Opens the binary download; the body is left unread for streaming.
    pub async fn fetch_binary(&self, url: &Url) -> ProxyResult<Response> {
        tracing::debug!(url = %url, "fetching binary");
        self.client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| ProxyError::upstream(format!("failed to fetch {url}: {err}")))
    }

    fn download_info_url(&self, slug: &str, key: &str) -> Url {
        let mut url = self.api_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("op", "get_plugin")
            .append_pair("slug", slug)
            .append_pair("key", key);
        url
    }
}

/// Copy of `url` safe to log: the `key` parameter's value is masked.
pub fn redact_key(url: &Url) -> Url {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(name, value)| {
            let value = if name == "key" {
                "***".to_string()
            } else {
                value.into_owned()
            };
            (name.into_owned(), value)
        })
        .collect();
    let mut redacted = url.clone();
    redacted.set_query(None);
    if !pairs.is_empty() {
        redacted.query_pairs_mut().extend_pairs(pairs);
    }
    redacted
}
