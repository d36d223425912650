use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Extension, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Uri};
use axum::response::{IntoResponse, Response};
use proxy_core::legacy::{self, Value};
use proxy_core::{Credentials, ProxyError};
use url::Url;
use url::form_urlencoded;

use super::NO_STORE;
use super::error::ApiError;
use crate::server::ProxyState;

const LATEST_URL_KEY: &str = "download_url_latest";

/// `GET /download?slug=<slug>`
///
/// The Basic-auth secret is the caller's vendor API key. The vendor answers
/// unknown slugs and rejected keys the same way, so both end up as 404 here.
pub async fn download(
    State(state): State<Arc<ProxyState>>,
    Extension(credentials): Extension<Credentials>,
    uri: Uri,
) -> Result<Response, ApiError> {
    let slug = query_param(&uri, "slug")
        .filter(|slug| !slug.is_empty())
        .ok_or_else(|| ProxyError::bad_request("Missing slug parameter."))?;

    let payload = state
        .upstream
        .download_info(&slug, &credentials.secret)
        .await?;
    let info = legacy::decode(&payload)?;
    let target = latest_download_url(&info).ok_or_else(|| {
        tracing::warn!(slug = %slug, "no download available for slug");
        ProxyError::not_found("Unknown download")
    })?;
    let target = Url::parse(target)
        .map_err(|err| ProxyError::upstream(format!("vendor returned an invalid download URL: {err}")))?;
    let filename = attachment_name(&target).unwrap_or_else(|| slug.clone());

    let upstream = state.upstream.fetch_binary(&target).await?;
    tracing::info!(slug = %slug, filename = %filename, status = %upstream.status(), "streaming download");

    let mut headers = HeaderMap::new();
    for name in [CONTENT_TYPE, CONTENT_LENGTH] {
        if let Some(value) = upstream.headers().get(&name) {
            headers.insert(name, value.clone());
        }
    }
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename={filename}"))
            .map_err(|_| ProxyError::upstream("download file name is not a valid header value"))?,
    );

    let status = upstream.status();
    let body = Body::from_stream(upstream.bytes_stream());
    Ok((status, headers, body).into_response())
}

fn query_param(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

fn latest_download_url(info: &Value) -> Option<&str> {
    info.get(LATEST_URL_KEY)
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
}

/// Last path segment of the resolved download URL.
fn attachment_name(url: &Url) -> Option<String> {
    url.path_segments()?
        .next_back()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_slug_from_query() {
        let uri: Uri = "/download?slug=gravityformsstripe&other=1".parse().unwrap();
        assert_eq!(query_param(&uri, "slug").as_deref(), Some("gravityformsstripe"));
        let uri: Uri = "/download?slug=a%20b".parse().unwrap();
        assert_eq!(query_param(&uri, "slug").as_deref(), Some("a b"));
        let uri: Uri = "/download".parse().unwrap();
        assert_eq!(query_param(&uri, "slug"), None);
    }

    #[test]
    fn finds_latest_download_url() {
        let info = legacy::decode(
            r#"a:2:{s:7:"version";s:5:"2.8.1";s:19:"download_url_latest";s:34:"https://cdn.vendor.test/gf_2.8.zip";}"#,
        )
        .unwrap();
        assert_eq!(
            latest_download_url(&info),
            Some("https://cdn.vendor.test/gf_2.8.zip")
        );
    }

    #[test]
    fn missing_or_empty_latest_url_is_absent() {
        for raw in [
            r#"a:1:{s:7:"version";s:5:"2.8.1";}"#,
            r#"a:1:{s:19:"download_url_latest";s:0:"";}"#,
            r#"a:1:{s:19:"download_url_latest";b:0;}"#,
            "b:0;",
            "N;",
        ] {
            let info = legacy::decode(raw).unwrap();
            assert_eq!(latest_download_url(&info), None, "{raw}");
        }
    }

    #[test]
    fn attachment_name_is_last_path_segment() {
        let url = Url::parse("https://cdn.vendor.test/releases/gravityforms_2.8.1.zip?sig=abc").unwrap();
        assert_eq!(attachment_name(&url).as_deref(), Some("gravityforms_2.8.1.zip"));
        let url = Url::parse("https://cdn.vendor.test/releases/").unwrap();
        assert_eq!(attachment_name(&url), None);
    }
}
