use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, RawQuery, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use composer_proxy::{ProxyConfig, ProxyServer};
use parking_lot::Mutex;
use reqwest::header::{CACHE_CONTROL, CONTENT_DISPOSITION, WWW_AUTHENTICATE};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use url::Url;

const GOOD_KEY: &str = "good-key";
const ZIP_BYTES: &[u8] = b"PK\x03\x04 pretend this is a plugin archive";
const FEEDS: [&str; 4] = [
    "wordpress-plugin",
    "wordpress-muplugin",
    "library",
    "wpackagist-plugin",
];

#[derive(Clone)]
struct Vendor {
    addr: SocketAddr,
    info_queries: Arc<Mutex<Vec<String>>>,
}

async fn spawn_vendor() -> Result<Vendor> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let vendor = Vendor {
        addr: listener.local_addr()?,
        info_queries: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/composer/v1/{feed}/packages.json", get(vendor_manifest))
        .route("/api.php", get(vendor_download_info))
        .route("/files/{name}", get(vendor_file))
        .with_state(vendor.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(vendor)
}

fn descriptor(vendor: &Vendor, slug: &str, version: &str, feed: &str) -> Value {
    json!({
        "name": format!("gravityforms/{}", slug.trim_start_matches("gravityforms")),
        "description": "Gravity Forms Stripe Add-On",
        "version": version,
        "type": feed,
        "license": "GPL-2.0-or-later",
        "support": { "docs": "https://docs.vendor.test/stripe" },
        "homepage": "https://vendor.test/add-ons/stripe",
        "dist": {
            "type": "zip",
            "url": format!("http://{}/api.php?op=get_plugin&slug={slug}", vendor.addr)
        },
        "require": {
            "vendor/gravityforms-installer": "^1.0",
            "composer/installers": "^1.0 || ^2.0"
        }
    })
}

/// The mirror answers the library feed as a cached copy.
fn manifest_status(feed: &str) -> StatusCode {
    if feed == "library" {
        StatusCode::NON_AUTHORITATIVE_INFORMATION
    } else {
        StatusCode::OK
    }
}

async fn vendor_manifest(
    State(vendor): State<Vendor>,
    Path(feed): Path<String>,
) -> (StatusCode, Json<Value>) {
    let status = manifest_status(&feed);
    let body = Json(json!({
        "packages": {
            "gravityforms/stripe": {
                "dev-master": descriptor(&vendor, "gravityformsstripe", "dev-master", &feed),
                "5.4.0": descriptor(&vendor, "gravityformsstripe", "5.4.0", &feed)
            },
            "gravityforms/gravityforms": {
                "2.8.1": descriptor(&vendor, "gravityforms", "2.8.1", &feed)
            }
        }
    }));
    (status, body)
}

fn serialized_str(value: &str) -> String {
    format!("s:{}:\"{value}\";", value.len())
}

async fn vendor_download_info(
    State(vendor): State<Vendor>,
    RawQuery(query): RawQuery,
) -> String {
    let query = query.unwrap_or_default();
    vendor.info_queries.lock().push(query.clone());
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    let param = |name: &str| {
        pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
            .unwrap_or_default()
    };

    match (param("slug").as_str(), param("key").as_str()) {
        ("broken", _) => "<!doctype html><title>maintenance</title>".to_string(),
        ("gravityformsstripe", GOOD_KEY) => {
            let download = format!("http://{}/files/gravityformsstripe_5.4.0.zip", vendor.addr);
            format!(
                "a:4:{{{}{}{}{}{}{}{}{}}}",
                serialized_str("name"),
                serialized_str("gravityformsstripe"),
                serialized_str("title"),
                serialized_str("Stripe Add-On – Café"),
                serialized_str("version_latest"),
                serialized_str("5.4.0"),
                serialized_str("download_url_latest"),
                serialized_str(&download),
            )
        }
        _ => "a:0:{}".to_string(),
    }
}

async fn vendor_file() -> impl IntoResponse {
    ([(CONTENT_TYPE, "application/zip")], ZIP_BYTES)
}

struct Harness {
    vendor: Vendor,
    proxy: SocketAddr,
    client: Client,
}

impl Harness {
    async fn start() -> Result<Self> {
        let vendor = spawn_vendor().await?;
        let config = ProxyConfig {
            public_base_url: Url::parse("https://proxy.example.test/")?,
            manifest_base_url: Url::parse(&format!("http://{}/composer/v1/", vendor.addr))?,
            api_endpoint: Url::parse(&format!("http://{}/api.php", vendor.addr))?,
            ..ProxyConfig::default()
        };
        let server = ProxyServer::bind(config, "127.0.0.1:0".parse()?).await?;
        let proxy = server.local_addr()?;
        tokio::spawn(server.serve(std::future::pending()));
        Ok(Self {
            vendor,
            proxy,
            client: Client::new(),
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("http://{}{path}", self.proxy))
            .header("x-forwarded-proto", "https")
    }

    fn licensed(&self, path: &str, key: &str) -> reqwest::RequestBuilder {
        self.get(path).basic_auth("licensekey", Some(key))
    }
}

#[tokio::test]
async fn every_feed_route_serves_rewritten_manifest() -> Result<()> {
    let harness = Harness::start().await?;

    for feed in FEEDS {
        for path in [format!("/{feed}"), format!("/{feed}/packages.json")] {
            let response = harness.licensed(&path, GOOD_KEY).send().await?;
            assert_eq!(response.status(), manifest_status(feed), "{path}");
            assert_eq!(response.headers()[CACHE_CONTROL], "no-store");
            let manifest: Value = response.json().await?;

            let packages = manifest["packages"].as_object().expect("packages object");
            assert_eq!(packages.len(), 2);
            for versions in packages.values() {
                for descriptor in versions.as_object().expect("versions object").values() {
                    assert_eq!(descriptor["type"], feed);
                    assert_eq!(
                        descriptor["require"],
                        json!({ "composer/installers": "^1.0 || ^2.0" })
                    );
                    let url = Url::parse(descriptor["dist"]["url"].as_str().expect("dist url"))?;
                    assert_eq!(url.host_str(), Some("proxy.example.test"));
                    assert_eq!(url.path(), "/download");
                    let slug: Vec<_> = url.query_pairs().collect();
                    assert_eq!(slug.len(), 1);
                    assert_eq!(slug[0].0, "slug");
                    assert!(slug[0].1.starts_with("gravityforms"));
                }
            }
            assert_eq!(
                manifest["packages"]["gravityforms/stripe"]["5.4.0"]["dist"]["url"],
                "https://proxy.example.test/download?slug=gravityformsstripe"
            );
        }
    }
    Ok(())
}

#[tokio::test]
async fn download_streams_vendor_binary() -> Result<()> {
    let harness = Harness::start().await?;

    let response = harness
        .licensed("/download?slug=gravityformsstripe", GOOD_KEY)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CACHE_CONTROL], "no-store");
    assert_eq!(
        response.headers()[CONTENT_DISPOSITION],
        "attachment; filename=gravityformsstripe_5.4.0.zip"
    );
    assert_eq!(response.headers()[CONTENT_TYPE], "application/zip");
    assert_eq!(response.bytes().await?.as_ref(), ZIP_BYTES);

    let queries = harness.vendor.info_queries.lock().clone();
    assert_eq!(
        queries,
        vec![format!("op=get_plugin&slug=gravityformsstripe&key={GOOD_KEY}")]
    );
    Ok(())
}

#[tokio::test]
async fn rejected_key_and_unknown_slug_are_not_found() -> Result<()> {
    let harness = Harness::start().await?;

    for (path, key) in [
        ("/download?slug=gravityformsstripe", "wrong-key"),
        ("/download?slug=does-not-exist", GOOD_KEY),
    ] {
        let response = harness.licensed(path, key).send().await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: Value = response.json().await?;
        assert_eq!(
            body,
            json!({ "status": 404, "statusText": "Not Found", "reason": "Unknown download" })
        );
    }
    Ok(())
}

#[tokio::test]
async fn malformed_vendor_payload_is_bad_request() -> Result<()> {
    let harness = Harness::start().await?;

    let response = harness
        .licensed("/download?slug=broken", GOOD_KEY)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await?;
    assert_eq!(body["statusText"], "Bad Request");
    assert!(
        body["reason"]
            .as_str()
            .is_some_and(|reason| reason.starts_with("Invalid upstream response"))
    );
    Ok(())
}

#[tokio::test]
async fn gate_runs_before_routing() -> Result<()> {
    let harness = Harness::start().await?;

    let plain = harness
        .client
        .get(format!("http://{}/unknown-route", harness.proxy))
        .send()
        .await?;
    assert_eq!(plain.status(), StatusCode::BAD_REQUEST);

    let anonymous = harness.get("/unknown-route").send().await?;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        anonymous.headers()[WWW_AUTHENTICATE],
        "Basic realm=\"Gravity Forms Composer Repository\", charset=\"UTF-8\""
    );
    assert_eq!(anonymous.text().await?, "You need to login.");

    let stranger = harness
        .get("/library")
        .basic_auth("someone", Some(GOOD_KEY))
        .send()
        .await?;
    assert_eq!(stranger.status(), StatusCode::UNAUTHORIZED);

    let unknown = harness
        .licensed("/unknown-route", GOOD_KEY)
        .send()
        .await?;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    assert!(harness.vendor.info_queries.lock().is_empty());
    Ok(())
}
