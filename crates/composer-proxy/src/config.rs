use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use proxy_core::FeedType;
use proxy_core::auth::LICENSE_KEY_USER;
use proxy_core::manifest::{Requirements, installer_requirement};
use serde::Deserialize;
use serde_yaml_bw as serde_yaml;
use url::Url;

const DEFAULT_PUBLIC_BASE_URL: &str = "https://gf-composer-proxy.arnaud-ritti.workers.dev/";
const DEFAULT_MANIFEST_BASE_URL: &str =
    "https://arnaud-ritti.github.io/gravityforms-composer-bridge/composer/v1/";
const DEFAULT_API_ENDPOINT: &str =
    "https://gravityapi.com/wp-content/plugins/gravitymanager/api.php";
const DEFAULT_REALM: &str = "Gravity Forms Composer Repository";

const ENV_PREFIX: &str = "COMPOSER_PROXY_";

/// Read-only settings for the proxy, fixed at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    /// Externally reachable origin of this service; downloads are served from `<base>/download`.
    pub public_base_url: Url,
    /// Where the exporter publishes `<feed>/packages.json`.
    pub manifest_base_url: Url,
    /// Vendor endpoint answering `op=get_plugin` download-info requests.
    pub api_endpoint: Url,
    pub license_user: String,
    pub realm: String,
    pub require_https: bool,
    pub installer_dependency: Requirements,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            public_base_url: default_url(DEFAULT_PUBLIC_BASE_URL),
            manifest_base_url: default_url(DEFAULT_MANIFEST_BASE_URL),
            api_endpoint: default_url(DEFAULT_API_ENDPOINT),
            license_user: LICENSE_KEY_USER.to_string(),
            realm: DEFAULT_REALM.to_string(),
            require_https: true,
            installer_dependency: installer_requirement(),
        }
    }
}

impl ProxyConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file {:?}", path))?;
        Ok(config)
    }

    /// Applies `COMPOSER_PROXY_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_overrides(|name| env::var(name).ok())
    }

    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |suffix: &str| {
            let name = format!("{ENV_PREFIX}{suffix}");
            lookup(&name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(|value| (name, value))
        };

        if let Some((name, value)) = var("PUBLIC_BASE_URL") {
            self.public_base_url = parse_url(&name, &value)?;
        }
        if let Some((name, value)) = var("MANIFEST_BASE_URL") {
            self.manifest_base_url = parse_url(&name, &value)?;
        }
        if let Some((name, value)) = var("API_ENDPOINT") {
            self.api_endpoint = parse_url(&name, &value)?;
        }
        if let Some((_, value)) = var("LICENSE_USER") {
            self.license_user = value;
        }
        if let Some((_, value)) = var("REALM") {
            self.realm = value;
        }
        if let Some((name, value)) = var("REQUIRE_HTTPS") {
            self.require_https = match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => bail!("{name} must be a boolean, got `{other}`"),
            };
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, url) in [
            ("public_base_url", &self.public_base_url),
            ("manifest_base_url", &self.manifest_base_url),
            ("api_endpoint", &self.api_endpoint),
        ] {
            if !matches!(url.scheme(), "http" | "https") {
                bail!("{field} must be an http(s) URL, got `{url}`");
            }
        }
        if self.license_user.is_empty() {
            bail!("license_user must not be empty");
        }
        if self
            .realm
            .chars()
            .any(|ch| ch == '"' || ch == '\\' || ch.is_control())
        {
            bail!("realm must not contain quotes, backslashes or control characters");
        }
        if self.installer_dependency.is_empty() {
            bail!("installer_dependency must declare at least one package");
        }
        Ok(())
    }

    /// `<public_base_url>/download`
    pub fn download_endpoint(&self) -> Result<Url> {
        directory(&self.public_base_url)
            .join("download")
            .context("failed to derive download endpoint")
    }

    /// Manifest location for every known feed.
    pub fn manifest_urls(&self) -> Result<HashMap<FeedType, Url>> {
        let base = directory(&self.manifest_base_url);
        FeedType::ALL
            .into_iter()
            .map(|feed| {
                base.join(&feed.manifest_path())
                    .map(|url| (feed, url))
                    .with_context(|| format!("failed to derive manifest URL for {feed}"))
            })
            .collect()
    }
}

fn default_url(value: &str) -> Url {
    Url::parse(value).expect("built-in default URL must parse")
}

fn parse_url(name: &str, value: &str) -> Result<Url> {
    Url::parse(value).with_context(|| format!("{name} is not a valid URL"))
}

// `Url::join` replaces the last segment unless the base ends with a slash.
fn directory(url: &Url) -> Url {
    let mut url = url.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url
}
