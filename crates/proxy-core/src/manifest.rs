//! Typed Composer (v1) manifest as published by the batch exporter, and the
//! rewrite that routes every download through this proxy.

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};
use url::Url;

use crate::error::{ProxyError, ProxyResult};

pub const INSTALLER_PACKAGE: &str = "composer/installers";
pub const INSTALLER_CONSTRAINT: &str = "^1.0 || ^2.0";

/// Package name to constraint.
pub type Requirements = IndexMap<String, String>;

/// The single dependency every proxied package declares.
pub fn installer_requirement() -> Requirements {
    Requirements::from([(INSTALLER_PACKAGE.to_owned(), INSTALLER_CONSTRAINT.to_owned())])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Package name, then version label.
    #[serde(deserialize_with = "map_or_empty_list")]
    pub packages: IndexMap<String, IndexMap<String, PackageDescriptor>>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub version: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support: Option<Support>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    pub dist: Dist,
    #[serde(default, deserialize_with = "map_or_empty_list")]
    pub require: Requirements,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Support {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dist {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Manifest {
    pub fn from_slice(bytes: &[u8]) -> ProxyResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|err| ProxyError::upstream(format!("manifest is not valid JSON: {err}")))
    }

    /// Points every version's `dist.url` at `download_endpoint` and replaces
    /// its `require` with `requirement`. Everything else is carried over.
    pub fn into_rewritten(
        mut self,
        download_endpoint: &Url,
        requirement: &Requirements,
    ) -> ProxyResult<Self> {
        for (package, versions) in self.packages.iter_mut() {
            for (version, descriptor) in versions.iter_mut() {
                let slug = descriptor.slug().ok_or_else(|| {
                    ProxyError::upstream(format!(
                        "{package} {version} has no slug in its distribution URL"
                    ))
                })?;
                descriptor.dist.url = download_url(download_endpoint, &slug).into();
                descriptor.require = requirement.clone();
            }
        }
        Ok(self)
    }

    pub fn version_count(&self) -> usize {
        self.packages.values().map(IndexMap::len).sum()
    }
}

impl PackageDescriptor {
    /// Upstream package identifier carried in the `slug` query parameter of `dist.url`.
    pub fn slug(&self) -> Option<String> {
        let url = Url::parse(&self.dist.url).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == "slug")
            .map(|(_, value)| value.into_owned())
            .filter(|slug| !slug.is_empty())
    }
}

/// `<endpoint>?slug=<slug>`, dropping any query the endpoint already had.
pub fn download_url(endpoint: &Url, slug: &str) -> Url {
    let mut url = endpoint.clone();
    url.set_query(None);
    url.query_pairs_mut().append_pair("slug", slug);
    url
}

// The exporter writes empty PHP arrays, which encode as `[]` rather than `{}`.
fn map_or_empty_list<'de, D, T>(deserializer: D) -> Result<IndexMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shape<T> {
        Map(IndexMap<String, T>),
        List(Vec<JsonValue>),
    }

    match Shape::deserialize(deserializer)? {
        Shape::Map(map) => Ok(map),
        Shape::List(items) if items.is_empty() => Ok(IndexMap::new()),
        Shape::List(_) => Err(D::Error::custom("expected an object, found a non-empty array")),
    }
}
