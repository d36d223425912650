use std::fmt;
use std::str::FromStr;

use crate::error::ProxyError;

/// Package categories published by the manifest exporter, one route each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedType {
    WordpressPlugin,
    WordpressMuplugin,
    Library,
    WpackagistPlugin,
}

impl FeedType {
    pub const ALL: [FeedType; 4] = [
        FeedType::WordpressPlugin,
        FeedType::WordpressMuplugin,
        FeedType::Library,
        FeedType::WpackagistPlugin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WordpressPlugin => "wordpress-plugin",
            Self::WordpressMuplugin => "wordpress-muplugin",
            Self::Library => "library",
            Self::WpackagistPlugin => "wpackagist-plugin",
        }
    }

    /// Path of this feed's manifest below the exporter's base URL.
    pub fn manifest_path(self) -> String {
        format!("{}/packages.json", self.as_str())
    }
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedType {
    type Err = ProxyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|feed| feed.as_str() == value)
            .ok_or_else(|| ProxyError::not_found("Unknown repository"))
    }
}
