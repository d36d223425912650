//! Protocol core for the composer proxy.
//!
//! This crate holds everything the edge service needs that does not touch the
//! network: decoding the vendor API's legacy serialized payloads, parsing HTTP
//! Basic credentials, the license-key authorization policy, the feed route
//! table, and the typed manifest rewrite.

#![forbid(unsafe_code)]

pub mod auth;
pub mod credentials;
pub mod error;
pub mod feed;
pub mod legacy;
pub mod manifest;

pub use auth::{Authorizer, LICENSE_KEY_USER};
pub use credentials::Credentials;
pub use error::{ProxyError, ProxyResult};
pub use feed::FeedType;
pub use legacy::{DecodeError, Key, Value};
pub use manifest::{Dist, Manifest, PackageDescriptor, Requirements};
