#![forbid(unsafe_code)]

pub mod config;
pub mod http;
pub mod server;
pub mod telemetry;
pub mod upstream;

pub use config::ProxyConfig;
pub use server::{ProxyServer, ProxyState, router};
