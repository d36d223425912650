use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::signal;

use composer_proxy::{ProxyConfig, ProxyServer, telemetry};

#[derive(Debug, Parser)]
#[command(name = "composer-proxy", version)]
struct Cli {
    /// YAML file with proxy settings; COMPOSER_PROXY_* variables override it
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Port to serve the HTTP server on (default 8080)
    #[arg(long, default_value = "8080")]
    port: u16,
}

#[tokio::main]
async fn main() {
    if let Err(err) = telemetry::init("info") {
        eprintln!("{err:#}");
    }
    if let Err(err) = run().await {
        tracing::error!(error = %format!("{err:#}"), "proxy failed");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ProxyConfig::load_from_path(path).context("failed to load proxy config")?,
        None => ProxyConfig::default(),
    }
    .apply_env()?;

    tracing::info!(
        public_base_url = %config.public_base_url,
        manifest_base_url = %config.manifest_base_url,
        require_https = config.require_https,
        "loaded proxy configuration"
    );

    let server = ProxyServer::bind(config, SocketAddr::new(cli.bind, cli.port)).await?;
    server
        .serve(async {
            if signal::ctrl_c().await.is_ok() {
                tracing::info!("received shutdown signal");
            }
        })
        .await
}
