//! remcache: a build-cache protocol server over stdin/stdout, backed by an
//! S3-compatible object store.
//!
//! Diagnostics go to stderr; stdout carries nothing but protocol records.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "remcache")]
#[command(about = "Build-cache protocol server backed by an S3-compatible object store")]
#[command(version)]
pub struct Args {
    /// Object-store base URL, e.g. https://s3.eu-west-2.amazonaws.com
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Bucket holding cached artifacts
    #[arg(long)]
    pub bucket: Option<String>,

    /// Key prefix namespacing this cache within the bucket
    #[arg(long)]
    pub prefix: Option<String>,

    /// Use path-style bucket addressing instead of virtual-hosted
    #[arg(long)]
    pub path_style: bool,

    /// Static bearer token attached to every object-store request
    #[arg(long)]
    pub auth_token: Option<String>,

    /// Default log filter for stderr diagnostics; RUST_LOG overrides
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = Config::resolve(&args)?;
    info!(
        endpoint = %config.endpoint,
        bucket = %config.bucket,
        prefix = config.prefix.as_deref().unwrap_or(""),
        "starting remcache"
    );

    let backend = remcache_store::HttpBackend::new(config.backend_config())?;
    let store = remcache_store::Store::new(Arc::new(backend), config.prefix)?;

    let stdin = BufReader::with_capacity(1 << 20, tokio::io::stdin());
    let server = remcache_store::Server::new(store, stdin, tokio::io::stdout());
    server.run_until(shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to install ctrl-c handler");
    }
}

fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}
