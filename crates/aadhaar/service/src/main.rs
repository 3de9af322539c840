//! aadhaard: Aadhaar Lite REST daemon.

use aadhaar_service::server::Server;
use aadhaar_service::ServiceConfig;
use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "aadhaard", version, about = "Aadhaar Lite identity and usage-chain service")]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, env = "AADHAAR_CONFIG")]
    config: Option<String>,

    /// Listen address, overrides the configuration file
    #[arg(short, long, env = "AADHAAR_LISTEN")]
    listen: Option<SocketAddr>,

    /// Log level
    #[arg(long, env = "AADHAAR_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "AADHAAR_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        ServiceConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.log_json;

    init_tracing(&config.logging.level, config.logging.json);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        "starting aadhaard"
    );

    let server = Server::new(config)
        .await
        .context("failed to initialise services")?;
    server.run().await?;
    Ok(())
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
