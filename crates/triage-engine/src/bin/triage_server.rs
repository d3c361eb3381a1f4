//! Triage queue server
//!
//! Loads configuration (file, then `TRIAGE__*` environment), sets up logging
//! and serves the HTTP API until Ctrl-C.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use triage_engine::config::TriageConfig;
use triage_engine::logging::setup_logging;
use triage_engine::server::TriageServerBuilder;

#[derive(Debug, Parser)]
#[command(name = "triage-server", version, about = "Hospital triage queue service")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the configuration
    #[arg(short, long)]
    bind: Option<String>,

    /// Database URL, overrides the configuration
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = TriageConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(url) = args.database_url {
        config.database.url = url;
    }
    config.validate().context("invalid configuration")?;

    setup_logging(&config.logging).context("failed to set up logging")?;
    info!("🏥 Starting triage-server {}", env!("CARGO_PKG_VERSION"));

    let mut server = TriageServerBuilder::new()
        .with_config(config)
        .build()
        .await
        .context("failed to start triage server")?;

    server.run().await.context("triage server failed")?;
    Ok(())
}
