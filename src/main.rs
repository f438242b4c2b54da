//! # Ship It Admin Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use shipit_admin::{
    cli::{self, Cli},
    config::ConfigLoader,
    telemetry::init_tracing,
};
use tracing::debug;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // One line, like the dashboard's error panel.
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Cli::parse();

    // Load configuration from layered env files and variables
    let config = ConfigLoader::new().load().context("loading configuration")?;
    config.validate().context("validating configuration")?;
    init_tracing(&config).context("initializing telemetry")?;

    if let Ok(redacted_json) = config.redacted_json() {
        debug!(profile = %config.profile, config = %redacted_json, "Loaded configuration");
    }

    let ctx = cli::Context::from_config(config)?;
    cli::run(args, &ctx).await
}
