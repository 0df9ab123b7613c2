//! Ostinato CLI
//!
//! Command-line harness for the Ostinato session core.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use ostinato::cli::commands::{self, SimulateOptions};
use ostinato::cli::{Cli, Commands};
use ostinato::telemetry::init_telemetry_with_level;
use ostinato::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry_with_level(if cli.verbose { "debug" } else { "info" });

    info!("Ostinato v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::from_env().context("invalid environment configuration")?,
    };

    match cli.command {
        Some(Commands::Timeline { seed, style }) => {
            commands::print_timeline(seed, &style.to_style())?;
        }
        Some(Commands::Simulate {
            seconds,
            seed,
            chunk_ms,
            scratch_dir,
            style,
        }) => {
            let options = SimulateOptions {
                duration: Duration::from_secs(seconds),
                seed,
                chunk_ms,
                scratch_dir,
                style: style.to_style(),
            };
            commands::simulate(config, options).await?;
        }
        None => {
            println!("Ostinato v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
        }
    }
    Ok(())
}
