//! CLI entry point for the photomosaic tool

use clap::Parser;
use photomosaic::io::cli::{Cli, MosaicRunner};
use tracing_subscriber::EnvFilter;

fn main() -> photomosaic::Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    MosaicRunner::new(cli).run()
}
