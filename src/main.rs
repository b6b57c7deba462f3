//! chunkplan - deterministic chunk splitting for frontend module graphs
//!
//! Reads a resolved module graph and a chunkplan.toml, groups modules into
//! chunks under size, sharing and request-count constraints, and writes a
//! manifest describing which chunks every entry point loads.
//!
//! # Features
//! - Cache groups with priorities, regex or glob matching
//! - minSize / maxSize splitting with largest-first bin packing
//! - Initial and async request caps
//! - Content-derived, stable chunk names

use anyhow::Result;
use chunkplan_lib::Cli;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging/tracing system
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("chunkplan_lib=debug"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("chunkplan_lib=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    cli.execute().await
}
