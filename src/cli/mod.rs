//! Command-line interface for chunkplan
//!
//! Provides the main CLI structure using clap with subcommands for:
//! - `plan`: Partition a module graph and write the manifest
//! - `check`: Validate configuration and graph
//! - `init`: Project scaffolding

mod check;
mod init;
mod plan;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use crate::bundler::{parse_graph, ModuleGraph};
use crate::config::Config;

pub use check::CheckCommand;
pub use init::InitCommand;
pub use plan::{BuildOptions, PlanCommand};

/// chunkplan - deterministic chunk splitting for frontend module graphs
#[derive(Parser, Debug)]
#[command(name = "chunkplan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to chunkplan.toml config file
    #[arg(short, long, global = true, default_value = "chunkplan.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Partition the module graph into chunks
    Plan(PlanCommand),

    /// Validate the configuration and module graph
    Check(CheckCommand),

    /// Initialize a new project
    Init(InitCommand),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        print_banner();

        match &self.command {
            Commands::Plan(cmd) => cmd.execute(&self.config).await,
            Commands::Check(cmd) => cmd.execute(&self.config).await,
            Commands::Init(cmd) => cmd.execute().await,
        }
    }
}

/// Print the chunkplan banner
fn print_banner() {
    eprintln!(
        "\n{} {} {}\n",
        "⚡".cyan(),
        "chunkplan".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}

/// Resolve the graph document path from the flag or the config
fn graph_path(config: &Config, flag: Option<&Path>) -> Result<PathBuf> {
    match flag {
        Some(path) => Ok(path.to_path_buf()),
        None => config
            .graph_path()
            .context("No module graph given: pass --graph or set `graph` in chunkplan.toml"),
    }
}

/// Read and parse a graph document
async fn read_graph(path: &Path) -> Result<ModuleGraph> {
    info!("Reading module graph from {}", path.display());
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read module graph: {}", path.display()))?;
    parse_graph(&json)
}
