//! Check command implementation

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tracing::info;

use super::{graph_path, read_graph};
use crate::bundler::{Partitioner, Warning};
use crate::config::Config;

/// Validate the configuration and module graph
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Module graph document (defaults to `graph` in the config)
    #[arg(short, long)]
    pub graph: Option<PathBuf>,
}

impl CheckCommand {
    pub async fn execute(&self, config_path: &str) -> Result<()> {
        info!("Loading configuration from {}", config_path);
        let config = Config::load(config_path)?;
        let partitioner = Partitioner::new(config.split_options()?)?;

        let graph = read_graph(&graph_path(&config, self.graph.as_deref())?).await?;
        let snapshot = graph.finalize().context("Invalid module graph")?;

        let vendor = snapshot.modules().iter().filter(|m| m.is_vendor).count();
        let async_edges: usize = (0..snapshot.len())
            .map(|m| snapshot.async_dependencies(m).len())
            .sum();

        let result = partitioner.partition(&snapshot, &config.entries())?;
        let unreachable = result
            .warnings
            .iter()
            .filter(|w| matches!(w, Warning::UnreachableModule { .. }))
            .count();

        eprintln!("{} Configuration and graph are valid\n", "✓".green().bold());
        eprintln!("  {} {} modules ({} vendor)", "•".dimmed(), snapshot.len(), vendor);
        eprintln!("  {} {} entries", "•".dimmed(), config.entries.len());
        eprintln!("  {} {} dynamic imports", "•".dimmed(), async_edges);
        eprintln!(
            "  {} {} cache groups, passes: {}",
            "•".dimmed(),
            partitioner.options().cache_groups.len(),
            partitioner.pass_names().join(" → ")
        );
        if unreachable > 0 {
            eprintln!(
                "  {} {} module(s) unreachable from any entry",
                "!".yellow().bold(),
                unreachable
            );
        }
        eprintln!();

        Ok(())
    }
}
