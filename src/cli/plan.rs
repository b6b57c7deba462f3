//! Plan command implementation

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tracing::info;

use super::{graph_path, read_graph};
use crate::bundler::{Bundler, ChunkKind, PartitionPlan};
use crate::config::{Config, Mode};
use crate::utils::{format_duration, format_size};

/// Partition the module graph into chunks
#[derive(Args, Debug)]
pub struct PlanCommand {
    /// Module graph document (defaults to `graph` in the config)
    #[arg(short, long)]
    pub graph: Option<PathBuf>,

    /// Output directory for manifest.json
    #[arg(short, long)]
    pub outdir: Option<PathBuf>,

    /// Build mode, overriding the config
    #[arg(long, value_enum, env = "CHUNKPLAN_MODE")]
    pub mode: Option<Mode>,

    /// Print the manifest to stdout instead of writing it
    #[arg(long)]
    pub print: bool,
}

impl PlanCommand {
    pub async fn execute(&self, config_path: &str) -> Result<()> {
        info!("Loading configuration from {}", config_path);
        let config = Config::load(config_path)?;
        let graph = read_graph(&graph_path(&config, self.graph.as_deref())?).await?;

        eprintln!("{} Planning chunks...", "→".blue());

        let bundler = Bundler::new(config, self.into())?;
        let result = bundler.build(graph)?;
        let plan = &result.plan;

        eprintln!(
            "\n{} Planned {} chunk(s) for {} module(s), {} total, in {}\n",
            "✓".green().bold(),
            plan.chunks.len(),
            result.modules,
            format_size(plan.total_size()),
            format_duration(result.duration)
        );

        print_summary(plan);

        if self.print {
            println!("{}", plan.to_json()?);
        } else if bundler.config().output.manifest {
            let path = bundler.write_manifest(plan)?;
            eprintln!("  {} Wrote {}\n", "✓".green(), path.display().to_string().cyan());
        }

        Ok(())
    }
}

/// Print chunks, load order and warnings
fn print_summary(plan: &PartitionPlan) {
    for (name, chunk) in &plan.chunks {
        let kind = match chunk.kind {
            ChunkKind::Entry => "entry",
            ChunkKind::Async => "async",
            ChunkKind::Shared => "shared",
            ChunkKind::Orphan => "orphan",
        };

        eprintln!(
            "  {} {} {} {}",
            "•".dimmed(),
            chunk.file.cyan(),
            format!("({name}, {kind}, {} modules)", chunk.modules.len()).dimmed(),
            format_size(chunk.size).dimmed()
        );
    }

    eprintln!();
    for entry in &plan.entrypoints {
        eprintln!(
            "  {} {} {}",
            "→".blue(),
            entry.name.bold(),
            entry.chunks.join(", ").dimmed()
        );
    }
    for point in &plan.async_chunks {
        eprintln!(
            "  {} {} {}",
            "⇢".blue(),
            point.module.bold(),
            point.chunks.join(", ").dimmed()
        );
    }

    for warning in &plan.warnings {
        eprintln!("  {} {}", "!".yellow().bold(), warning.to_string().yellow());
    }
    eprintln!();
}

/// Build options derived from command arguments
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub outdir: Option<PathBuf>,
    pub mode: Option<Mode>,
}

impl From<&PlanCommand> for BuildOptions {
    fn from(cmd: &PlanCommand) -> Self {
        Self {
            outdir: cmd.outdir.clone(),
            mode: cmd.mode,
        }
    }
}
