//! Project initialization command

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use crate::bundler::{GraphFile, ModuleSpec};

/// Initialize a new project
#[derive(Args, Debug)]
pub struct InitCommand {
    /// Project directory
    #[arg(default_value = ".")]
    pub name: String,

    /// Overwrite existing files
    #[arg(long)]
    pub force: bool,
}

impl InitCommand {
    pub async fn execute(&self) -> Result<()> {
        let project_dir = Path::new(&self.name);

        eprintln!("{} Initializing new project...\n", "→".blue());

        // Create project directory if needed
        if self.name != "." {
            fs::create_dir_all(project_dir)
                .context("Failed to create project directory")?;
        }

        self.write_file(project_dir, "chunkplan.toml", CONFIG_TEMPLATE)?;

        let graph = serde_json::to_string_pretty(&sample_graph())?;
        self.write_file(project_dir, "graph.json", &graph)?;

        eprintln!(
            "\n{} Project initialized successfully!\n",
            "✓".green().bold()
        );

        eprintln!("  Next steps:");
        if self.name != "." {
            eprintln!("    {} cd {}", "→".dimmed(), self.name.cyan());
        }
        eprintln!("    {} chunkplan plan", "→".dimmed());
        eprintln!();

        Ok(())
    }

    fn write_file(&self, dir: &Path, name: &str, content: &str) -> Result<()> {
        let path = dir.join(name);
        if path.exists() && !self.force {
            anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
        }

        fs::write(&path, content).with_context(|| format!("Failed to write {}", name))?;
        eprintln!("  {} Created {}", "✓".green(), name.cyan());
        Ok(())
    }
}

const CONFIG_TEMPLATE: &str = r#"# chunkplan configuration

mode = "production"
graph = "graph.json"

[[entries]]
name = "index"
module = "src/index.js"

[[entries]]
name = "about"
module = "src/about.js"

[output]
dir = "dist"
manifest = true

[split_chunks]
chunks = "all"
min_size = 51200
max_size = 1048576
min_chunks = 1
max_async_requests = 5
max_initial_requests = 3
name_delimiter = "~"

[[split_chunks.cache_groups]]
name = "vendors"
test = '[\\/]node_modules[\\/]|^node_modules[\\/]'
priority = -10

[[split_chunks.cache_groups]]
name = "default"
min_chunks = 2
priority = -20
reuse_existing_chunk = true

[estimator]
kind = "declared"
"#;

/// A small two-page app with a lazily loaded chart
fn sample_graph() -> GraphFile {
    let module = |id: &str, size: u64, deps: &[&str], lazy: &[&str]| ModuleSpec {
        id: id.to_string(),
        size,
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
        async_dependencies: lazy.iter().map(|d| d.to_string()).collect(),
    };

    GraphFile {
        modules: vec![
            module(
                "src/index.js",
                4_200,
                &["node_modules/react/index.js", "src/components/Layout.jsx"],
                &["src/pages/Chart.jsx"],
            ),
            module(
                "src/about.js",
                2_800,
                &["node_modules/react/index.js", "src/components/Layout.jsx"],
                &[],
            ),
            module("node_modules/react/index.js", 120_000, &[], &[]),
            module(
                "src/components/Layout.jsx",
                64_000,
                &["src/components/layout.css"],
                &[],
            ),
            module("src/components/layout.css", 3_000, &[], &[]),
            module(
                "src/pages/Chart.jsx",
                18_000,
                &["node_modules/chart.js/dist/chart.js"],
                &[],
            ),
            module("node_modules/chart.js/dist/chart.js", 210_000, &[], &[]),
        ],
    }
}
