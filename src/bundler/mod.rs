//! Core bundler implementation
//!
//! Runs one build: module graph, size estimation, partitioning, and the
//! emission plan handed to downstream writers.

mod chunk;
mod estimator;
mod graph;
mod manifest;
mod split;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::BuildOptions;
use crate::config::Config;
use crate::plugins::{Plugin, PluginManager};

pub use chunk::{BaseChunk, BaseIdx, BaseKind, Chunk, ChunkKind, NameHint, OWN_CHUNK_PRIORITY};
pub use estimator::{DeclaredSize, SizeEstimator, WeightedSize};
pub use graph::{
    is_vendor_id, GraphFile, GraphSnapshot, Module, ModuleGraph, ModuleIdx, ModuleSpec, ModuleType,
};
pub use manifest::{render_filename, ChunkManifest, LoadPlan, ManifestBuilder, NamingOptions, PartitionPlan};
pub use split::{
    default_cache_groups, CacheGroup, ChunkSelection, Entry, ModuleMatcher, Partitioner, Pass,
    PartitionResult, PartitionState, SplitOptions, Warning,
};

/// Result of a build operation
#[derive(Debug)]
pub struct BuildResult {
    /// The emission plan
    pub plan: PartitionPlan,

    /// Number of modules in the graph
    pub modules: usize,

    /// Time spent building
    pub duration: Duration,
}

/// Parse a JSON graph document into a module graph
pub fn parse_graph(json: &str) -> Result<ModuleGraph> {
    let file: GraphFile = serde_json::from_str(json).context("Failed to parse module graph")?;
    let graph = ModuleGraph::from_specs(file.modules).context("Invalid module graph")?;
    Ok(graph)
}

/// The main bundler
pub struct Bundler {
    /// Project configuration
    config: Arc<Config>,

    /// Build options
    options: BuildOptions,

    /// Chunk partitioner
    partitioner: Partitioner,

    /// Plugin registry
    plugins: PluginManager,
}

impl Bundler {
    /// Create a new bundler instance
    pub fn new(mut config: Config, options: BuildOptions) -> Result<Self> {
        if let Some(mode) = options.mode {
            config.mode = mode;
        }

        let partitioner = Partitioner::new(config.split_options()?)?
            .with_estimator(config.estimator.build());
        let plugins = PluginManager::from_config(&config.plugins)?;

        Ok(Self {
            config: Arc::new(config),
            options,
            partitioner,
            plugins,
        })
    }

    /// Register an additional plugin after the configured ones
    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.register(plugin);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Finalize the graph and build
    pub fn build(&self, graph: ModuleGraph) -> Result<BuildResult> {
        self.plugins.run_stage("finalize");
        let snapshot = graph.finalize().context("Invalid module graph")?;
        self.build_snapshot(&snapshot)
    }

    /// Build from an already finalized graph
    pub fn build_snapshot(&self, graph: &GraphSnapshot) -> Result<BuildResult> {
        let start = Instant::now();
        self.plugins.run_build_start(graph)?;

        // 1. Partition the module graph
        info!(
            "Partitioning {} modules ({:?} mode)...",
            graph.len(),
            self.config.mode
        );
        let entries = self.config.entries();
        let result = self
            .partitioner
            .partition_with(graph, &entries, |pass| self.plugins.run_stage(pass))?;

        // 2. Name chunks and order requests
        self.plugins.run_stage("manifest");
        let naming = self.config.naming();
        let plan = ManifestBuilder::new(graph, &naming).build(&result);

        self.plugins.run_build_end(&plan)?;
        debug!("Build completed in {:?}", start.elapsed());

        Ok(BuildResult {
            plan,
            modules: graph.len(),
            duration: start.elapsed(),
        })
    }

    /// Directory the manifest is written to
    pub fn output_dir(&self) -> PathBuf {
        self.options
            .outdir
            .clone()
            .unwrap_or_else(|| self.config.output_dir())
    }

    /// Write manifest.json
    pub fn write_manifest(&self, plan: &PartitionPlan) -> Result<PathBuf> {
        let output_dir = self.output_dir();
        fs::create_dir_all(&output_dir).context("Failed to create output directory")?;

        let manifest_path = output_dir.join("manifest.json");
        fs::write(&manifest_path, plan.to_json()?).context("Failed to write manifest.json")?;

        Ok(manifest_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;

    fn config(extra: &str) -> Config {
        Config::parse(
            &format!(
                r#"
                mode = "production"

                [[entries]]
                name = "index"
                module = "src/index.js"

                [[entries]]
                name = "about"
                module = "src/about.js"

                {extra}
                "#
            ),
            PathBuf::from("."),
        )
        .unwrap()
    }

    const GRAPH: &str = r#"{
        "modules": [
            { "id": "src/index.js", "size": 2000, "dependencies": ["node_modules/react/index.js", "src/layout.js"] },
            { "id": "src/about.js", "size": 1500, "dependencies": ["node_modules/react/index.js", "src/layout.js"] },
            { "id": "node_modules/react/index.js", "size": 90000 },
            { "id": "src/layout.js", "size": 70000 }
        ]
    }"#;

    #[test]
    fn test_build_from_json() {
        let bundler = Bundler::new(config(""), BuildOptions::default()).unwrap();
        let result = bundler.build(parse_graph(GRAPH).unwrap()).unwrap();
        let plan = result.plan;

        assert_eq!(result.modules, 4);
        assert_eq!(
            plan.entry("index").unwrap().chunks,
            vec!["vendors~about~index", "default~about~index", "index"]
        );
        assert!(plan.chunk("index").unwrap().file.starts_with("index-"));
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_mode_override() {
        let options = BuildOptions {
            mode: Some(Mode::Development),
            ..BuildOptions::default()
        };
        let bundler = Bundler::new(config(""), options).unwrap();
        assert_eq!(bundler.config().mode, Mode::Development);

        let plan = bundler.build(parse_graph(GRAPH).unwrap()).unwrap().plan;
        assert_eq!(plan.chunk("index").unwrap().file, "index.js");
    }

    #[test]
    fn test_invalid_graph_is_rejected_before_partitioning() {
        let bundler = Bundler::new(config(""), BuildOptions::default()).unwrap();
        let graph = parse_graph(r#"{ "modules": [ { "id": "src/index.js", "dependencies": ["nope.js"] } ] }"#)
            .unwrap();
        assert!(bundler.build(graph).is_err());

        assert!(parse_graph(r#"{ "modules": [ { "id": "a.js" }, { "id": "a.js" } ] }"#).is_err());
    }

    struct StageLog(parking_lot::Mutex<Vec<String>>);

    impl Plugin for StageLog {
        fn name(&self) -> &str {
            "stage-log"
        }

        fn stage(&self, name: &str) {
            self.0.lock().push(name.to_string());
        }
    }

    #[test]
    fn test_plugins_see_every_stage() {
        let log = Arc::new(StageLog(parking_lot::Mutex::new(Vec::new())));
        let bundler = Bundler::new(config(""), BuildOptions::default())
            .unwrap()
            .with_plugin(log.clone());
        bundler.build(parse_graph(GRAPH).unwrap()).unwrap();

        assert_eq!(
            *log.0.lock(),
            vec![
                "finalize",
                "discover",
                "cache-groups",
                "default-placement",
                "max-size",
                "request-limits",
                "manifest"
            ]
        );
    }

    #[test]
    fn test_write_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let options = BuildOptions {
            outdir: Some(dir.path().join("out")),
            ..BuildOptions::default()
        };
        let bundler = Bundler::new(config(""), options).unwrap();
        let plan = bundler.build(parse_graph(GRAPH).unwrap()).unwrap().plan;

        let path = bundler.write_manifest(&plan).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert!(written["chunks"]["index"]["modules"].is_array());
        assert_eq!(written["entrypoints"][0]["name"], "index");
    }
}
