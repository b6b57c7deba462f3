//! Plugin system for chunkplan
//!
//! Plugins observe a build: they are told when it starts, when each stage
//! begins, and receive the finished plan. They run in registration order.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use tracing::info;

use crate::bundler::{GraphSnapshot, PartitionPlan};
use crate::config::PluginConfig;
use crate::utils::format_size;

/// Names of the built-in plugins
const BUILTIN_PLUGINS: &[&str] = &["progress", "stats"];

/// Check if a plugin name refers to a built-in plugin
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_PLUGINS.contains(&name)
}

/// Plugin trait - implement this to observe a build
pub trait Plugin: Send + Sync {
    /// Plugin name for logging and debugging
    fn name(&self) -> &str;

    /// Called once the module graph is finalized
    fn build_start(&self, _graph: &GraphSnapshot) -> Result<()> {
        Ok(())
    }

    /// Called before each pipeline stage
    fn stage(&self, _name: &str) {}

    /// Called with the finished plan
    fn build_end(&self, _plan: &PartitionPlan) -> Result<()> {
        Ok(())
    }
}

/// Plugin manager
#[derive(Default)]
pub struct PluginManager {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginManager {
    /// Create a new plugin manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager holding the configured built-in plugins
    pub fn from_config(configs: &[PluginConfig]) -> Result<Self> {
        let mut manager = Self::new();
        for config in configs {
            let plugin: Arc<dyn Plugin> = match config.name.as_str() {
                "progress" => Arc::new(ProgressPlugin::new()),
                "stats" => Arc::new(StatsPlugin),
                other => anyhow::bail!("Unknown plugin '{}'", other),
            };
            manager.register(plugin);
        }
        Ok(manager)
    }

    /// Register a plugin
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// Registered plugin names, in order
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Run build_start hooks
    pub fn run_build_start(&self, graph: &GraphSnapshot) -> Result<()> {
        for plugin in &self.plugins {
            plugin.build_start(graph)?;
        }
        Ok(())
    }

    /// Run stage hooks
    pub fn run_stage(&self, name: &str) {
        for plugin in &self.plugins {
            plugin.stage(name);
        }
    }

    /// Run build_end hooks
    pub fn run_build_end(&self, plan: &PartitionPlan) -> Result<()> {
        for plugin in &self.plugins {
            plugin.build_end(plan)?;
        }
        Ok(())
    }
}

/// Progress plugin - shows a spinner with the current stage
pub struct ProgressPlugin {
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressPlugin {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }
}

impl Default for ProgressPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for ProgressPlugin {
    fn name(&self) -> &str {
        "progress"
    }

    fn build_start(&self, graph: &GraphSnapshot) -> Result<()> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}")?);
        bar.enable_steady_tick(Duration::from_millis(80));
        bar.set_message(format!("{} modules", graph.len()));
        *self.bar.lock() = Some(bar);
        Ok(())
    }

    fn stage(&self, name: &str) {
        if let Some(bar) = self.bar.lock().as_ref() {
            bar.set_message(name.to_string());
        }
    }

    fn build_end(&self, plan: &PartitionPlan) -> Result<()> {
        if let Some(bar) = self.bar.lock().take() {
            bar.finish_and_clear();
        }
        info!("Planned {} chunks", plan.chunks.len());
        Ok(())
    }
}

/// Stats plugin - logs a summary of every chunk
pub struct StatsPlugin;

impl Plugin for StatsPlugin {
    fn name(&self) -> &str {
        "stats"
    }

    fn build_end(&self, plan: &PartitionPlan) -> Result<()> {
        for (name, chunk) in &plan.chunks {
            info!(
                "{} ({:?}, {} modules, {})",
                name,
                chunk.kind,
                chunk.modules.len(),
                format_size(chunk.size)
            );
        }
        for entry in &plan.entrypoints {
            info!("{}: {} initial requests", entry.name, entry.requests);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{
        Entry, ManifestBuilder, ModuleGraph, NamingOptions, Partitioner, SplitOptions,
    };

    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Plugin for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn build_start(&self, graph: &GraphSnapshot) -> Result<()> {
            self.events.lock().push(format!("start:{}", graph.len()));
            Ok(())
        }

        fn stage(&self, name: &str) {
            self.events.lock().push(name.to_string());
        }

        fn build_end(&self, plan: &PartitionPlan) -> Result<()> {
            self.events.lock().push(format!("end:{}", plan.chunks.len()));
            Ok(())
        }
    }

    #[test]
    fn test_from_config() {
        let manager = PluginManager::from_config(&[
            PluginConfig {
                name: "stats".to_string(),
            },
            PluginConfig {
                name: "progress".to_string(),
            },
        ])
        .unwrap();
        assert_eq!(manager.names(), vec!["stats", "progress"]);

        assert!(PluginManager::from_config(&[PluginConfig {
            name: "clean".to_string(),
        }])
        .is_err());
    }

    #[test]
    fn test_hooks_run_in_order() {
        let mut graph = ModuleGraph::new();
        graph.add_module("src/a.js", 10, Vec::<String>::new()).unwrap();
        let graph = graph.finalize().unwrap();

        let recorder = Arc::new(Recorder {
            events: Mutex::new(Vec::new()),
        });
        let mut manager = PluginManager::new();
        manager.register(recorder.clone());
        manager.register(Arc::new(StatsPlugin));

        manager.run_build_start(&graph).unwrap();
        manager.run_stage("partition");

        let result = Partitioner::new(SplitOptions::unconstrained())
            .unwrap()
            .partition(&graph, &[Entry::new("a", "src/a.js")])
            .unwrap();
        let naming = NamingOptions::default();
        let plan = ManifestBuilder::new(&graph, &naming).build(&result);
        manager.run_build_end(&plan).unwrap();

        assert_eq!(
            *recorder.events.lock(),
            vec!["start:1", "partition", "end:1"]
        );
    }
}
