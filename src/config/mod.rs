//! Configuration handling for chunkplan
//!
//! Parses and manages chunkplan.toml configuration files.

mod schema;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::bundler::{Entry, NamingOptions, SplitOptions};

pub use schema::*;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Build mode; never read from the environment by the pipeline
    #[serde(default)]
    pub mode: Mode,

    /// Path to the module graph document, relative to the root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<String>,

    /// Entry points, in declaration order
    #[serde(default)]
    pub entries: Vec<EntryConfig>,

    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Chunk splitting rules
    #[serde(default)]
    pub split_chunks: SplitChunksConfig,

    /// Size estimation
    #[serde(default)]
    pub estimator: EstimatorConfig,

    /// Plugin configuration
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,

    /// Root directory (computed from config file location)
    #[serde(skip)]
    pub root: PathBuf,
}

impl Config {
    /// Load configuration from a file path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let canonical_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let content = fs::read_to_string(&canonical_path)
            .with_context(|| format!("Failed to read config file: {}", canonical_path.display()))?;

        // Set root directory to the directory containing the config file
        let root = canonical_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        Self::parse(&content, root)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str, root: PathBuf) -> Result<Self> {
        let mut config: Config = toml::from_str(content)
            .with_context(|| "Failed to parse chunkplan.toml")?;
        config.root = root;

        config.validate()?;

        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            mode: Mode::default(),
            graph: Some("graph.json".to_string()),
            entries: vec![EntryConfig {
                name: "main".to_string(),
                module: "src/main.js".to_string(),
            }],
            output: OutputConfig::default(),
            split_chunks: SplitChunksConfig::default(),
            estimator: EstimatorConfig::default(),
            plugins: Vec::new(),
            root: PathBuf::from("."),
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        // Ensure at least one entrypoint exists
        if self.entries.is_empty() {
            anyhow::bail!("At least one entry must be specified in chunkplan.toml");
        }

        let mut names = HashSet::new();
        for entry in &self.entries {
            if !names.insert(entry.name.as_str()) {
                anyhow::bail!("Entry '{}' is declared more than once", entry.name);
            }
        }

        for group in &self.split_chunks.cache_groups {
            let matchers = [group.vendor, group.test.is_some(), group.glob.is_some()]
                .into_iter()
                .filter(|&set| set)
                .count();
            if matchers > 1 {
                anyhow::bail!(
                    "Cache group '{}' sets more than one of `vendor`, `test` and `glob`",
                    group.name
                );
            }
        }

        self.split_options()?;

        for plugin in &self.plugins {
            if !crate::plugins::is_builtin(&plugin.name) {
                anyhow::bail!("Unknown plugin '{}'", plugin.name);
            }
        }

        Ok(())
    }

    /// Compiled split options
    pub fn split_options(&self) -> Result<SplitOptions> {
        self.split_chunks
            .to_options()
            .context("Invalid [split_chunks] configuration")
    }

    /// Naming rules for the active mode
    pub fn naming(&self) -> NamingOptions {
        let mut naming = NamingOptions::for_mode(self.mode);
        naming.delimiter = self.split_chunks.name_delimiter.clone();
        if let Some(filename) = &self.output.filename {
            naming.filename = filename.clone();
        }
        if let Some(chunk_filename) = &self.output.chunk_filename {
            naming.chunk_filename = chunk_filename.clone();
        }
        naming
    }

    /// Entry points in declaration order
    pub fn entries(&self) -> Vec<Entry> {
        self.entries
            .iter()
            .map(|e| Entry::new(&e.name, &e.module))
            .collect()
    }

    /// Get the absolute output directory path
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.output.dir)
    }

    /// Get the absolute graph document path
    pub fn graph_path(&self) -> Option<PathBuf> {
        self.graph.as_ref().map(|p| self.root.join(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::ModuleMatcher;

    #[test]
    fn test_parse_minimal_config() {
        let config = Config::parse(
            r#"
            [[entries]]
            name = "index"
            module = "src/index.js"
            "#,
            PathBuf::from("/project"),
        )
        .unwrap();

        assert_eq!(config.mode, Mode::Development);
        assert_eq!(config.entries().len(), 1);
        assert_eq!(config.output_dir(), PathBuf::from("/project/dist"));

        let options = config.split_options().unwrap();
        assert_eq!(options.min_size, 51200);
        assert_eq!(options.max_size, Some(1024 * 1024));
        assert_eq!(options.max_initial_requests, 3);
        assert_eq!(options.max_async_requests, 5);
        assert_eq!(options.cache_groups.len(), 2);
        assert!(matches!(
            options.cache_groups[0].matcher,
            ModuleMatcher::Pattern(_)
        ));
        assert!(options.cache_groups[1].reuse_existing_chunk);

        let naming = config.naming();
        assert_eq!(naming.filename, "[name].js");
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
            mode = "production"
            graph = "build/graph.json"

            [[entries]]
            name = "index"
            module = "src/index.js"

            [[entries]]
            name = "admin"
            module = "src/admin.js"

            [output]
            chunk_filename = "chunks/[name].[hash:6].js"

            [split_chunks]
            chunks = "initial"
            min_size = 0
            max_size = 0
            name_delimiter = "-"

            [[split_chunks.cache_groups]]
            name = "ui"
            glob = "src/components/**"
            priority = 5
            chunk_name = "ui-kit"

            [estimator]
            kind = "weighted"
            script = 1.5

            [[plugins]]
            name = "stats"
            "#,
            PathBuf::from("/project"),
        )
        .unwrap();

        assert_eq!(config.mode, Mode::Production);
        assert_eq!(
            config.graph_path(),
            Some(PathBuf::from("/project/build/graph.json"))
        );
        assert_eq!(config.entries()[1].name, "admin");

        let options = config.split_options().unwrap();
        assert_eq!(options.max_size, None);
        assert_eq!(options.cache_groups.len(), 1);
        assert_eq!(options.cache_groups[0].name.as_deref(), Some("ui-kit"));

        let naming = config.naming();
        assert_eq!(naming.delimiter, "-");
        assert_eq!(naming.filename, "[name]-[hash:8].js");
        assert_eq!(naming.chunk_filename, "chunks/[name].[hash:6].js");
        assert_eq!(config.estimator.build().name(), "weighted");
    }

    #[test]
    fn test_rejects_missing_entries() {
        assert!(Config::parse("mode = \"production\"", PathBuf::from(".")).is_err());
    }

    #[test]
    fn test_rejects_duplicate_entries() {
        let result = Config::parse(
            r#"
            [[entries]]
            name = "index"
            module = "src/a.js"

            [[entries]]
            name = "index"
            module = "src/b.js"
            "#,
            PathBuf::from("."),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_unsatisfiable_split_chunks() {
        let result = Config::parse(
            r#"
            [[entries]]
            name = "index"
            module = "src/index.js"

            [split_chunks]
            max_initial_requests = 0
            "#,
            PathBuf::from("."),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_cache_group_with_two_matchers() {
        let result = Config::parse(
            r#"
            [[entries]]
            name = "index"
            module = "src/index.js"

            [[split_chunks.cache_groups]]
            name = "mixed"
            vendor = true
            glob = "src/**"
            "#,
            PathBuf::from("."),
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("'mixed'"), "{err}");
    }

    #[test]
    fn test_rejects_unknown_plugin() {
        let result = Config::parse(
            r#"
            [[entries]]
            name = "index"
            module = "src/index.js"

            [[plugins]]
            name = "html"
            "#,
            PathBuf::from("."),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunkplan.toml");
        std::fs::write(
            &path,
            "[[entries]]\nname = \"main\"\nmodule = \"src/main.js\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.root, dir.path());
    }
}
