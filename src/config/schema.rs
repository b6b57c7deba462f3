//! Configuration schema definitions

use serde::{Deserialize, Serialize};

use crate::bundler::{
    CacheGroup, ChunkSelection, DeclaredSize, SizeEstimator, SplitOptions, WeightedSize,
};
use crate::error::Result;

/// Build mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Production,
}

/// An entry point declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryConfig {
    /// Entry name, used for the entry chunk
    pub name: String,

    /// Module id of the entry module
    pub module: String,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory
    #[serde(default = "default_output_dir")]
    pub dir: String,

    /// Filename template for entry chunks (mode default when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Filename template for other chunks (mode default when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_filename: Option<String>,

    /// Write manifest.json
    #[serde(default = "default_true")]
    pub manifest: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            filename: None,
            chunk_filename: None,
            manifest: true,
        }
    }
}

fn default_output_dir() -> String {
    "dist".to_string()
}

fn default_true() -> bool {
    true
}

/// Chunk splitting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitChunksConfig {
    /// Which chunks take part in sharing (all, initial, async)
    #[serde(default)]
    pub chunks: ChunkSelection,

    #[serde(default = "default_min_size")]
    pub min_size: u64,

    /// 0 disables size splitting
    #[serde(default = "default_max_size")]
    pub max_size: u64,

    #[serde(default = "default_min_chunks")]
    pub min_chunks: usize,

    #[serde(default = "default_max_async_requests")]
    pub max_async_requests: usize,

    #[serde(default = "default_max_initial_requests")]
    pub max_initial_requests: usize,

    /// Separator in automatic chunk names
    #[serde(default = "default_name_delimiter")]
    pub name_delimiter: String,

    #[serde(default = "default_cache_group_configs")]
    pub cache_groups: Vec<CacheGroupConfig>,
}

impl Default for SplitChunksConfig {
    fn default() -> Self {
        Self {
            chunks: ChunkSelection::default(),
            min_size: default_min_size(),
            max_size: default_max_size(),
            min_chunks: default_min_chunks(),
            max_async_requests: default_max_async_requests(),
            max_initial_requests: default_max_initial_requests(),
            name_delimiter: default_name_delimiter(),
            cache_groups: default_cache_group_configs(),
        }
    }
}

impl SplitChunksConfig {
    /// Compile patterns and validate constraints
    pub fn to_options(&self) -> Result<SplitOptions> {
        let cache_groups = self
            .cache_groups
            .iter()
            .map(CacheGroupConfig::to_cache_group)
            .collect::<Result<Vec<_>>>()?;

        let options = SplitOptions {
            chunks: self.chunks,
            min_size: self.min_size,
            max_size: (self.max_size > 0).then_some(self.max_size),
            min_chunks: self.min_chunks,
            max_async_requests: self.max_async_requests,
            max_initial_requests: self.max_initial_requests,
            cache_groups,
        };
        options.validate()?;

        Ok(options)
    }
}

fn default_min_size() -> u64 {
    51200
}

fn default_max_size() -> u64 {
    1024 * 1024
}

fn default_min_chunks() -> usize {
    1
}

fn default_max_async_requests() -> usize {
    5
}

fn default_max_initial_requests() -> usize {
    3
}

fn default_name_delimiter() -> String {
    "~".to_string()
}

fn default_cache_group_configs() -> Vec<CacheGroupConfig> {
    vec![
        CacheGroupConfig {
            name: "vendors".to_string(),
            test: Some(r"[\\/]node_modules[\\/]|^node_modules[\\/]".to_string()),
            priority: -10,
            ..CacheGroupConfig::default()
        },
        CacheGroupConfig {
            name: "default".to_string(),
            min_chunks: Some(2),
            priority: -20,
            reuse_existing_chunk: true,
            ..CacheGroupConfig::default()
        },
    ]
}

/// Cache group configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheGroupConfig {
    /// Group key
    pub name: String,

    /// Regular expression matched against module ids
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,

    /// Glob matched against module ids
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glob: Option<String>,

    /// Match modules from installed packages
    #[serde(default)]
    pub vendor: bool,

    #[serde(default)]
    pub priority: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_chunks: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,

    #[serde(default)]
    pub reuse_existing_chunk: bool,

    /// Fixed chunk name; all claimed modules go into one chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_name: Option<String>,
}

impl CacheGroupConfig {
    pub fn to_cache_group(&self) -> Result<CacheGroup> {
        let mut group = CacheGroup::new(&self.name)
            .priority(self.priority)
            .reuse_existing_chunk(self.reuse_existing_chunk);

        if self.vendor {
            group = group.vendors();
        }
        if let Some(pattern) = &self.test {
            group = group.test(pattern)?;
        }
        if let Some(pattern) = &self.glob {
            group = group.glob(pattern)?;
        }
        group.min_chunks = self.min_chunks;
        group.min_size = self.min_size;
        group.max_size = self.max_size.filter(|&max| max > 0);
        group.name = self.chunk_name.clone();

        Ok(group)
    }
}

/// Which size estimator to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    #[default]
    Declared,
    Weighted,
}

/// Size estimation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    #[serde(default)]
    pub kind: EstimatorKind,

    #[serde(default = "default_weight")]
    pub script: f64,

    #[serde(default = "default_weight")]
    pub style: f64,

    #[serde(default = "default_weight")]
    pub asset: f64,

    #[serde(default = "default_weight")]
    pub other: f64,

    #[serde(default = "default_weight")]
    pub vendor: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            kind: EstimatorKind::default(),
            script: 1.0,
            style: 1.0,
            asset: 1.0,
            other: 1.0,
            vendor: 1.0,
        }
    }
}

fn default_weight() -> f64 {
    1.0
}

impl EstimatorConfig {
    pub fn build(&self) -> std::sync::Arc<dyn SizeEstimator> {
        match self.kind {
            EstimatorKind::Declared => std::sync::Arc::new(DeclaredSize),
            EstimatorKind::Weighted => std::sync::Arc::new(WeightedSize {
                script: self.script,
                style: self.style,
                asset: self.asset,
                other: self.other,
                vendor: self.vendor,
            }),
        }
    }
}

/// Plugin configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Plugin name/identifier
    pub name: String,
}
