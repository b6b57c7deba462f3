//! Chunk splitting
//!
//! The partitioner runs a fixed sequence of passes over a shared
//! [`PartitionState`]:
//!
//! 1. `discover` - entry and split point base chunks, module usage sets
//! 2. `cache-groups` - shared chunks claimed by cache groups, by priority
//! 3. `default-placement` - remaining modules go to their base's own chunk
//! 4. `max-size` - oversized chunks are bin-packed into parts
//! 5. `request-limits` - chunks are merged until request caps hold

mod options;
mod passes;

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use super::chunk::{BaseChunk, BaseIdx, Chunk};
use super::estimator::{DeclaredSize, SizeEstimator};
use super::graph::{GraphSnapshot, ModuleIdx};
use crate::error::{Error, Result};

pub use options::{default_cache_groups, CacheGroup, ChunkSelection, ModuleMatcher, SplitOptions};
pub use passes::{CacheGroupPass, DefaultPlacementPass, DiscoverPass, MaxSizePass, RequestLimitPass};

/// An entry point: a name and the module it starts from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub module: String,
}

impl Entry {
    pub fn new(name: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: module.into(),
        }
    }
}

/// Non-fatal conditions found while partitioning
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A single module is larger than the chunk size cap
    OversizedModule {
        module: String,
        size: u64,
        max_size: u64,
    },
    /// No entry point reaches this module
    UnreachableModule { module: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::OversizedModule {
                module,
                size,
                max_size,
            } => write!(
                f,
                "module '{module}' ({size} bytes) exceeds max_size {max_size} and was emitted as its own chunk"
            ),
            Warning::UnreachableModule { module } => {
                write!(f, "module '{module}' is not reachable from any entry point")
            }
        }
    }
}

/// One step of the partitioning pipeline
pub trait Pass: Send + Sync {
    /// Pass name for logging and progress reporting
    fn name(&self) -> &'static str;

    /// Refine the partial plan held by `state`
    fn apply(&self, state: &mut PartitionState<'_>);
}

/// Working state shared by the passes
pub struct PartitionState<'a> {
    pub graph: &'a GraphSnapshot,
    pub options: &'a SplitOptions,

    /// Resolved entry points, in declaration order
    pub entries: Vec<(String, ModuleIdx)>,

    /// Estimated size per module
    pub sizes: Vec<u64>,

    /// Discovery order per module; unreachable modules sort last
    pub rank: Vec<usize>,

    pub bases: Vec<BaseChunk>,

    /// Bases containing each module
    pub membership: Vec<BTreeSet<BaseIdx>>,

    /// Bases containing each module, restricted by the chunk selection
    pub usage: Vec<BTreeSet<BaseIdx>>,

    /// Modules kept by a cache group
    pub claimed: Vec<bool>,

    /// Bases whose need for each module is already met by a chunk
    pub covered: Vec<BTreeSet<BaseIdx>>,

    pub chunks: Vec<Chunk>,

    pub warnings: Vec<Warning>,
}

impl<'a> PartitionState<'a> {
    fn new(
        graph: &'a GraphSnapshot,
        options: &'a SplitOptions,
        entries: Vec<(String, ModuleIdx)>,
        sizes: Vec<u64>,
    ) -> Self {
        let n = graph.len();
        Self {
            graph,
            options,
            entries,
            sizes,
            rank: vec![usize::MAX; n],
            bases: Vec::new(),
            membership: vec![BTreeSet::new(); n],
            usage: vec![BTreeSet::new(); n],
            claimed: vec![false; n],
            covered: vec![BTreeSet::new(); n],
            chunks: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Total estimated size of a set of modules
    pub fn size_of(&self, modules: &[ModuleIdx]) -> u64 {
        modules
            .iter()
            .fold(0u64, |acc, &m| acc.saturating_add(self.sizes[m]))
    }

    /// Order modules by discovery
    pub fn sort_by_rank(&self, modules: &mut [ModuleIdx]) {
        modules.sort_by_key(|&m| (self.rank[m], m));
    }

    /// Modules of a base not yet placed in a chunk that base loads
    pub fn uncovered(&self, base: BaseIdx) -> Vec<ModuleIdx> {
        self.bases[base]
            .modules
            .iter()
            .copied()
            .filter(|&m| !self.covered[m].contains(&base))
            .collect()
    }

    /// Record that `origins` now get `modules` from a chunk
    pub fn cover(&mut self, modules: &[ModuleIdx], origins: &BTreeSet<BaseIdx>) {
        for &m in modules {
            self.covered[m].extend(origins.iter().copied());
        }
    }

    pub fn warn(&mut self, warning: Warning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// Merge `victim` into `target` on behalf of `base`
    ///
    /// The victim keeps serving its other origins; when `base` was its only
    /// origin it is emptied and later dropped.
    pub fn merge_into(&mut self, victim: usize, target: usize, base: BaseIdx) {
        let moved = self.chunks[victim].modules.clone();
        let mut present: HashSet<ModuleIdx> = self.chunks[target].modules.iter().copied().collect();

        let mut modules = self.chunks[target].modules.clone();
        for m in moved {
            if present.insert(m) {
                modules.push(m);
            }
        }
        self.sort_by_rank(&mut modules);
        let size = self.size_of(&modules);

        let target_chunk = &mut self.chunks[target];
        target_chunk.modules = modules;
        target_chunk.size = size;

        let victim_chunk = &mut self.chunks[victim];
        victim_chunk.origins.remove(&base);
        if victim_chunk.origins.is_empty() {
            victim_chunk.modules.clear();
            victim_chunk.size = 0;
        }

        debug!(
            "Merged chunk #{} into #{} for base '{}'",
            victim, target, self.bases[base].name
        );
    }
}

/// Output of the partitioner
#[derive(Debug, Clone)]
pub struct PartitionResult {
    /// Non-empty chunks
    pub chunks: Vec<Chunk>,

    /// Entry bases first, in declaration order, then split points
    pub bases: Vec<BaseChunk>,

    pub warnings: Vec<Warning>,
}

impl PartitionResult {
    /// Indices of the chunks a base loads
    pub fn chunks_loaded_by(&self, base: BaseIdx) -> Vec<usize> {
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_loaded_by(base))
            .map(|(i, _)| i)
            .collect()
    }

    /// Base index of a named entry point
    pub fn entry_base(&self, name: &str) -> Option<BaseIdx> {
        self.bases
            .iter()
            .position(|b| b.kind == super::chunk::BaseKind::Initial && b.name == name)
    }
}

/// Groups the modules of a graph into chunks
pub struct Partitioner {
    options: SplitOptions,
    estimator: Arc<dyn SizeEstimator>,
    passes: Vec<Box<dyn Pass>>,
}

impl Partitioner {
    /// Create a partitioner, rejecting unsatisfiable options
    pub fn new(options: SplitOptions) -> Result<Self> {
        options.validate()?;

        Ok(Self {
            options,
            estimator: Arc::new(DeclaredSize),
            passes: vec![
                Box::new(DiscoverPass),
                Box::new(CacheGroupPass),
                Box::new(DefaultPlacementPass),
                Box::new(MaxSizePass),
                Box::new(RequestLimitPass),
            ],
        })
    }

    /// Use a different size estimator
    pub fn with_estimator(mut self, estimator: Arc<dyn SizeEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn options(&self) -> &SplitOptions {
        &self.options
    }

    /// Names of the passes, in execution order
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Partition a graph for the given entry points
    pub fn partition(&self, graph: &GraphSnapshot, entries: &[Entry]) -> Result<PartitionResult> {
        self.partition_with(graph, entries, |_| {})
    }

    /// Partition, calling `on_pass` before each pass runs
    pub fn partition_with<F>(
        &self,
        graph: &GraphSnapshot,
        entries: &[Entry],
        mut on_pass: F,
    ) -> Result<PartitionResult>
    where
        F: FnMut(&str),
    {
        let entries = resolve_entries(graph, entries)?;
        let sizes = graph
            .modules()
            .iter()
            .map(|m| self.estimator.estimate(m))
            .collect();

        debug!(
            "Partitioning {} modules for {} entries using '{}' sizes",
            graph.len(),
            entries.len(),
            self.estimator.name()
        );

        let mut state = PartitionState::new(graph, &self.options, entries, sizes);
        for pass in &self.passes {
            on_pass(pass.name());
            pass.apply(&mut state);
            debug!("Pass '{}' done: {} chunks", pass.name(), state.chunks.len());
        }

        let mut chunks = state.chunks;
        chunks.retain(|c| !c.is_empty());

        Ok(PartitionResult {
            chunks,
            bases: state.bases,
            warnings: state.warnings,
        })
    }
}

fn resolve_entries(graph: &GraphSnapshot, entries: &[Entry]) -> Result<Vec<(String, ModuleIdx)>> {
    let mut names = HashSet::new();
    let mut resolved = Vec::with_capacity(entries.len());

    for entry in entries {
        if !names.insert(entry.name.as_str()) {
            return Err(Error::DuplicateEntry(entry.name.clone()));
        }
        let idx = graph
            .index_of(&entry.module)
            .ok_or_else(|| Error::UnknownEntry {
                entry: entry.name.clone(),
                module: entry.module.clone(),
            })?;
        resolved.push((entry.name.clone(), idx));
    }

    Ok(resolved)
}
