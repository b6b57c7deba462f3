//! Module graph data structures

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Index of a module inside a finalized graph
pub type ModuleIdx = usize;

/// Matches ids that come from an installed package rather than project source
static VENDOR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[\\/])node_modules[\\/]").unwrap()
});

/// Types of modules a graph can contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    JavaScript,
    TypeScript,
    Jsx,
    Tsx,
    Css,
    Json,
    Image,
    Unknown,
}

impl ModuleType {
    /// Determine module type from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "js" | "mjs" | "cjs" => ModuleType::JavaScript,
            "ts" | "mts" | "cts" => ModuleType::TypeScript,
            "jsx" => ModuleType::Jsx,
            "tsx" => ModuleType::Tsx,
            "css" | "scss" | "sass" | "less" => ModuleType::Css,
            "json" => ModuleType::Json,
            "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" => ModuleType::Image,
            _ => ModuleType::Unknown,
        }
    }

    /// Determine module type from a module id
    pub fn from_id(id: &str) -> Self {
        let file = id.rsplit(['/', '\\']).next().unwrap_or(id);
        match file.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ModuleType::from_extension(ext),
            _ => ModuleType::Unknown,
        }
    }

    /// Check if this is a JavaScript-like module
    pub fn is_js_like(&self) -> bool {
        matches!(
            self,
            ModuleType::JavaScript
                | ModuleType::TypeScript
                | ModuleType::Jsx
                | ModuleType::Tsx
        )
    }
}

/// Serialized shape of one module in a graph document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub id: String,

    #[serde(default)]
    pub size: u64,

    /// Statically imported module ids
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Dynamically imported module ids (split points)
    #[serde(default)]
    pub async_dependencies: Vec<String>,
}

/// A graph document as read from disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphFile {
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
}

/// A module in the dependency graph
#[derive(Debug, Clone)]
pub struct Module {
    /// Unique module identifier
    pub id: String,

    /// Declared size in bytes
    pub size: u64,

    /// Module type, derived from the id
    pub module_type: ModuleType,

    /// Whether the module comes from an external package
    pub is_vendor: bool,

    /// Static import ids, in declaration order
    pub dependencies: Vec<String>,

    /// Dynamic import ids, in declaration order
    pub async_dependencies: Vec<String>,
}

impl Module {
    fn from_spec(spec: ModuleSpec) -> Self {
        Self {
            module_type: ModuleType::from_id(&spec.id),
            is_vendor: is_vendor_id(&spec.id),
            id: spec.id,
            size: spec.size,
            dependencies: dedup(spec.dependencies),
            async_dependencies: dedup(spec.async_dependencies),
        }
    }
}

/// Check whether an id points into an installed package
pub fn is_vendor_id(id: &str) -> bool {
    VENDOR_REGEX.is_match(id)
}

fn dedup(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

/// Mutable module graph, filled in by the resolution pipeline
///
/// Dependencies may name modules that have not been added yet; they are
/// resolved when the graph is finalized.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    /// Modules in insertion order
    modules: Vec<Module>,

    /// Map from module id to index
    index: HashMap<String, ModuleIdx>,
}

impl ModuleGraph {
    /// Create a new empty module graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from serialized module specs
    pub fn from_specs<I>(specs: I) -> Result<Self>
    where
        I: IntoIterator<Item = ModuleSpec>,
    {
        let mut graph = Self::new();
        for spec in specs {
            graph.add_module_spec(spec)?;
        }
        Ok(graph)
    }

    /// Add a module with its static dependencies
    pub fn add_module<I, S>(&mut self, id: impl Into<String>, size: u64, dependencies: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_module_spec(ModuleSpec {
            id: id.into(),
            size,
            dependencies: dependencies.into_iter().map(Into::into).collect(),
            async_dependencies: Vec::new(),
        })
    }

    /// Add a module described by a spec, including dynamic imports
    pub fn add_module_spec(&mut self, spec: ModuleSpec) -> Result<()> {
        if self.index.contains_key(&spec.id) {
            return Err(Error::DuplicateModule(spec.id));
        }

        let idx = self.modules.len();
        self.index.insert(spec.id.clone(), idx);
        self.modules.push(Module::from_spec(spec));
        Ok(())
    }

    /// Check if a module id has been added
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Total number of modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if graph is empty
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Resolve every edge and freeze the graph
    pub fn finalize(self) -> Result<GraphSnapshot> {
        let mut static_edges = Vec::with_capacity(self.modules.len());
        let mut async_edges = Vec::with_capacity(self.modules.len());

        for module in &self.modules {
            static_edges.push(self.resolve_edges(module, &module.dependencies)?);
            async_edges.push(self.resolve_edges(module, &module.async_dependencies)?);
        }

        Ok(GraphSnapshot {
            inner: Arc::new(GraphInner {
                modules: self.modules,
                index: self.index,
                static_edges,
                async_edges,
            }),
        })
    }

    fn resolve_edges(&self, module: &Module, ids: &[String]) -> Result<Vec<ModuleIdx>> {
        ids.iter()
            .map(|dep| {
                self.index
                    .get(dep)
                    .copied()
                    .ok_or_else(|| Error::UnresolvedDependency {
                        module: module.id.clone(),
                        dependency: dep.clone(),
                    })
            })
            .collect()
    }
}

#[derive(Debug)]
struct GraphInner {
    modules: Vec<Module>,
    index: HashMap<String, ModuleIdx>,
    static_edges: Vec<Vec<ModuleIdx>>,
    async_edges: Vec<Vec<ModuleIdx>>,
}

/// Immutable view of a finalized module graph
///
/// Cloning is cheap and the snapshot can be shared between threads.
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    inner: Arc<GraphInner>,
}

impl GraphSnapshot {
    /// Total number of modules
    pub fn len(&self) -> usize {
        self.inner.modules.len()
    }

    /// Check if graph is empty
    pub fn is_empty(&self) -> bool {
        self.inner.modules.is_empty()
    }

    /// All modules in insertion order
    pub fn modules(&self) -> &[Module] {
        &self.inner.modules
    }

    /// Get a module by index
    pub fn module(&self, idx: ModuleIdx) -> &Module {
        &self.inner.modules[idx]
    }

    /// Get a module index from its id
    pub fn index_of(&self, id: &str) -> Option<ModuleIdx> {
        self.inner.index.get(id).copied()
    }

    /// Static dependencies of a module
    pub fn dependencies(&self, idx: ModuleIdx) -> &[ModuleIdx] {
        &self.inner.static_edges[idx]
    }

    /// Dynamic (split point) dependencies of a module
    pub fn async_dependencies(&self, idx: ModuleIdx) -> &[ModuleIdx] {
        &self.inner.async_edges[idx]
    }

    /// All modules statically reachable from `start`, in BFS order
    pub fn static_closure(&self, start: ModuleIdx) -> Vec<ModuleIdx> {
        let mut visited = HashSet::new();
        let mut result = Vec::new();
        let mut queue = VecDeque::new();

        queue.push_back(start);
        visited.insert(start);

        while let Some(idx) = queue.pop_front() {
            result.push(idx);

            for &dep in self.dependencies(idx) {
                if visited.insert(dep) {
                    queue.push_back(dep);
                }
            }
        }

        result
    }
}
