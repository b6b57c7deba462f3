//! Emission plan generation
//!
//! Turns a [`PartitionResult`] into named chunks, output file names and
//! per-entry load order. Names depend only on chunk contents, never on the
//! order chunks were created in, so identical input always yields identical
//! names and file hashes.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;

use super::chunk::{BaseIdx, BaseKind, Chunk, ChunkKind, NameHint};
use super::graph::GraphSnapshot;
use super::split::{PartitionResult, Warning};
use crate::config::Mode;
use crate::utils::{file_stem, hash_hex};

/// `[hash]` or `[hash:N]` in a filename template
static HASH_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[hash(?::(\d+))?\]").unwrap()
});

/// Hash length used when a template does not give one
const DEFAULT_HASH_LENGTH: usize = 20;

/// Chunk naming conventions
#[derive(Debug, Clone)]
pub struct NamingOptions {
    /// Joins group keys and origin names in automatic chunk names
    pub delimiter: String,

    /// Template for entry chunks
    pub filename: String,

    /// Template for every other chunk
    pub chunk_filename: String,
}

impl NamingOptions {
    /// Default templates for a build mode
    pub fn for_mode(mode: Mode) -> Self {
        let (filename, chunk_filename) = match mode {
            Mode::Development => ("[name].js", "[id].js"),
            Mode::Production => ("[name]-[hash:8].js", "[id]-[hash:8].js"),
        };

        Self {
            delimiter: "~".to_string(),
            filename: filename.to_string(),
            chunk_filename: chunk_filename.to_string(),
        }
    }
}

impl Default for NamingOptions {
    fn default() -> Self {
        Self::for_mode(Mode::Production)
    }
}

/// One chunk of the emission plan
#[derive(Debug, Clone, Serialize)]
pub struct ChunkManifest {
    /// Content-derived identifier
    pub id: String,

    /// Output file name
    pub file: String,

    pub kind: ChunkKind,

    /// Member module ids, in load order
    pub modules: Vec<String>,

    pub size: u64,

    /// Loaded when an entry point starts
    pub initial: bool,

    /// Loaded by a dynamic import
    pub on_demand: bool,

    /// Every member comes from an installed package
    pub vendor: bool,
}

/// Chunks to request for an entry point or a split point
#[derive(Debug, Clone, Serialize)]
pub struct LoadPlan {
    /// Entry name, or split point module id
    pub name: String,

    /// Root module id
    pub module: String,

    /// Chunk names, in request order
    pub chunks: Vec<String>,

    pub requests: usize,
}

/// The final output of a build
#[derive(Debug, Clone, Serialize)]
pub struct PartitionPlan {
    pub chunks: BTreeMap<String, ChunkManifest>,

    /// Entry points, in declaration order
    pub entrypoints: Vec<LoadPlan>,

    /// Split points, in discovery order
    pub async_chunks: Vec<LoadPlan>,

    /// Module id to the names of the chunks containing it
    pub modules: BTreeMap<String, Vec<String>>,

    pub warnings: Vec<Warning>,
}

impl PartitionPlan {
    /// Get a chunk by name
    pub fn chunk(&self, name: &str) -> Option<&ChunkManifest> {
        self.chunks.get(name)
    }

    /// Get the load plan of an entry point
    pub fn entry(&self, name: &str) -> Option<&LoadPlan> {
        self.entrypoints.iter().find(|e| e.name == name)
    }

    /// Names of the chunks containing a module
    pub fn chunks_of(&self, module: &str) -> &[String] {
        self.modules.get(module).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total size across chunks
    pub fn total_size(&self) -> u64 {
        self.chunks.values().map(|c| c.size).sum()
    }

    /// Serialize as pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Builds the emission plan from a partition result
pub struct ManifestBuilder<'a> {
    graph: &'a GraphSnapshot,
    naming: &'a NamingOptions,
}

impl<'a> ManifestBuilder<'a> {
    pub fn new(graph: &'a GraphSnapshot, naming: &'a NamingOptions) -> Self {
        Self { graph, naming }
    }

    pub fn build(&self, result: &PartitionResult) -> PartitionPlan {
        let hashes: Vec<String> = result.chunks.iter().map(|c| self.content_hash(c)).collect();
        let names = self.assign_names(result, &hashes);

        let mut chunks = BTreeMap::new();
        let mut modules: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (i, chunk) in result.chunks.iter().enumerate() {
            let ids: Vec<String> = chunk
                .modules
                .iter()
                .map(|&m| self.graph.module(m).id.clone())
                .collect();
            for id in &ids {
                modules.entry(id.clone()).or_default().push(names[i].clone());
            }

            let template = if chunk.kind == ChunkKind::Entry {
                &self.naming.filename
            } else {
                &self.naming.chunk_filename
            };

            chunks.insert(
                names[i].clone(),
                ChunkManifest {
                    id: hashes[i][..16].to_string(),
                    file: render_filename(template, &names[i], &hashes[i]),
                    kind: chunk.kind,
                    size: chunk.size,
                    initial: chunk
                        .origins
                        .iter()
                        .any(|&b| result.bases[b].kind == BaseKind::Initial),
                    on_demand: chunk
                        .origins
                        .iter()
                        .any(|&b| result.bases[b].kind == BaseKind::Async),
                    vendor: self.is_vendor(chunk),
                    modules: ids,
                },
            );
        }

        for list in modules.values_mut() {
            list.sort();
        }

        let mut entrypoints = Vec::new();
        let mut async_chunks = Vec::new();
        for (b, base) in result.bases.iter().enumerate() {
            let order = self.load_order(result, b, &names);
            let plan = LoadPlan {
                name: base.name.clone(),
                module: self.graph.module(base.root).id.clone(),
                requests: order.len(),
                chunks: order,
            };
            match base.kind {
                BaseKind::Initial => entrypoints.push(plan),
                BaseKind::Async => async_chunks.push(plan),
            }
        }

        PartitionPlan {
            chunks,
            entrypoints,
            async_chunks,
            modules,
            warnings: result.warnings.clone(),
        }
    }

    /// Hash of the sorted member ids
    fn content_hash(&self, chunk: &Chunk) -> String {
        let mut ids: Vec<&str> = chunk
            .modules
            .iter()
            .map(|&m| self.graph.module(m).id.as_str())
            .collect();
        ids.sort_unstable();
        hash_hex(ids.join("\n").as_bytes())
    }

    fn is_vendor(&self, chunk: &Chunk) -> bool {
        !chunk.modules.is_empty() && chunk.modules.iter().all(|&m| self.graph.module(m).is_vendor)
    }

    fn base_name(&self, result: &PartitionResult, base: BaseIdx) -> String {
        let base = &result.bases[base];
        match base.kind {
            BaseKind::Initial => base.name.clone(),
            BaseKind::Async => file_stem(&self.graph.module(base.root).id),
        }
    }

    fn assign_names(&self, result: &PartitionResult, hashes: &[String]) -> Vec<String> {
        let delim = &self.naming.delimiter;

        let raw: Vec<String> = result
            .chunks
            .iter()
            .zip(hashes)
            .map(|(chunk, hash)| {
                let name = match &chunk.name_hint {
                    NameHint::Base(b) => self.base_name(result, *b),
                    NameHint::Fixed(name) => name.clone(),
                    NameHint::Orphans => "orphans".to_string(),
                    NameHint::Group(key) => {
                        let mut origins: Vec<String> = chunk
                            .origins
                            .iter()
                            .map(|&b| self.base_name(result, b))
                            .collect();
                        origins.sort();
                        std::iter::once(key.clone())
                            .chain(origins)
                            .collect::<Vec<_>>()
                            .join(delim)
                    }
                };
                match chunk.part {
                    Some(_) => format!("{name}{delim}{}", &hash[..8]),
                    None => name,
                }
            })
            .collect();

        // Chunks sharing a name are told apart by content, first by hash wins
        let mut by_name: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, name) in raw.iter().enumerate() {
            by_name.entry(name.as_str()).or_default().push(i);
        }

        let mut names = raw.clone();
        let mut used: HashSet<String> = HashSet::new();
        let mut collisions: Vec<Vec<usize>> = Vec::new();
        for (name, indices) in &by_name {
            if indices.len() == 1 {
                used.insert(name.to_string());
            } else {
                collisions.push(indices.clone());
            }
        }
        collisions.sort_by(|a, b| raw[a[0]].cmp(&raw[b[0]]));

        for mut indices in collisions {
            indices.sort_by(|&a, &b| hashes[a].cmp(&hashes[b]).then(a.cmp(&b)));
            for (k, &i) in indices.iter().enumerate() {
                let mut name = if k == 0 {
                    raw[i].clone()
                } else {
                    format!("{}{delim}{}", raw[i], &hashes[i][..8])
                };
                let mut n = 1;
                while used.contains(&name) {
                    name = format!("{}{delim}{}{delim}{n}", raw[i], &hashes[i][..8]);
                    n += 1;
                }
                used.insert(name.clone());
                names[i] = name;
            }
        }

        names
    }

    /// Shared chunks before the base's own, vendor chunks first
    fn load_order(&self, result: &PartitionResult, base: BaseIdx, names: &[String]) -> Vec<String> {
        let mut loaded = result.chunks_loaded_by(base);
        loaded.sort_by_key(|&i| {
            let chunk = &result.chunks[i];
            (
                chunk.owner == Some(base),
                !self.is_vendor(chunk),
                Reverse(chunk.priority),
                names[i].clone(),
            )
        });
        loaded.into_iter().map(|i| names[i].clone()).collect()
    }
}

/// Fill `[name]`, `[id]`, `[hash]` and `[hash:N]` in a filename template
pub fn render_filename(template: &str, name: &str, hash: &str) -> String {
    let with_names = template
        .replace("[name]", name)
        .replace("[id]", &hash[..16.min(hash.len())]);

    HASH_PLACEHOLDER
        .replace_all(&with_names, |caps: &Captures| {
            let len = caps
                .get(1)
                .and_then(|m| m.as_str().parse::<usize>().ok())
                .unwrap_or(DEFAULT_HASH_LENGTH)
                .min(hash.len());
            hash[..len].to_string()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::graph::ModuleGraph;
    use crate::bundler::split::{CacheGroup, Entry, Partitioner, SplitOptions};

    const HASH: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_render_filename() {
        assert_eq!(render_filename("[name].js", "index", HASH), "index.js");
        assert_eq!(
            render_filename("[name]-[hash:8].js", "index", HASH),
            "index-01234567.js"
        );
        assert_eq!(
            render_filename("[id].[hash].js", "x", HASH),
            "0123456789abcdef.0123456789abcdef0123.js"
        );
        assert_eq!(render_filename("[hash:100].js", "x", HASH), format!("{HASH}.js"));
    }

    #[test]
    fn test_naming_for_mode() {
        let dev = NamingOptions::for_mode(Mode::Development);
        assert_eq!(dev.filename, "[name].js");

        let prod = NamingOptions::for_mode(Mode::Production);
        assert_eq!(prod.filename, "[name]-[hash:8].js");
        assert_eq!(prod.delimiter, "~");
    }

    #[test]
    fn test_group_chunk_names_and_load_order() {
        let mut graph = ModuleGraph::new();
        graph
            .add_module("src/a.js", 100, ["node_modules/react/index.js", "src/util.js"])
            .unwrap();
        graph
            .add_module("src/b.js", 100, ["node_modules/react/index.js", "src/util.js"])
            .unwrap();
        graph
            .add_module("node_modules/react/index.js", 5000, Vec::<String>::new())
            .unwrap();
        graph.add_module("src/util.js", 300, Vec::<String>::new()).unwrap();
        let graph = graph.finalize().unwrap();

        let options = SplitOptions {
            cache_groups: vec![
                CacheGroup::new("vendors").vendors().priority(-10),
                CacheGroup::new("common").min_chunks(2).priority(-20),
            ],
            ..SplitOptions::unconstrained()
        };
        let entries = [Entry::new("b", "src/b.js"), Entry::new("a", "src/a.js")];
        let result = Partitioner::new(options)
            .unwrap()
            .partition(&graph, &entries)
            .unwrap();

        let naming = NamingOptions::for_mode(Mode::Development);
        let plan = ManifestBuilder::new(&graph, &naming).build(&result);

        assert!(plan.chunk("vendors~a~b").unwrap().vendor);
        assert!(plan.chunk("common~a~b").is_some());
        assert_eq!(plan.chunk("a").unwrap().file, "a.js");

        let a = plan.entry("a").unwrap();
        assert_eq!(a.chunks, vec!["vendors~a~b", "common~a~b", "a"]);
        assert_eq!(a.requests, 3);
        assert_eq!(plan.chunks_of("src/util.js"), &["common~a~b".to_string()]);
    }

    #[test]
    fn test_names_are_stable_across_runs() {
        let build = || {
            let mut graph = ModuleGraph::new();
            graph.add_module("src/e.js", 10, ["src/big1.js", "src/big2.js", "src/big3.js"]).unwrap();
            graph.add_module("src/big1.js", 600, Vec::<String>::new()).unwrap();
            graph.add_module("src/big2.js", 500, Vec::<String>::new()).unwrap();
            graph.add_module("src/big3.js", 400, Vec::<String>::new()).unwrap();
            let graph = graph.finalize().unwrap();

            let options = SplitOptions {
                max_size: Some(1000),
                ..SplitOptions::unconstrained()
            };
            let result = Partitioner::new(options)
                .unwrap()
                .partition(&graph, &[Entry::new("e", "src/e.js")])
                .unwrap();
            let naming = NamingOptions::default();
            ManifestBuilder::new(&graph, &naming).build(&result).to_json().unwrap()
        };

        let first = build();
        assert_eq!(first, build());
    }
}
