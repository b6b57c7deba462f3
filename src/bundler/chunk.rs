//! Chunks produced by the partitioner

use std::collections::BTreeSet;

use serde::Serialize;

use super::graph::ModuleIdx;

/// Index of a base chunk (an entry point or a split point)
pub type BaseIdx = usize;

/// Priority carried by a base's own chunks; they are merged last
pub const OWN_CHUNK_PRIORITY: i32 = i32::MAX;

/// Type of chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// Entry point chunk - loaded immediately
    Entry,
    /// Async chunk - loaded on demand via dynamic import
    Async,
    /// Shared chunk - split out by a cache group
    Shared,
    /// Modules no entry point reaches
    Orphan,
}

/// How a base chunk is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseKind {
    Initial,
    Async,
}

/// A chunk implied by the module graph before any splitting
#[derive(Debug, Clone)]
pub struct BaseChunk {
    /// Entry name, or the split point's module id
    pub name: String,

    pub kind: BaseKind,

    /// Entry module or split point module
    pub root: ModuleIdx,

    /// Modules loaded by this base, in discovery order
    pub modules: Vec<ModuleIdx>,

    /// Bases that load this one through a dynamic import
    pub parents: BTreeSet<BaseIdx>,
}

/// What a chunk's final name is derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameHint {
    /// Own chunk of a base
    Base(BaseIdx),
    /// Cache group chunk named after the group and its origins
    Group(String),
    /// Cache group chunk with a fixed name
    Fixed(String),
    Orphans,
}

/// A chunk is a group of modules that will be bundled together
#[derive(Debug, Clone)]
pub struct Chunk {
    pub kind: ChunkKind,

    pub name_hint: NameHint,

    /// Module indices, in discovery order
    pub modules: Vec<ModuleIdx>,

    /// Sum of estimated member sizes
    pub size: u64,

    pub priority: i32,

    /// Bases that load this chunk
    pub origins: BTreeSet<BaseIdx>,

    /// Set when this is the own chunk of a base
    pub owner: Option<BaseIdx>,

    /// Size cap applied by the max-size pass
    pub max_size: Option<u64>,

    /// Set when the chunk is one of several parts of a split chunk
    pub part: Option<usize>,
}

impl Chunk {
    /// Create the own chunk of a base
    pub fn own(base: BaseIdx, kind: BaseKind, modules: Vec<ModuleIdx>, size: u64) -> Self {
        Self {
            kind: match kind {
                BaseKind::Initial => ChunkKind::Entry,
                BaseKind::Async => ChunkKind::Async,
            },
            name_hint: NameHint::Base(base),
            modules,
            size,
            priority: OWN_CHUNK_PRIORITY,
            origins: BTreeSet::from([base]),
            owner: Some(base),
            max_size: None,
            part: None,
        }
    }

    /// Create a shared chunk split out by a cache group
    pub fn shared(
        name_hint: NameHint,
        modules: Vec<ModuleIdx>,
        size: u64,
        priority: i32,
        origins: BTreeSet<BaseIdx>,
    ) -> Self {
        Self {
            kind: ChunkKind::Shared,
            name_hint,
            modules,
            size,
            priority,
            origins,
            owner: None,
            max_size: None,
            part: None,
        }
    }

    /// Create the chunk holding unreachable modules
    pub fn orphans(modules: Vec<ModuleIdx>, size: u64) -> Self {
        Self {
            kind: ChunkKind::Orphan,
            name_hint: NameHint::Orphans,
            modules,
            size,
            priority: i32::MIN,
            origins: BTreeSet::new(),
            owner: None,
            max_size: None,
            part: None,
        }
    }

    /// Check if chunk is empty
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Number of modules in chunk
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if a base loads this chunk
    pub fn is_loaded_by(&self, base: BaseIdx) -> bool {
        self.origins.contains(&base)
    }

    /// Check if this is a chunk only `base` loads and owns
    pub fn is_private_to(&self, base: BaseIdx) -> bool {
        self.owner == Some(base) && self.origins.len() == 1 && self.origins.contains(&base)
    }
}
