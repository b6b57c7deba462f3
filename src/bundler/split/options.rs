//! Split options and cache group rules

use globset::{Glob, GlobMatcher};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::bundler::chunk::BaseKind;
use crate::bundler::graph::Module;
use crate::error::{Error, Result};

/// Which base chunks count towards a module's usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkSelection {
    #[default]
    All,
    Initial,
    Async,
}

impl ChunkSelection {
    pub fn includes(&self, kind: BaseKind) -> bool {
        match self {
            ChunkSelection::All => true,
            ChunkSelection::Initial => kind == BaseKind::Initial,
            ChunkSelection::Async => kind == BaseKind::Async,
        }
    }
}

/// Predicate selecting the modules a cache group may claim
#[derive(Debug, Clone)]
pub enum ModuleMatcher {
    /// Every module
    Any,
    /// Modules from installed packages
    Vendor,
    /// Module ids matching a regular expression
    Pattern(Regex),
    /// Module ids matching a glob
    Glob(GlobMatcher),
}

impl ModuleMatcher {
    pub fn matches(&self, module: &Module) -> bool {
        match self {
            ModuleMatcher::Any => true,
            ModuleMatcher::Vendor => module.is_vendor,
            ModuleMatcher::Pattern(re) => re.is_match(&module.id),
            ModuleMatcher::Glob(glob) => glob.is_match(&module.id),
        }
    }
}

/// A named rule grouping shared modules into a common chunk
#[derive(Debug, Clone)]
pub struct CacheGroup {
    /// Group key, used in automatic chunk names
    pub key: String,

    pub matcher: ModuleMatcher,

    /// Higher priority groups claim modules first
    pub priority: i32,

    /// Overrides the global `min_chunks`
    pub min_chunks: Option<usize>,

    /// Overrides the global `min_size`
    pub min_size: Option<u64>,

    /// Overrides the global `max_size`
    pub max_size: Option<u64>,

    /// Fold into an existing chunk holding exactly the same modules
    pub reuse_existing_chunk: bool,

    /// Put every claimed module in one chunk with this name
    pub name: Option<String>,
}

impl CacheGroup {
    /// Create a group matching every module
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            matcher: ModuleMatcher::Any,
            priority: 0,
            min_chunks: None,
            min_size: None,
            max_size: None,
            reuse_existing_chunk: false,
            name: None,
        }
    }

    /// Match module ids against a regular expression
    pub fn test(mut self, pattern: &str) -> Result<Self> {
        let re = Regex::new(pattern).map_err(|e| Error::InvalidPattern {
            group: self.key.clone(),
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        self.matcher = ModuleMatcher::Pattern(re);
        Ok(self)
    }

    /// Match module ids against a glob
    pub fn glob(mut self, pattern: &str) -> Result<Self> {
        let glob = Glob::new(pattern).map_err(|e| Error::InvalidPattern {
            group: self.key.clone(),
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        self.matcher = ModuleMatcher::Glob(glob.compile_matcher());
        Ok(self)
    }

    /// Match vendor modules only
    pub fn vendors(mut self) -> Self {
        self.matcher = ModuleMatcher::Vendor;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn min_chunks(mut self, min_chunks: usize) -> Self {
        self.min_chunks = Some(min_chunks);
        self
    }

    pub fn min_size(mut self, min_size: u64) -> Self {
        self.min_size = Some(min_size);
        self
    }

    pub fn max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    pub fn reuse_existing_chunk(mut self, reuse: bool) -> Self {
        self.reuse_existing_chunk = reuse;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Constraints for the partitioner
#[derive(Debug, Clone)]
pub struct SplitOptions {
    pub chunks: ChunkSelection,
    pub min_size: u64,
    /// `None` means chunks are never split for size
    pub max_size: Option<u64>,
    pub min_chunks: usize,
    pub max_async_requests: usize,
    pub max_initial_requests: usize,
    /// Declaration order breaks priority ties
    pub cache_groups: Vec<CacheGroup>,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            chunks: ChunkSelection::All,
            min_size: 51200,
            max_size: Some(1024 * 1024),
            min_chunks: 1,
            max_async_requests: 5,
            max_initial_requests: 3,
            cache_groups: default_cache_groups(),
        }
    }
}

/// The `vendors` and `default` groups
pub fn default_cache_groups() -> Vec<CacheGroup> {
    vec![
        CacheGroup::new("vendors").vendors().priority(-10),
        CacheGroup::new("default")
            .min_chunks(2)
            .priority(-20)
            .reuse_existing_chunk(true),
    ]
}

impl SplitOptions {
    /// Options with no cache groups and no size limits
    pub fn unconstrained() -> Self {
        Self {
            min_size: 0,
            max_size: None,
            max_async_requests: usize::MAX,
            max_initial_requests: usize::MAX,
            cache_groups: Vec::new(),
            ..Self::default()
        }
    }

    /// Reject configurations no plan can satisfy
    pub fn validate(&self) -> Result<()> {
        if self.max_initial_requests < 1 {
            return Err(unsatisfiable("max_initial_requests must be at least 1"));
        }
        if self.max_async_requests < 1 {
            return Err(unsatisfiable("max_async_requests must be at least 1"));
        }
        if self.min_chunks < 1 {
            return Err(unsatisfiable("min_chunks must be at least 1"));
        }
        check_size_bounds("split options", self.min_size, self.max_size)?;

        for group in &self.cache_groups {
            if group.min_chunks == Some(0) {
                return Err(unsatisfiable(format!(
                    "cache group '{}' has min_chunks = 0",
                    group.key
                )));
            }
            check_size_bounds(
                &format!("cache group '{}'", group.key),
                group.min_size.unwrap_or(self.min_size),
                group.max_size.or(self.max_size),
            )?;
        }

        Ok(())
    }
}

fn check_size_bounds(scope: &str, min_size: u64, max_size: Option<u64>) -> Result<()> {
    match max_size {
        Some(max) if min_size > max => Err(unsatisfiable(format!(
            "{scope}: min_size {min_size} is larger than max_size {max}"
        ))),
        _ => Ok(()),
    }
}

fn unsatisfiable(reason: impl Into<String>) -> Error {
    Error::UnsatisfiableConstraint(reason.into())
}
