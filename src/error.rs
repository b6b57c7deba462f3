//! Error types for graph construction and partitioning

use thiserror::Error;

/// Result alias used by the partitioning core
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building the module graph or validating split options.
///
/// Graph errors are raised before partitioning starts; once a snapshot and a
/// validated set of options exist, partitioning cannot fail.
#[derive(Debug, Error)]
pub enum Error {
    /// A module id was added to the graph twice
    #[error("module '{0}' was added to the graph more than once")]
    DuplicateModule(String),

    /// A dependency id was never added before the graph was finalized
    #[error("module '{module}' depends on '{dependency}', which is not in the graph")]
    UnresolvedDependency { module: String, dependency: String },

    /// An entry point refers to a module the graph does not contain
    #[error("entry point '{entry}' refers to unknown module '{module}'")]
    UnknownEntry { entry: String, module: String },

    /// The same entry point name was declared twice
    #[error("entry point '{0}' is declared more than once")]
    DuplicateEntry(String),

    /// The split configuration can never be satisfied
    #[error("unsatisfiable split constraint: {0}")]
    UnsatisfiableConstraint(String),

    /// A cache group pattern failed to compile
    #[error("invalid pattern '{pattern}' in cache group '{group}': {reason}")]
    InvalidPattern {
        group: String,
        pattern: String,
        reason: String,
    },
}
