//! chunkplan library
//!
//! Deterministic chunk splitting for frontend module graphs: a module graph
//! goes in, a named set of chunks and per-entry load order comes out.

pub mod bundler;
pub mod cli;
pub mod config;
pub mod error;
pub mod plugins;
pub mod utils;

pub use bundler::{Bundler, ModuleGraph, Partitioner, PartitionPlan};
pub use cli::Cli;
pub use config::Config;
pub use error::Error;
