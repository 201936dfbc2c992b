//! Configuration management for the replicator.
//!
//! Provides environment detection, hierarchical configuration loading from YAML files and
//! environment variables, and the shared configuration types consumed by the worker pool.

mod environment;
mod load;
pub mod shared;

pub use environment::*;
pub use load::*;
