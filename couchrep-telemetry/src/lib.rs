//! Telemetry setup for the replicator.
//!
//! Configures structured logging with environment-appropriate outputs: rolling JSON files in
//! production-like environments and pretty terminal output in development.

pub mod tracing;

pub use tracing::*;
