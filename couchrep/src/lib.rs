//! Replication workers computing the revisions a target peer is missing.
//!
//! Workers drain batches of change events from a shared [`concurrency::queue::WorkQueue`], ask
//! the target peer which revisions it lacks with one revision diff per batch, and report their
//! progress so that a safe checkpoint can be computed with [`checkpoint::ProgressTracker`].
pub mod checkpoint;
pub mod concurrency;
pub mod error;
mod macros;
pub mod metrics;
pub mod peer;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod workers;
