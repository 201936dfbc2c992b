//! Shared helpers for testing replication workers.
//!
//! Includes change event builders, a target peer wrapper that records and manipulates revision
//! diff requests, and checks over the progress signals emitted by workers.
pub mod event;
pub mod progress;
pub mod target;
