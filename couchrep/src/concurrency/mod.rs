//! Concurrency primitives shared by the replication workers.
//!
//! Contains the closable work queue used to distribute change events and progress reports
//! between workers, together with the capabilities workers consume from it.

pub mod queue;
