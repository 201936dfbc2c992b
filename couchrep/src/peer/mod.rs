//! Target peer capability used to discover missing revisions.

pub mod base;
pub mod memory;
pub mod retry;

pub use base::TargetPeer;
