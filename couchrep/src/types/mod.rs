//! Data model of the replication worker pipeline.

mod change;
mod identity;
mod progress;
mod revs;

pub use change::*;
pub use identity::*;
pub use progress::*;
pub use revs::*;
