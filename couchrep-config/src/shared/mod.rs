mod base;
mod batch;
mod pool;
mod replicator;
mod retry;

pub use base::*;
pub use batch::*;
pub use pool::*;
pub use replicator::*;
pub use retry::*;
