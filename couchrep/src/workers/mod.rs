pub mod base;
pub mod pool;
pub mod replication;
