use std::fmt;

/// Identifier of a replication session, shared by every worker of a pool.
pub type ReplicationId = String;

/// Number of random bytes a [`WorkerId`] is made of.
const WORKER_ID_BYTES: usize = 4;

/// Randomly generated identifier of a single replication worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerId(String);

impl WorkerId {
    /// Generates a new worker id made of 8 lowercase hex characters.
    pub fn generate() -> Self {
        let bytes: [u8; WORKER_ID_BYTES] = rand::random();
        let id = bytes.iter().map(|byte| format!("{byte:02x}")).collect();

        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity attached to every log line and metric emitted by a worker.
///
/// The identity is purely informational and carries no synchronization semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    pub worker_id: WorkerId,
    pub replication_id: ReplicationId,
}

impl WorkerIdentity {
    /// Creates an identity with a freshly generated [`WorkerId`].
    pub fn generate(replication_id: ReplicationId) -> Self {
        Self {
            worker_id: WorkerId::generate(),
            replication_id,
        }
    }
}
