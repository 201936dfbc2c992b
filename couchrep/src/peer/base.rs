use std::future::Future;

use crate::error::RepResult;
use crate::types::{DocumentRevisionSet, RevsDiffResponse};

/// Destination data store of a replication.
///
/// Implementations are expected to issue a single request for the whole revision set and to
/// report transport failures as [`crate::error::ErrorKind::TargetConnectionFailed`] or
/// [`crate::error::ErrorKind::TargetRequestFailed`], and unexpected responses as
/// [`crate::error::ErrorKind::TargetProtocolViolation`].
pub trait TargetPeer {
    /// Asks the target which of the given revisions it doesn't have.
    fn revs_diff(
        &self,
        revisions: &DocumentRevisionSet,
    ) -> impl Future<Output = RepResult<RevsDiffResponse>> + Send;
}
