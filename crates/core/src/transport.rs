//! Transport collaborator for outgoing writes.

use crate::intent::WriteIntent;
use crate::SyncResult;
use async_trait::async_trait;
use tracker::Reference;

/// What became of one dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write was applied; `reference` identifies the resulting object.
    Success { reference: Reference },
    /// The remote outcome cannot be determined (e.g. timeout after the
    /// request may have been sent). Drives the retry policy: only methods
    /// that are safe to repeat blindly may be re-dispatched.
    AmbiguousFailure { message: String },
    /// The remote definitely did not apply the write.
    DefiniteFailure { message: String },
}

/// The external write channel a finished [`WriteIntent`] is handed to.
///
/// Implementations must fold uncertainty into
/// [`WriteOutcome::AmbiguousFailure`]; an `Err` from `execute` means the
/// dispatch could not be attempted at all and the write was definitely not
/// applied.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Carry out one write intent.
    async fn execute(&self, intent: &WriteIntent) -> SyncResult<WriteOutcome>;
}
