//! # clinsync core
//!
//! Synchronization orchestration for clinsync.
//!
//! This crate drives one synchronization attempt end to end: resolve the
//! target reference through the metadata cache, normalize measurement
//! values in the payload, select the request method, and hand the finished
//! write intent to the transport collaborator.
//!
//! **No transport concerns**: HTTP clients, spool handling and process
//! wiring belong to the worker binary; this crate only consumes the
//! [`Transport`] seam.

pub mod intent;
pub mod locks;
pub mod orchestrator;
pub mod transport;

pub use intent::{Payload, PayloadValue, WriteDraft, WriteIntent};
pub use orchestrator::{FailureKind, SyncConfig, SyncOrchestrator, SyncOutcome, SyncReport};
pub use transport::{Transport, WriteOutcome};

/// Errors raised while preparing or dispatching a synchronization attempt.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The payload cannot be normalized for the target system.
    ///
    /// Fatal for the attempt and never retried; surfaced for manual fix.
    #[error("payload rejected: {0}")]
    Payload(String),

    /// Metadata resolution failed after the cache's bounded retries.
    #[error(transparent)]
    Resolution(#[from] tracker::TrackerError),

    /// The transport collaborator could not carry out the dispatch at all.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Type alias for Results that can fail with a [`SyncError`].
pub type SyncResult<T> = Result<T, SyncError>;
