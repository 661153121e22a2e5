//! Target-platform boundary crate for clinsync.
//!
//! This crate models the tracker-style health-information platform the
//! synchronization core writes into:
//! - opaque [`Reference`]s that identify remote metadata objects
//! - immutable [`MetadataRecord`] snapshots and paged listings
//! - the closed [`RequestMethod`] set for outgoing writes
//! - the [`MetadataCache`] with per-reference fetch coalescing and
//!   staleness tracking, fed by the [`poll`] change feed
//! - the [`MetadataSource`] collaborator trait and its HTTP implementation
//!
//! Transport of outgoing writes lives in `clinsync-core`; this crate only
//! covers the read/metadata side of the platform.

pub mod cache;
pub mod http;
pub mod metadata;
pub mod method;
pub mod poll;
pub mod reference;
pub mod remote;

// Re-export facades
pub use cache::{CacheConfig, MetadataCache, RetryConfig};
pub use http::{HttpMetadataSource, RemoteConfig};
pub use metadata::{expected_unit, MetadataFilter, MetadataPage, MetadataRecord};
pub use method::RequestMethod;
pub use poll::{ChangePoller, PollConfig, StalenessHandle};
pub use reference::{Reference, ReferenceKind};
pub use remote::{MetadataSource, RemoteError};

/// Errors returned by the `tracker` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// The remote system reported that no object resolves the reference.
    ///
    /// Only raised by lookups that require a result; optional lookups
    /// report absence as `Ok(None)`.
    #[error("no metadata found for reference {0}")]
    NotFound(Reference),

    /// A remote metadata fetch failed after bounded retries.
    #[error("metadata lookup for {reference} failed: {source}")]
    Remote {
        reference: Reference,
        source: RemoteError,
    },

    /// A bulk listing request failed.
    #[error("metadata listing failed: {0}")]
    Find(#[source] RemoteError),
}

/// Type alias for Results that can fail with a [`TrackerError`].
pub type TrackerResult<T> = Result<T, TrackerError>;
