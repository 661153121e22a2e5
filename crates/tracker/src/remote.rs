//! Remote metadata service collaborator.

use crate::metadata::{MetadataFilter, MetadataPage, MetadataRecord};
use crate::reference::Reference;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Errors reported by a [`MetadataSource`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    /// The request could not be completed; the condition may clear.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The remote rejected the request; repeating it will not help.
    #[error("remote rejected request: {0}")]
    Rejected(String),

    /// The remote answered with a payload this crate cannot decode.
    #[error("could not decode remote payload: {0}")]
    Decode(String),
}

impl RemoteError {
    /// True when the cache may retry the request with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transport(_))
    }
}

/// The remote metadata service the cache mediates access to.
///
/// Absence of an object is reported as `Ok(None)`, never as an error;
/// errors mean the question could not be answered.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetch the metadata object resolving `reference`, if any.
    async fn fetch_by_reference(
        &self,
        reference: &Reference,
    ) -> Result<Option<MetadataRecord>, RemoteError>;

    /// Fetch one page of a filtered listing.
    async fn fetch_page(
        &self,
        filter: &MetadataFilter,
        offset: u32,
        limit: u32,
    ) -> Result<MetadataPage, RemoteError>;

    /// References of objects modified since `since`.
    ///
    /// This is the poll side of the staleness-signal feed; see
    /// [`crate::poll::ChangePoller`].
    async fn fetch_changed_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Reference>, RemoteError>;
}
