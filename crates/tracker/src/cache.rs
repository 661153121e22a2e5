//! Metadata resolution and caching.
//!
//! The cache mediates between the synchronization core and the remote
//! metadata service. It owns immutable [`MetadataRecord`] snapshots keyed
//! by every reference kind a record exposes, coalesces concurrent fetches
//! for the same reference onto a single remote call, and serves
//! slightly-stale data while a refresh is in flight rather than blocking
//! readers.
//!
//! Lifecycle is process-scoped and explicit: construct one cache per
//! remote metadata collection, with its source and configuration injected.

use crate::metadata::{MetadataFilter, MetadataPage, MetadataRecord};
use crate::poll::StalenessHandle;
use crate::reference::Reference;
use crate::remote::{MetadataSource, RemoteError};
use crate::{TrackerError, TrackerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Bounded retry with exponential backoff for transient remote failures.
///
/// Parameters are configuration rather than constants; the defaults are a
/// starting point, not a product decision.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay_ms: u64,
    /// Upper bound on the doubling delay.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 250,
            max_delay_ms: 5_000,
        }
    }
}

/// Cache construction parameters.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Retry policy for transient remote fetch failures.
    pub retry: RetryConfig,
}

/// One cached snapshot plus its bookkeeping.
///
/// A single entry is inserted under every reference the record exposes, so
/// flipping the staleness flag through one alias is visible through all of
/// them.
struct CacheEntry {
    record: Arc<MetadataRecord>,
    fetched_at: DateTime<Utc>,
    stale: AtomicBool,
}

impl CacheEntry {
    fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }
}

/// Metadata resolution and cache component.
///
/// Concurrency contract:
/// - for a given reference at most one remote fetch is in flight;
///   concurrent callers coalesce onto it and all receive its result
/// - the per-reference fetch lock is held only across the remote fetch and
///   the map update, never across caller-side processing
/// - records are immutable once stored; a refresh inserts a new snapshot
pub struct MetadataCache {
    source: Arc<dyn MetadataSource>,
    config: CacheConfig,
    entries: RwLock<HashMap<Reference, Arc<CacheEntry>>>,
    fetch_locks: Mutex<HashMap<Reference, Arc<Mutex<()>>>>,
}

impl MetadataCache {
    /// Create a cache over the given remote source.
    pub fn new(source: Arc<dyn MetadataSource>, config: CacheConfig) -> Self {
        Self {
            source,
            config,
            entries: RwLock::new(HashMap::new()),
            fetch_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Hands out the staleness-feed subscription for this cache.
    ///
    /// The handle holds a weak reference: it can only mark entries stale
    /// and does not keep the cache alive.
    pub fn staleness_handle(cache: &Arc<Self>) -> StalenessHandle {
        StalenessHandle::new(Arc::downgrade(cache))
    }

    /// Returns a cached record without remote I/O when a fresh entry
    /// exists; otherwise fetches, stores the result under every reference
    /// the record exposes, and returns it.
    ///
    /// Absence (`Ok(None)`) means the remote reported no such object; it is
    /// not an error and is not cached. A stale entry triggers exactly one
    /// re-fetch: the caller that wins the fetch lock refreshes, concurrent
    /// callers are served the stale snapshot instead of blocking.
    pub async fn find_by_reference(
        &self,
        reference: &Reference,
    ) -> TrackerResult<Option<Arc<MetadataRecord>>> {
        let existing = self.entry(reference).await;
        match existing {
            Some(entry) if !entry.is_stale() => {
                tracing::debug!(%reference, "metadata cache hit");
                Ok(Some(entry.record.clone()))
            }
            Some(entry) => {
                let fetch_lock = self.fetch_lock(reference).await;
                let attempt = fetch_lock.try_lock();
                match attempt {
                    Ok(_guard) => {
                        // the refresh may have happened while we took the lock
                        if let Some(current) = self.entry(reference).await {
                            if !current.is_stale() {
                                return Ok(Some(current.record.clone()));
                            }
                        }
                        self.refresh_locked(reference).await
                    }
                    Err(_) => {
                        let age_secs = (Utc::now() - entry.fetched_at).num_seconds();
                        tracing::debug!(%reference, age_secs, "serving stale metadata during refresh");
                        Ok(Some(entry.record.clone()))
                    }
                }
            }
            None => {
                let fetch_lock = self.fetch_lock(reference).await;
                let _guard = fetch_lock.lock().await;
                // a coalesced waiter finds the winner's entry here
                if let Some(entry) = self.entry(reference).await {
                    if !entry.is_stale() {
                        return Ok(Some(entry.record.clone()));
                    }
                }
                self.refresh_locked(reference).await
            }
        }
    }

    /// Always fetches from the remote and replaces the cache entry.
    ///
    /// Used when the caller has independent reason to believe the cached
    /// copy is stale, e.g. after a write through this same core.
    pub async fn find_refreshed_by_reference(
        &self,
        reference: &Reference,
    ) -> TrackerResult<Option<Arc<MetadataRecord>>> {
        let fetch_lock = self.fetch_lock(reference).await;
        let _guard = fetch_lock.lock().await;
        self.refresh_locked(reference).await
    }

    /// Like [`find_by_reference`](Self::find_by_reference) but absence is
    /// an error.
    pub async fn find_one(&self, reference: &Reference) -> TrackerResult<Arc<MetadataRecord>> {
        self.find_by_reference(reference)
            .await?
            .ok_or_else(|| TrackerError::NotFound(reference.clone()))
    }

    /// Bulk listing against the remote, bypassing the single-key cache.
    ///
    /// Used for reconciliation sweeps, not per-record resolution.
    pub async fn find(
        &self,
        filter: &MetadataFilter,
        offset: u32,
        limit: u32,
    ) -> TrackerResult<MetadataPage> {
        self.source
            .fetch_page(filter, offset, limit)
            .await
            .map_err(TrackerError::Find)
    }

    /// Marks the entry for `reference` stale without evicting it.
    ///
    /// Returns whether an entry was found. The flag is shared across all
    /// aliases of the record; the next
    /// [`find_by_reference`](Self::find_by_reference) triggers one
    /// re-fetch.
    pub async fn mark_stale(&self, reference: &Reference) -> bool {
        let entries = self.entries.read().await;
        match entries.get(reference) {
            Some(entry) => {
                entry.stale.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// True when the cache holds no entry, or a stale one, for `reference`.
    pub async fn needs_refresh(&self, reference: &Reference) -> bool {
        let entries = self.entries.read().await;
        match entries.get(reference) {
            Some(entry) => entry.is_stale(),
            None => true,
        }
    }

    async fn entry(&self, reference: &Reference) -> Option<Arc<CacheEntry>> {
        self.entries.read().await.get(reference).cloned()
    }

    async fn fetch_lock(&self, reference: &Reference) -> Arc<Mutex<()>> {
        let mut locks = self.fetch_locks.lock().await;
        locks
            .entry(reference.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Fetches and stores one record. Caller must hold the fetch lock for
    /// `reference`.
    async fn refresh_locked(
        &self,
        reference: &Reference,
    ) -> TrackerResult<Option<Arc<MetadataRecord>>> {
        match self.fetch_with_retry(reference).await? {
            Some(record) => {
                let record = Arc::new(record);
                let entry = Arc::new(CacheEntry {
                    record: record.clone(),
                    fetched_at: Utc::now(),
                    stale: AtomicBool::new(false),
                });
                let mut entries = self.entries.write().await;
                for alias in record.references() {
                    entries.insert(alias, entry.clone());
                }
                Ok(Some(record))
            }
            None => {
                // the object is gone remotely: drop it under every alias
                let mut entries = self.entries.write().await;
                if let Some(old) = entries.remove(reference) {
                    for alias in old.record.references() {
                        entries.remove(&alias);
                    }
                }
                Ok(None)
            }
        }
    }

    async fn fetch_with_retry(
        &self,
        reference: &Reference,
    ) -> TrackerResult<Option<MetadataRecord>> {
        let retry = &self.config.retry;
        let mut delay = Duration::from_millis(retry.initial_delay_ms);
        let mut attempt = 1u32;
        loop {
            match self.source.fetch_by_reference(reference).await {
                Ok(found) => return Ok(found),
                Err(err) if err.is_transient() && attempt < retry.max_attempts => {
                    tracing::warn!(
                        %reference,
                        attempt,
                        error = %err,
                        "transient metadata fetch failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_millis(retry.max_delay_ms));
                    attempt += 1;
                }
                Err(err) => {
                    return Err(TrackerError::Remote {
                        reference: reference.clone(),
                        source: err,
                    })
                }
            }
        }
    }
}
