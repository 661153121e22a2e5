//! Polling-based staleness feed for the metadata cache.
//!
//! The remote platform exposes no push channel for metadata changes, so
//! staleness is driven by polling the modified-since listing. The poller is
//! deliberately decoupled from fetch logic: it only flips staleness flags
//! through a [`StalenessHandle`], and the next lookup pays for the refresh.

use crate::cache::MetadataCache;
use crate::reference::Reference;
use crate::remote::{MetadataSource, RemoteError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Change-feed polling parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Seconds between polls.
    pub interval_secs: u64,
    /// Overlap between consecutive poll windows, to absorb clock skew
    /// between this process and the remote.
    pub tolerance_millis: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            tolerance_millis: 2_000,
        }
    }
}

/// The subscription interface a cache hands to its staleness feed.
///
/// Holds a weak reference: the feed can mark entries stale but never keeps
/// the cache alive or fetches through it.
pub struct StalenessHandle {
    cache: Weak<MetadataCache>,
}

impl StalenessHandle {
    pub(crate) fn new(cache: Weak<MetadataCache>) -> Self {
        Self { cache }
    }

    /// Marks the cache entry for `reference` stale.
    ///
    /// Returns whether a live cache held an entry for it.
    pub async fn mark_stale(&self, reference: &Reference) -> bool {
        match self.cache.upgrade() {
            Some(cache) => cache.mark_stale(reference).await,
            None => false,
        }
    }

    /// True while the cache this handle feeds is still alive.
    pub fn is_attached(&self) -> bool {
        self.cache.strong_count() > 0
    }
}

/// Polls the remote change feed and marks matching cache entries stale.
pub struct ChangePoller {
    source: Arc<dyn MetadataSource>,
    handle: StalenessHandle,
    config: PollConfig,
    window_start: DateTime<Utc>,
}

impl ChangePoller {
    /// Create a poller feeding `handle` from `source`.
    ///
    /// The first window starts at construction time; changes older than
    /// that are assumed to be covered by cache misses.
    pub fn new(source: Arc<dyn MetadataSource>, handle: StalenessHandle, config: PollConfig) -> Self {
        Self {
            source,
            handle,
            config,
            window_start: Utc::now(),
        }
    }

    /// Runs one poll window. Returns how many cache entries were marked
    /// stale.
    ///
    /// On a remote error the window is left untouched so the next tick
    /// re-covers the same period.
    pub async fn tick(&mut self) -> Result<usize, RemoteError> {
        let since =
            self.window_start - chrono::Duration::milliseconds(self.config.tolerance_millis as i64);
        let next_window_start = Utc::now();
        let changed = self.source.fetch_changed_since(since).await?;

        let mut marked = 0usize;
        for reference in &changed {
            if self.handle.mark_stale(reference).await {
                marked += 1;
            }
        }
        self.window_start = next_window_start;
        Ok(marked)
    }

    /// Long-running poll loop; ends when the fed cache is dropped.
    pub async fn run(mut self) {
        let period = Duration::from_secs(self.config.interval_secs.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick of a tokio interval completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            if !self.handle.is_attached() {
                tracing::debug!("metadata cache dropped, stopping change poller");
                return;
            }
            match self.tick().await {
                Ok(0) => {}
                Ok(marked) => tracing::debug!(marked, "marked cache entries stale"),
                Err(err) => {
                    tracing::warn!(error = %err, "change poll failed, keeping previous window");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::metadata::{MetadataFilter, MetadataPage, MetadataRecord};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct FeedSource {
        record: MetadataRecord,
        changed: StdMutex<Vec<Reference>>,
        windows: StdMutex<Vec<DateTime<Utc>>>,
    }

    #[async_trait]
    impl MetadataSource for FeedSource {
        async fn fetch_by_reference(
            &self,
            reference: &Reference,
        ) -> Result<Option<MetadataRecord>, RemoteError> {
            Ok(Some(&self.record)
                .filter(|record| record.references().contains(reference))
                .cloned())
        }

        async fn fetch_page(
            &self,
            _filter: &MetadataFilter,
            _offset: u32,
            _limit: u32,
        ) -> Result<MetadataPage, RemoteError> {
            Ok(MetadataPage {
                items: vec![self.record.clone()],
                more: false,
            })
        }

        async fn fetch_changed_since(
            &self,
            since: DateTime<Utc>,
        ) -> Result<Vec<Reference>, RemoteError> {
            self.windows.lock().unwrap().push(since);
            Ok(self.changed.lock().unwrap().clone())
        }
    }

    fn feed_source(changed: Vec<Reference>) -> Arc<FeedSource> {
        Arc::new(FeedSource {
            record: MetadataRecord {
                id: "a1".into(),
                code: Some("C1".into()),
                identifier: None,
                name: "record".into(),
                last_updated: Utc::now(),
                attributes: serde_json::Value::Null,
            },
            changed: StdMutex::new(changed),
            windows: StdMutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn tick_marks_changed_entries_stale() {
        let source = feed_source(vec![Reference::id("a1"), Reference::id("unknown")]);
        let cache = Arc::new(MetadataCache::new(source.clone(), CacheConfig::default()));
        cache
            .find_by_reference(&Reference::code("C1"))
            .await
            .unwrap();

        let mut poller =
            ChangePoller::new(
                source.clone(),
                MetadataCache::staleness_handle(&cache),
                PollConfig::default(),
            );
        let marked = poller.tick().await.unwrap();

        assert_eq!(marked, 1);
        assert!(cache.needs_refresh(&Reference::code("C1")).await);
    }

    #[tokio::test]
    async fn windows_overlap_by_the_tolerance() {
        let source = feed_source(Vec::new());
        let cache = Arc::new(MetadataCache::new(source.clone(), CacheConfig::default()));
        let config = PollConfig {
            interval_secs: 30,
            tolerance_millis: 2_000,
        };
        let mut poller =
            ChangePoller::new(source.clone(), MetadataCache::staleness_handle(&cache), config);

        let before_first = poller.window_start;
        poller.tick().await.unwrap();
        poller.tick().await.unwrap();

        let windows = source.windows.lock().unwrap();
        assert_eq!(windows.len(), 2);
        // each window starts the tolerance before the recorded window start
        assert_eq!(
            before_first - windows[0],
            chrono::Duration::milliseconds(2_000)
        );
        assert!(windows[1] >= windows[0]);
    }

    #[tokio::test]
    async fn handle_detaches_when_cache_is_dropped() {
        let source = feed_source(vec![Reference::id("a1")]);
        let cache = Arc::new(MetadataCache::new(source.clone(), CacheConfig::default()));
        let handle = MetadataCache::staleness_handle(&cache);

        assert!(handle.is_attached());
        drop(cache);
        assert!(!handle.is_attached());
        assert!(!handle.mark_stale(&Reference::id("a1")).await);
    }
}
