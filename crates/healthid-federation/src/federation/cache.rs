//! Proactive-refresh cache for federation documents.
//!
//! # Overview
//!
//! [`TtlCache`] keeps one document per key and hands it out while it stays
//! valid for at least `minimum_lookahead` into the future. Once a document
//! would expire inside that window it is refetched, so callers never receive
//! a document that is about to expire mid-flow.
//!
//! # Concurrency
//!
//! Each key owns an async mutex slot. Concurrent callers for the same key
//! queue on that slot and the supplier runs at most once per refresh; callers
//! for different keys never wait on each other.
//!
//! # Example
//!
//! ```ignore
//! let cache = TtlCache::new(Duration::from_secs(300), Arc::new(SystemClock));
//! let statement = cache
//!     .compute_if_absent(subject, || api.fetch_entity_configuration(subject))
//!     .await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use super::documents::TemporalValidity;
use crate::clock::Clock;

type Slot<V> = Arc<Mutex<Option<V>>>;

/// A per-key cache of documents with a validity window.
pub struct TtlCache<V> {
    entries: DashMap<String, Slot<V>>,
    minimum_lookahead: time::Duration,
    clock: Arc<dyn Clock>,
}

impl<V> TtlCache<V>
where
    V: TemporalValidity + Clone + Send,
{
    /// Creates an empty cache.
    #[must_use]
    pub fn new(minimum_lookahead: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        let seconds = i64::try_from(minimum_lookahead.as_secs()).unwrap_or(i64::MAX);
        Self {
            entries: DashMap::new(),
            minimum_lookahead: time::Duration::seconds(seconds),
            clock,
        }
    }

    /// Returns the cached value for `key`, or computes and stores a new one.
    ///
    /// A cached value is reused only if it is valid now and still valid after
    /// `minimum_lookahead`. Otherwise `supplier` runs and its result replaces
    /// the entry.
    ///
    /// # Errors
    ///
    /// Returns the supplier's error; the previously cached value is kept.
    pub async fn compute_if_absent<F, Fut, E>(&self, key: &str, supplier: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        // Clone the slot out so the map shard is not locked across `.await`
        let slot = Arc::clone(self.entries.entry(key.to_string()).or_default().value());
        let mut cached = slot.lock().await;

        if let Some(value) = cached.as_ref()
            && self.is_fresh(value)
        {
            tracing::trace!("Cache hit for {}", key);
            return Ok(value.clone());
        }

        tracing::debug!("Cache miss for {}, refreshing", key);

        match supplier().await {
            Ok(value) => {
                *cached = Some(value.clone());
                Ok(value)
            }
            Err(e) => {
                // Drop an empty slot only if no other caller is queued on it
                if cached.is_none() {
                    self.entries.remove_if(key, |_, current| {
                        Arc::ptr_eq(current, &slot) && Arc::strong_count(current) == 2
                    });
                }
                Err(e)
            }
        }
    }

    /// Removes the entry for `key`.
    ///
    /// An entry that is currently being refreshed is left alone; the
    /// refresh replaces its value anyway.
    pub fn invalidate(&self, key: &str) {
        if self
            .entries
            .remove_if(key, |_, slot| slot.try_lock().is_ok())
            .is_some()
        {
            tracing::debug!("Invalidated cache entry {}", key);
        }
    }

    /// Removes entries that are no longer valid.
    ///
    /// Entries that are currently being refreshed are left alone.
    pub fn cleanup(&self) {
        let now = self.clock.now();
        let before = self.entries.len();

        self.entries.retain(|_, slot| match slot.try_lock() {
            Ok(cached) => cached.as_ref().is_some_and(|v| v.is_valid_at(now)),
            Err(_) => true,
        });

        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!("Cleaned up {} expired cache entries", removed);
        }
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.entries.clear();
        tracing::debug!("Cleared all cache entries");
    }

    /// Returns the number of keys held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no key is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_fresh(&self, value: &V) -> bool {
        let now = self.clock.now();
        let Some(horizon) = now.checked_add(self.minimum_lookahead) else {
            return false;
        };
        value.is_valid_at(now) && value.is_valid_at(horizon)
    }
}

impl<V> std::fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &self.entries.len())
            .field("minimum_lookahead", &self.minimum_lookahead)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use time::OffsetDateTime;
    use tokio::sync::Notify;

    const NOW: i64 = 1_700_000_000;

    #[derive(Debug, Clone, PartialEq)]
    struct Doc {
        nbf: i64,
        exp: i64,
        version: usize,
    }

    impl TemporalValidity for Doc {
        fn is_valid_at(&self, at: OffsetDateTime) -> bool {
            let t = at.unix_timestamp();
            self.nbf < t && t < self.exp
        }
    }

    fn setup() -> (Arc<FixedClock>, TtlCache<Doc>) {
        let clock = Arc::new(FixedClock::at_unix(NOW));
        let cache = TtlCache::new(Duration::from_secs(300), clock.clone());
        (clock, cache)
    }

    async fn fetch(calls: &AtomicUsize, exp: i64) -> Result<Doc, String> {
        let version = calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Doc {
            nbf: NOW - 10,
            exp,
            version,
        })
    }

    #[tokio::test]
    async fn test_supplier_called_once_while_fresh() {
        let (_, cache) = setup();
        let calls = AtomicUsize::new(0);

        for _ in 0..10 {
            let doc = cache
                .compute_if_absent("k", || fetch(&calls, NOW + 3600))
                .await
                .unwrap();
            assert_eq!(doc.version, 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_inside_lookahead_window() {
        let (clock, cache) = setup();
        let calls = AtomicUsize::new(0);

        cache
            .compute_if_absent("k", || fetch(&calls, NOW + 3600))
            .await
            .unwrap();

        // exp - lookahead - 1: still outside the window
        clock.set(OffsetDateTime::from_unix_timestamp(NOW + 3600 - 301).unwrap());
        cache
            .compute_if_absent("k", || fetch(&calls, NOW + 7200))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // past exp - lookahead
        clock.advance(time::Duration::seconds(2));
        let doc = cache
            .compute_if_absent("k", || fetch(&calls, NOW + 7200))
            .await
            .unwrap();
        assert_eq!(doc.version, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_short_lived_document_is_always_refreshed() {
        let (_, cache) = setup();
        let calls = AtomicUsize::new(0);

        for expected in 1..=3 {
            let doc = cache
                .compute_if_absent("k", || fetch(&calls, NOW + 60))
                .await
                .unwrap();
            assert_eq!(doc.version, expected);
        }
    }

    #[tokio::test]
    async fn test_supplier_error_keeps_previous_entry() {
        let (clock, cache) = setup();
        let calls = AtomicUsize::new(0);

        cache
            .compute_if_absent("k", || fetch(&calls, NOW + 600))
            .await
            .unwrap();

        clock.advance(time::Duration::seconds(400));
        let err = cache
            .compute_if_absent("k", || async { Err::<Doc, _>("unreachable".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(err, "unreachable");
        assert_eq!(cache.len(), 1);

        // a later successful refresh replaces it
        let doc = cache
            .compute_if_absent("k", || fetch(&calls, NOW + 3600))
            .await
            .unwrap();
        assert_eq!(doc.version, 2);
    }

    #[tokio::test]
    async fn test_failed_first_fetch_leaves_no_entry() {
        let (_, cache) = setup();
        let result = cache
            .compute_if_absent("k", || async { Err::<Doc, _>("boom") })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let (_, cache) = setup();
        let cache = Arc::new(cache);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .compute_if_absent("k", || async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        fetch(&calls, NOW + 3600).await
                    })
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().version, 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_waiter_result_survives_failed_first_fetch() {
        let (_, cache) = setup();
        let cache = Arc::new(cache);
        let calls = Arc::new(AtomicUsize::new(0));
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());

        let failing = tokio::spawn({
            let cache = Arc::clone(&cache);
            let (started, release) = (Arc::clone(&started), Arc::clone(&release));
            async move {
                cache
                    .compute_if_absent("k", || async move {
                        started.notify_one();
                        release.notified().await;
                        Err::<Doc, _>("unreachable")
                    })
                    .await
            }
        });
        started.notified().await;

        let waiting = tokio::spawn({
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            async move {
                cache
                    .compute_if_absent("k", || fetch(&calls, NOW + 3600))
                    .await
            }
        });
        // let the second caller queue on the slot
        tokio::time::sleep(Duration::from_millis(20)).await;
        release.notify_one();

        assert!(failing.await.unwrap().is_err());
        assert_eq!(waiting.await.unwrap().unwrap().version, 1);
        assert_eq!(cache.len(), 1);

        let doc = cache
            .compute_if_absent("k", || fetch(&calls, NOW + 3600))
            .await
            .unwrap();
        assert_eq!(doc.version, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pending_key_does_not_block_other_keys() {
        let (_, cache) = setup();
        let cache = Arc::new(cache);
        let calls = Arc::new(AtomicUsize::new(0));
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());

        let pending = tokio::spawn({
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            let (started, release) = (Arc::clone(&started), Arc::clone(&release));
            async move {
                cache
                    .compute_if_absent("a", || async move {
                        started.notify_one();
                        release.notified().await;
                        fetch(&calls, NOW + 3600).await
                    })
                    .await
            }
        });
        started.notified().await;

        let other = tokio::time::timeout(
            Duration::from_secs(1),
            cache.compute_if_absent("b", || fetch(&calls, NOW + 3600)),
        )
        .await
        .expect("key b waited on key a")
        .unwrap();
        assert_eq!(other.version, 1);
        assert!(!pending.is_finished());

        release.notify_one();
        assert_eq!(pending.await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_invalidate_during_refresh_keeps_result() {
        let (_, cache) = setup();
        let cache = Arc::new(cache);
        let calls = Arc::new(AtomicUsize::new(0));
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());

        let refreshing = tokio::spawn({
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            let (started, release) = (Arc::clone(&started), Arc::clone(&release));
            async move {
                cache
                    .compute_if_absent("k", || async move {
                        started.notify_one();
                        release.notified().await;
                        fetch(&calls, NOW + 3600).await
                    })
                    .await
            }
        });
        started.notified().await;

        cache.invalidate("k");
        assert_eq!(cache.len(), 1);

        release.notify_one();
        refreshing.await.unwrap().unwrap();

        cache
            .compute_if_absent("k", || fetch(&calls, NOW + 3600))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let (_, cache) = setup();
        let calls = AtomicUsize::new(0);

        cache.compute_if_absent("a", || fetch(&calls, NOW + 3600)).await.unwrap();
        cache.compute_if_absent("b", || fetch(&calls, NOW + 3600)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);

        cache.invalidate("a");
        assert_eq!(cache.len(), 1);
        cache.compute_if_absent("a", || fetch(&calls, NOW + 3600)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_removes_expired() {
        let (clock, cache) = setup();
        let calls = AtomicUsize::new(0);

        cache.compute_if_absent("short", || fetch(&calls, NOW + 1000)).await.unwrap();
        cache.compute_if_absent("long", || fetch(&calls, NOW + 9000)).await.unwrap();

        clock.advance(time::Duration::seconds(2000));
        cache.cleanup();

        assert_eq!(cache.len(), 1);
    }
}
