//! Bounded, TTL-evicting cache of paginated search results.
//!
//! Keyed by (normalized query, offset). The map and the live-entry counter
//! share one mutex so the counter always equals the number of live entries.
//! A full cache skips caching instead of evicting.

use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::Record;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    query: String,
    offset: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedPage {
    pub records: Vec<Record>,
    pub total: u64,
    pub inserted_at: Instant,
}

struct Slot {
    page: CachedPage,
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, Slot>,
    live: usize,
    next_generation: u64,
}

impl CacheState {
    fn remove_if_current(&mut self, key: &CacheKey, generation: u64) -> bool {
        let current = self.entries.get(key).map(|s| s.generation);
        if current != Some(generation) {
            return false;
        }
        self.entries.remove(key);
        self.live = self.live.saturating_sub(1);
        debug_assert_eq!(self.live, self.entries.len());
        true
    }
}

#[derive(Clone)]
pub struct SearchResultCache {
    state: Arc<Mutex<CacheState>>,
    capacity: usize,
    ttl: Duration,
}

/// Collapse whitespace and lowercase so equivalent queries share entries.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl SearchResultCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            capacity,
            ttl,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, query: &str, offset: usize) -> Option<CachedPage> {
        let key = CacheKey {
            query: normalize_query(query),
            offset,
        };
        self.state.lock().entries.get(&key).map(|s| s.page.clone())
    }

    /// Cache one page. Returns `false` when the cache is full and the key is
    /// new; nothing is evicted in that case.
    ///
    /// Must be called from within a tokio runtime.
    pub fn put(&self, query: &str, offset: usize, records: Vec<Record>, total: u64) -> bool {
        let key = CacheKey {
            query: normalize_query(query),
            offset,
        };
        let cancel = CancellationToken::new();
        let generation = {
            let mut state = self.state.lock();
            let exists = state.entries.contains_key(&key);
            if !exists && state.live >= self.capacity {
                debug!(query = %key.query, offset, "Search cache full, skipping");
                return false;
            }
            state.next_generation += 1;
            let generation = state.next_generation;
            let slot = Slot {
                page: CachedPage {
                    records,
                    total,
                    inserted_at: Instant::now(),
                },
                generation,
                cancel: cancel.clone(),
            };
            match state.entries.insert(key.clone(), slot) {
                Some(previous) => previous.cancel.cancel(),
                None => state.live += 1,
            }
            debug_assert_eq!(state.live, state.entries.len());
            generation
        };

        let state = Arc::clone(&self.state);
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = sleep(ttl) => {
                    if state.lock().remove_if_current(&key, generation) {
                        debug!(query = %key.query, offset = key.offset, "Search cache entry evicted");
                    }
                }
            }
        });
        true
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.state.lock().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record;

    const TTL: Duration = Duration::from_secs(30);

    async fn settle() {
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn put_then_get_round_trips_until_ttl() {
        let cache = SearchResultCache::new(4, TTL);
        let page = vec![record("Foo"), record("Foo Bar")];
        assert!(cache.put("foo", 0, page.clone(), 12));

        let hit = cache.get("  FOO ", 0).unwrap();
        assert_eq!(hit.records, page);
        assert_eq!(hit.total, 12);

        sleep(TTL + Duration::from_millis(1)).await;
        settle().await;
        assert!(cache.get("foo", 0).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn full_cache_skips_instead_of_evicting() {
        let cache = SearchResultCache::new(2, TTL);
        assert!(cache.put("a", 0, vec![], 0));
        assert!(cache.put("b", 0, vec![], 0));
        assert!(!cache.put("c", 0, vec![], 0));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a", 0).is_some());
        assert!(cache.get("b", 0).is_some());
        assert!(cache.get("c", 0).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reinsert_replaces_timer_without_double_count() {
        let cache = SearchResultCache::new(2, TTL);
        assert!(cache.put("a", 0, vec![], 1));
        sleep(Duration::from_secs(20)).await;
        assert!(cache.put("a", 0, vec![record("A")], 2));
        assert_eq!(cache.len(), 1);

        // A full cache still accepts a refresh of an existing key.
        assert!(cache.put("b", 0, vec![], 0));
        assert!(cache.put("a", 0, vec![], 3));
        assert_eq!(cache.len(), 2);

        // The first timer would have fired at t=30.
        sleep(Duration::from_secs(15)).await;
        settle().await;
        assert_eq!(cache.get("a", 0).unwrap().total, 3);

        sleep(TTL).await;
        settle().await;
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn offsets_are_independent() {
        let cache = SearchResultCache::new(10, TTL);
        cache.put("foo", 0, vec![], 20);
        sleep(Duration::from_secs(10)).await;
        cache.put("foo", 10, vec![], 20);

        sleep(Duration::from_secs(21)).await;
        settle().await;
        assert!(cache.get("foo", 0).is_none());
        assert!(cache.get("foo", 10).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_frees_up_after_eviction() {
        let cache = SearchResultCache::new(1, TTL);
        assert!(cache.put("a", 0, vec![], 0));
        assert!(!cache.put("b", 0, vec![], 0));
        sleep(TTL + Duration::from_millis(1)).await;
        settle().await;
        assert!(cache.put("b", 0, vec![], 0));
        assert_eq!(cache.len(), 1);
    }
}
