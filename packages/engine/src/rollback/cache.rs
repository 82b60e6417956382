//! In-memory LRU cache of hot [`RollbackPoint`]s.
//!
//! The LRU map and the expiry-timer bookkeeping share a single
//! `parking_lot::Mutex` (§5: "single lock for both the LRU map and the
//! timer table to avoid TOCTOU on expiry") -- a reader that finds an entry
//! and a writer that expires it can never interleave.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use codegraph_core::RollbackPoint;

struct Inner {
    lru: LruCache<String, RollbackPoint>,
    /// id -> expires_at_millis, for points that carry an expiry.
    expiry: HashMap<String, u64>,
}

/// Capacity-bounded LRU cache for rollback points.
///
/// Eviction on `insert` when at capacity removes only the cache entry --
/// the durable copy (if any persistence layer is configured) is retained,
/// matching the "capacity-reached" contract in §4.1.
pub struct RollbackCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

/// Outcome of inserting into the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    InsertedAtCapacity { evicted_id: String },
}

impl RollbackCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            inner: Mutex::new(Inner { lru: LruCache::new(cap), expiry: HashMap::new() }),
            capacity,
        }
    }

    /// Inserts or replaces a point, reporting whether an LRU eviction occurred.
    pub fn insert(&self, point: RollbackPoint) -> InsertOutcome {
        let mut inner = self.inner.lock();
        let was_at_capacity = inner.lru.len() >= self.capacity && !inner.lru.contains(&point.id);

        if let Some(expires_at) = point.expires_at_millis {
            inner.expiry.insert(point.id.clone(), expires_at);
        } else {
            inner.expiry.remove(&point.id);
        }

        let evicted = inner.lru.push(point.id.clone(), point);
        if was_at_capacity {
            if let Some((evicted_id, _)) = evicted {
                inner.expiry.remove(&evicted_id);
                return InsertOutcome::InsertedAtCapacity { evicted_id };
            }
        }
        InsertOutcome::Inserted
    }

    /// Reads a point, updating LRU recency. Returns `None` if absent or
    /// expired as of `now_millis` (expired entries are evicted eagerly).
    pub fn get(&self, id: &str, now_millis: u64) -> Option<RollbackPoint> {
        let mut inner = self.inner.lock();
        if let Some(&expires_at) = inner.expiry.get(id) {
            if expires_at <= now_millis {
                inner.lru.pop(id);
                inner.expiry.remove(id);
                return None;
            }
        }
        inner.lru.get(id).cloned()
    }

    /// Removes an entry unconditionally (used when the durable layer deletes it).
    pub fn remove(&self, id: &str) {
        let mut inner = self.inner.lock();
        inner.lru.pop(id);
        inner.expiry.remove(id);
    }

    /// Returns all non-expired cached points, newest-first by insertion/access order.
    pub fn snapshot_live(&self, now_millis: u64) -> Vec<RollbackPoint> {
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .expiry
            .iter()
            .filter(|&(_, &exp)| exp <= now_millis)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            inner.lru.pop(id);
            inner.expiry.remove(id);
        }
        inner.lru.iter().map(|(_, v)| v.clone()).collect()
    }

    /// Current number of cached entries (including not-yet-evicted expired ones).
    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, expires_at: Option<u64>) -> RollbackPoint {
        RollbackPoint {
            id: id.to_string(),
            name: id.to_string(),
            description: None,
            timestamp_millis: 0,
            expires_at_millis: expires_at,
            session_id: None,
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let cache = RollbackCache::new(4);
        cache.insert(point("p1", None));
        assert_eq!(cache.get("p1", 0).unwrap().id, "p1");
    }

    #[test]
    fn get_expired_returns_none_and_evicts() {
        let cache = RollbackCache::new(4);
        cache.insert(point("p1", Some(100)));
        assert!(cache.get("p1", 200).is_none());
        assert_eq!(cache.len(), 0, "expired entry should be evicted eagerly");
    }

    #[test]
    fn get_not_yet_expired_returns_some() {
        let cache = RollbackCache::new(4);
        cache.insert(point("p1", Some(100)));
        assert!(cache.get("p1", 50).is_some());
    }

    #[test]
    fn capacity_reached_evicts_lru() {
        let cache = RollbackCache::new(2);
        cache.insert(point("p1", None));
        cache.insert(point("p2", None));
        // Touch p1 so it's more recently used than p2.
        cache.get("p1", 0);
        let outcome = cache.insert(point("p3", None));
        assert_eq!(outcome, InsertOutcome::InsertedAtCapacity { evicted_id: "p2".to_string() });
        assert!(cache.get("p2", 0).is_none());
        assert!(cache.get("p1", 0).is_some());
    }

    #[test]
    fn remove_clears_entry_and_expiry() {
        let cache = RollbackCache::new(4);
        cache.insert(point("p1", Some(1000)));
        cache.remove("p1");
        assert!(cache.get("p1", 0).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn snapshot_live_excludes_expired() {
        let cache = RollbackCache::new(4);
        cache.insert(point("p1", Some(50)));
        cache.insert(point("p2", None));
        let live = cache.snapshot_live(100);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, "p2");
    }
}
