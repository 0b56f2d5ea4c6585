//! Recently-seen transaction cache.
//!
//! A bounded LRU from transaction fingerprint to last-publish time, used
//! to suppress duplicate network chatter. `None` is the "accepted but not
//! yet published" sentinel.

use lru::LruCache;
use parking_lot::Mutex;
use shared_types::Hash;
use std::num::NonZeroUsize;
use std::time::Instant;

/// Bounded LRU of recently published transaction fingerprints.
///
/// Internally locked; callers need no external synchronization. Eviction
/// is strictly by least-recent access and capacity is enforced on `put`.
pub struct SeenCache {
    inner: Mutex<LruCache<Hash, Option<Instant>>>,
}

impl SeenCache {
    /// Create a cache with the given capacity.
    pub fn new(capacity: u64) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1) as usize).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Look up a fingerprint without refreshing its recency.
    ///
    /// `None`: never seen. `Some(None)`: seen, not yet published.
    /// `Some(Some(t))`: last published at `t`.
    pub fn peek(&self, hash: &Hash) -> Option<Option<Instant>> {
        self.inner.lock().peek(hash).copied()
    }

    /// Record a fingerprint with its publish time, refreshing recency and
    /// evicting the least recently used entry when at capacity.
    pub fn put(&self, hash: Hash, published_at: Option<Instant>) {
        self.inner.lock().put(hash, published_at);
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Number of cached fingerprints.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(b: u8) -> Hash {
        Hash::digest_bytes(&[b])
    }

    #[test]
    fn test_peek_and_put() {
        let cache = SeenCache::new(4);
        assert_eq!(cache.peek(&h(1)), None);

        cache.put(h(1), None);
        assert_eq!(cache.peek(&h(1)), Some(None));

        let now = Instant::now();
        cache.put(h(1), Some(now));
        assert_eq!(cache.peek(&h(1)), Some(Some(now)));
    }

    #[test]
    fn test_eviction_is_lru() {
        let cache = SeenCache::new(2);
        cache.put(h(1), None);
        cache.put(h(2), None);
        // Refresh 1 so 2 becomes the eviction candidate.
        cache.put(h(1), None);
        cache.put(h(3), None);

        assert!(cache.peek(&h(1)).is_some());
        assert_eq!(cache.peek(&h(2)), None);
        assert!(cache.peek(&h(3)).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_peek_does_not_refresh_recency() {
        let cache = SeenCache::new(2);
        cache.put(h(1), None);
        cache.put(h(2), None);
        // Peeking 1 must not protect it from eviction.
        cache.peek(&h(1));
        cache.put(h(3), None);
        assert_eq!(cache.peek(&h(1)), None);
    }

    #[test]
    fn test_clear() {
        let cache = SeenCache::new(4);
        cache.put(h(1), None);
        cache.clear();
        assert!(cache.is_empty());
    }
}
