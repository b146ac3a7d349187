//! Version-tagged caching.
//!
//! Per-action artifacts (filter lists, executors, constraint sets) are derived
//! from an action catalog that can be replaced at runtime. Instead of tracking
//! invalidation per entry, every entry records the catalog version it was
//! built for and is rebuilt when a reader asks for a newer version.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from a current entry.
    pub hits: u64,
    /// Lookups that built a value.
    pub misses: u64,
    /// Entries dropped because their version was superseded.
    pub evictions: u64,
    /// Entries currently cached.
    pub size: usize,
}

#[derive(Debug)]
struct VersionedEntry<V> {
    version: u64,
    value: Arc<V>,
}

/// A concurrent cache whose entries are valid for one catalog version.
///
/// Reads never block each other. Two callers that miss the same key at the
/// same version may both build a value; the first insert wins and both get
/// the stored value back. A caller holding an older version than the stored
/// entry gets a freshly built value that is not stored.
///
/// # Example
///
/// ```
/// use daedalus_core::VersionedCache;
/// use std::sync::Arc;
///
/// let cache: VersionedCache<u64, String> = VersionedCache::new();
/// let a = cache.get_or_insert_with(&1, 1, || "v1".to_string());
/// let b = cache.get_or_insert_with(&1, 1, || unreachable!());
/// assert!(Arc::ptr_eq(&a, &b));
///
/// let c = cache.get_or_insert_with(&1, 2, || "v2".to_string());
/// assert_eq!(c.as_str(), "v2");
/// ```
#[derive(Debug)]
pub struct VersionedCache<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, VersionedEntry<V>>,
    latest_version: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> Default for VersionedCache<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> VersionedCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            latest_version: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns the value for `key` at `version`, if cached.
    pub fn get(&self, key: &K, version: u64) -> Option<Arc<V>> {
        self.entries
            .get(key)
            .filter(|e| e.version == version)
            .map(|e| Arc::clone(&e.value))
    }

    /// Returns the value for `key` at `version`, building it on a miss.
    pub fn get_or_insert_with<F>(&self, key: &K, version: u64, create: F) -> Arc<V>
    where
        F: FnOnce() -> V,
    {
        match self.try_get_or_insert_with(key, version, || Ok::<V, std::convert::Infallible>(create())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Fallible form of [`get_or_insert_with`](Self::get_or_insert_with).
    /// A failed build stores nothing.
    pub fn try_get_or_insert_with<F, E>(&self, key: &K, version: u64, create: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        self.observe_version(version);
        if let Some(hit) = self.get(key, version) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        // Built outside any shard lock; `create` may consult other caches.
        let candidate = Arc::new(create()?);

        let stored = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get().version;
                if current == version {
                    Arc::clone(&occupied.get().value)
                } else if current < version {
                    occupied.insert(VersionedEntry {
                        version,
                        value: Arc::clone(&candidate),
                    });
                    candidate
                } else {
                    candidate
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(VersionedEntry {
                    version,
                    value: Arc::clone(&candidate),
                });
                candidate
            }
        };
        Ok(stored)
    }

    /// Drops every entry built for a version older than `current_version`.
    /// Returns the number of entries removed.
    pub fn purge_stale(&self, current_version: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.version >= current_version);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    /// Highest version seen by this cache.
    #[must_use]
    pub fn latest_version(&self) -> u64 {
        self.latest_version.load(Ordering::Acquire)
    }

    // First reader of a newer version sweeps entries of older ones.
    fn observe_version(&self, version: u64) {
        let previous = self.latest_version.fetch_max(version, Ordering::AcqRel);
        if version > previous {
            self.purge_stale(version);
        }
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_hit_returns_same_instance() {
        let cache: VersionedCache<&'static str, Vec<u8>> = VersionedCache::new();
        let first = cache.get_or_insert_with(&"a", 1, || vec![1]);
        let second = cache.get_or_insert_with(&"a", 1, || vec![2]);
        assert!(Arc::ptr_eq(&first, &second));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_newer_version_rebuilds() {
        let cache: VersionedCache<u32, u32> = VersionedCache::new();
        let builds = AtomicUsize::new(0);
        let build = |v| {
            builds.fetch_add(1, Ordering::SeqCst);
            v
        };

        assert_eq!(*cache.get_or_insert_with(&1, 1, || build(10)), 10);
        assert_eq!(*cache.get_or_insert_with(&1, 2, || build(20)), 20);
        assert_eq!(*cache.get_or_insert_with(&1, 2, || build(30)), 20);
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_older_reader_does_not_overwrite() {
        let cache: VersionedCache<u32, u32> = VersionedCache::new();
        cache.get_or_insert_with(&1, 5, || 50);
        let stale = cache.get_or_insert_with(&1, 4, || 40);
        assert_eq!(*stale, 40);
        assert_eq!(cache.get(&1, 5).as_deref(), Some(&50));
    }

    #[test]
    fn test_new_version_purges_other_keys() {
        let cache: VersionedCache<u32, u32> = VersionedCache::new();
        cache.get_or_insert_with(&1, 1, || 1);
        cache.get_or_insert_with(&2, 1, || 2);
        assert_eq!(cache.len(), 2);

        cache.get_or_insert_with(&1, 2, || 3);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&2, 1).is_none());
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_failed_build_stores_nothing() {
        let cache: VersionedCache<u32, u32> = VersionedCache::new();
        let result: Result<_, &str> = cache.try_get_or_insert_with(&1, 1, || Err("nope"));
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_readers_converge() {
        let cache: Arc<VersionedCache<u32, u32>> = Arc::new(VersionedCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get_or_insert_with(&7, 1, || i))
            })
            .collect();
        let values: Vec<Arc<u32>> = handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .collect();
        let stored = cache.get(&7, 1).expect("stored");
        // Every caller that arrived after the first insert saw the stored value.
        assert!(values.iter().any(|v| Arc::ptr_eq(v, &stored)));
        assert_eq!(cache.len(), 1);
    }
}
