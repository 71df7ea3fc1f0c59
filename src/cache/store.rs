//! Validity-checked object cache.

use std::any::Any;
use std::sync::{Arc, RwLock};

use lru::LruCache;
use metrics::counter;
use tracing::debug;

use super::config::CacheConfig;
use super::keys::{CacheKey, Validity, hash_value};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_CACHE_HIT: &str = "xforms_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "xforms_cache_miss_total";
pub(crate) const METRIC_CACHE_EVICT: &str = "xforms_cache_evict_total";

pub type CachedObject = Arc<dyn Any + Send + Sync>;

/// Store of objects addressed by key and guarded by a validity token.
pub trait CacheStore: Send + Sync {
    /// Returns the object stored under `key` if it was stored with `validity`.
    fn lookup(&self, key: &CacheKey, validity: &Validity) -> Option<CachedObject>;

    fn store(&self, key: CacheKey, validity: Validity, value: CachedObject);
}

/// Typed lookup on any store; entries of another type count as absent.
pub fn find_valid<T: Any + Send + Sync>(
    store: &dyn CacheStore,
    key: &CacheKey,
    validity: &Validity,
) -> Option<Arc<T>> {
    store
        .lookup(key, validity)
        .and_then(|object| object.downcast::<T>().ok())
}

struct Entry {
    validity: Validity,
    value: CachedObject,
}

/// In-memory LRU implementation of [`CacheStore`].
pub struct ObjectCache {
    enabled: bool,
    entries: RwLock<LruCache<CacheKey, Entry>>,
}

impl ObjectCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enable_object_cache,
            entries: RwLock::new(LruCache::new(config.object_cache_limit_non_zero())),
        }
    }

    /// Clear all cached data.
    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for ObjectCache {
    fn lookup(&self, key: &CacheKey, validity: &Validity) -> Option<CachedObject> {
        if !self.enabled {
            counter!(METRIC_CACHE_MISS).increment(1);
            return None;
        }

        let mut entries = rw_write(&self.entries, SOURCE, "lookup");
        let cached = entries
            .get(key)
            .map(|entry| (entry.validity == *validity).then(|| Arc::clone(&entry.value)));
        let found = match cached {
            Some(Some(value)) => Some(value),
            Some(None) => {
                entries.pop(key);
                debug!(key = %key, "Dropped stale cache entry");
                None
            }
            None => None,
        };

        match found {
            Some(value) => {
                counter!(METRIC_CACHE_HIT).increment(1);
                Some(value)
            }
            None => {
                counter!(METRIC_CACHE_MISS).increment(1);
                None
            }
        }
    }

    fn store(&self, key: CacheKey, validity: Validity, value: CachedObject) {
        if !self.enabled {
            return;
        }

        let key_hash = hash_value(&key);
        let evicted = rw_write(&self.entries, SOURCE, "store")
            .push(key.clone(), Entry { validity, value })
            .filter(|(evicted_key, _)| *evicted_key != key);
        if let Some((evicted_key, _)) = evicted {
            counter!(METRIC_CACHE_EVICT).increment(1);
            debug!(evicted = %evicted_key, key_hash, "Evicted cache entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    fn token(value: &str) -> Validity {
        Validity::Token(value.to_string())
    }

    #[test]
    fn lookup_requires_matching_validity() {
        let cache = ObjectCache::new(&CacheConfig::default());
        let key = CacheKey::url("file:/a.xsl");
        cache.store(key.clone(), token("1"), Arc::new(42u32));

        assert_eq!(find_valid::<u32>(&cache, &key, &token("1")).as_deref(), Some(&42));
        assert!(find_valid::<u32>(&cache, &key, &token("2")).is_none());
        assert!(cache.is_empty(), "stale entry should be dropped");
    }

    #[test]
    fn typed_lookup_ignores_other_types() {
        let cache = ObjectCache::new(&CacheConfig::default());
        let key = CacheKey::input("stylesheet", "a");
        cache.store(key.clone(), token("1"), Arc::new("text".to_string()));
        assert!(find_valid::<u32>(&cache, &key, &token("1")).is_none());
    }

    #[test]
    fn lru_eviction() {
        let cache = ObjectCache::new(&CacheConfig {
            object_cache_limit: 2,
            ..Default::default()
        });
        for id in ["a", "b", "c"] {
            cache.store(CacheKey::input("doc", id), token("v"), Arc::new(()));
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.lookup(&CacheKey::input("doc", "a"), &token("v")).is_none());
        assert!(cache.lookup(&CacheKey::input("doc", "c"), &token("v")).is_some());
    }

    #[test]
    fn disabled_cache_never_stores() {
        let cache = ObjectCache::new(&CacheConfig {
            enable_object_cache: false,
            ..Default::default()
        });
        cache.store(CacheKey::url("file:/a"), token("v"), Arc::new(1u8));
        assert!(cache.is_empty());
    }

    #[test]
    fn recovers_from_poisoned_lock() {
        let cache = ObjectCache::new(&CacheConfig::default());
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = cache.entries.write().expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        cache.store(CacheKey::url("file:/a"), token("v"), Arc::new(1u8));
        assert_eq!(cache.len(), 1);
    }
}
