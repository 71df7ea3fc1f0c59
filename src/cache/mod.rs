//! Object cache for compiled stylesheets and their dependency records.
//!
//! Entries are addressed by [`CacheKey`] and guarded by a [`Validity`]; a
//! lookup with a different validity misses and drops the stale entry.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enable_object_cache = true
//! object_cache_limit = 200
//! ```

mod config;
mod keys;
pub(crate) mod lock;
mod store;

use std::sync::Arc;

use once_cell::sync::OnceCell;

pub use config::CacheConfig;
pub use keys::{CacheKey, Validity, hash_value};
pub use store::{CacheStore, CachedObject, ObjectCache, find_valid};
pub(crate) use store::{METRIC_CACHE_EVICT, METRIC_CACHE_HIT, METRIC_CACHE_MISS};

static GLOBAL_CACHE: OnceCell<Arc<ObjectCache>> = OnceCell::new();

/// Installs the process-wide cache. Only the first call takes effect.
pub fn configure_object_cache(config: &CacheConfig) -> Arc<ObjectCache> {
    Arc::clone(GLOBAL_CACHE.get_or_init(|| Arc::new(ObjectCache::new(config))))
}

/// The process-wide cache, created with defaults if never configured.
pub fn object_cache() -> Arc<ObjectCache> {
    configure_object_cache(&CacheConfig::default())
}
