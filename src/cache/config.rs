//! Cache configuration.
//!
//! Controls the object cache shared by compiled stylesheets and their
//! dependency records.

use std::num::NonZeroUsize;

use serde::Deserialize;

const DEFAULT_OBJECT_CACHE_LIMIT: usize = 200;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the object cache. When disabled every lookup misses.
    pub enable_object_cache: bool,
    /// Maximum entries kept before least-recently-used eviction.
    pub object_cache_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_object_cache: true,
            object_cache_limit: DEFAULT_OBJECT_CACHE_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enable_object_cache: settings.enable_object_cache,
            object_cache_limit: settings.object_cache_limit,
        }
    }
}

impl CacheConfig {
    /// Returns the entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn object_cache_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.object_cache_limit).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enable_object_cache);
        assert_eq!(config.object_cache_limit, 200);
    }

    #[test]
    fn zero_limit_clamps_to_one() {
        let config = CacheConfig {
            object_cache_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.object_cache_limit_non_zero().get(), 1);
    }
}
