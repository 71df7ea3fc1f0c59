//! Cache key and validity definitions.
//!
//! A cached object is addressed by a [`CacheKey`] and is only returned when
//! the caller presents the same [`Validity`] it was stored with.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use time::OffsetDateTime;

/// Identifies a cached object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A processor input, identified by whoever supplies it.
    Input { name: String, id: String },
    /// A resource addressed by absolute URL.
    Url(String),
    /// Transform engine together with its feature overrides.
    Engine {
        name: String,
        attributes: Vec<(String, bool)>,
    },
    /// Owner-scoped key built from other keys.
    Composite {
        owner: &'static str,
        parts: Vec<CacheKey>,
    },
}

impl CacheKey {
    pub fn input(name: impl Into<String>, id: impl Into<String>) -> Self {
        CacheKey::Input {
            name: name.into(),
            id: id.into(),
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        CacheKey::Url(url.into())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Input { name, id } => write!(f, "input:{name}:{id}"),
            CacheKey::Url(url) => write!(f, "url:{url}"),
            CacheKey::Engine { name, .. } => write!(f, "engine:{name}"),
            CacheKey::Composite { owner, parts } => {
                write!(f, "{owner}[")?;
                for (index, part) in parts.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{part}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Freshness token compared by equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Validity {
    Timestamp(OffsetDateTime),
    Token(String),
    Composite(Vec<Validity>),
}

/// Hash an arbitrary hashable value, for compact logging of keys.
pub fn hash_value<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}
