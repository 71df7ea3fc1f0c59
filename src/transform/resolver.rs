//! Resource resolution for stylesheets and the documents they reference.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::sync::RwLock;

use time::OffsetDateTime;
use tracing::debug;
use url::Url;

use super::TransformError;
use crate::cache::Validity;
use crate::cache::lock::{rw_read, rw_write};
use crate::xml::{EventBuffer, parse_document};

const SOURCE: &str = "transform::resolver";

/// Resolves `spec` against `base`, or parses it as absolute without a base.
pub fn resolve_url(base: Option<&str>, spec: &str) -> Result<Url, TransformError> {
    let resolved = match base {
        Some(base) => Url::parse(base).and_then(|base| base.join(spec)),
        None => Url::parse(spec),
    };
    resolved.map_err(|err| TransformError::Resource {
        url: match base {
            Some(base) => format!("{spec} (relative to {base})"),
            None => spec.to_string(),
        },
        message: err.to_string(),
    })
}

/// Access to referenced resources.
pub trait ResourceResolver: Send + Sync {
    /// Current validity of the resource. `None` when it cannot be known,
    /// which makes anything depending on the resource uncacheable.
    fn validity(&self, url: &Url) -> Result<Option<Validity>, TransformError>;

    /// Reads the resource as a located event stream.
    fn open(&self, url: &Url) -> Result<EventBuffer, TransformError>;
}

/// Resolver for `file:` URLs; validity is the modification time.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileResolver;

impl FileResolver {
    fn path(url: &Url) -> Result<std::path::PathBuf, TransformError> {
        url.to_file_path().map_err(|()| TransformError::Resource {
            url: url.to_string(),
            message: "not a local file URL".to_string(),
        })
    }
}

impl ResourceResolver for FileResolver {
    fn validity(&self, url: &Url) -> Result<Option<Validity>, TransformError> {
        if url.scheme() != "file" {
            return Ok(None);
        }
        let path = Self::path(url)?;
        let modified = match fs::metadata(&path).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(url = %url, "Referenced file does not exist");
                return Ok(None);
            }
            Err(err) => {
                return Err(TransformError::Resource {
                    url: url.to_string(),
                    message: err.to_string(),
                });
            }
        };
        Ok(Some(Validity::Timestamp(OffsetDateTime::from(modified))))
    }

    fn open(&self, url: &Url) -> Result<EventBuffer, TransformError> {
        let path = Self::path(url)?;
        let text = fs::read_to_string(&path).map_err(|err| TransformError::Resource {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        Ok(parse_document(&text, Some(url.as_str()))?)
    }
}

struct MemoryDocument {
    text: String,
    validity: Option<Validity>,
}

/// In-memory documents with explicit validity tokens.
#[derive(Default)]
pub struct MemoryResolver {
    documents: RwLock<HashMap<String, MemoryDocument>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a document. `validity` of `None` marks it uncacheable.
    pub fn insert(&self, url: &str, text: impl Into<String>, validity: Option<Validity>) {
        rw_write(&self.documents, SOURCE, "insert").insert(
            url.to_string(),
            MemoryDocument {
                text: text.into(),
                validity,
            },
        );
    }

    /// Changes the validity of a document without touching its content.
    pub fn touch(&self, url: &str, validity: Validity) {
        if let Some(document) = rw_write(&self.documents, SOURCE, "touch").get_mut(url) {
            document.validity = Some(validity);
        }
    }
}

impl ResourceResolver for MemoryResolver {
    fn validity(&self, url: &Url) -> Result<Option<Validity>, TransformError> {
        Ok(rw_read(&self.documents, SOURCE, "validity")
            .get(url.as_str())
            .and_then(|document| document.validity.clone()))
    }

    fn open(&self, url: &Url) -> Result<EventBuffer, TransformError> {
        let documents = rw_read(&self.documents, SOURCE, "open");
        let document = documents
            .get(url.as_str())
            .ok_or_else(|| TransformError::Resource {
                url: url.to_string(),
                message: "no such document".to_string(),
            })?;
        Ok(parse_document(&document.text, Some(url.as_str()))?)
    }
}
