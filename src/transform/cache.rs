//! Compiled stylesheet caching keyed on transitive dependencies.
//!
//! Two entries are kept per stylesheet:
//!
//! ```text
//! stylesheet key                      -> UriReferences
//! (stylesheet key, engine, url, ...)  -> TemplatesInfo
//! ```
//!
//! The second key exists only when every reference is static and every
//! referenced resource reports a validity; its validity combines the
//! stylesheet's own with those of the referenced resources, so touching any
//! of them invalidates the compiled result.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info_span};

use super::engine::{CompileContext, CompiledTransform, EngineAttributes, TransformEngine};
use super::listener::CollectingErrorListener;
use super::resolver::ResourceResolver;
use super::{TransformError, UriReferences};
use crate::cache::{CacheKey, CacheStore, Validity, find_valid, hash_value};
use crate::xml::{Location, XmlSource};

pub const METRIC_TRANSFORM_COMPILE: &str = "xforms_transform_compile_total";

const REFERENCES_OWNER: &str = "uri-references";
const TEMPLATES_OWNER: &str = "templates";

/// A cache key together with the validity it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValidity {
    pub key: CacheKey,
    pub validity: Validity,
}

impl KeyValidity {
    pub fn new(key: CacheKey, validity: Validity) -> Self {
        Self { key, validity }
    }
}

/// A stylesheet to compile. Without `key_validity` nothing is cached.
pub struct StylesheetInput<'a> {
    pub source: &'a dyn XmlSource,
    pub key_validity: Option<KeyValidity>,
}

/// A compiled stylesheet as stored in the cache.
pub struct TemplatesInfo {
    pub compiled: Arc<dyn CompiledTransform>,
    pub engine: String,
    pub system_id: Option<String>,
}

impl std::fmt::Debug for TemplatesInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplatesInfo")
            .field("engine", &self.engine)
            .field("system_id", &self.system_id)
            .finish_non_exhaustive()
    }
}

pub struct TemplatesCache<'a> {
    store: &'a dyn CacheStore,
    resolver: &'a dyn ResourceResolver,
}

impl<'a> TemplatesCache<'a> {
    pub fn new(store: &'a dyn CacheStore, resolver: &'a dyn ResourceResolver) -> Self {
        Self { store, resolver }
    }

    /// Dependency record stored for the stylesheet, if still valid.
    pub fn uri_references(&self, input: &KeyValidity) -> Option<Arc<UriReferences>> {
        find_valid::<UriReferences>(self.store, &references_key(&input.key), &input.validity)
    }

    /// Key and validity of the compiled stylesheet.
    ///
    /// `Ok(None)` when the result must not be cached: a reference is
    /// dynamic, or a referenced resource cannot report its validity.
    pub fn stylesheet_key_validity(
        &self,
        input: &KeyValidity,
        references: &UriReferences,
        engine: &str,
        attributes: &EngineAttributes,
    ) -> Result<Option<KeyValidity>, TransformError> {
        if references.has_dynamic_document_references {
            return Ok(None);
        }

        let mut keys = vec![
            input.key.clone(),
            CacheKey::Engine {
                name: engine.to_string(),
                attributes: attributes.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            },
        ];
        let mut validities = vec![input.validity.clone()];
        for reference in references.all() {
            let url = reference.resolve()?;
            let Some(validity) = self.resolver.validity(&url)? else {
                debug!(url = %url, "Reference has no validity, not caching");
                return Ok(None);
            };
            keys.push(CacheKey::url(url.as_str()));
            validities.push(validity);
        }

        Ok(Some(KeyValidity::new(
            CacheKey::Composite {
                owner: TEMPLATES_OWNER,
                parts: keys,
            },
            Validity::Composite(validities),
        )))
    }

    /// Returns the compiled stylesheet from the cache, compiling and storing
    /// it when missing or stale.
    pub fn get_or_compile(
        &self,
        engine: &dyn TransformEngine,
        attributes: &EngineAttributes,
        input: &StylesheetInput<'_>,
    ) -> Result<Arc<TemplatesInfo>, TransformError> {
        if let Some(key_validity) = &input.key_validity {
            if let Some(references) = self.uri_references(key_validity) {
                if let Some(stylesheet) = self.stylesheet_key_validity(
                    key_validity,
                    &references,
                    engine.name(),
                    attributes,
                )? {
                    if let Some(templates) =
                        find_valid::<TemplatesInfo>(self.store, &stylesheet.key, &stylesheet.validity)
                    {
                        debug!(
                            key = hash_value(&stylesheet.key),
                            system_id = ?templates.system_id,
                            "Reusing compiled stylesheet"
                        );
                        return Ok(templates);
                    }
                }
            }
        }

        let (templates, references) = self.compile(engine, attributes, input)?;
        let templates = Arc::new(templates);

        if let Some(key_validity) = &input.key_validity {
            self.store.store(
                references_key(&key_validity.key),
                key_validity.validity.clone(),
                Arc::new(references.clone()),
            );
            if let Some(stylesheet) =
                self.stylesheet_key_validity(key_validity, &references, engine.name(), attributes)?
            {
                self.store.store(
                    stylesheet.key,
                    stylesheet.validity,
                    Arc::clone(&templates) as Arc<dyn std::any::Any + Send + Sync>,
                );
            }
        }
        Ok(templates)
    }

    fn compile(
        &self,
        engine: &dyn TransformEngine,
        attributes: &EngineAttributes,
        input: &StylesheetInput<'_>,
    ) -> Result<(TemplatesInfo, UriReferences), TransformError> {
        let span = info_span!(
            "compile_stylesheet",
            engine = engine.name(),
            system_id = input.source.system_id().unwrap_or_default()
        );
        let _guard = span.enter();
        counter!(METRIC_TRANSFORM_COMPILE, "engine" => engine.name().to_string()).increment(1);

        let mut listener = CollectingErrorListener::new();
        let mut context = CompileContext::new(input.source, self.resolver, &mut listener, attributes);
        let result = engine.compile(&mut context);
        let system_id = context.system_id().map(str::to_string);
        let references = context.into_references();

        match result {
            Ok(compiled) => {
                debug!(
                    stylesheets = references.stylesheet_references.len(),
                    documents = references.document_references.len(),
                    dynamic = references.has_dynamic_document_references,
                    "Compiled stylesheet"
                );
                let info = TemplatesInfo {
                    system_id: compiled.system_id().map(str::to_string).or(system_id),
                    compiled,
                    engine: engine.name().to_string(),
                };
                Ok((info, references))
            }
            Err(err) => Err(compilation_error(err, &listener, system_id.as_deref())),
        }
    }
}

fn references_key(input: &CacheKey) -> CacheKey {
    CacheKey::Composite {
        owner: REFERENCES_OWNER,
        parts: vec![input.clone()],
    }
}

/// Wraps a failed compilation, preferring what the listener collected.
fn compilation_error(
    err: TransformError,
    listener: &CollectingErrorListener,
    system_id: Option<&str>,
) -> TransformError {
    let mut locations = listener.locations();
    if locations.is_empty() {
        if let Some(location) = super::best_location(&err) {
            locations.push(location.clone());
        } else if let Some(system_id) = system_id {
            locations.push(Location::document(system_id));
        }
    }
    let message = listener
        .first_error()
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string());
    TransformError::Compilation {
        message,
        locations,
        cause: Some(Box::new(err)),
    }
}
