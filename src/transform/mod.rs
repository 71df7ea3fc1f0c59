//! Stylesheet compilation, caching and execution.
//!
//! A stylesheet is streamed through a [`StylesheetTracker`] while an engine
//! compiles it, so every include, import and static `document()` reference
//! is known once compilation ends. [`TemplatesCache`] uses those references to
//! build a composite cache key whose validity follows each referenced
//! resource, and [`TransformExecutor`] runs the compiled result.

mod cache;
mod deps;
mod engine;
mod executor;
mod identity;
mod listener;
mod locator;
mod resolver;

use std::sync::Arc;

use thiserror::Error;

use crate::xml::{Location, XmlError};
use crate::xpath::XPathError;

pub use cache::{KeyValidity, METRIC_TRANSFORM_COMPILE, StylesheetInput, TemplatesCache, TemplatesInfo};
pub use deps::{StylesheetTracker, UriReference, UriReferences, is_processor_input_uri};
pub use engine::{
    CompileContext, CompiledTransform, ContextStack, EngineAttributes, ErrorListener, SourceNode,
    TransformEngine, TransformOutputs, Transformer,
};
pub use executor::{ExecutionResult, LocationMode, TransformExecutor};
pub use identity::{IdentityEngine, STRIP_COMMENTS};
pub use listener::CollectingErrorListener;
pub use locator::{ConstantLocator, SmartLocator};
pub use resolver::{FileResolver, MemoryResolver, ResourceResolver, resolve_url};

pub const XSLT_NAMESPACE_URI: &str = "http://www.w3.org/1999/XSL/Transform";

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("XPath syntax error ({source}) for expression: {expression}")]
    XPathSyntax {
        expression: String,
        location: Option<Location>,
        #[source]
        source: XPathError,
    },
    /// Stylesheet compilation failed; one location per distinct error site.
    #[error("{message}")]
    Compilation {
        message: String,
        locations: Vec<Location>,
        #[source]
        cause: Option<Box<TransformError>>,
    },
    #[error("{message}")]
    Execution {
        message: String,
        location: Option<Location>,
        #[source]
        cause: Option<Box<TransformError>>,
    },
    /// The stylesheet asked to stop through a terminating message.
    #[error("processing terminated by xsl:message: {message}")]
    Terminated {
        message: String,
        location: Option<Location>,
    },
    #[error("{message}")]
    Engine {
        message: String,
        location: Option<Location>,
    },
    #[error("cannot access resource `{url}`: {message}")]
    Resource { url: String, message: String },
    #[error(transparent)]
    Xml(#[from] XmlError),
}

impl TransformError {
    pub fn location(&self) -> Option<&Location> {
        match self {
            TransformError::XPathSyntax { location, .. }
            | TransformError::Execution { location, .. }
            | TransformError::Terminated { location, .. }
            | TransformError::Engine { location, .. } => location.as_ref(),
            TransformError::Compilation { locations, .. } => locations.first(),
            TransformError::Xml(err) => err.location(),
            TransformError::Resource { .. } => None,
        }
    }

    /// The wrapped error, if any.
    pub fn cause(&self) -> Option<&TransformError> {
        match self {
            TransformError::Compilation { cause, .. } | TransformError::Execution { cause, .. } => {
                cause.as_deref()
            }
            _ => None,
        }
    }

    fn chain(&self) -> impl Iterator<Item = &TransformError> {
        std::iter::successors(Some(self), |err| err.cause())
    }
}

/// Innermost error of the chain.
pub fn root_cause(err: &TransformError) -> &TransformError {
    err.chain().last().unwrap_or(err)
}

/// Most precise location along the chain: the innermost one with a line
/// number, otherwise the outermost one naming at least a document.
pub fn best_location(err: &TransformError) -> Option<&Location> {
    let mut fallback = None;
    let mut best = None;
    for location in err.chain().filter_map(TransformError::location) {
        if location.has_position() {
            best = Some(location);
        } else if fallback.is_none() {
            fallback = Some(location);
        }
    }
    best.or(fallback)
}

/// Engine registered under `name`.
pub fn engine_by_name(name: &str) -> Option<Arc<dyn TransformEngine>> {
    match name {
        IdentityEngine::NAME => Some(Arc::new(IdentityEngine)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execution(location: Option<Location>, cause: TransformError) -> TransformError {
        TransformError::Execution {
            message: "failed".into(),
            location,
            cause: Some(Box::new(cause)),
        }
    }

    #[test]
    fn root_cause_walks_to_innermost() {
        let err = execution(
            None,
            TransformError::Terminated {
                message: "stop".into(),
                location: None,
            },
        );
        assert!(matches!(root_cause(&err), TransformError::Terminated { .. }));

        let leaf = TransformError::Resource {
            url: "x".into(),
            message: "gone".into(),
        };
        assert!(matches!(root_cause(&leaf), TransformError::Resource { .. }));
    }

    #[test]
    fn best_location_prefers_innermost_position() {
        let err = execution(
            Some(Location::document("file:/a.xsl")),
            TransformError::Engine {
                message: "bad".into(),
                location: Some(Location::new(Some("file:/b.xsl"), 4, 2)),
            },
        );
        assert_eq!(
            best_location(&err),
            Some(&Location::new(Some("file:/b.xsl"), 4, 2))
        );

        let err = execution(
            Some(Location::document("file:/a.xsl")),
            TransformError::Engine {
                message: "bad".into(),
                location: None,
            },
        );
        assert_eq!(best_location(&err), Some(&Location::document("file:/a.xsl")));
    }

    #[test]
    fn engines_are_looked_up_by_name() {
        assert!(engine_by_name("identity").is_some());
        assert!(engine_by_name("saxon").is_none());
    }
}
