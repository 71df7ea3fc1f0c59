//! Capabilities a transform engine adapter provides.
//!
//! Optional capabilities are trait methods with a declining default, so the
//! executor asks the adapter instead of guessing from its concrete type.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use super::deps::{StylesheetTracker, UriReferences};
use super::resolver::{ResourceResolver, resolve_url};
use super::TransformError;
use crate::xml::{
    EventBuffer, EventRecorder, Location, NodeKind, QName, TeeReceiver, XmlError, XmlReceiver,
    XmlSource,
};

/// Boolean feature overrides handed to an engine, sorted by name.
pub type EngineAttributes = BTreeMap<String, bool>;

/// Sink for engine diagnostics.
pub trait ErrorListener {
    fn warning(&mut self, message: &str, location: Option<&Location>);
    fn error(&mut self, message: &str, location: Option<&Location>);
}

pub trait TransformEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Compiles the stylesheet available through `context`.
    fn compile(
        &self,
        context: &mut CompileContext<'_>,
    ) -> Result<Arc<dyn CompiledTransform>, TransformError>;
}

/// Reusable result of a compilation.
pub trait CompiledTransform: Send + Sync {
    fn system_id(&self) -> Option<&str>;

    fn new_transformer(&self, attributes: &EngineAttributes) -> Box<dyn Transformer>;
}

/// One execution of a compiled transform.
pub trait Transformer {
    fn transform(
        &mut self,
        input: &dyn XmlSource,
        outputs: &mut TransformOutputs<'_>,
        listener: &mut dyn ErrorListener,
    ) -> Result<(), TransformError>;

    /// The engine's view of the source nodes being processed, if it exposes one.
    fn context_stack(&self) -> Option<Rc<dyn ContextStack>> {
        None
    }

    /// Routes `xsl:message` output into `buffer`. Returns false when the
    /// engine has no such channel.
    fn set_message_buffer(&mut self, buffer: Rc<RefCell<String>>) -> bool {
        let _ = buffer;
        false
    }
}

/// A source node as the engine sees it while executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceNode {
    pub name: Option<QName>,
    pub kind: NodeKind,
    pub location: Option<Location>,
}

pub trait ContextStack {
    /// Nodes currently in context, innermost first.
    fn current_nodes(&self) -> Vec<SourceNode>;
}

/// Primary output plus the named outputs a caller asked for.
pub struct TransformOutputs<'a> {
    primary: &'a mut dyn XmlReceiver,
    named: BTreeMap<String, EventRecorder>,
}

impl<'a> TransformOutputs<'a> {
    pub fn new(primary: &'a mut dyn XmlReceiver) -> Self {
        Self {
            primary,
            named: BTreeMap::new(),
        }
    }

    pub fn request(&mut self, name: &str) {
        self.named
            .entry(name.to_string())
            .or_insert_with(|| EventRecorder::new(None));
    }

    pub fn primary(&mut self) -> &mut dyn XmlReceiver {
        &mut *self.primary
    }

    /// Receiver for a named output, or `None` when nobody asked for it.
    pub fn named(&mut self, name: &str) -> Option<&mut dyn XmlReceiver> {
        self.named
            .get_mut(name)
            .map(|recorder| recorder as &mut dyn XmlReceiver)
    }

    pub fn into_named(self) -> BTreeMap<String, EventBuffer> {
        self.named
            .into_iter()
            .map(|(name, recorder)| (name, recorder.finish()))
            .collect()
    }
}

/// What an engine sees while compiling: the stylesheet, a way to pull in
/// included stylesheets, and where to report problems.
///
/// Everything read through the context is tracked for dependencies.
pub struct CompileContext<'a> {
    stylesheet: &'a dyn XmlSource,
    resolver: &'a dyn ResourceResolver,
    listener: &'a mut dyn ErrorListener,
    attributes: &'a EngineAttributes,
    system_id: Option<String>,
    references: UriReferences,
}

impl<'a> CompileContext<'a> {
    pub fn new(
        stylesheet: &'a dyn XmlSource,
        resolver: &'a dyn ResourceResolver,
        listener: &'a mut dyn ErrorListener,
        attributes: &'a EngineAttributes,
    ) -> Self {
        Self {
            stylesheet,
            resolver,
            listener,
            attributes,
            system_id: stylesheet.system_id().map(str::to_string),
            references: UriReferences::default(),
        }
    }

    pub fn attributes(&self) -> &EngineAttributes {
        self.attributes
    }

    pub fn listener(&mut self) -> &mut dyn ErrorListener {
        &mut *self.listener
    }

    /// System id of the top-level stylesheet.
    pub fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    /// Streams the top-level stylesheet to `receiver`.
    pub fn read_stylesheet(&mut self, receiver: &mut dyn XmlReceiver) -> Result<(), TransformError> {
        let mut tracker = StylesheetTracker::new();
        let result = self
            .stylesheet
            .replay(&mut TeeReceiver::new(&mut tracker, receiver));
        if self.system_id.is_none() {
            self.system_id = tracker.system_id().map(str::to_string);
        }
        self.absorb(tracker, result)
    }

    /// Resolves `href` against `base` and streams that stylesheet to
    /// `receiver`. Returns the resolved URL.
    pub fn include(
        &mut self,
        base: Option<&str>,
        href: &str,
        receiver: &mut dyn XmlReceiver,
    ) -> Result<String, TransformError> {
        let url = resolve_url(base.or(self.system_id.as_deref()), href)?;
        debug!(url = %url, "Reading included stylesheet");
        let source = self.resolver.open(&url)?;
        let mut tracker = StylesheetTracker::new();
        let result = source.replay(&mut TeeReceiver::new(&mut tracker, receiver));
        self.absorb(tracker, result)?;
        Ok(url.to_string())
    }

    fn absorb(
        &mut self,
        mut tracker: StylesheetTracker,
        result: Result<(), XmlError>,
    ) -> Result<(), TransformError> {
        if let Some(err) = tracker.take_error() {
            return Err(err);
        }
        result?;
        self.references.merge(tracker.into_references());
        Ok(())
    }

    /// References gathered from everything read so far.
    pub fn into_references(self) -> UriReferences {
        self.references
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{CollectingErrorListener, MemoryResolver, TransformError};
    use crate::xml::{NullReceiver, parse_document};

    const MAIN: &str = r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
        <xsl:include href="common.xsl"/>
    </xsl:stylesheet>"#;

    #[test]
    fn references_span_every_read_document() {
        let resolver = MemoryResolver::new();
        resolver.insert(
            "mem:/xsl/common.xsl",
            r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                 <xsl:variable name="c" select="doc('codes.xml')"/>
               </xsl:stylesheet>"#,
            None,
        );
        let stylesheet = parse_document(MAIN, Some("mem:/xsl/main.xsl")).expect("parse");
        let attributes = EngineAttributes::new();
        let mut listener = CollectingErrorListener::new();
        let mut context = CompileContext::new(&stylesheet, &resolver, &mut listener, &attributes);

        context.read_stylesheet(&mut NullReceiver).expect("read");
        let url = context
            .include(None, "common.xsl", &mut NullReceiver)
            .expect("include");
        assert_eq!(url, "mem:/xsl/common.xsl");

        let refs = context.into_references();
        assert_eq!(refs.stylesheet_references.len(), 1);
        assert_eq!(
            refs.document_references[0].resolve().expect("url").as_str(),
            "mem:/xsl/codes.xml"
        );
    }

    #[test]
    fn missing_include_is_a_resource_error() {
        let resolver = MemoryResolver::new();
        let stylesheet = parse_document(MAIN, Some("mem:/xsl/main.xsl")).expect("parse");
        let attributes = EngineAttributes::new();
        let mut listener = CollectingErrorListener::new();
        let mut context = CompileContext::new(&stylesheet, &resolver, &mut listener, &attributes);
        assert!(matches!(
            context.include(None, "common.xsl", &mut NullReceiver),
            Err(TransformError::Resource { .. })
        ));
    }

    #[test]
    fn unrequested_named_outputs_are_absent() {
        let mut primary = NullReceiver;
        let mut outputs = TransformOutputs::new(&mut primary);
        outputs.request("summary");
        assert!(outputs.named("summary").is_some());
        assert!(outputs.named("other").is_none());
        assert_eq!(outputs.into_named().len(), 1);
    }
}
