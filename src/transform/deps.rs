//! Static discovery of the resources a stylesheet depends on.

use std::rc::Rc;

use tracing::{debug, error};
use url::Url;

use super::{TransformError, XSLT_NAMESPACE_URI, resolve_url};
use crate::xml::{Locator, XmlError, XmlEvent, XmlReceiver};
use crate::xpath::{self, Expr};

const PROCESSOR_INPUT_SCHEME: &str = "input:";
const PROCESSOR_INPUT_SCHEME_OLD: &str = "oxf:";

/// True for URIs naming another input of the running pipeline rather than an
/// external resource.
pub fn is_processor_input_uri(uri: &str) -> bool {
    uri.starts_with('#')
        || (uri.starts_with(PROCESSOR_INPUT_SCHEME)
            && !uri.starts_with(&format!("{PROCESSOR_INPUT_SCHEME}/")))
        || (uri.starts_with(PROCESSOR_INPUT_SCHEME_OLD)
            && !uri.starts_with(&format!("{PROCESSOR_INPUT_SCHEME_OLD}/")))
}

/// A reference as written, relative to the document it appeared in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UriReference {
    pub context: Option<String>,
    pub spec: String,
}

impl UriReference {
    pub fn new(context: Option<&str>, spec: impl Into<String>) -> Self {
        Self {
            context: context.map(str::to_string),
            spec: spec.into(),
        }
    }

    pub fn resolve(&self) -> Result<Url, TransformError> {
        resolve_url(self.context.as_deref(), &self.spec)
    }
}

/// Everything a compiled stylesheet was found to depend on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UriReferences {
    /// Included, imported and schema-imported documents.
    pub stylesheet_references: Vec<UriReference>,
    /// Literal `doc()`/`document()` arguments.
    pub document_references: Vec<UriReference>,
    /// Some `doc()`/`document()` argument is computed at run time, so the
    /// set above is incomplete and nothing built from it may be cached.
    pub has_dynamic_document_references: bool,
}

impl UriReferences {
    pub fn merge(&mut self, other: UriReferences) {
        self.stylesheet_references.extend(other.stylesheet_references);
        self.document_references.extend(other.document_references);
        self.has_dynamic_document_references |= other.has_dynamic_document_references;
    }

    pub fn all(&self) -> impl Iterator<Item = &UriReference> {
        self.stylesheet_references
            .iter()
            .chain(&self.document_references)
    }
}

/// Receiver that records the references of one stylesheet document while it
/// streams past.
///
/// A `test` or `select` attribute that does not parse stops the stream; the
/// syntax error is kept here and returned by [`StylesheetTracker::take_error`].
#[derive(Default)]
pub struct StylesheetTracker {
    locator: Option<Rc<dyn Locator>>,
    system_id: Option<String>,
    references: UriReferences,
    error: Option<TransformError>,
}

impl StylesheetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// System id of the tracked document, known after its first element.
    pub fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    pub fn references(&self) -> &UriReferences {
        &self.references
    }

    pub fn take_error(&mut self) -> Option<TransformError> {
        self.error.take()
    }

    pub fn into_references(self) -> UriReferences {
        self.references
    }

    fn record_stylesheet(&mut self, spec: Option<&str>) {
        if let Some(spec) = spec {
            self.references
                .stylesheet_references
                .push(UriReference::new(self.system_id.as_deref(), spec));
        }
    }

    fn scan_expression(&mut self, expression: &str) -> Result<(), XmlError> {
        // Cheap filter before parsing.
        if !expression.contains("doc") {
            return Ok(());
        }
        match xpath::parse(expression) {
            Ok(expr) => {
                self.visit(&expr);
                Ok(())
            }
            Err(source) => {
                let location = self.locator.as_ref().and_then(|l| l.location());
                error!(expression, %source, "Invalid XPath expression in stylesheet");
                let message = format!("XPath syntax error in `{expression}`");
                self.error = Some(TransformError::XPathSyntax {
                    expression: expression.to_string(),
                    location,
                    source,
                });
                Err(XmlError::Interrupted { message })
            }
        }
    }

    fn visit(&mut self, expr: &Expr) {
        if let Some(name @ ("doc" | "document")) = expr.function_local_name() {
            match expr.sub_expressions().first() {
                Some(Expr::StringLiteral(uri)) => {
                    if !is_processor_input_uri(uri) {
                        self.references
                            .document_references
                            .push(UriReference::new(self.system_id.as_deref(), uri.as_str()));
                    }
                }
                _ => {
                    debug!(function = name, "Found dynamic document reference");
                    self.references.has_dynamic_document_references = true;
                }
            }
            return;
        }
        for sub in expr.sub_expressions() {
            self.visit(sub);
        }
    }
}

impl XmlReceiver for StylesheetTracker {
    fn set_locator(&mut self, locator: Rc<dyn Locator>) {
        self.locator = Some(locator);
    }

    fn receive(&mut self, event: XmlEvent) -> Result<(), XmlError> {
        let XmlEvent::StartElement { name, attributes } = &event else {
            return Ok(());
        };
        if self.system_id.is_none() {
            self.system_id = self
                .locator
                .as_ref()
                .and_then(|l| l.location())
                .and_then(|l| l.system_id);
        }
        if name.namespace.as_deref() != Some(XSLT_NAMESPACE_URI) {
            return Ok(());
        }

        match name.local.as_str() {
            "include" | "import" => self.record_stylesheet(attributes.get("href")),
            "import-schema" => self.record_stylesheet(attributes.get("schema-location")),
            _ => {}
        }
        match attributes.get("test").or_else(|| attributes.get("select")) {
            Some(expression) => self.scan_expression(expression),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{XmlSource, parse_document};

    fn track(stylesheet: &str) -> StylesheetTracker {
        let buffer = parse_document(stylesheet, Some("file:/forms/main.xsl")).expect("parse");
        let mut tracker = StylesheetTracker::new();
        let _ = buffer.replay(&mut tracker);
        tracker
    }

    #[test]
    fn records_includes_imports_and_literal_documents() {
        let tracker = track(
            r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform" version="2.0">
                 <xsl:include href="a.xsl"/>
                 <xsl:import href="lib/b.xsl"/>
                 <xsl:import-schema schema-location="s.xsd"/>
                 <xsl:variable name="v" select="document('b.xml')/root"/>
                 <xsl:template match="/">
                   <xsl:if test="doc-available('c.xml') and count(fn:doc('d.xml')//x) gt 0"/>
                 </xsl:template>
               </xsl:stylesheet>"#,
        );
        assert!(!tracker.references().has_dynamic_document_references);
        assert_eq!(tracker.system_id(), Some("file:/forms/main.xsl"));

        let refs = tracker.into_references();
        fn specs(refs: &[UriReference]) -> Vec<String> {
            refs.iter().map(|r| r.spec.clone()).collect()
        }
        assert_eq!(
            specs(&refs.stylesheet_references),
            vec!["a.xsl", "lib/b.xsl", "s.xsd"]
        );
        assert_eq!(specs(&refs.document_references), vec!["b.xml", "d.xml"]);
        assert_eq!(
            refs.stylesheet_references[1].resolve().expect("url").as_str(),
            "file:///forms/lib/b.xsl"
        );
    }

    #[test]
    fn computed_document_argument_is_dynamic() {
        let tracker = track(
            r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform" version="2.0">
                 <xsl:variable name="v" select="document(concat($base, '.xml'))"/>
               </xsl:stylesheet>"#,
        );
        assert!(tracker.references().has_dynamic_document_references);
        assert!(tracker.references().document_references.is_empty());
    }

    #[test]
    fn processor_inputs_are_not_references() {
        let tracker = track(
            r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform" version="2.0">
                 <xsl:variable name="a" select="doc('input:instance')"/>
                 <xsl:variable name="b" select="doc('oxf:/config.xml')"/>
               </xsl:stylesheet>"#,
        );
        let refs = tracker.into_references();
        assert_eq!(refs.document_references.len(), 1);
        assert_eq!(refs.document_references[0].spec, "oxf:/config.xml");
        assert!(is_processor_input_uri("#data"));
    }

    #[test]
    fn syntax_error_stops_the_stream_with_location() {
        let buffer = parse_document(
            "<xsl:stylesheet xmlns:xsl=\"http://www.w3.org/1999/XSL/Transform\">\n  <xsl:value-of select=\"doc('a.xml')/(\"/>\n</xsl:stylesheet>",
            Some("file:/bad.xsl"),
        )
        .expect("parse");
        let mut tracker = StylesheetTracker::new();
        let err = buffer.replay(&mut tracker).expect_err("interrupted");
        assert!(matches!(err, XmlError::Interrupted { .. }));

        match tracker.take_error() {
            Some(TransformError::XPathSyntax {
                expression,
                location: Some(location),
                ..
            }) => {
                assert_eq!(expression, "doc('a.xml')/(");
                assert_eq!(location.line, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn elements_outside_xslt_are_ignored() {
        let tracker = track(
            r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform" xmlns:f="urn:f">
                 <f:include href="nope.xsl" select="doc('nope.xml')"/>
               </xsl:stylesheet>"#,
        );
        assert_eq!(tracker.into_references(), UriReferences::default());
    }
}
