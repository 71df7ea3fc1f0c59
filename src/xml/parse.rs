use roxmltree::{Document, Node};

use super::XmlError;
use super::buffer::EventBuffer;
use super::event::{Attributes, Location, QName, XmlEvent};

const XML_PREFIX: &str = "xml";

/// Parses `text` into a located event buffer.
pub fn parse_document(text: &str, system_id: Option<&str>) -> Result<EventBuffer, XmlError> {
    let doc = Document::parse(text).map_err(|err| {
        let pos = err.pos();
        XmlError::Parse {
            system_id: system_id.unwrap_or("<anonymous>").to_string(),
            message: err.to_string(),
            location: Some(Location::new(system_id, pos.row, pos.col)),
        }
    })?;

    let mut buffer = EventBuffer::new(system_id);
    buffer.push(XmlEvent::StartDocument, Some(Location::new(system_id, 1, 1)));
    for child in doc.root().children() {
        emit_node(&doc, child, system_id, &mut buffer);
    }
    buffer.push(XmlEvent::EndDocument, None);
    Ok(buffer)
}

fn emit_node(doc: &Document<'_>, node: Node<'_, '_>, system_id: Option<&str>, out: &mut EventBuffer) {
    let pos = doc.text_pos_at(node.range().start);
    let location = Some(Location::new(system_id, pos.row, pos.col));

    if node.is_element() {
        let declared = declared_namespaces(node);
        for (prefix, uri) in &declared {
            out.push(
                XmlEvent::StartPrefixMapping {
                    prefix: prefix.clone(),
                    uri: uri.clone(),
                },
                location.clone(),
            );
        }

        let tag = node.tag_name();
        let name = QName::new(
            tag.namespace().and_then(|ns| node.lookup_prefix(ns)),
            tag.namespace(),
            tag.name(),
        );
        let mut attributes = Attributes::new();
        for attr in node.attributes() {
            let prefix = attr.namespace().and_then(|ns| node.lookup_prefix(ns));
            attributes.push(QName::new(prefix, attr.namespace(), attr.name()), attr.value());
        }

        out.push(
            XmlEvent::StartElement {
                name: name.clone(),
                attributes,
            },
            location.clone(),
        );
        for child in node.children() {
            emit_node(doc, child, system_id, out);
        }
        out.push(XmlEvent::EndElement { name }, location.clone());

        for (prefix, _) in declared.into_iter().rev() {
            out.push(XmlEvent::EndPrefixMapping { prefix }, location.clone());
        }
    } else if node.is_text() {
        if let Some(text) = node.text() {
            out.push(XmlEvent::Characters(text.to_string()), location);
        }
    } else if node.is_comment() {
        if let Some(text) = node.text() {
            out.push(XmlEvent::Comment(text.to_string()), location);
        }
    } else if let Some(pi) = node.pi() {
        out.push(
            XmlEvent::ProcessingInstruction {
                target: pi.target.to_string(),
                data: pi.value.unwrap_or_default().to_string(),
            },
            location,
        );
    }
}

/// Namespaces in scope on `node` that are not already in scope on its parent.
fn declared_namespaces(node: Node<'_, '_>) -> Vec<(String, String)> {
    let inherited: Vec<(Option<&str>, &str)> = node
        .parent_element()
        .map(|parent| parent.namespaces().map(|ns| (ns.name(), ns.uri())).collect())
        .unwrap_or_default();

    node.namespaces()
        .filter(|ns| ns.name() != Some(XML_PREFIX))
        .filter(|ns| !inherited.contains(&(ns.name(), ns.uri())))
        .map(|ns| (ns.name().unwrap_or_default().to_string(), ns.uri().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlSource;

    #[test]
    fn parse_emits_located_events_with_namespaces() {
        let buffer = parse_document(
            "<xsl:stylesheet xmlns:xsl=\"http://www.w3.org/1999/XSL/Transform\">\n  <xsl:include href=\"b.xsl\"/>\n</xsl:stylesheet>",
            Some("file:/a.xsl"),
        )
        .expect("parse");

        assert_eq!(buffer.system_id(), Some("file:/a.xsl"));
        let include = buffer
            .events()
            .find_map(|event| match event {
                XmlEvent::StartElement { name, attributes } if name.local == "include" => {
                    Some((name.clone(), attributes.get("href").map(str::to_string)))
                }
                _ => None,
            })
            .expect("include element");
        assert_eq!(include.0.prefix.as_deref(), Some("xsl"));
        assert_eq!(include.1.as_deref(), Some("b.xsl"));
        assert!(buffer.events().any(|event| matches!(
            event,
            XmlEvent::StartPrefixMapping { prefix, .. } if prefix == "xsl"
        )));
    }

    #[test]
    fn parse_error_carries_position() {
        let err = parse_document("<a><b></a>", Some("file:/bad.xml")).expect_err("malformed");
        match err {
            XmlError::Parse { location, .. } => {
                let location = location.expect("location");
                assert_eq!(location.system_id.as_deref(), Some("file:/bad.xml"));
                assert!(location.has_position());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
