use super::XmlError;
use super::event::{Attributes, QName, XmlEvent};
use super::receiver::XmlReceiver;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Xml,
    Html { skip_root: bool },
}

/// Serializes a received event stream to text.
///
/// XML mode keeps prefixes and namespace declarations. HTML fragment mode
/// writes local names only, never self-closes non-void elements and can drop
/// the outermost element to yield its content.
#[derive(Debug)]
pub struct XmlWriter {
    out: String,
    mode: Mode,
    pending: Option<(QName, Attributes)>,
    pending_namespaces: Vec<(String, String)>,
    depth: usize,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self::with_mode(Mode::Xml)
    }

    pub fn html_fragment(skip_root: bool) -> Self {
        Self::with_mode(Mode::Html { skip_root })
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            out: String::new(),
            mode,
            pending: None,
            pending_namespaces: Vec::new(),
            depth: 0,
        }
    }

    pub fn finish(mut self) -> String {
        self.flush_start(false);
        self.out
    }

    fn is_skipped(&self, depth: usize) -> bool {
        matches!(self.mode, Mode::Html { skip_root: true }) && depth == 1
    }

    fn flush_start(&mut self, self_close: bool) {
        let Some((name, attributes)) = self.pending.take() else {
            return;
        };
        let namespaces = std::mem::take(&mut self.pending_namespaces);
        if self.is_skipped(self.depth) {
            return;
        }

        let html = matches!(self.mode, Mode::Html { .. });
        self.out.push('<');
        self.out.push_str(&element_name(&name, html));
        if !html {
            for (prefix, uri) in &namespaces {
                if prefix.is_empty() {
                    self.out.push_str(" xmlns=\"");
                } else {
                    self.out.push_str(" xmlns:");
                    self.out.push_str(prefix);
                    self.out.push_str("=\"");
                }
                escape_into(&mut self.out, uri, true);
                self.out.push('"');
            }
        }
        for attr in attributes.iter() {
            self.out.push(' ');
            self.out.push_str(&element_name(&attr.name, html));
            self.out.push_str("=\"");
            escape_into(&mut self.out, &attr.value, true);
            self.out.push('"');
        }

        if self_close && !html {
            self.out.push_str("/>");
        } else if self_close && VOID_ELEMENTS.contains(&name.local.as_str()) {
            self.out.push('>');
        } else {
            self.out.push('>');
            if self_close {
                self.out.push_str("</");
                self.out.push_str(&element_name(&name, html));
                self.out.push('>');
            }
        }
    }
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlReceiver for XmlWriter {
    fn receive(&mut self, event: XmlEvent) -> Result<(), XmlError> {
        match event {
            XmlEvent::StartDocument | XmlEvent::EndDocument | XmlEvent::EndPrefixMapping { .. } => {}
            XmlEvent::StartPrefixMapping { prefix, uri } => {
                self.flush_start(false);
                self.pending_namespaces.push((prefix, uri));
            }
            XmlEvent::StartElement { name, attributes } => {
                self.flush_start(false);
                self.depth += 1;
                self.pending = Some((name, attributes));
            }
            XmlEvent::EndElement { name } => {
                if self.depth == 0 {
                    return Err(XmlError::Protocol {
                        message: format!("unbalanced end element `{name}`"),
                    });
                }
                if self.pending.is_some() {
                    self.flush_start(true);
                } else if !self.is_skipped(self.depth) {
                    let html = matches!(self.mode, Mode::Html { .. });
                    self.out.push_str("</");
                    self.out.push_str(&element_name(&name, html));
                    self.out.push('>');
                }
                self.depth -= 1;
            }
            XmlEvent::Characters(text) => {
                self.flush_start(false);
                escape_into(&mut self.out, &text, false);
            }
            XmlEvent::Comment(text) => {
                self.flush_start(false);
                self.out.push_str("<!--");
                self.out.push_str(&text);
                self.out.push_str("-->");
            }
            XmlEvent::ProcessingInstruction { target, data } => {
                self.flush_start(false);
                self.out.push_str("<?");
                self.out.push_str(&target);
                if !data.is_empty() {
                    self.out.push(' ');
                    self.out.push_str(&data);
                }
                self.out.push_str("?>");
            }
        }
        Ok(())
    }
}

fn element_name(name: &QName, html: bool) -> String {
    if html { name.local.clone() } else { name.qualified() }
}

fn escape_into(out: &mut String, text: &str, attribute: bool) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

/// HTML-escapes `text` for use as element content.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    escape_into(&mut out, text, true);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{XmlSource, parse_document};

    #[test]
    fn xml_mode_self_closes_and_declares_namespaces() {
        let buffer = parse_document(r#"<a xmlns:x="urn:x"><x:b c="1 &lt; 2"/>t</a>"#, None)
            .expect("parse");
        let mut writer = XmlWriter::new();
        buffer.replay(&mut writer).expect("write");
        insta::assert_snapshot!(writer.finish(), @r#"<a xmlns:x="urn:x"><x:b c="1 &lt; 2"/>t</a>"#);
    }

    #[test]
    fn html_fragment_drops_root_and_prefixes() {
        let buffer = parse_document(
            r#"<h:div xmlns:h="http://www.w3.org/1999/xhtml"><h:span/><h:br/></h:div>"#,
            None,
        )
        .expect("parse");
        let mut writer = XmlWriter::html_fragment(true);
        buffer.replay(&mut writer).expect("write");
        assert_eq!(writer.finish(), "<span></span><br>");
    }
}
