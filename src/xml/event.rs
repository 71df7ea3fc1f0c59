use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Qualified XML name with its resolved namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    pub prefix: Option<String>,
    pub namespace: Option<String>,
    pub local: String,
}

impl QName {
    /// Name in no namespace.
    pub fn local(local: impl Into<String>) -> Self {
        Self {
            prefix: None,
            namespace: None,
            local: local.into(),
        }
    }

    pub fn new(prefix: Option<&str>, namespace: Option<&str>, local: impl Into<String>) -> Self {
        Self {
            prefix: prefix.filter(|p| !p.is_empty()).map(str::to_string),
            namespace: namespace.filter(|n| !n.is_empty()).map(str::to_string),
            local: local.into(),
        }
    }

    /// `prefix:local`, or just `local` when unprefixed.
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.local),
            None => self.local.clone(),
        }
    }

    pub fn matches(&self, namespace: &str, local: &str) -> bool {
        self.namespace.as_deref() == Some(namespace) && self.local == local
    }

    /// Equality on namespace and local part, ignoring the prefix.
    pub fn same_name(&self, other: &QName) -> bool {
        self.namespace == other.namespace && self.local == other.local
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

/// Ordered attribute list of a start element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attributes(Vec<Attribute>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: QName, value: impl Into<String>) {
        self.0.push(Attribute {
            name,
            value: value.into(),
        });
    }

    /// Builder-style variant of [`Attributes::push`] for no-namespace names.
    pub fn with(mut self, local: &str, value: impl Into<String>) -> Self {
        self.push(QName::local(local), value);
        self
    }

    /// Value of the no-namespace attribute `local`.
    pub fn get(&self, local: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|attr| attr.name.namespace.is_none() && attr.name.local == local)
            .map(|attr| attr.value.as_str())
    }

    pub fn get_ns(&self, namespace: &str, local: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|attr| attr.name.matches(namespace, local))
            .map(|attr| attr.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut attributes = Attributes::new();
        for (name, value) in iter {
            attributes.push(QName::local(name), value);
        }
        attributes
    }
}

/// Kind of source node an event or a context frame refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Text,
    Comment,
    ProcessingInstruction,
}

/// One step of a streamed XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    StartDocument,
    EndDocument,
    StartPrefixMapping { prefix: String, uri: String },
    EndPrefixMapping { prefix: String },
    StartElement { name: QName, attributes: Attributes },
    EndElement { name: QName },
    Characters(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

impl XmlEvent {
    /// Node kind for content events; `None` for namespace bookkeeping and end events.
    pub fn node_kind(&self) -> Option<NodeKind> {
        match self {
            XmlEvent::StartDocument => Some(NodeKind::Document),
            XmlEvent::StartElement { .. } => Some(NodeKind::Element),
            XmlEvent::Characters(_) => Some(NodeKind::Text),
            XmlEvent::Comment(_) => Some(NodeKind::Comment),
            XmlEvent::ProcessingInstruction { .. } => Some(NodeKind::ProcessingInstruction),
            _ => None,
        }
    }
}

/// Position within a source document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub system_id: Option<String>,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(system_id: Option<&str>, line: u32, column: u32) -> Self {
        Self {
            system_id: system_id.map(str::to_string),
            line,
            column,
        }
    }

    /// Location that only knows which document it refers to.
    pub fn document(system_id: &str) -> Self {
        Self::new(Some(system_id), 0, 0)
    }

    pub fn has_position(&self) -> bool {
        self.line > 0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.system_id, self.has_position()) {
            (Some(id), true) => write!(f, "{id}, line {}, column {}", self.line, self.column),
            (Some(id), false) => f.write_str(id),
            (None, true) => write!(f, "line {}, column {}", self.line, self.column),
            (None, false) => f.write_str("unknown location"),
        }
    }
}

/// Reports the source position of the event currently being delivered.
pub trait Locator {
    fn location(&self) -> Option<Location>;
}

/// Locator whose position is moved by the producer as it streams.
#[derive(Debug, Clone, Default)]
pub struct SharedLocator(Rc<RefCell<Option<Location>>>);

impl SharedLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, location: Option<Location>) {
        *self.0.borrow_mut() = location;
    }
}

impl Locator for SharedLocator {
    fn location(&self) -> Option<Location> {
        self.0.borrow().clone()
    }
}
