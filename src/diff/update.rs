use super::DiffError;
use crate::xml::{Attributes, QName, XmlReceiver};

pub const XXFORMS_NAMESPACE_URI: &str = "http://orbeon.org/oxf/xml/xforms";
pub const XXFORMS_PREFIX: &str = "xxf";

/// Kind of client update instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    Control,
    RepeatIteration,
    CopyRepeatTemplate,
    DeleteRepeatElements,
    /// Visibility toggle for a switch case or a dialog.
    Div,
    InnerHtml,
}

impl UpdateKind {
    pub fn element_name(self) -> &'static str {
        match self {
            UpdateKind::Control => "control",
            UpdateKind::RepeatIteration => "repeat-iteration",
            UpdateKind::CopyRepeatTemplate => "copy-repeat-template",
            UpdateKind::DeleteRepeatElements => "delete-repeat-elements",
            UpdateKind::Div => "div",
            UpdateKind::InnerHtml => "inner-html",
        }
    }
}

/// One update instruction with its flat attribute set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateEvent {
    pub kind: UpdateKind,
    pub attributes: Vec<(String, String)>,
    /// Text content: the control value, or the rendered fragment.
    pub text: Option<String>,
}

impl UpdateEvent {
    pub fn new(kind: UpdateKind, attributes: Vec<(String, String)>) -> Self {
        Self {
            kind,
            attributes,
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn id(&self) -> Option<&str> {
        self.attribute("id")
    }
}

/// Destination of differ output.
pub trait UpdateSink {
    fn emit(&mut self, event: UpdateEvent) -> Result<(), DiffError>;
}

impl UpdateSink for Vec<UpdateEvent> {
    fn emit(&mut self, event: UpdateEvent) -> Result<(), DiffError> {
        self.push(event);
        Ok(())
    }
}

/// Streams updates as `xxf:*` elements.
pub struct ReceiverSink<'a> {
    receiver: &'a mut dyn XmlReceiver,
    emitted: u64,
}

impl<'a> ReceiverSink<'a> {
    pub fn new(receiver: &'a mut dyn XmlReceiver) -> Self {
        Self {
            receiver,
            emitted: 0,
        }
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

impl UpdateSink for ReceiverSink<'_> {
    fn emit(&mut self, event: UpdateEvent) -> Result<(), DiffError> {
        let attributes: Attributes = event
            .attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        self.receiver.text_element(
            xxf_name(event.kind.element_name()),
            attributes,
            event.text.as_deref(),
        )?;
        self.emitted += 1;
        Ok(())
    }
}

pub fn xxf_name(local: &str) -> QName {
    QName::new(Some(XXFORMS_PREFIX), Some(XXFORMS_NAMESPACE_URI), local)
}
