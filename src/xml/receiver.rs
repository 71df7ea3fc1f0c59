use std::rc::Rc;

use super::XmlError;
use super::event::{Attributes, Locator, QName, XmlEvent};

/// Consumer of a streamed XML document.
pub trait XmlReceiver {
    /// Installs the locator describing the events that follow.
    fn set_locator(&mut self, locator: Rc<dyn Locator>) {
        let _ = locator;
    }

    fn receive(&mut self, event: XmlEvent) -> Result<(), XmlError>;

    fn start_element(&mut self, name: QName, attributes: Attributes) -> Result<(), XmlError> {
        self.receive(XmlEvent::StartElement { name, attributes })
    }

    fn end_element(&mut self, name: QName) -> Result<(), XmlError> {
        self.receive(XmlEvent::EndElement { name })
    }

    fn characters(&mut self, text: &str) -> Result<(), XmlError> {
        self.receive(XmlEvent::Characters(text.to_string()))
    }

    /// Element with optional text content and no children.
    fn text_element(
        &mut self,
        name: QName,
        attributes: Attributes,
        text: Option<&str>,
    ) -> Result<(), XmlError> {
        self.start_element(name.clone(), attributes)?;
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            self.characters(text)?;
        }
        self.end_element(name)
    }
}

impl<R: XmlReceiver + ?Sized> XmlReceiver for &mut R {
    fn set_locator(&mut self, locator: Rc<dyn Locator>) {
        (**self).set_locator(locator);
    }

    fn receive(&mut self, event: XmlEvent) -> Result<(), XmlError> {
        (**self).receive(event)
    }
}

impl<R: XmlReceiver + ?Sized> XmlReceiver for Box<R> {
    fn set_locator(&mut self, locator: Rc<dyn Locator>) {
        (**self).set_locator(locator);
    }

    fn receive(&mut self, event: XmlEvent) -> Result<(), XmlError> {
        (**self).receive(event)
    }
}

/// Producer of a complete XML document that can be read more than once.
pub trait XmlSource {
    fn system_id(&self) -> Option<&str> {
        None
    }

    fn replay(&self, receiver: &mut dyn XmlReceiver) -> Result<(), XmlError>;
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReceiver;

impl XmlReceiver for NullReceiver {
    fn receive(&mut self, _event: XmlEvent) -> Result<(), XmlError> {
        Ok(())
    }
}

/// Forwards every event to two receivers, first to `first`.
pub struct TeeReceiver<A, B> {
    first: A,
    second: B,
}

impl<A: XmlReceiver, B: XmlReceiver> TeeReceiver<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: XmlReceiver, B: XmlReceiver> XmlReceiver for TeeReceiver<A, B> {
    fn set_locator(&mut self, locator: Rc<dyn Locator>) {
        self.first.set_locator(Rc::clone(&locator));
        self.second.set_locator(locator);
    }

    fn receive(&mut self, event: XmlEvent) -> Result<(), XmlError> {
        self.first.receive(event.clone())?;
        self.second.receive(event)
    }
}
