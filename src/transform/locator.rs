//! Locators attached to transform output.

use std::cell::RefCell;
use std::rc::Rc;

use super::engine::ContextStack;
use crate::xml::{Location, Locator, NodeKind, QName, XmlError, XmlEvent, XmlReceiver, XmlSource};

/// Always reports the same location.
#[derive(Debug, Clone)]
pub struct ConstantLocator(pub Location);

impl Locator for ConstantLocator {
    fn location(&self) -> Option<Location> {
        Some(self.0.clone())
    }
}

type LocatorSlot = Rc<RefCell<Option<Rc<dyn Locator>>>>;

/// Reports whatever the input's own locator currently reports.
#[derive(Clone, Default)]
pub(crate) struct InputLocator(LocatorSlot);

impl Locator for InputLocator {
    fn location(&self) -> Option<Location> {
        self.0.borrow().as_ref().and_then(|locator| locator.location())
    }
}

/// Input source that remembers the locator it hands to the engine.
pub(crate) struct TappedSource<'a> {
    source: &'a dyn XmlSource,
    slot: LocatorSlot,
}

impl<'a> TappedSource<'a> {
    pub(crate) fn new(source: &'a dyn XmlSource) -> (Self, InputLocator) {
        let slot = LocatorSlot::default();
        (
            Self {
                source,
                slot: Rc::clone(&slot),
            },
            InputLocator(slot),
        )
    }
}

impl XmlSource for TappedSource<'_> {
    fn system_id(&self) -> Option<&str> {
        self.source.system_id()
    }

    fn replay(&self, receiver: &mut dyn XmlReceiver) -> Result<(), XmlError> {
        let mut tap = Tap {
            inner: receiver,
            slot: Rc::clone(&self.slot),
        };
        self.source.replay(&mut tap)
    }
}

struct Tap<'r> {
    inner: &'r mut dyn XmlReceiver,
    slot: LocatorSlot,
}

impl XmlReceiver for Tap<'_> {
    fn set_locator(&mut self, locator: Rc<dyn Locator>) {
        *self.slot.borrow_mut() = Some(Rc::clone(&locator));
        self.inner.set_locator(locator);
    }

    fn receive(&mut self, event: XmlEvent) -> Result<(), XmlError> {
        self.inner.receive(event)
    }
}

/// Locates each output event at the source node the engine is processing
/// when it emits it.
///
/// The innermost context node whose kind and name match the event wins;
/// without a match the input locator answers.
pub struct SmartLocator {
    stack: Rc<dyn ContextStack>,
    fallback: Rc<dyn Locator>,
    current: RefCell<Option<(NodeKind, Option<QName>)>>,
}

impl SmartLocator {
    pub fn new(stack: Rc<dyn ContextStack>, fallback: Rc<dyn Locator>) -> Self {
        Self {
            stack,
            fallback,
            current: RefCell::new(None),
        }
    }

    fn track(&self, event: &XmlEvent) {
        let current = match event {
            XmlEvent::StartElement { name, .. } | XmlEvent::EndElement { name } => {
                Some((NodeKind::Element, Some(name.clone())))
            }
            XmlEvent::Characters(_) => Some((NodeKind::Text, None)),
            _ => None,
        };
        *self.current.borrow_mut() = current;
    }
}

impl Locator for SmartLocator {
    fn location(&self) -> Option<Location> {
        let current = self.current.borrow();
        if let Some((kind, name)) = current.as_ref() {
            let found = self.stack.current_nodes().into_iter().find(|node| {
                node.kind == *kind
                    && match (&node.name, name) {
                        (Some(a), Some(b)) => a.same_name(b),
                        (None, None) => true,
                        _ => false,
                    }
            });
            if let Some(location) = found.and_then(|node| node.location) {
                return Some(location);
            }
        }
        self.fallback.location()
    }
}

/// Feeds every event through a [`SmartLocator`] before forwarding it.
pub(crate) struct SmartReceiver<R> {
    inner: R,
    locator: Rc<SmartLocator>,
}

impl<R: XmlReceiver> SmartReceiver<R> {
    pub(crate) fn new(inner: R, locator: Rc<SmartLocator>) -> Self {
        Self { inner, locator }
    }
}

impl<R: XmlReceiver> XmlReceiver for SmartReceiver<R> {
    fn set_locator(&mut self, locator: Rc<dyn Locator>) {
        self.inner.set_locator(locator);
    }

    fn receive(&mut self, event: XmlEvent) -> Result<(), XmlError> {
        self.locator.track(&event);
        self.inner.receive(event)
    }
}
