//! Recorded event streams.
//!
//! An [`EventBuffer`] holds a complete document together with the source
//! location of every event, so it can be replayed any number of times with a
//! faithful locator. Buffers are plain data and can be shared across threads;
//! recording goes through an [`EventRecorder`].

use std::collections::HashMap;
use std::rc::Rc;

use super::XmlError;
use super::event::{Location, Locator, SharedLocator, XmlEvent};
use super::receiver::{XmlReceiver, XmlSource};

#[derive(Debug, Clone, PartialEq, Eq)]
struct RecordedEvent {
    event: XmlEvent,
    location: Option<Location>,
}

/// Position of a start element inside an [`EventBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mark(usize);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBuffer {
    system_id: Option<String>,
    events: Vec<RecordedEvent>,
}

impl EventBuffer {
    pub fn new(system_id: Option<&str>) -> Self {
        Self {
            system_id: system_id.map(str::to_string),
            events: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> impl Iterator<Item = &XmlEvent> {
        self.events.iter().map(|recorded| &recorded.event)
    }

    /// Events paired with the location they were recorded at.
    pub fn located(&self) -> impl Iterator<Item = (&XmlEvent, Option<&Location>)> {
        self.events
            .iter()
            .map(|recorded| (&recorded.event, recorded.location.as_ref()))
    }

    pub fn push(&mut self, event: XmlEvent, location: Option<Location>) {
        self.events.push(RecordedEvent { event, location });
    }

    /// Mark of the next event to be recorded.
    pub fn next_mark(&self) -> Mark {
        Mark(self.events.len())
    }

    /// Marks of every element carrying attribute `attr`, keyed by its value.
    pub fn element_marks(&self, attr: &str) -> HashMap<String, Mark> {
        self.events
            .iter()
            .enumerate()
            .filter_map(|(index, recorded)| match &recorded.event {
                XmlEvent::StartElement { attributes, .. } => attributes
                    .get(attr)
                    .map(|value| (value.to_string(), Mark(index))),
                _ => None,
            })
            .collect()
    }

    /// Replays the element starting at `mark` up to its matching end.
    pub fn replay_element(&self, mark: Mark, receiver: &mut dyn XmlReceiver) -> Result<(), XmlError> {
        match self.events.get(mark.0).map(|recorded| &recorded.event) {
            Some(XmlEvent::StartElement { .. }) => {}
            _ => {
                return Err(XmlError::Protocol {
                    message: format!("mark {} does not point at a start element", mark.0),
                });
            }
        }

        let locator = SharedLocator::new();
        receiver.set_locator(Rc::new(locator.clone()));

        let mut depth = 0usize;
        for recorded in &self.events[mark.0..] {
            locator.set(recorded.location.clone());
            match &recorded.event {
                XmlEvent::StartElement { .. } => depth += 1,
                XmlEvent::EndElement { .. } => depth -= 1,
                _ => {}
            }
            receiver.receive(recorded.event.clone())?;
            if depth == 0 {
                return Ok(());
            }
        }

        Err(XmlError::Protocol {
            message: "unterminated element in event buffer".to_string(),
        })
    }
}

impl XmlSource for EventBuffer {
    fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    fn replay(&self, receiver: &mut dyn XmlReceiver) -> Result<(), XmlError> {
        let locator = SharedLocator::new();
        receiver.set_locator(Rc::new(locator.clone()));
        for recorded in &self.events {
            locator.set(recorded.location.clone());
            receiver.receive(recorded.event.clone())?;
        }
        Ok(())
    }
}

/// Receiver that records into a new [`EventBuffer`].
pub struct EventRecorder {
    buffer: EventBuffer,
    locator: Option<Rc<dyn Locator>>,
}

impl EventRecorder {
    pub fn new(system_id: Option<&str>) -> Self {
        Self {
            buffer: EventBuffer::new(system_id),
            locator: None,
        }
    }

    pub fn buffer(&self) -> &EventBuffer {
        &self.buffer
    }

    pub fn finish(self) -> EventBuffer {
        self.buffer
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new(None)
    }
}

impl XmlReceiver for EventRecorder {
    fn set_locator(&mut self, locator: Rc<dyn Locator>) {
        self.locator = Some(locator);
    }

    fn receive(&mut self, event: XmlEvent) -> Result<(), XmlError> {
        let location = self.locator.as_ref().and_then(|l| l.location());
        if self.buffer.system_id.is_none() {
            self.buffer.system_id = location.as_ref().and_then(|l| l.system_id.clone());
        }
        self.buffer.push(event, location);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{Attributes, QName, parse_document};

    #[test]
    fn replay_element_stops_at_matching_end() {
        let buffer = parse_document(
            r#"<root><div id="a"><div>inner</div></div><p id="b"/></root>"#,
            Some("file:/t.xml"),
        )
        .expect("parse");
        let marks = buffer.element_marks("id");

        let mut recorder = EventRecorder::default();
        buffer
            .replay_element(marks["a"], &mut recorder)
            .expect("replay");
        let events: Vec<_> = recorder.finish().events().cloned().collect();
        assert_eq!(events.len(), 5);
        assert!(matches!(events.last(), Some(XmlEvent::EndElement { name }) if name.local == "div"));
    }

    #[test]
    fn replay_element_rejects_non_element_marks() {
        let mut buffer = EventBuffer::new(None);
        buffer.push(XmlEvent::StartDocument, None);
        let err = buffer
            .replay_element(Mark(0), &mut EventRecorder::default())
            .expect_err("document start is not an element");
        assert!(matches!(err, XmlError::Protocol { .. }));
    }

    #[test]
    fn recorder_keeps_locations() {
        let locator = SharedLocator::new();
        let mut recorder = EventRecorder::default();
        recorder.set_locator(Rc::new(locator.clone()));
        locator.set(Some(Location::new(Some("file:/in.xml"), 4, 1)));
        recorder
            .start_element(QName::local("a"), Attributes::new())
            .expect("record");

        let buffer = recorder.finish();
        assert_eq!(buffer.system_id(), Some("file:/in.xml"));
    }
}
