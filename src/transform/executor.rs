//! Runs compiled stylesheets.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::str::FromStr;

use serde::Deserialize;
use tracing::{debug, info, info_span, warn};

use super::cache::TemplatesInfo;
use super::engine::{EngineAttributes, TransformOutputs};
use super::listener::CollectingErrorListener;
use super::locator::{ConstantLocator, SmartLocator, SmartReceiver, TappedSource};
use super::{TransformError, best_location, root_cause};
use crate::xml::{EventBuffer, Location, Locator, XmlError, XmlEvent, XmlReceiver, XmlSource};

/// How output events are located.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationMode {
    /// Only the stylesheet's system id, and only when the engine sets nothing.
    #[default]
    None,
    /// The input locator, as it moves through the input.
    Dumb,
    /// The source node the engine is processing, falling back to the input locator.
    Smart,
}

impl FromStr for LocationMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(LocationMode::None),
            "dumb" => Ok(LocationMode::Dumb),
            "smart" => Ok(LocationMode::Smart),
            other => Err(format!("unknown location mode `{other}`")),
        }
    }
}

/// What a run produced besides the primary output.
#[derive(Debug, Default)]
pub struct ExecutionResult {
    /// Requested named outputs, buffered until the primary output is done.
    pub named: BTreeMap<String, EventBuffer>,
    /// Text of the messages the stylesheet emitted.
    pub messages: String,
    /// Locations of errors the engine reported without failing.
    pub error_locations: Vec<Location>,
}

impl ExecutionResult {
    /// Streams a buffered named output.
    pub fn read_named(&self, name: &str, receiver: &mut dyn XmlReceiver) -> Result<(), TransformError> {
        let buffer = self.named.get(name).ok_or_else(|| TransformError::Execution {
            message: format!("output `{name}` was not requested"),
            location: None,
            cause: None,
        })?;
        buffer.replay(receiver)?;
        Ok(())
    }
}

pub struct TransformExecutor<'a> {
    templates: &'a TemplatesInfo,
    attributes: &'a EngineAttributes,
    location_mode: LocationMode,
    requested: Vec<String>,
}

impl<'a> TransformExecutor<'a> {
    pub fn new(templates: &'a TemplatesInfo, attributes: &'a EngineAttributes) -> Self {
        Self {
            templates,
            attributes,
            location_mode: LocationMode::None,
            requested: Vec::new(),
        }
    }

    pub fn with_location_mode(mut self, mode: LocationMode) -> Self {
        self.location_mode = mode;
        self
    }

    /// Asks for a named output to be kept for [`ExecutionResult::read_named`].
    pub fn request_output(mut self, name: impl Into<String>) -> Self {
        self.requested.push(name.into());
        self
    }

    /// Runs the transform over `input`, streaming the primary output to `output`.
    pub fn read_primary(
        &self,
        input: &dyn XmlSource,
        output: &mut dyn XmlReceiver,
    ) -> Result<ExecutionResult, TransformError> {
        let span = info_span!(
            "run_transform",
            engine = %self.templates.engine,
            mode = ?self.location_mode
        );
        let _guard = span.enter();

        let mut transformer = self.templates.compiled.new_transformer(self.attributes);
        let messages = Rc::new(RefCell::new(String::new()));
        let has_message_channel = transformer.set_message_buffer(Rc::clone(&messages));
        let mut listener = CollectingErrorListener::new();

        let (input, input_locator) = TappedSource::new(input);
        let mode = match (self.location_mode, transformer.context_stack()) {
            (LocationMode::Smart, Some(stack)) => Some(Rc::new(SmartLocator::new(
                stack,
                Rc::new(input_locator.clone()),
            ))),
            (LocationMode::Smart, None) => {
                debug!("Engine exposes no context stack, locating by input");
                None
            }
            _ => None,
        };
        let fixed_locator: Option<Rc<dyn Locator>> = match (self.location_mode, &mode) {
            (LocationMode::None, _) => None,
            (_, Some(smart)) => Some(Rc::clone(smart) as Rc<dyn Locator>),
            (_, None) => Some(Rc::new(input_locator)),
        };

        let mut guard = DocumentGuard::new(output, self.templates.system_id.as_deref());
        if let Some(locator) = fixed_locator {
            guard.fix_locator(locator);
        }
        let result = match mode {
            Some(smart) => {
                let mut receiver = SmartReceiver::new(&mut guard, smart);
                self.run(transformer.as_mut(), &input, &mut receiver, &mut listener)
            }
            None => self.run(transformer.as_mut(), &input, &mut guard, &mut listener),
        };

        let messages = if has_message_channel {
            messages.borrow().trim_end().to_string()
        } else {
            String::new()
        };
        if !messages.is_empty() {
            info!(messages = %messages, "Transform messages");
        }

        match result {
            Ok(named) => {
                let error_locations = listener.locations();
                if !error_locations.is_empty() {
                    warn!(errors = error_locations.len(), "Transform reported errors");
                }
                Ok(ExecutionResult {
                    named,
                    messages,
                    error_locations,
                })
            }
            Err(err) => Err(self.execution_error(err, messages)),
        }
    }

    fn run(
        &self,
        transformer: &mut dyn super::Transformer,
        input: &dyn XmlSource,
        primary: &mut dyn XmlReceiver,
        listener: &mut CollectingErrorListener,
    ) -> Result<BTreeMap<String, EventBuffer>, TransformError> {
        let mut outputs = TransformOutputs::new(primary);
        for name in &self.requested {
            outputs.request(name);
        }
        transformer.transform(input, &mut outputs, listener)?;
        Ok(outputs.into_named())
    }

    fn execution_error(&self, err: TransformError, messages: String) -> TransformError {
        if let TransformError::Terminated { message, location } = root_cause(&err) {
            let message = if messages.is_empty() {
                message.clone()
            } else {
                messages
            };
            return TransformError::Terminated {
                message,
                location: location.clone(),
            };
        }
        let location = best_location(&err).cloned().or_else(|| {
            self.templates
                .system_id
                .as_deref()
                .map(Location::document)
        });
        TransformError::Execution {
            message: root_cause(&err).to_string(),
            location,
            cause: Some(Box::new(err)),
        }
    }
}

/// Shields the caller from engine quirks on the primary output: a second
/// end of document, and `xmlns` declared as a prefix.
struct DocumentGuard<'r> {
    inner: &'r mut dyn XmlReceiver,
    system_id: Option<String>,
    fixed_locator: bool,
    has_locator: bool,
    ended: bool,
}

impl<'r> DocumentGuard<'r> {
    fn new(inner: &'r mut dyn XmlReceiver, system_id: Option<&str>) -> Self {
        Self {
            inner,
            system_id: system_id.map(str::to_string),
            fixed_locator: false,
            has_locator: false,
            ended: false,
        }
    }

    /// Installs `locator` and ignores any the engine sets later.
    fn fix_locator(&mut self, locator: Rc<dyn Locator>) {
        self.inner.set_locator(locator);
        self.fixed_locator = true;
        self.has_locator = true;
    }
}

impl XmlReceiver for DocumentGuard<'_> {
    fn set_locator(&mut self, locator: Rc<dyn Locator>) {
        if !self.fixed_locator {
            self.has_locator = true;
            self.inner.set_locator(locator);
        }
    }

    fn receive(&mut self, event: XmlEvent) -> Result<(), XmlError> {
        match &event {
            XmlEvent::StartDocument => {
                if !self.has_locator {
                    if let Some(system_id) = &self.system_id {
                        self.inner
                            .set_locator(Rc::new(ConstantLocator(Location::document(system_id))));
                        self.has_locator = true;
                    }
                }
            }
            XmlEvent::EndDocument => {
                if self.ended {
                    warn!("Engine ended the output document twice, ignoring");
                    return Ok(());
                }
                self.ended = true;
            }
            XmlEvent::StartPrefixMapping { prefix, .. } | XmlEvent::EndPrefixMapping { prefix }
                if prefix == "xmlns" =>
            {
                return Ok(());
            }
            _ => {}
        }
        self.inner.receive(event)
    }
}
