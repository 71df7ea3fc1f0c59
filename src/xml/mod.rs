//! Streamed XML events.
//!
//! Everything that moves documents around (stylesheet compilation, transform
//! input and output, Ajax responses) speaks the event model defined here.

mod buffer;
mod event;
mod parse;
mod receiver;
mod writer;

use thiserror::Error;

pub use buffer::{EventBuffer, EventRecorder, Mark};
pub use event::{
    Attribute, Attributes, Location, Locator, NodeKind, QName, SharedLocator, XmlEvent,
};
pub use parse::parse_document;
pub use receiver::{NullReceiver, TeeReceiver, XmlReceiver, XmlSource};
pub use writer::{XmlWriter, escape_html};

#[derive(Debug, Clone, Error)]
pub enum XmlError {
    #[error("failed to parse `{system_id}`: {message}")]
    Parse {
        system_id: String,
        message: String,
        location: Option<Location>,
    },
    #[error("malformed event stream: {message}")]
    Protocol { message: String },
    /// A receiver stopped the stream; the receiver holds the detailed error.
    #[error("event stream interrupted: {message}")]
    Interrupted { message: String },
}

impl XmlError {
    pub fn location(&self) -> Option<&Location> {
        match self {
            XmlError::Parse { location, .. } => location.as_ref(),
            _ => None,
        }
    }
}
