use tracing::{error, warn};

use super::ErrorListener;
use crate::xml::Location;

/// Listener that logs every report and keeps what callers need afterwards:
/// a combined message log and the first error seen at each distinct location.
#[derive(Debug, Default)]
pub struct CollectingErrorListener {
    messages: String,
    errors: Vec<(String, Option<Location>)>,
    warnings: usize,
}

impl CollectingErrorListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    /// Every warning and error, one per line.
    pub fn messages(&self) -> &str {
        &self.messages
    }

    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(|(message, _)| message.as_str())
    }

    /// Locations of the recorded errors, in report order.
    pub fn locations(&self) -> Vec<Location> {
        self.errors
            .iter()
            .filter_map(|(_, location)| location.clone())
            .collect()
    }

    fn append(&mut self, kind: &str, message: &str, location: Option<&Location>) {
        if !self.messages.is_empty() {
            self.messages.push('\n');
        }
        self.messages.push_str(kind);
        self.messages.push_str(": ");
        self.messages.push_str(message);
        if let Some(location) = location {
            self.messages.push_str(" (");
            self.messages.push_str(&location.to_string());
            self.messages.push(')');
        }
    }
}

impl ErrorListener for CollectingErrorListener {
    fn warning(&mut self, message: &str, location: Option<&Location>) {
        warn!(location = location.map(tracing::field::display), "{message}");
        self.warnings += 1;
        self.append("Warning", message, location);
    }

    fn error(&mut self, message: &str, location: Option<&Location>) {
        error!(location = location.map(tracing::field::display), "{message}");
        self.append("Error", message, location);
        let seen = location.is_some()
            && self
                .errors
                .iter()
                .any(|(_, known)| known.as_ref() == location);
        if !seen {
            self.errors
                .push((message.to_string(), location.cloned()));
        }
    }
}
