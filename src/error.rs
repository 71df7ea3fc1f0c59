use thiserror::Error;

use crate::config::LoadError;
use crate::diff::DiffError;
use crate::infra::error::InfraError;
use crate::transform::TransformError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Diff(#[from] DiffError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("validation failed: {0}")]
    Validation(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Messages of this error and every error below it, outermost first.
    pub fn messages(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut current = std::error::Error::source(self);
        while let Some(inner) = current {
            let message = inner.to_string();
            if messages.last() != Some(&message) {
                messages.push(message);
            }
            current = inner.source();
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{Location, XmlError};

    #[test]
    fn messages_walk_the_source_chain() {
        let err = AppError::from(TransformError::Execution {
            message: "boom".to_string(),
            location: Some(Location::document("file:/a.xsl")),
            cause: Some(Box::new(TransformError::Xml(XmlError::Protocol {
                message: "unbalanced".to_string(),
            }))),
        });
        let messages = err.messages();
        assert!(messages.len() >= 2);
        assert!(messages.iter().any(|m| m.contains("unbalanced")));
    }
}
