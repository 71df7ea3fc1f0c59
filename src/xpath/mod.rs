//! Permissive XPath 2.0 parsing.
//!
//! Only the shape of an expression matters here: stylesheet analysis walks the
//! tree looking for document-loading calls. No evaluation is provided.

mod ast;
mod lexer;
mod parser;

use thiserror::Error;

pub use ast::{Expr, NodeTest, PathRoot, Step};
pub use parser::parse;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {position}")]
pub struct XPathError {
    pub message: String,
    pub position: usize,
}

impl XPathError {
    pub(crate) fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}
