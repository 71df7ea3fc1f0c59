//! Server-side pieces of an XForms processor: Ajax response diffing of
//! control trees, and compiled stylesheet caching keyed on what each
//! stylesheet transitively reads.

pub mod cache;
pub mod config;
pub mod controls;
pub mod diff;
pub mod error;
pub mod infra;
pub mod response;
pub mod transform;
pub mod xml;
pub mod xpath;
