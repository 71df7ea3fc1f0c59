//! Control tree differ.
//!
//! Compares the control tree as it was before a client request with the tree
//! after the request's events ran, and produces the update instructions the
//! client needs to bring its page in line.

mod attributes;
mod comparator;
mod fragment;
mod indexes;
mod itemsets;
mod update;

#[cfg(test)]
mod tests;

use thiserror::Error;

use crate::xml::XmlError;

pub use attributes::AttributeBuilder;
pub use comparator::{ControlsComparator, DiffOptions};
pub use fragment::{FragmentRenderer, TemplateFragmentRenderer};
pub use indexes::{RepeatIndexChange, collect_repeat_indexes, diff_repeat_indexes};
pub use itemsets::{ItemsetMaps, diff_itemsets};
pub use update::{
    ReceiverSink, UpdateEvent, UpdateKind, UpdateSink, XXFORMS_NAMESPACE_URI, XXFORMS_PREFIX,
    xxf_name,
};

pub(crate) use comparator::{METRIC_DIFF_EVENTS, METRIC_DIFF_MS};

#[derive(Debug, Error)]
pub enum DiffError {
    /// The snapshots do not line up outside a repeat.
    #[error("illegal state when comparing controls: {message}")]
    IllegalState { message: String },
    #[error("failed to render fragment for `{id}`")]
    Fragment {
        id: String,
        #[source]
        source: XmlError,
    },
    #[error("failed to write update")]
    Output(#[from] XmlError),
}
