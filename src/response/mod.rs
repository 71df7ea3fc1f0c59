//! Ajax response assembly.
//!
//! Wraps differ output in the `xxf:event-response` document the client
//! applies after each request.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::controls::{Control, StaticState};
use crate::diff::{
    ControlsComparator, DiffError, DiffOptions, ItemsetMaps, ReceiverSink, XXFORMS_NAMESPACE_URI,
    XXFORMS_PREFIX, collect_repeat_indexes, diff_repeat_indexes, xxf_name,
};
use crate::xml::{Attributes, XmlEvent, XmlReceiver, XmlWriter};

/// Counts of what a written response contained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseSummary {
    pub control_updates: u64,
    pub repeat_indexes: usize,
    pub itemsets: usize,
}

/// One response: the snapshots before and after a request plus what the
/// request touched.
pub struct AjaxResponse<'a> {
    static_state: &'a StaticState,
    options: DiffOptions,
    previous: Option<&'a [Control]>,
    current: &'a [Control],
    value_changes: Option<&'a HashSet<String>>,
    dirty: bool,
}

impl<'a> AjaxResponse<'a> {
    /// A response for a dirty document. `previous` is `None` for a page the
    /// client has not seen yet.
    pub fn new(
        static_state: &'a StaticState,
        options: DiffOptions,
        previous: Option<&'a [Control]>,
        current: &'a [Control],
    ) -> Self {
        Self {
            static_state,
            options,
            previous,
            current,
            value_changes: None,
            dirty: true,
        }
    }

    /// Whether the document changed since the last request.
    pub fn dirty(mut self, dirty: bool) -> Self {
        self.dirty = dirty;
        self
    }

    pub fn with_value_changes(mut self, ids: &'a HashSet<String>) -> Self {
        self.value_changes = Some(ids);
        self
    }

    fn compute_diffs(&self) -> bool {
        self.dirty || self.options.test_mode
    }

    /// Streams the whole response document to `receiver`.
    pub fn write(&self, receiver: &mut dyn XmlReceiver) -> Result<ResponseSummary, DiffError> {
        let mut summary = ResponseSummary::default();
        let mut itemsets = ItemsetMaps::new();

        receiver.receive(XmlEvent::StartDocument)?;
        receiver.receive(XmlEvent::StartPrefixMapping {
            prefix: XXFORMS_PREFIX.to_string(),
            uri: XXFORMS_NAMESPACE_URI.to_string(),
        })?;
        receiver.start_element(xxf_name("event-response"), Attributes::new())?;
        receiver.start_element(xxf_name("action"), Attributes::new())?;

        receiver.start_element(xxf_name("control-values"), Attributes::new())?;
        if self.compute_diffs() {
            let mut sink = ReceiverSink::new(&mut *receiver);
            let mut comparator =
                ControlsComparator::new(&mut sink, self.static_state, self.options)
                    .with_itemsets(&mut itemsets);
            if let Some(ids) = self.value_changes {
                comparator = comparator.with_value_changes(ids);
            }
            comparator.diff_trees(self.previous, self.current)?;
            drop(comparator);
            summary.control_updates = sink.emitted();
        } else {
            debug!("Document not dirty, skipping control diff");
        }
        receiver.end_element(xxf_name("control-values"))?;

        if self.compute_diffs() {
            summary.repeat_indexes = self.write_repeat_indexes(receiver)?;
        }
        summary.itemsets = write_itemsets(receiver, &itemsets)?;

        receiver.end_element(xxf_name("action"))?;
        receiver.end_element(xxf_name("event-response"))?;
        receiver.receive(XmlEvent::EndPrefixMapping {
            prefix: XXFORMS_PREFIX.to_string(),
        })?;
        receiver.receive(XmlEvent::EndDocument)?;
        Ok(summary)
    }

    fn write_repeat_indexes(&self, receiver: &mut dyn XmlReceiver) -> Result<usize, DiffError> {
        let previous = match self.previous {
            Some(previous) if !self.options.test_mode => collect_repeat_indexes(previous),
            _ => BTreeMap::new(),
        };
        let changes = diff_repeat_indexes(&previous, &collect_repeat_indexes(self.current));
        if changes.is_empty() {
            return Ok(0);
        }

        receiver.start_element(xxf_name("repeat-indexes"), Attributes::new())?;
        for change in &changes {
            let attributes = Attributes::new()
                .with("id", change.id.as_str())
                .with("old-index", change.old_index.to_string())
                .with("new-index", change.new_index.to_string());
            receiver.text_element(xxf_name("repeat-index"), attributes, None)?;
        }
        receiver.end_element(xxf_name("repeat-indexes"))?;
        Ok(changes.len())
    }

    /// Convenience: the response serialized as XML text.
    pub fn to_xml_string(&self) -> Result<String, DiffError> {
        let mut writer = XmlWriter::new();
        self.write(&mut writer)?;
        Ok(writer.finish())
    }
}

fn write_itemsets(receiver: &mut dyn XmlReceiver, itemsets: &ItemsetMaps) -> Result<usize, DiffError> {
    let changed = itemsets.changed();
    if changed.is_empty() {
        return Ok(0);
    }

    receiver.start_element(xxf_name("itemsets"), Attributes::new())?;
    for (id, itemset) in &changed {
        receiver.text_element(
            xxf_name("itemset"),
            Attributes::new().with("id", id.as_str()),
            Some(&itemset.to_json_string()),
        )?;
    }
    receiver.end_element(xxf_name("itemsets"))?;
    Ok(changed.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::{ControlKind, Item, Itemset, ValueState};

    fn input(id: &str, value: &str) -> Control {
        Control::new(id, ControlKind::Input {
            value: ValueState::new(value),
        })
    }

    fn select(values: &[&str]) -> Control {
        Control::new("fruit", ControlKind::Select {
            value: ValueState::new(""),
            itemset: Some(Itemset::new(values.iter().map(|v| Item::new(*v, *v)).collect())),
            multiple: false,
        })
    }

    #[test]
    fn clean_document_writes_empty_action() {
        let tree = vec![input("a", "1")];
        let state = StaticState::new();
        let response = AjaxResponse::new(&state, DiffOptions::default(), Some(&tree[..]), &tree)
            .dirty(false);

        insta::assert_snapshot!(
            response.to_xml_string().expect("response"),
            @r#"<xxf:event-response xmlns:xxf="http://orbeon.org/oxf/xml/xforms"><xxf:action><xxf:control-values/></xxf:action></xxf:event-response>"#
        );
    }

    #[test]
    fn clean_document_skips_repeat_index_changes() {
        let previous = vec![Control::new("r", ControlKind::Repeat { index: 1 })];
        let current = vec![Control::new("r", ControlKind::Repeat { index: 2 })];
        let state = StaticState::new();
        let mut writer = XmlWriter::new();
        let summary =
            AjaxResponse::new(&state, DiffOptions::default(), Some(&previous[..]), &current)
                .dirty(false)
                .write(&mut writer)
                .expect("response");

        assert_eq!(summary, ResponseSummary::default());
        assert!(!writer.finish().contains("repeat-indexes"));
    }

    #[test]
    fn writes_values_indexes_and_itemsets() {
        let previous = vec![
            input("a", "1"),
            select(&["apple"]),
            Control::new("r", ControlKind::Repeat { index: 1 }),
        ];
        let current = vec![
            input("a", "2 < 3"),
            select(&["apple", "pear"]),
            Control::new("r", ControlKind::Repeat { index: 0 }),
        ];
        let state = StaticState::new();
        let response =
            AjaxResponse::new(&state, DiffOptions::default(), Some(&previous[..]), &current);

        let mut writer = XmlWriter::new();
        let summary = response.write(&mut writer).expect("response");
        assert_eq!(
            summary,
            ResponseSummary {
                control_updates: 2,
                repeat_indexes: 1,
                itemsets: 1,
            }
        );
        insta::assert_snapshot!(
            writer.finish(),
            @r#"<xxf:event-response xmlns:xxf="http://orbeon.org/oxf/xml/xforms"><xxf:action><xxf:control-values><xxf:control id="a">2 &lt; 3</xxf:control><xxf:control id="fruit"/></xxf:control-values><xxf:repeat-indexes><xxf:repeat-index id="r" old-index="1" new-index="0"/></xxf:repeat-indexes><xxf:itemsets><xxf:itemset id="fruit">[{"label":"apple","value":"apple"},{"label":"pear","value":"pear"}]</xxf:itemset></xxf:itemsets></xxf:action></xxf:event-response>"#
        );
    }

    #[test]
    fn test_mode_describes_everything_even_when_clean() {
        let tree = vec![input("a", "1")];
        let state = StaticState::new();
        let options = DiffOptions {
            test_mode: true,
            ..Default::default()
        };
        let mut writer = XmlWriter::new();
        let summary = AjaxResponse::new(&state, options, Some(&tree[..]), &tree)
            .dirty(false)
            .write(&mut writer)
            .expect("response");
        assert_eq!(summary.control_updates, 1);
    }
}
