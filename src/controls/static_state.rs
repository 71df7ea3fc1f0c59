use std::collections::HashMap;

use crate::xml::{EventBuffer, Mark};

/// What is known about a selection control's items before any request runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemsInfo {
    /// Some item depends on instance data and may change between requests.
    pub has_non_static_item: bool,
}

/// Facts about the form derived once from its static markup.
#[derive(Debug, Clone, Default)]
pub struct StaticState {
    items_info: HashMap<String, ItemsInfo>,
    template: EventBuffer,
    fragment_marks: HashMap<String, Mark>,
}

impl StaticState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items_info(mut self, prefixed_id: impl Into<String>, info: ItemsInfo) -> Self {
        self.items_info.insert(prefixed_id.into(), info);
        self
    }

    /// Uses `template` as the static page and marks the elements whose `id`
    /// is one of `fragment_ids` as replaceable HTML fragments.
    pub fn with_template<I, S>(mut self, template: EventBuffer, fragment_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let marks = template.element_marks("id");
        for id in fragment_ids {
            if let Some(mark) = marks.get(id.as_ref()) {
                self.fragment_marks.insert(id.as_ref().to_string(), *mark);
            }
        }
        self.template = template;
        self
    }

    pub fn items_info(&self, prefixed_id: &str) -> Option<ItemsInfo> {
        self.items_info.get(prefixed_id).copied()
    }

    /// True when the control's items are known never to change.
    pub fn has_static_itemset(&self, prefixed_id: &str) -> bool {
        self.items_info(prefixed_id)
            .is_some_and(|info| !info.has_non_static_item)
    }

    pub fn template(&self) -> &EventBuffer {
        &self.template
    }

    pub fn fragment_mark(&self, prefixed_id: &str) -> Option<Mark> {
        self.fragment_marks.get(prefixed_id).copied()
    }
}
