/// Attribute set for one update, built fresh for every compared control.
///
/// `is_new` selects the tri-state rule: for a node without a previous
/// counterpart an attribute is only worth sending when it differs from the
/// default a freshly created client-side node already has.
#[derive(Debug, Default)]
pub struct AttributeBuilder {
    attributes: Vec<(String, String)>,
    is_new: bool,
}

impl AttributeBuilder {
    pub fn new(is_new: bool) -> Self {
        Self {
            attributes: Vec::new(),
            is_new,
        }
    }

    /// Adds unconditionally. Does not count as a change.
    pub fn push(&mut self, name: &str, value: impl Into<String>) {
        self.attributes.push((name.to_string(), value.into()));
    }

    /// Adds unless the node is new and `value` is the implicit default.
    pub fn add_if_needed(&mut self, name: &str, value: &str, is_default: bool) -> bool {
        if self.is_new && is_default {
            return false;
        }
        self.push(name, value);
        true
    }

    /// Boolean property: compared with `previous`, or with `default` for a new node.
    pub fn diff_flag(&mut self, name: &str, previous: Option<bool>, current: bool, default: bool) -> bool {
        let changed = match previous {
            Some(previous) => previous != current,
            None => current != default,
        };
        if changed {
            self.push(name, current.to_string());
        }
        changed
    }

    /// Text property whose default is the empty string. `wire` is what the
    /// client receives when it differs from the compared text.
    pub fn diff_text(
        &mut self,
        name: &str,
        previous: Option<&str>,
        current: Option<&str>,
        wire: Option<&str>,
    ) -> bool {
        if previous == current {
            return false;
        }
        let value = wire.or(current).unwrap_or_default();
        self.add_if_needed(name, value, value.is_empty())
    }

    pub fn into_attributes(self) -> Vec<(String, String)> {
        self.attributes
    }
}
