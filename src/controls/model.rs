use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::itemset::Itemset;
use crate::xml::escape_html;

/// Model item properties of a bound control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mips {
    pub relevant: bool,
    pub readonly: bool,
    pub required: bool,
    pub valid: bool,
}

impl Default for Mips {
    fn default() -> Self {
        Self {
            relevant: true,
            readonly: false,
            required: false,
            valid: true,
        }
    }
}

/// Label, help, hint or alert text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lhha {
    pub text: String,
    pub escaped: String,
    #[serde(default)]
    pub is_html: bool,
}

impl Lhha {
    pub fn plain(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            escaped: escape_html(&text),
            text,
            is_html: false,
        }
    }

    /// Text that is already markup and must reach the client unescaped.
    pub fn html(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            escaped: text.clone(),
            text,
            is_html: true,
        }
    }
}

/// External value of a value-bearing control.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueState {
    pub value: Option<String>,
    pub display_value: Option<String>,
}

impl ValueState {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            display_value: None,
        }
    }
}

/// Kind-specific state. Each variant carries only what its kind needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlKind {
    Group {
        #[serde(default)]
        internal: bool,
    },
    /// Input, textarea, secret and range controls.
    Input {
        #[serde(default)]
        value: ValueState,
    },
    Output {
        #[serde(default)]
        value: ValueState,
        #[serde(default)]
        mediatype: Option<String>,
        /// Output bound through a `value` attribute rather than a binding.
        #[serde(default)]
        value_attribute: bool,
    },
    Upload {
        #[serde(default)]
        state: Option<String>,
        #[serde(default)]
        mediatype: Option<String>,
        #[serde(default)]
        filename: Option<String>,
        #[serde(default)]
        size: Option<String>,
    },
    Select {
        #[serde(default)]
        value: ValueState,
        #[serde(default)]
        itemset: Option<Itemset>,
        #[serde(default)]
        multiple: bool,
    },
    Trigger,
    Repeat {
        #[serde(default)]
        index: usize,
    },
    RepeatIteration {
        iteration: usize,
    },
    Switch {
        #[serde(default)]
        selected_case: Option<String>,
    },
    Case,
    Dialog {
        #[serde(default)]
        visible: bool,
        #[serde(default)]
        neighbor: Option<String>,
        #[serde(default)]
        constrain_to_viewport: bool,
    },
}

impl ControlKind {
    pub fn name(&self) -> &'static str {
        match self {
            ControlKind::Group { .. } => "group",
            ControlKind::Input { .. } => "input",
            ControlKind::Output { .. } => "output",
            ControlKind::Upload { .. } => "upload",
            ControlKind::Select { .. } => "select",
            ControlKind::Trigger => "trigger",
            ControlKind::Repeat { .. } => "repeat",
            ControlKind::RepeatIteration { .. } => "repeat-iteration",
            ControlKind::Switch { .. } => "switch",
            ControlKind::Case => "case",
            ControlKind::Dialog { .. } => "dialog",
        }
    }
}

/// A node of the control tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub effective_id: String,
    pub prefixed_id: String,
    #[serde(default)]
    pub mips: Mips,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_mips: BTreeMap<String, String>,
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub label: Option<Lhha>,
    #[serde(default)]
    pub help: Option<Lhha>,
    #[serde(default)]
    pub hint: Option<Lhha>,
    #[serde(default)]
    pub alert: Option<Lhha>,
    /// Rendered with the static readonly appearance.
    #[serde(default)]
    pub static_readonly: bool,
    pub kind: ControlKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Control>,
}

impl Control {
    /// Control whose prefixed id is its effective id without repeat suffix.
    pub fn new(effective_id: impl Into<String>, kind: ControlKind) -> Self {
        let effective_id = effective_id.into();
        Self {
            prefixed_id: super::ids::effective_id_no_suffix(&effective_id).to_string(),
            effective_id,
            mips: Mips::default(),
            custom_mips: BTreeMap::new(),
            type_name: None,
            label: None,
            help: None,
            hint: None,
            alert: None,
            static_readonly: false,
            kind,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Control>) -> Self {
        self.children = children;
        self
    }

    pub fn is_relevant(&self) -> bool {
        self.mips.relevant
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self.kind,
            ControlKind::Group { .. }
                | ControlKind::Repeat { .. }
                | ControlKind::RepeatIteration { .. }
                | ControlKind::Switch { .. }
                | ControlKind::Case
                | ControlKind::Dialog { .. }
        )
    }

    /// Whether the client can update this control through a `control` element.
    pub fn supports_ajax_updates(&self) -> bool {
        !matches!(
            self.kind,
            ControlKind::Repeat { .. } | ControlKind::Case | ControlKind::Dialog { .. }
        )
    }

    pub fn value(&self) -> Option<&ValueState> {
        match &self.kind {
            ControlKind::Input { value }
            | ControlKind::Output { value, .. }
            | ControlKind::Select { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn itemset(&self) -> Option<&Itemset> {
        match &self.kind {
            ControlKind::Select { itemset, .. } => itemset.as_ref(),
            _ => None,
        }
    }

    /// Compares everything the client can observe on this node, ignoring children.
    pub fn equals_external(&self, other: Option<&Control>) -> bool {
        let Some(other) = other else {
            return false;
        };
        self.effective_id == other.effective_id
            && self.mips == other.mips
            && self.custom_mips == other.custom_mips
            && self.type_name == other.type_name
            && self.label == other.label
            && self.help == other.help
            && self.hint == other.hint
            && self.alert == other.alert
            && self.static_readonly == other.static_readonly
            && self.kind == other.kind
    }

    /// [`Control::equals_external`] extended to the whole subtree.
    pub fn equals_external_recurse(&self, other: Option<&Control>) -> bool {
        let Some(other) = other else {
            return false;
        };
        self.equals_external(Some(other))
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(&other.children)
                .all(|(mine, theirs)| mine.equals_external_recurse(Some(theirs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(id: &str, value: &str) -> Control {
        Control::new(id, ControlKind::Input {
            value: ValueState::new(value),
        })
    }

    #[test]
    fn external_equality_ignores_children() {
        let a = Control::new("g", ControlKind::Group { internal: false })
            .with_children(vec![input("i", "1")]);
        let b = Control::new("g", ControlKind::Group { internal: false })
            .with_children(vec![input("i", "2")]);
        assert!(a.equals_external(Some(&b)));
        assert!(!a.equals_external_recurse(Some(&b)));
        assert!(!a.equals_external(None));
    }

    #[test]
    fn prefixed_id_drops_repeat_suffix() {
        assert_eq!(input("name\u{b7}2", "").prefixed_id, "name");
    }

    #[test]
    fn deserializes_tagged_kinds_with_defaults() {
        let control: Control = serde_json::from_str(
            r#"{"effective_id":"s","prefixed_id":"s","kind":{"type":"switch","selected_case":"c1"}}"#,
        )
        .expect("control json");
        assert!(control.mips.relevant);
        assert_eq!(
            control.kind,
            ControlKind::Switch {
                selected_case: Some("c1".into())
            }
        );
    }
}
