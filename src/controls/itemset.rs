use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One choice of a selection control, possibly with nested choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub label: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Item>,
}

impl Item {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("label".to_string(), Value::String(self.label.clone()));
        object.insert("value".to_string(), Value::String(self.value.clone()));
        if !self.attributes.is_empty() {
            let attributes = self
                .attributes
                .iter()
                .map(|(name, value)| (name.clone(), Value::String(value.clone())))
                .collect();
            object.insert("attributes".to_string(), Value::Object(attributes));
        }
        if !self.children.is_empty() {
            object.insert(
                "children".to_string(),
                Value::Array(self.children.iter().map(Item::to_json).collect()),
            );
        }
        Value::Object(object)
    }
}

/// Ordered tree of items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Itemset {
    pub items: Vec<Item>,
}

impl Itemset {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    /// Client encoding: an array of `{label, value, attributes?, children?}`.
    pub fn to_json(&self) -> Value {
        Value::Array(self.items.iter().map(Item::to_json).collect())
    }

    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_encoding_omits_empty_members() {
        let mut parent = Item::new("Fruit", "fruit");
        parent.attributes.insert("class".into(), "group".into());
        parent.children.push(Item::new("Apple", "apple"));
        let itemset = Itemset::new(vec![parent, Item::new("Other", "")]);

        insta::assert_snapshot!(
            itemset.to_json_string(),
            @r#"[{"attributes":{"class":"group"},"children":[{"label":"Apple","value":"apple"}],"label":"Fruit","value":"fruit"},{"label":"Other","value":""}]"#
        );
    }
}
