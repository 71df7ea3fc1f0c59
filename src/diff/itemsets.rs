use std::collections::BTreeMap;

use crate::controls::Itemset;

/// Itemsets registered while diffing, keyed by effective id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemsetMaps {
    pub previous: BTreeMap<String, Itemset>,
    pub current: BTreeMap<String, Itemset>,
}

impl ItemsetMaps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Itemsets the client must receive; see [`diff_itemsets`].
    pub fn changed(&self) -> BTreeMap<String, Itemset> {
        diff_itemsets(Some(&self.previous), Some(&self.current))
    }
}

/// Current-side itemsets that are new or differ from the previous side.
pub fn diff_itemsets(
    previous: Option<&BTreeMap<String, Itemset>>,
    current: Option<&BTreeMap<String, Itemset>>,
) -> BTreeMap<String, Itemset> {
    let Some(current) = current else {
        return BTreeMap::new();
    };
    current
        .iter()
        .filter(|(id, itemset)| previous.and_then(|p| p.get(*id)) != Some(*itemset))
        .map(|(id, itemset)| (id.clone(), itemset.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::Item;

    fn itemset(values: &[&str]) -> Itemset {
        Itemset::new(values.iter().map(|v| Item::new(*v, *v)).collect())
    }

    #[test]
    fn keeps_only_new_or_changed_entries() {
        let previous = BTreeMap::from([
            ("same".to_string(), itemset(&["a"])),
            ("changed".to_string(), itemset(&["a"])),
        ]);
        let current = BTreeMap::from([
            ("same".to_string(), itemset(&["a"])),
            ("changed".to_string(), itemset(&["a", "b"])),
            ("added".to_string(), itemset(&["c"])),
        ]);

        let diff = diff_itemsets(Some(&previous), Some(&current));
        assert_eq!(diff.keys().collect::<Vec<_>>(), vec!["added", "changed"]);
        assert_eq!(diff_itemsets(None, Some(&current)).len(), 3);
        assert!(diff_itemsets(Some(&previous), None).is_empty());
    }
}
