use std::collections::BTreeMap;

use crate::controls::{Control, ControlKind};

/// A repeat whose current index moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatIndexChange {
    pub id: String,
    /// Zero when the repeat did not exist before.
    pub old_index: usize,
    pub new_index: usize,
}

/// Current index of every repeat in the tree, by effective id.
pub fn collect_repeat_indexes(controls: &[Control]) -> BTreeMap<String, usize> {
    fn walk(controls: &[Control], out: &mut BTreeMap<String, usize>) {
        for control in controls {
            if let ControlKind::Repeat { index } = control.kind {
                out.insert(control.effective_id.clone(), index);
            }
            walk(&control.children, out);
        }
    }

    let mut out = BTreeMap::new();
    walk(controls, &mut out);
    out
}

pub fn diff_repeat_indexes(
    previous: &BTreeMap<String, usize>,
    current: &BTreeMap<String, usize>,
) -> Vec<RepeatIndexChange> {
    current
        .iter()
        .filter_map(|(id, &new_index)| {
            let old_index = previous.get(id).copied().unwrap_or(0);
            (old_index != new_index).then(|| RepeatIndexChange {
                id: id.clone(),
                old_index,
                new_index,
            })
        })
        .collect()
}
