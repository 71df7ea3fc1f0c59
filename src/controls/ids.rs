//! Effective id helpers.
//!
//! Controls inside repeats get an effective id made of the static id, the
//! first separator and the dash-separated iteration indexes of every
//! enclosing repeat: `name·1-3`.

pub const REPEAT_HIERARCHY_SEPARATOR_1: char = '\u{b7}';
pub const REPEAT_HIERARCHY_SEPARATOR_2: char = '-';

/// Effective id without its repeat suffix.
pub fn effective_id_no_suffix(effective_id: &str) -> &str {
    effective_id
        .split_once(REPEAT_HIERARCHY_SEPARATOR_1)
        .map_or(effective_id, |(prefix, _)| prefix)
}

/// Repeat suffix of an effective id, empty when not inside a repeat.
pub fn effective_id_suffix(effective_id: &str) -> &str {
    effective_id
        .split_once(REPEAT_HIERARCHY_SEPARATOR_1)
        .map_or("", |(_, suffix)| suffix)
}

/// Iteration indexes encoded in the suffix, outermost first.
pub fn parent_indexes(effective_id: &str) -> Vec<usize> {
    effective_id_suffix(effective_id)
        .split(REPEAT_HIERARCHY_SEPARATOR_2)
        .filter_map(|index| index.parse().ok())
        .collect()
}
