//! Position-aligned control tree comparison.
//!
//! Both snapshots have the same shape except below repeats, whose iteration
//! count may grow or shrink. Everything else is compared pairwise in tree
//! order and differences are pushed to the sink as they are found.

use std::collections::HashSet;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, info_span};

use super::DiffError;
use super::attributes::AttributeBuilder;
use super::fragment::{FragmentRenderer, TemplateFragmentRenderer};
use super::itemsets::ItemsetMaps;
use super::update::{UpdateEvent, UpdateKind, UpdateSink};
use crate::controls::ids::{effective_id_no_suffix, effective_id_suffix};
use crate::controls::{Control, ControlKind, Lhha, StaticState};

pub(crate) const METRIC_DIFF_EVENTS: &str = "xforms_diff_events_total";
pub(crate) const METRIC_DIFF_MS: &str = "xforms_diff_ms";

static TEMPLATE_RENDERER: TemplateFragmentRenderer = TemplateFragmentRenderer;

/// Behavior switches of a comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffOptions {
    /// Readonly controls use the static appearance.
    pub static_readonly_appearance: bool,
    /// Ignore the previous snapshot and describe every control as new.
    pub test_mode: bool,
    /// Replace changed static-fragment subtrees with rendered markup.
    pub inner_html_updates: bool,
}

impl From<&crate::config::AjaxSettings> for DiffOptions {
    fn from(settings: &crate::config::AjaxSettings) -> Self {
        Self {
            static_readonly_appearance: settings.static_readonly_appearance,
            test_mode: settings.test_mode,
            inner_html_updates: settings.inner_html_updates,
        }
    }
}

pub struct ControlsComparator<'a> {
    sink: &'a mut dyn UpdateSink,
    static_state: &'a StaticState,
    options: DiffOptions,
    value_changed: Option<&'a HashSet<String>>,
    itemsets: Option<&'a mut ItemsetMaps>,
    renderer: &'a dyn FragmentRenderer,
}

impl<'a> ControlsComparator<'a> {
    pub fn new(sink: &'a mut dyn UpdateSink, static_state: &'a StaticState, options: DiffOptions) -> Self {
        Self {
            sink,
            static_state,
            options,
            value_changed: None,
            itemsets: None,
            renderer: &TEMPLATE_RENDERER,
        }
    }

    /// Ids whose value changed in this request; they are sent even when unchanged.
    pub fn with_value_changes(mut self, ids: &'a HashSet<String>) -> Self {
        self.value_changed = Some(ids);
        self
    }

    pub fn with_itemsets(mut self, itemsets: &'a mut ItemsetMaps) -> Self {
        self.itemsets = Some(itemsets);
        self
    }

    pub fn with_fragment_renderer(mut self, renderer: &'a dyn FragmentRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    /// Compares two top-level control lists.
    pub fn diff_trees(
        &mut self,
        previous: Option<&[Control]>,
        current: &[Control],
    ) -> Result<(), DiffError> {
        let span = info_span!("diff_controls", test_mode = self.options.test_mode);
        let _guard = span.enter();
        let started_at = Instant::now();

        let previous = if self.options.test_mode { None } else { previous };
        let result = self.diff(previous, Some(current));

        histogram!(METRIC_DIFF_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        result
    }

    /// Compares two sibling lists. An empty list counts as absent.
    pub fn diff(
        &mut self,
        previous: Option<&[Control]>,
        current: Option<&[Control]>,
    ) -> Result<(), DiffError> {
        let previous = previous.filter(|list| !list.is_empty());
        let current = current.filter(|list| !list.is_empty());

        let current = match (previous, current) {
            (None, None) => return Ok(()),
            (Some(previous), None) => {
                return Err(DiffError::IllegalState {
                    message: format!(
                        "{} previous controls but no current controls",
                        previous.len()
                    ),
                });
            }
            (Some(previous), Some(current)) if previous.len() != current.len() => {
                return Err(DiffError::IllegalState {
                    message: format!(
                        "sibling count changed from {} to {} outside a repeat",
                        previous.len(),
                        current.len()
                    ),
                });
            }
            (_, Some(current)) => current,
        };

        for (index, cur) in current.iter().enumerate() {
            let prev = previous.map(|list| &list[index]);
            if let Some(prev) = prev {
                if std::mem::discriminant(&prev.kind) != std::mem::discriminant(&cur.kind) {
                    return Err(DiffError::IllegalState {
                        message: format!(
                            "control `{}` changed kind from {} to {}",
                            cur.effective_id,
                            prev.kind.name(),
                            cur.kind.name()
                        ),
                    });
                }
            }

            if self.replace_fragment(prev, cur)? {
                continue;
            }

            self.diff_control(prev, cur)?;
            self.register_itemsets(prev, cur);
            match &cur.kind {
                ControlKind::Switch { .. } => self.diff_switch(prev, cur)?,
                ControlKind::Dialog { .. } => self.diff_dialog(prev, cur)?,
                _ => {}
            }

            if cur.is_container() {
                self.diff_children(prev, cur)?;
            }
        }
        Ok(())
    }

    fn emit(&mut self, event: UpdateEvent) -> Result<(), DiffError> {
        counter!(METRIC_DIFF_EVENTS, "kind" => event.kind.element_name()).increment(1);
        self.sink.emit(event)
    }

    fn is_forced(&self, control: &Control) -> bool {
        self.value_changed
            .is_some_and(|ids| ids.contains(&control.effective_id))
    }

    /// Emits the `control` or `repeat-iteration` update for one node.
    fn diff_control(&mut self, prev: Option<&Control>, cur: &Control) -> Result<(), DiffError> {
        if !cur.supports_ajax_updates() {
            return Ok(());
        }
        if cur.equals_external(prev) && !self.is_forced(cur) {
            return Ok(());
        }
        if self.options.static_readonly_appearance
            && cur.mips.readonly
            && matches!(cur.kind, ControlKind::Trigger)
        {
            return Ok(());
        }
        if matches!(cur.kind, ControlKind::Group { internal: true }) {
            return Ok(());
        }

        let is_new = prev.is_none();
        let mut builder = AttributeBuilder::new(is_new);
        builder.push("id", cur.effective_id.clone());

        if let ControlKind::RepeatIteration { iteration } = cur.kind {
            let changed = builder.diff_flag(
                "relevant",
                prev.map(|p| p.mips.relevant),
                cur.mips.relevant,
                true,
            );
            if changed {
                builder.push("iteration", iteration.to_string());
                self.emit(UpdateEvent::new(
                    UpdateKind::RepeatIteration,
                    builder.into_attributes(),
                ))?;
            }
            return Ok(());
        }

        let mips = prev.map(|p| &p.mips);
        let mut changed = false;
        changed |= builder.diff_flag("readonly", mips.map(|m| m.readonly), cur.mips.readonly, false);
        changed |= builder.diff_flag("required", mips.map(|m| m.required), cur.mips.required, false);
        changed |= builder.diff_flag("relevant", mips.map(|m| m.relevant), cur.mips.relevant, true);
        changed |= builder.diff_flag("valid", mips.map(|m| m.valid), cur.mips.valid, true);

        if is_new && cur.static_readonly && cur.mips.relevant {
            builder.push("static", "true");
        }

        let output_with_value_attribute = matches!(
            cur.kind,
            ControlKind::Output {
                value_attribute: true,
                ..
            }
        );
        if !output_with_value_attribute {
            changed |= builder.diff_text(
                "type",
                prev.and_then(|p| p.type_name.as_deref()),
                cur.type_name.as_deref(),
                None,
            );
        }

        changed |= diff_lhha(&mut builder, "label", prev.and_then(|p| p.label.as_ref()), cur.label.as_ref(), true);
        changed |= diff_lhha(&mut builder, "help", prev.and_then(|p| p.help.as_ref()), cur.help.as_ref(), true);
        changed |= diff_lhha(&mut builder, "hint", prev.and_then(|p| p.hint.as_ref()), cur.hint.as_ref(), false);
        changed |= diff_lhha(&mut builder, "alert", prev.and_then(|p| p.alert.as_ref()), cur.alert.as_ref(), true);

        let previous_classes = prev.map(|p| classes(&p.custom_mips)).unwrap_or_default();
        let current_classes = classes(&cur.custom_mips);
        if previous_classes != current_classes {
            changed |= builder.add_if_needed("class", &current_classes, current_classes.is_empty());
        }

        match (&cur.kind, prev.map(|p| &p.kind)) {
            (ControlKind::Output { mediatype, .. }, previous) => {
                let previous = match previous {
                    Some(ControlKind::Output { mediatype, .. }) => mediatype.as_deref(),
                    _ => None,
                };
                changed |= builder.diff_text("mediatype", previous, mediatype.as_deref(), None);
            }
            (
                ControlKind::Upload {
                    state,
                    mediatype,
                    filename,
                    size,
                },
                previous,
            ) => {
                let (p_state, p_mediatype, p_filename, p_size) = match previous {
                    Some(ControlKind::Upload {
                        state,
                        mediatype,
                        filename,
                        size,
                    }) => (
                        state.as_deref(),
                        mediatype.as_deref(),
                        filename.as_deref(),
                        size.as_deref(),
                    ),
                    _ => (None, None, None, None),
                };
                changed |= builder.diff_text("state", p_state, state.as_deref(), None);
                changed |= builder.diff_text("mediatype", p_mediatype, mediatype.as_deref(), None);
                changed |= builder.diff_text("filename", p_filename, filename.as_deref(), None);
                changed |= builder.diff_text("size", p_size, size.as_deref(), None);
            }
            _ => {}
        }

        let event = match cur.value() {
            Some(value) => {
                if !output_with_value_attribute {
                    if let Some(display) = value.display_value.as_deref() {
                        changed |= builder.add_if_needed("display-value", display, display.is_empty());
                    }
                }
                let text = value.value.clone().unwrap_or_default();
                (changed || !is_new || !text.is_empty()).then(|| {
                    UpdateEvent::new(UpdateKind::Control, builder.into_attributes()).with_text(text)
                })
            }
            None => changed.then(|| UpdateEvent::new(UpdateKind::Control, builder.into_attributes())),
        };

        match event {
            Some(event) => self.emit(event),
            None => Ok(()),
        }
    }

    fn register_itemsets(&mut self, prev: Option<&Control>, cur: &Control) {
        let Some(maps) = self.itemsets.as_deref_mut() else {
            return;
        };
        if !matches!(cur.kind, ControlKind::Select { .. }) {
            return;
        }
        if self.static_state.has_static_itemset(&cur.prefixed_id) || cur.static_readonly {
            return;
        }

        if let Some(prev) = prev.filter(|p| p.is_relevant()) {
            if let Some(itemset) = prev.itemset() {
                maps.previous.insert(prev.effective_id.clone(), itemset.clone());
            }
        }
        if cur.is_relevant() {
            if let Some(itemset) = cur.itemset() {
                maps.current.insert(cur.effective_id.clone(), itemset.clone());
            }
        }
    }

    fn diff_switch(&mut self, prev: Option<&Control>, cur: &Control) -> Result<(), DiffError> {
        let ControlKind::Switch {
            selected_case: Some(selected),
        } = &cur.kind
        else {
            return Ok(());
        };
        let previous_selected = match prev.map(|p| &p.kind) {
            Some(ControlKind::Switch { selected_case }) => selected_case.as_deref(),
            _ => None,
        };
        if previous_selected == Some(selected.as_str()) {
            return Ok(());
        }

        self.emit(visibility(selected, true))?;
        match previous_selected {
            Some(deselected) => self.emit(visibility(deselected, false))?,
            None => {
                for case in cur.children.iter().filter(|c| c.effective_id != *selected) {
                    self.emit(visibility(&case.effective_id, false))?;
                }
            }
        }
        Ok(())
    }

    fn diff_dialog(&mut self, prev: Option<&Control>, cur: &Control) -> Result<(), DiffError> {
        let ControlKind::Dialog {
            visible,
            neighbor,
            constrain_to_viewport,
        } = &cur.kind
        else {
            return Ok(());
        };
        let previous_visible = match prev.map(|p| &p.kind) {
            Some(ControlKind::Dialog { visible, .. }) => *visible,
            _ => false,
        };
        if prev.is_some() && previous_visible == *visible {
            return Ok(());
        }

        let mut event = visibility(&cur.effective_id, *visible);
        if *visible {
            if let Some(neighbor) = neighbor {
                event.attributes.push(("neighbor".to_string(), neighbor.clone()));
            }
            event
                .attributes
                .push(("constrain".to_string(), constrain_to_viewport.to_string()));
        }
        self.emit(event)
    }

    fn diff_children(&mut self, prev: Option<&Control>, cur: &Control) -> Result<(), DiffError> {
        let current = cur.children.as_slice();
        if !matches!(cur.kind, ControlKind::Repeat { .. }) {
            return self.diff(prev.map(|p| p.children.as_slice()), Some(current));
        }

        let size2 = current.len();
        let Some(prev) = prev else {
            // The client already owns the first iteration of a newly shown repeat.
            match size2 {
                0 => self.delete_repeat_elements(cur, 1)?,
                1 => {}
                _ => self.copy_repeat_template(cur, 2, size2)?,
            }
            return self.diff(None, Some(current));
        };

        let previous = prev.children.as_slice();
        let size1 = previous.len();
        if size2 > size1 {
            self.copy_repeat_template(cur, size1 + 1, size2)?;
            self.diff(Some(previous), Some(&current[..size1]))?;
            self.diff(None, Some(&current[size1..]))
        } else if size2 < size1 {
            self.delete_repeat_elements(cur, size1 - size2)?;
            self.diff(Some(&previous[..size2]), Some(current))
        } else {
            self.diff(Some(previous), Some(current))
        }
    }

    fn copy_repeat_template(&mut self, repeat: &Control, start: usize, end: usize) -> Result<(), DiffError> {
        if self.options.test_mode {
            return Ok(());
        }
        debug!(repeat = %repeat.effective_id, start, end, "Copying repeat template");
        self.emit(UpdateEvent::new(
            UpdateKind::CopyRepeatTemplate,
            vec![
                ("id".to_string(), repeat.prefixed_id.clone()),
                (
                    "parent-indexes".to_string(),
                    effective_id_suffix(&repeat.effective_id).to_string(),
                ),
                ("start-suffix".to_string(), start.to_string()),
                ("end-suffix".to_string(), end.to_string()),
            ],
        ))
    }

    fn delete_repeat_elements(&mut self, repeat: &Control, count: usize) -> Result<(), DiffError> {
        if self.options.test_mode {
            return Ok(());
        }
        debug!(repeat = %repeat.effective_id, count, "Deleting repeat iterations");
        self.emit(UpdateEvent::new(
            UpdateKind::DeleteRepeatElements,
            vec![
                (
                    "id".to_string(),
                    effective_id_no_suffix(&repeat.effective_id).to_string(),
                ),
                (
                    "parent-indexes".to_string(),
                    effective_id_suffix(&repeat.effective_id).to_string(),
                ),
                ("count".to_string(), count.to_string()),
            ],
        ))
    }

    /// Replaces a changed static-fragment subtree with its rendered markup.
    ///
    /// Returns true when the subtree was handled; the regular per-attribute
    /// pass, itemset registration and child recursion are then skipped.
    fn replace_fragment(&mut self, prev: Option<&Control>, cur: &Control) -> Result<bool, DiffError> {
        if !self.options.inner_html_updates
            || !cur.is_container()
            || matches!(cur.kind, ControlKind::RepeatIteration { .. })
        {
            return Ok(false);
        }
        let Some(mark) = self.static_state.fragment_mark(&cur.prefixed_id) else {
            return Ok(false);
        };
        if cur.equals_external_recurse(prev) {
            return Ok(false);
        }

        if !cur.equals_external(prev) {
            self.diff_control(prev, cur)?;
        }
        let html = self
            .renderer
            .render(cur, self.static_state.template(), mark)?;
        self.emit(
            UpdateEvent::new(
                UpdateKind::InnerHtml,
                vec![("id".to_string(), cur.effective_id.clone())],
            )
            .with_text(html),
        )?;
        Ok(true)
    }
}

fn diff_lhha(
    builder: &mut AttributeBuilder,
    name: &str,
    previous: Option<&Lhha>,
    current: Option<&Lhha>,
    escaped: bool,
) -> bool {
    // Compared on the wire form so that an HTML flag flip is sent too.
    fn wire_of(lhha: &Lhha, escaped: bool) -> &str {
        if escaped { lhha.escaped.as_str() } else { lhha.text.as_str() }
    }
    let wire = |lhha| wire_of(lhha, escaped);
    builder.diff_text(name, previous.map(wire), current.map(wire), None)
}

fn classes(custom_mips: &std::collections::BTreeMap<String, String>) -> String {
    custom_mips
        .iter()
        .map(|(name, value)| format!("xforms-{name}-{value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn visibility(id: &str, visible: bool) -> UpdateEvent {
    UpdateEvent::new(
        UpdateKind::Div,
        vec![
            ("id".to_string(), id.to_string()),
            (
                "visibility".to_string(),
                if visible { "visible" } else { "hidden" }.to_string(),
            ),
        ],
    )
}
