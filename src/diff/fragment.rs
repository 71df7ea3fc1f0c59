use super::DiffError;
use crate::controls::{Control, ControlKind};
use crate::xml::{EventBuffer, Mark, XmlWriter};

/// Renders the static markup of a control for an `inner-html` replacement.
pub trait FragmentRenderer {
    fn render(&self, control: &Control, template: &EventBuffer, mark: Mark)
    -> Result<String, DiffError>;
}

/// Serializes the marked template element as an HTML fragment.
///
/// The client replaces the content of the control's element, so the root
/// element itself is dropped, except for repeats whose markup is a sequence
/// of siblings delimited by the root.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateFragmentRenderer;

impl FragmentRenderer for TemplateFragmentRenderer {
    fn render(
        &self,
        control: &Control,
        template: &EventBuffer,
        mark: Mark,
    ) -> Result<String, DiffError> {
        let skip_root = !matches!(control.kind, ControlKind::Repeat { .. });
        let mut writer = XmlWriter::html_fragment(skip_root);
        template
            .replay_element(mark, &mut writer)
            .map_err(|source| DiffError::Fragment {
                id: control.effective_id.clone(),
                source,
            })?;
        Ok(writer.finish())
    }
}
