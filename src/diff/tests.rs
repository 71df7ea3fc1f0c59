use std::collections::{BTreeMap, HashSet};

use super::*;
use crate::controls::{
    Control, ControlKind, Item, ItemsInfo, Itemset, Lhha, StaticState, ValueState,
};
use crate::xml::parse_document;

fn input(id: &str, value: &str) -> Control {
    Control::new(id, ControlKind::Input {
        value: ValueState::new(value),
    })
}

fn iteration(repeat: &str, index: usize, children: Vec<Control>) -> Control {
    Control::new(
        format!("{repeat}-it\u{b7}{index}"),
        ControlKind::RepeatIteration { iteration: index },
    )
    .with_children(children)
}

fn repeat(id: &str, values: &[&str]) -> Control {
    let iterations = values
        .iter()
        .enumerate()
        .map(|(i, value)| iteration(id, i + 1, vec![input(&format!("name\u{b7}{}", i + 1), value)]))
        .collect();
    Control::new(id, ControlKind::Repeat { index: 1 }).with_children(iterations)
}

fn switch(selected: &str) -> Control {
    Control::new("s", ControlKind::Switch {
        selected_case: Some(selected.to_string()),
    })
    .with_children(
        ["c1", "c2", "c3"]
            .into_iter()
            .map(|id| Control::new(id, ControlKind::Case))
            .collect(),
    )
}

fn select(id: &str, values: &[&str]) -> Control {
    Control::new(id, ControlKind::Select {
        value: ValueState::new(values.first().copied().unwrap_or_default()),
        itemset: Some(Itemset::new(values.iter().map(|v| Item::new(*v, *v)).collect())),
        multiple: false,
    })
}

fn run_with(
    previous: Option<&[Control]>,
    current: &[Control],
    changed: &HashSet<String>,
    options: DiffOptions,
    static_state: &StaticState,
) -> Result<Vec<String>, DiffError> {
    let mut events: Vec<UpdateEvent> = Vec::new();
    ControlsComparator::new(&mut events, static_state, options)
        .with_value_changes(changed)
        .diff_trees(previous, current)?;
    Ok(events.iter().map(describe).collect())
}

fn run(previous: Option<&[Control]>, current: &[Control]) -> Result<Vec<String>, DiffError> {
    run_with(
        previous,
        current,
        &HashSet::new(),
        DiffOptions::default(),
        &StaticState::new(),
    )
}

fn describe(event: &UpdateEvent) -> String {
    let attributes = event
        .attributes
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(" ");
    match &event.text {
        Some(text) => format!("{} {attributes} {text:?}", event.kind.element_name()),
        None => format!("{} {attributes}", event.kind.element_name()),
    }
}

fn sample_tree() -> Vec<Control> {
    let mut labelled = input("first", "Ada");
    labelled.label = Some(Lhha::plain("First <name>"));
    labelled.custom_mips.insert("status".into(), "draft".into());
    vec![
        Control::new("main", ControlKind::Group { internal: false }).with_children(vec![
            labelled,
            select("country", &["ch", "fr"]),
            switch("c1"),
            repeat("names", &["a", "b"]),
            Control::new("dlg", ControlKind::Dialog {
                visible: true,
                neighbor: Some("first".into()),
                constrain_to_viewport: true,
            }),
        ]),
    ]
}

#[test]
fn identical_trees_produce_no_events() {
    let tree = sample_tree();
    assert!(run(Some(tree.as_slice()), &tree).expect("diff").is_empty());
}

#[test]
fn repeat_growth_copies_template_once_and_describes_new_iterations() {
    let previous = vec![repeat("names", &["a", "b"])];
    let current = vec![repeat("names", &["a", "b", "c", "d"])];

    assert_eq!(
        run(Some(previous.as_slice()), &current).expect("diff"),
        vec![
            "copy-repeat-template id=names parent-indexes= start-suffix=3 end-suffix=4",
            "control id=name\u{b7}3 \"c\"",
            "control id=name\u{b7}4 \"d\"",
        ]
    );
}

#[test]
fn repeat_shrink_deletes_trailing_iterations_then_diffs_prefix() {
    let previous = vec![repeat("names", &["a", "b", "c"])];
    let current = vec![repeat("names", &["z"])];

    assert_eq!(
        run(Some(previous.as_slice()), &current).expect("diff"),
        vec![
            "delete-repeat-elements id=names parent-indexes= count=2",
            "control id=name\u{b7}1 \"z\"",
        ]
    );
}

#[test]
fn nested_repeat_instructions_carry_parent_indexes() {
    let mut inner_before = repeat("inner\u{b7}2", &["a"]);
    inner_before.prefixed_id = "inner".into();
    let mut inner_after = repeat("inner\u{b7}2", &[]);
    inner_after.prefixed_id = "inner".into();

    let events = run(Some(&[inner_before][..]), &[inner_after]).expect("diff");
    assert_eq!(
        events,
        vec!["delete-repeat-elements id=inner parent-indexes=2 count=1"]
    );
}

#[test]
fn newly_shown_repeat_copies_all_but_first_iteration() {
    let current = vec![
        Control::new("g", ControlKind::Group { internal: false })
            .with_children(vec![repeat("names", &["", "", ""])]),
    ];
    assert_eq!(
        run(None, &current).expect("diff"),
        vec!["copy-repeat-template id=names parent-indexes= start-suffix=2 end-suffix=3"]
    );

    let empty = vec![repeat("names", &[])];
    assert_eq!(
        run(None, &empty).expect("diff"),
        vec!["delete-repeat-elements id=names parent-indexes= count=1"]
    );
}

#[test]
fn forced_value_change_emits_unchanged_control() {
    let tree = vec![input("amount", "10")];
    let changed = HashSet::from(["amount".to_string()]);
    let events = run_with(
        Some(tree.as_slice()),
        &tree,
        &changed,
        DiffOptions::default(),
        &StaticState::new(),
    )
    .expect("diff");
    assert_eq!(events, vec!["control id=amount \"10\""]);
}

#[test]
fn mismatched_siblings_outside_repeat_are_illegal() {
    let previous = vec![input("a", ""), input("b", "")];
    let current = vec![input("a", "")];
    let err = run(Some(previous.as_slice()), &current).expect_err("size mismatch");
    assert!(matches!(err, DiffError::IllegalState { .. }));

    let group = |children| Control::new("g", ControlKind::Group { internal: false }).with_children(children);
    let err = run(Some(&[group(vec![input("a", "")])][..]), &[group(Vec::new())])
        .expect_err("children vanished");
    assert!(matches!(err, DiffError::IllegalState { .. }));
}

#[test]
fn kind_change_at_same_position_is_illegal() {
    let previous = vec![input("a", "")];
    let current = vec![Control::new("a", ControlKind::Trigger)];
    assert!(matches!(
        run(Some(previous.as_slice()), &current),
        Err(DiffError::IllegalState { .. })
    ));
}

#[test]
fn switch_selection_toggles_only_affected_cases() {
    assert_eq!(
        run(Some(&[switch("c1")][..]), &[switch("c2")]).expect("diff"),
        vec!["div id=c2 visibility=visible", "div id=c1 visibility=hidden"]
    );
}

#[test]
fn new_switch_hides_every_other_case() {
    assert_eq!(
        run(None, &[switch("c2")]).expect("diff"),
        vec![
            "div id=c2 visibility=visible",
            "div id=c1 visibility=hidden",
            "div id=c3 visibility=hidden",
        ]
    );
}

#[test]
fn new_nodes_only_send_non_default_properties() {
    let mut control = input("x", "");
    control.mips.readonly = true;
    control.mips.relevant = true;
    control.hint = Some(Lhha::plain("a < b"));
    control.label = Some(Lhha::plain("a < b"));
    assert_eq!(
        run(None, &[control]).expect("diff"),
        vec!["control id=x readonly=true label=a &lt; b hint=a < b \"\""]
    );
}

#[test]
fn label_switching_to_html_is_sent_even_with_same_text() {
    let mut before = input("x", "1");
    before.label = Some(Lhha::plain("a < b"));
    let mut after = input("x", "1");
    after.label = Some(Lhha::html("a < b"));
    assert_eq!(
        run(Some(&[before][..]), &[after]).expect("diff"),
        vec!["control id=x label=a < b \"1\""]
    );
}

#[test]
fn existing_nodes_send_changed_properties() {
    let before = input("x", "1");
    let mut after = input("x", "1");
    after.mips.valid = false;
    after.type_name = Some("xs:integer".into());
    after.custom_mips.insert("priority".into(), "high".into());
    assert_eq!(
        run(Some(&[before][..]), &[after]).expect("diff"),
        vec!["control id=x valid=false type=xs:integer class=xforms-priority-high \"1\""]
    );
}

#[test]
fn non_relevant_new_iteration_is_reported() {
    let previous = vec![repeat("names", &["a"])];
    let mut current = vec![repeat("names", &["a", "b"])];
    current[0].children[1].mips.relevant = false;

    let events = run(Some(previous.as_slice()), &current).expect("diff");
    assert_eq!(events[1], "repeat-iteration id=names-it\u{b7}2 relevant=false iteration=2");
}

#[test]
fn static_readonly_triggers_are_suppressed() {
    let before = Control::new("t", ControlKind::Trigger);
    let mut after = Control::new("t", ControlKind::Trigger);
    after.mips.readonly = true;
    let options = DiffOptions {
        static_readonly_appearance: true,
        ..Default::default()
    };
    let events = run_with(
        Some(&[before.clone()][..]),
        &[after.clone()],
        &HashSet::new(),
        options,
        &StaticState::new(),
    )
    .expect("diff");
    assert!(events.is_empty());
    assert_eq!(
        run(Some(&[before][..]), &[after]).expect("diff"),
        vec!["control id=t readonly=true"]
    );
}

#[test]
fn dialog_visibility_change_carries_neighbor() {
    let dialog = |visible| {
        Control::new("dlg", ControlKind::Dialog {
            visible,
            neighbor: Some("first".into()),
            constrain_to_viewport: false,
        })
    };
    assert_eq!(
        run(Some(&[dialog(false)][..]), &[dialog(true)]).expect("diff"),
        vec!["div id=dlg visibility=visible neighbor=first constrain=false"]
    );
    assert_eq!(
        run(Some(&[dialog(true)][..]), &[dialog(false)]).expect("diff"),
        vec!["div id=dlg visibility=hidden"]
    );
}

#[test]
fn upload_fields_are_diffed() {
    let upload = |state: Option<&str>, filename: Option<&str>| {
        Control::new("u", ControlKind::Upload {
            state: state.map(str::to_string),
            mediatype: None,
            filename: filename.map(str::to_string),
            size: None,
        })
    };
    assert_eq!(
        run(Some(&[upload(Some("empty"), None)][..]), &[upload(Some("file"), Some("a.txt"))])
            .expect("diff"),
        vec!["control id=u state=file filename=a.txt"]
    );
}

#[test]
fn test_mode_ignores_previous_and_repeat_instructions() {
    let previous = vec![repeat("names", &["a"])];
    let current = vec![repeat("names", &["a", "b"])];
    let options = DiffOptions {
        test_mode: true,
        ..Default::default()
    };
    let events = run_with(
        Some(previous.as_slice()),
        &current,
        &HashSet::new(),
        options,
        &StaticState::new(),
    )
    .expect("diff");
    assert_eq!(
        events,
        vec!["control id=name\u{b7}1 \"a\"", "control id=name\u{b7}2 \"b\""]
    );
}

#[test]
fn itemsets_are_registered_unless_static() {
    let static_state = StaticState::new().with_items_info(
        "fixed",
        ItemsInfo {
            has_non_static_item: false,
        },
    );
    let previous = vec![select("country", &["ch"]), select("fixed", &["a"])];
    let current = vec![select("country", &["ch", "fr"]), select("fixed", &["a", "b"])];

    let mut maps = ItemsetMaps::new();
    let mut events: Vec<UpdateEvent> = Vec::new();
    ControlsComparator::new(&mut events, &static_state, DiffOptions::default())
        .with_itemsets(&mut maps)
        .diff_trees(Some(previous.as_slice()), &current)
        .expect("diff");

    assert_eq!(maps.previous.keys().collect::<Vec<_>>(), vec!["country"]);
    let changed: BTreeMap<_, _> = maps.changed();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed["country"].items.len(), 2);
}

#[test]
fn changed_static_fragment_is_replaced_as_inner_html() {
    let template = parse_document(
        r#"<body><div id="panel"><span class="label">Name</span><input name="x"/></div></body>"#,
        None,
    )
    .expect("template");
    let static_state = StaticState::new().with_template(template, ["panel"]);
    let options = DiffOptions {
        inner_html_updates: true,
        ..Default::default()
    };
    let panel = |value| {
        Control::new("panel", ControlKind::Group { internal: false })
            .with_children(vec![input("x", value)])
    };

    let events = run_with(
        Some(&[panel("old")][..]),
        &[panel("new")],
        &HashSet::new(),
        options,
        &static_state,
    )
    .expect("diff");
    assert_eq!(
        events,
        vec![r#"inner-html id=panel "<span class=\"label\">Name</span><input name=\"x\">""#]
    );

    let unchanged = run_with(
        Some(&[panel("same")][..]),
        &[panel("same")],
        &HashSet::new(),
        options,
        &static_state,
    )
    .expect("diff");
    assert!(unchanged.is_empty());
}

#[test]
fn inner_html_uses_the_configured_renderer() {
    struct IdRenderer;

    impl FragmentRenderer for IdRenderer {
        fn render(
            &self,
            control: &Control,
            _template: &crate::xml::EventBuffer,
            _mark: crate::xml::Mark,
        ) -> Result<String, DiffError> {
            Ok(format!("<b>{}</b>", control.effective_id))
        }
    }

    let template = parse_document(r#"<body><div id="panel"/></body>"#, None).expect("template");
    let static_state = StaticState::new().with_template(template, ["panel"]);
    let options = DiffOptions {
        inner_html_updates: true,
        ..Default::default()
    };
    let panel = |value| {
        Control::new("panel", ControlKind::Group { internal: false })
            .with_children(vec![input("x", value)])
    };
    let previous = [panel("old")];
    let current = [panel("new")];

    let mut events: Vec<UpdateEvent> = Vec::new();
    ControlsComparator::new(&mut events, &static_state, options)
        .with_fragment_renderer(&IdRenderer)
        .diff_trees(Some(&previous[..]), &current)
        .expect("diff");
    let events: Vec<String> = events.iter().map(describe).collect();
    assert_eq!(events, vec![r#"inner-html id=panel "<b>panel</b>""#]);
}
