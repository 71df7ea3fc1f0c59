use std::collections::HashSet;
use std::sync::Arc;

use metrics_util::debugging::DebuggingRecorder;
use serial_test::serial;
use xforms_server::cache::{CacheConfig, CacheKey, CacheStore, ObjectCache, Validity};
use xforms_server::controls::{Control, ControlKind, StaticState, ValueState};
use xforms_server::diff::DiffOptions;
use xforms_server::response::AjaxResponse;
use xforms_server::transform::{
    EngineAttributes, IdentityEngine, KeyValidity, MemoryResolver, StylesheetInput, TemplatesCache,
};
use xforms_server::xml::parse_document;

#[test]
#[serial]
fn cache_diff_and_compile_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    // Object cache hit, miss and eviction.
    let cache = ObjectCache::new(&CacheConfig {
        object_cache_limit: 1,
        ..Default::default()
    });
    let validity = Validity::Token("v1".into());
    assert!(cache.lookup(&CacheKey::url("mem:/one"), &validity).is_none());
    cache.store(CacheKey::url("mem:/one"), validity.clone(), Arc::new(1_u32));
    assert!(cache.lookup(&CacheKey::url("mem:/one"), &validity).is_some());
    cache.store(CacheKey::url("mem:/two"), validity.clone(), Arc::new(2_u32));

    // Stylesheet compilation.
    let resolver = MemoryResolver::new();
    let source = parse_document(
        r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform"/>"#,
        Some("mem:/m.xsl"),
    )
    .expect("stylesheet");
    TemplatesCache::new(&cache, &resolver)
        .get_or_compile(
            &IdentityEngine,
            &EngineAttributes::new(),
            &StylesheetInput {
                source: &source,
                key_validity: Some(KeyValidity::new(CacheKey::url("mem:/m.xsl"), validity)),
            },
        )
        .expect("compile");

    // Control diff.
    let previous = vec![Control::new(
        "name",
        ControlKind::Input {
            value: ValueState::new("a"),
        },
    )];
    let current = vec![Control::new(
        "name",
        ControlKind::Input {
            value: ValueState::new("b"),
        },
    )];
    let state = StaticState::new();
    AjaxResponse::new(&state, DiffOptions::default(), Some(&previous[..]), &current)
        .to_xml_string()
        .expect("response");

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "xforms_cache_hit_total",
        "xforms_cache_miss_total",
        "xforms_cache_evict_total",
        "xforms_transform_compile_total",
        "xforms_diff_events_total",
        "xforms_diff_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
