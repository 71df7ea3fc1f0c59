use std::io::Write;

use clap::Parser;

use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("info".to_string());
    raw.ajax.test_mode = Some(false);

    raw.apply_logging_overrides(&LoggingOverrides {
        log_level: Some("debug".to_string()),
        ..Default::default()
    });
    raw.apply_ajax_overrides(&AjaxOverrides {
        test_mode: Some(true),
        ..Default::default()
    });
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert!(settings.ajax.test_mode);
}

#[test]
fn defaults_are_usable() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    assert_eq!(settings.logging.format, LogFormat::Compact);
    assert_eq!(
        settings.cache,
        CacheSettings {
            enable_object_cache: true,
            object_cache_limit: DEFAULT_OBJECT_CACHE_LIMIT,
        }
    );
    assert_eq!(settings.ajax, AjaxSettings::default());
    assert_eq!(settings.transform.engine, IdentityEngine::NAME);
    assert_eq!(settings.transform.location_mode, LocationMode::Smart);
}

#[test]
fn zero_cache_limit_is_rejected() {
    let mut raw = RawSettings::default();
    raw.apply_transform_overrides(&TransformOverrides {
        object_cache_limit: Some(0),
        ..Default::default()
    });
    let err = Settings::from_raw(raw).expect_err("invalid");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.object_cache_limit",
            ..
        }
    ));
}

#[test]
fn unknown_engine_is_rejected() {
    let mut raw = RawSettings::default();
    raw.transform.engine = Some("saxon".to_string());
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "transform.engine",
            ..
        })
    ));
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn parse_diff_arguments() {
    let args = CliArgs::try_parse_from([
        "xforms-server",
        "diff",
        "--previous",
        "before.json",
        "--current",
        "after.json",
        "--changed",
        "name",
        "--changed",
        "age",
        "--ajax-test-mode",
        "true",
    ])
    .expect("parse diff");

    let Command::Diff(diff) = args.command else {
        panic!("expected diff command");
    };
    assert_eq!(diff.previous.as_deref(), Some(std::path::Path::new("before.json")));
    assert_eq!(diff.changed, vec!["name", "age"]);
    assert_eq!(diff.overrides.test_mode, Some(true));
    assert!(!diff.clean);
}

#[test]
fn parse_transform_arguments() {
    let args = CliArgs::try_parse_from([
        "xforms-server",
        "--log-json",
        "yes",
        "transform",
        "--stylesheet",
        "a.xsl",
        "--input",
        "in.xml",
        "--attribute",
        "strip-comments=true",
        "--transform-location-mode",
        "dumb",
        "--repeat",
        "2",
    ])
    .expect("parse transform");

    assert_eq!(args.logging.log_json, Some(true));
    let Command::Transform(transform) = args.command else {
        panic!("expected transform command");
    };
    assert_eq!(
        transform.attributes,
        vec![("strip-comments".to_string(), true)]
    );
    assert_eq!(transform.overrides.location_mode, Some(LocationMode::Dumb));
    assert_eq!(transform.repeat, 2);
}

#[test]
fn rejects_malformed_attribute() {
    let result = CliArgs::try_parse_from([
        "xforms-server",
        "transform",
        "--stylesheet",
        "a.xsl",
        "--input",
        "in.xml",
        "--attribute",
        "strip-comments",
    ]);
    assert!(result.is_err());
}

#[test]
fn config_file_layer_is_applied() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    writeln!(
        file,
        "[cache]\nobject_cache_limit = 12\n\n[transform]\nlocation_mode = \"none\""
    )
    .expect("write config");

    let args = CliArgs::try_parse_from([
        "xforms-server",
        "--config-file",
        file.path().to_str().expect("utf-8 path"),
        "transform",
        "--stylesheet",
        "a.xsl",
        "--input",
        "in.xml",
        "--cache-object-cache-limit",
        "7",
    ])
    .expect("parse");
    let settings = load(&args).expect("load");

    assert_eq!(settings.cache.object_cache_limit, 7);
    assert_eq!(settings.transform.location_mode, LocationMode::None);
}
