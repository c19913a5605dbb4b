// tests/config_loading.rs
mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::fs;

use wavequeue::config::{
    ConfigFile, RawConfigFile, RawTaskSetFile, TaskSetFile, load_and_validate, load_or_default,
    load_task_set_file,
};
use wavequeue::errors::WaveQueueError;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn missing_default_config_means_builtin_defaults() -> TestResult {
    init_tracing();

    let dir = tempfile::tempdir()?;
    let cfg = load_or_default(dir.path().join("wavequeue.toml"))?;

    assert_eq!(cfg.store.path, ".wavequeue/queue.db");
    let lanes = cfg.lane_assigner();
    assert_eq!(lanes.assign_lane(Some("database")), "data");
    assert_eq!(lanes.assign_lane(None), "general");
    Ok(())
}

#[test]
fn explicit_config_must_exist() {
    init_tracing();

    let dir = tempfile::tempdir().expect("tempdir");
    assert!(matches!(
        load_and_validate(dir.path().join("absent.toml")),
        Err(WaveQueueError::IoError(_))
    ));
}

#[test]
fn lane_table_from_file_replaces_builtin_table() -> TestResult {
    init_tracing();

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("wavequeue.toml");
    fs::write(
        &path,
        r#"
[store]
path = "state/queue.db"

[lanes]
default = "misc"

[lanes.categories]
API = "server"
ui = "client"
"#,
    )?;

    let cfg = load_and_validate(&path)?;
    assert_eq!(cfg.store.path, "state/queue.db");

    let lanes = cfg.lane_assigner();
    assert_eq!(lanes.assign_lane(Some("api")), "server");
    assert_eq!(lanes.assign_lane(Some("backend")), "misc");
    Ok(())
}

#[test]
fn empty_lane_names_are_rejected() {
    init_tracing();

    let raw: RawConfigFile = toml::from_str(
        r#"
[lanes]
default = " "
"#,
    )
    .expect("parse");
    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(WaveQueueError::ConfigError(_))
    ));

    let raw: RawConfigFile = toml::from_str(
        r#"
[lanes.categories]
backend = ""
"#,
    )
    .expect("parse");
    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(WaveQueueError::ConfigError(msg)) if msg.contains("backend")
    ));
}

#[test]
fn task_set_file_parses_with_defaults_and_pins() -> TestResult {
    init_tracing();

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("release.toml");
    fs::write(
        &path,
        r#"
task_set = "release-1"

[task.schema]
category = "database"
created_at = "2026-01-01T00:00:00Z"

[task.api]
priority = 1
category = "backend"
depends_on = ["schema", "vendor-sdk"]
wave = 3
lane = "backend"
execution_order = 0
"#,
    )?;

    let file = load_task_set_file(&path)?;
    assert_eq!(file.task_set, "release-1");
    assert_eq!(file.tasks.len(), 2);

    let api = file.tasks.iter().find(|t| t.id == "api").expect("api");
    assert_eq!(api.priority.0, 1);
    assert_eq!(api.depends_on, vec!["schema".to_string(), "vendor-sdk".to_string()]);
    assert_eq!(api.pins.wave, Some(3));
    assert_eq!(api.pins.execution_order, Some(0));

    let schema = file.tasks.iter().find(|t| t.id == "schema").expect("schema");
    assert_eq!(schema.priority.0, 2);
    assert_eq!(schema.created_at.to_rfc3339(), "2026-01-01T00:00:00+00:00");
    assert!(schema.pins.is_empty());
    Ok(())
}

#[test]
fn invalid_task_set_files_are_rejected() {
    init_tracing();

    let cases = [
        ("empty set name", "task_set = \"\"\n[task.a]\n"),
        ("no tasks", "task_set = \"s\"\n"),
        ("empty dependency", "task_set = \"s\"\n[task.a]\ndepends_on = [\"\"]\n"),
        ("bad timestamp", "task_set = \"s\"\n[task.a]\ncreated_at = \"yesterday\"\n"),
    ];

    for (label, text) in cases {
        let raw: RawTaskSetFile = toml::from_str(text).expect(label);
        assert!(
            matches!(TaskSetFile::try_from(raw), Err(WaveQueueError::ConfigError(_))),
            "{label} should be rejected"
        );
    }
}

#[test]
fn cycles_are_not_an_import_error() {
    init_tracing();

    let raw: RawTaskSetFile = toml::from_str(
        r#"
task_set = "s"
[task.x]
depends_on = ["y"]
[task.y]
depends_on = ["x"]
"#,
    )
    .expect("parse");
    assert!(TaskSetFile::try_from(raw).is_ok());
}
