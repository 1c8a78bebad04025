#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use assert_cmd::cargo::cargo_bin_cmd;
use graphcache::{
    selection::{ArgumentValue, LinkedField},
    Operation, Selection,
};
use serde_json::{json, Value};
use tempfile::TempDir;

fn user_operation() -> Operation {
    let node = LinkedField::new(
        "node",
        vec![Selection::scalar("id"), Selection::scalar("name")],
    )
    .arg("id", ArgumentValue::literal("4"));
    Operation::query("UserQuery", vec![node.into()])
}

fn write_script(dir: &TempDir, name: &str, payloads: Value) -> PathBuf {
    let script = json!({
        "operation": serde_json::to_value(Arc::new(user_operation())).expect("operation json"),
        "payloads": payloads,
    });
    let path = dir.path().join(format!("{name}.json"));
    fs::write(&path, serde_json::to_vec_pretty(&script).expect("script json")).expect("write");
    path
}

fn run(dir: &TempDir, args: &[&str], script: &Path) -> assert_cmd::assert::Assert {
    cargo_bin_cmd!("graphcache")
        .env("GRAPHCACHE_CONFIG", dir.path().join("absent.toml"))
        .env_remove("RUST_LOG")
        .args(args)
        .arg(script)
        .assert()
}

fn stdout_json(assert: &assert_cmd::assert::Assert) -> Value {
    serde_json::from_slice(&assert.get_output().stdout).expect("valid json")
}

#[test]
fn replay_reports_snapshots_as_json() {
    let dir = TempDir::new().expect("tempdir");
    let script = write_script(
        &dir,
        "replay",
        json!([{"data": {"node": {"id": "4", "name": "Zuck"}}}]),
    );
    let assert = run(&dir, &["--format", "json", "replay"], &script).success();
    let report = stdout_json(&assert);
    assert_eq!(report["operation"], "UserQuery");
    assert_eq!(report["outcome"], "complete");
    assert_eq!(report["payloads"], 1);
    assert_eq!(report["records"], 2);
    assert!(report.get("error_code").is_none());
    let snapshots = report["snapshots"].as_array().expect("snapshots");
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0]["selector"], "operation");
    assert_eq!(
        snapshots[0]["data"],
        json!({"node": {"id": "4", "name": "Zuck"}})
    );
    assert_eq!(snapshots[0]["missing_data"], false);
}

#[test]
fn inspect_prints_normalized_records() {
    let dir = TempDir::new().expect("tempdir");
    let script = write_script(
        &dir,
        "inspect",
        json!([{"data": {"node": {"id": "4", "name": "Zuck"}}}]),
    );
    let assert = run(&dir, &["--format", "json", "inspect"], &script).success();
    let records = stdout_json(&assert);
    assert_eq!(records["4"]["name"], "Zuck");
    assert_eq!(records["4"]["__id"], "4");

    let text = run(&dir, &["--theme", "plain", "inspect"], &script).success();
    let stdout = String::from_utf8_lossy(&text.get_output().stdout).into_owned();
    assert!(stdout.contains("Zuck"), "stdout: {stdout}");
}

#[test]
fn unknown_label_exits_with_its_error_code() {
    let dir = TempDir::new().expect("tempdir");
    let script = write_script(
        &dir,
        "unknown",
        json!([
            {"data": {"node": {"id": "4", "name": "Zuck"}}},
            {"data": {"name": "Mark"}, "label": "UserQuery$defer$Missing", "path": ["node"]}
        ]),
    );
    let assert = run(&dir, &["--format", "json", "replay"], &script).code(2);
    let report = stdout_json(&assert);
    assert_eq!(report["error_code"], "UnknownLabel");
    assert_eq!(report["snapshots"].as_array().map(Vec::len), Some(1));
}

#[test]
fn config_file_selects_the_output_format() {
    let dir = TempDir::new().expect("tempdir");
    let config = dir.path().join("config.toml");
    fs::write(&config, "[output]\nformat = \"json\"\n").expect("write config");
    let script = write_script(
        &dir,
        "configured",
        json!([{"data": {"node": {"id": "4", "name": "Zuck"}}}]),
    );
    let output = cargo_bin_cmd!("graphcache")
        .arg("--config")
        .arg(&config)
        .args(["replay"])
        .arg(&script)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(report["outcome"], "complete");
}

#[test]
fn invalid_config_format_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let config = dir.path().join("config.toml");
    fs::write(&config, "[output]\nformat = \"yaml\"\n").expect("write config");
    let script = write_script(&dir, "invalid", json!([]));
    cargo_bin_cmd!("graphcache")
        .arg("--config")
        .arg(&config)
        .args(["replay"])
        .arg(&script)
        .assert()
        .code(1);
}

#[test]
fn debug_log_names_the_config_file_in_use() {
    let dir = TempDir::new().expect("tempdir");
    let config = dir.path().join("config.toml");
    fs::write(&config, "[environment]\nid_field = \"id\"\n").expect("write config");
    let script = write_script(
        &dir,
        "logged",
        json!([{"data": {"node": {"id": "4", "name": "Zuck"}}}]),
    );
    let assert = cargo_bin_cmd!("graphcache")
        .env("GRAPHCACHE_CONFIG", &config)
        .env_remove("RUST_LOG")
        .args(["--log-filter", "graphcache=debug", "--theme", "plain", "replay"])
        .arg(&script)
        .assert()
        .success();
    let output = assert.get_output();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    assert!(stderr.contains("cli.config"), "stderr: {stderr}");
    assert!(stderr.contains("config.toml"), "stderr: {stderr}");
    assert!(stderr.contains("loaded=true"), "stderr: {stderr}");

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    assert!(stdout.contains("Replay UserQuery"), "stdout: {stdout}");
    assert!(stdout.contains("completed after 1 payloads"), "stdout: {stdout}");
}
