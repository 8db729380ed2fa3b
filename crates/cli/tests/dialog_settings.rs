use assert_cmd::Command;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::fs;
use tempfile::tempdir;

#[allow(deprecated)]
fn dialog_settings() -> Command {
    Command::cargo_bin("dialog-settings").expect("binary")
}

fn run_json(args: &[&str]) -> Value {
    let output = dialog_settings().args(args).output().expect("command run");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid json")
}

#[test]
fn splits_scope_into_data_paths() {
    let out = run_json(&["data-paths", "#/properties/foo/items/properties/bar"]);
    assert_eq!(out, json!(["foo", "bar"]));
}

#[test]
fn combines_scope_with_indices() {
    let out = run_json(&[
        "combine",
        "#/properties/foo/items/properties/bar",
        "--indices",
        "2",
    ]);
    assert_eq!(out, json!(["foo.2.bar"]));
}

#[test]
fn prefers_the_most_specific_match() {
    let out = run_json(&[
        "match-path",
        "lorem.123.ipsum.45.dolor",
        "--scope",
        "#/properties/lorem/items/properties/ipsum",
        "--scope",
        "#/properties/lorem/items/properties/ipsum/items/properties/dolor",
    ]);
    assert_eq!(out["indices"], json!([123, 45]));
}

#[test]
fn reports_no_match_as_null() {
    let out = run_json(&[
        "match-path",
        "lorem",
        "--scope",
        "#/properties/lorem/items/properties/ipsum",
    ]);
    assert_eq!(out, Value::Null);
}

#[test]
fn rejects_malformed_scope() {
    dialog_settings()
        .args(["data-paths", "#/properties"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid scope"));
}

#[test]
fn extracts_dependency_values_for_every_element() {
    let temp = tempdir().unwrap();
    let data = temp.path().join("data.json");
    fs::write(&data, r#"{"rows": [{"v": 1}, {"v": 2}]}"#).unwrap();

    let out = run_json(&[
        "dependencies",
        "--data",
        data.to_str().unwrap(),
        "--scope",
        "#/properties/rows/items/properties/v",
    ]);
    let values: Vec<&Value> = out
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| &entry["value"])
        .collect();
    assert_eq!(values, vec![&json!(1), &json!(2)]);
    assert_eq!(out[0]["indices"].as_array().unwrap().len(), 1);
}

#[test]
fn prints_update_result_schema() {
    dialog_settings()
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("providedOptionName"));
}

#[test]
fn replays_edit_through_recorded_backend() {
    let temp = tempdir().unwrap();
    let payload = temp.path().join("payload.json");
    let responses = temp.path().join("responses.json");
    fs::write(
        &payload,
        json!({
            "data": {"model": {"first": "a", "second": "b"}},
            "globalUpdates": [{
                "trigger": {"scope": "#/properties/model/properties/first"},
                "dependencies": ["#/properties/model/properties/first"]
            }]
        })
        .to_string(),
    )
    .unwrap();
    fs::write(
        &responses,
        json!([{
            "state": "SUCCESS",
            "result": [{"scope": "#/properties/model/properties/second", "values": [{"indices": [], "value": "updated"}]}]
        }])
        .to_string(),
    )
    .unwrap();

    let out = run_json(&[
        "replay",
        "--payload",
        payload.to_str().unwrap(),
        "--responses",
        responses.to_str().unwrap(),
        "--change",
        "model.first=\"changed\"",
        "--calls",
    ]);

    assert_eq!(out["data"], json!({"model": {"first": "changed", "second": "updated"}}));
    assert_eq!(out["alerts"], json!([]));
    assert_eq!(out["calls"][0]["method"], json!("settings.update2"));
}

#[test]
fn replay_reports_backend_failures_as_alerts() {
    let temp = tempdir().unwrap();
    let payload = temp.path().join("payload.json");
    let responses = temp.path().join("responses.json");
    fs::write(
        &payload,
        json!({
            "data": {"model": {}},
            "globalUpdates": [{"trigger": {"id": "refresh"}, "dependencies": []}]
        })
        .to_string(),
    )
    .unwrap();
    fs::write(
        &responses,
        json!([{"state": "FAIL", "message": ["Node is not configured"]}]).to_string(),
    )
    .unwrap();

    let out = run_json(&[
        "replay",
        "--payload",
        payload.to_str().unwrap(),
        "--responses",
        responses.to_str().unwrap(),
        "--fire",
        "refresh",
    ]);

    assert_eq!(
        out["alerts"],
        json!([{"type": "error", "message": "Node is not configured"}])
    );
    assert_eq!(out["data"], json!({"model": {}}));
}

#[test]
fn replay_fails_for_unknown_trigger() {
    let temp = tempdir().unwrap();
    let payload = temp.path().join("payload.json");
    fs::write(&payload, r#"{"data": {}}"#).unwrap();

    dialog_settings()
        .args(["replay", "--payload", payload.to_str().unwrap(), "--fire", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No trigger registered for id missing"));
}
