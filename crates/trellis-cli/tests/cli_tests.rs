//! End-to-end tests for the `trellis` binary against the bakery demo.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn trellis() -> Command {
    let mut cmd = Command::cargo_bin("trellis").unwrap();
    cmd.current_dir(workspace_root())
        .env_remove("RUST_LOG")
        .env_remove("TRELLIS_LOG")
        .args(["--config", "demos/bakery/trellis.toml"]);
    cmd
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("trellis").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Usage:"));
}

#[test]
fn test_paths_lists_capped_candidates() {
    let out = stdout_json(trellis().args(["paths", "demos/bakery/intents/chocolate_deliveries.json"]));

    assert_eq!(out["root"], "deliveries");
    let candidates: Vec<&str> = out["candidates"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(candidates.contains(&"order.items"));
    assert!(!candidates.contains(&"order.items.product"));
}

#[test]
fn test_compile_prints_stage_documents() {
    let out = stdout_json(trellis().args(["compile", "demos/bakery/intents/pending_orders.json"]));
    let stages = out.as_array().unwrap();

    assert_eq!(
        stages[0],
        serde_json::json!({"$match": {"status": {"$in": ["PENDING", "READY"]}}})
    );
    assert!(stages.iter().any(|s| s["$lookup"]["as"] == "customer"));
    assert_eq!(stages.last().unwrap(), &serde_json::json!({"$limit": 10}));
}

#[test]
fn test_compile_explain_includes_recipes() {
    let out = stdout_json(trellis().args([
        "compile",
        "--explain",
        "demos/bakery/intents/chocolate_deliveries.json",
    ]));

    assert_eq!(out["root"], "deliveries");
    assert!(!out["recipes"].as_array().unwrap().is_empty());
    assert!(out["pipeline"].is_array());
}

#[test]
fn test_run_chocolate_deliveries() {
    let out = stdout_json(trellis().args(["run", "demos/bakery/intents/chocolate_deliveries.json"]));
    let ids: Vec<&str> = out
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|row| row["_id"].as_str())
        .collect();

    assert_eq!(ids, vec!["D2", "D1"]);
}

#[test]
fn test_run_count_over_nothing_prints_empty_array() {
    let temp = TempDir::new().unwrap();
    let intent = temp.path().join("none.json");
    fs::write(
        &intent,
        r#"{"root": "orders", "filters": [{"pathHint": "status", "op": "eq", "value": "LOST"}], "aggregation": "count"}"#,
    )
    .unwrap();

    let out = stdout_json(trellis().arg("run").arg(&intent));
    assert_eq!(out, serde_json::json!([]));
}

#[test]
fn test_missing_schema_is_reported() {
    let mut cmd = Command::cargo_bin("trellis").unwrap();
    cmd.current_dir(workspace_root())
        .env_remove("RUST_LOG")
        .args(["compile", "demos/bakery/intents/pending_orders.json"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("no schema seed"));
}

#[test]
fn test_unsupported_operator_fails() {
    let temp = TempDir::new().unwrap();
    let intent = temp.path().join("bad.json");
    fs::write(
        &intent,
        r#"{"root": "orders", "filters": [{"pathHint": "status", "op": "near", "value": 1}]}"#,
    )
    .unwrap();

    trellis()
        .arg("compile")
        .arg(&intent)
        .assert()
        .failure()
        .stderr(predicate::str::contains("near"));
}
