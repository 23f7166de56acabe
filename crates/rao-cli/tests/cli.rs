//! Integration tests for the rao-cli commands

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

fn sample_scenario() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/two_instants.json")
}

#[test]
fn test_validate_sample_scenario() {
    let scenario = sample_scenario();
    let mut cmd = cargo_bin_cmd!("rao-cli");
    cmd.args(["validate", "--scenario", scenario.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"))
        .stdout(predicate::str::contains("2 Cnecs"));
}

#[test]
fn test_validate_reports_unknown_elements() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("broken.json");
    let text = fs::read_to_string(sample_scenario())
        .unwrap()
        .replace(r#""elements": ["l2"]"#, r#""elements": ["l9"]"#);
    fs::write(&path, text).unwrap();

    let mut cmd = cargo_bin_cmd!("rao-cli");
    cmd.args(["validate", "--scenario", path.to_str().unwrap()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("unknown network element 'l9'"))
        .stderr(predicate::str::contains("inconsistent"));
}

#[test]
fn test_validate_missing_file_fails() {
    let mut cmd = cargo_bin_cmd!("rao-cli");
    cmd.args(["validate", "--scenario", "does/not/exist.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("reading scenario"));
}

#[test]
fn test_optimize_writes_outcome() {
    let tmp = tempdir().unwrap();
    let out = tmp.path().join("results/outcome.json");
    let scenario = sample_scenario();

    let mut cmd = cargo_bin_cmd!("rao-cli");
    cmd.args([
        "optimize",
        "--scenario",
        scenario.to_str().unwrap(),
        "--out",
        out.to_str().unwrap(),
        "--threads",
        "2",
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("Status       : Secure"))
    .stdout(predicate::str::contains("open-s1"));

    let outcome: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(outcome["status"], "secure");
    assert_eq!(outcome["perimeters"][0]["network_actions"][0], "open-s1");
    assert_eq!(outcome["perimeters"][1]["network_actions"][0], "open-s2");
}

#[test]
fn test_optimize_prints_json_without_out() {
    let scenario = sample_scenario();
    let mut cmd = cargo_bin_cmd!("rao-cli");
    let output = cmd
        .args(["optimize", "--scenario", scenario.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());
    let outcome: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let final_cost = outcome["final_cost"].as_f64().unwrap();
    assert!((final_cost + 10.0).abs() < 1e-6);
}

#[test]
fn test_optimize_with_parameter_file() {
    let tmp = tempdir().unwrap();
    let params = tmp.path().join("params.toml");
    // depth 0: no network action may be applied
    fs::write(
        &params,
        "[topo]\nmax_preventive_search_tree_depth = 0\nmax_curative_search_tree_depth = 0\n\n[logging]\nlevel = \"warn\"\n",
    )
    .unwrap();
    let out = tmp.path().join("outcome.json");
    let scenario = sample_scenario();

    let mut cmd = cargo_bin_cmd!("rao-cli");
    cmd.args([
        "optimize",
        "--scenario",
        scenario.to_str().unwrap(),
        "--params",
        params.to_str().unwrap(),
        "--out",
        out.to_str().unwrap(),
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("Unsecure"))
    .stderr(predicate::str::contains("INFO").not());
}

#[test]
fn test_optimize_rejects_bad_thread_count() {
    let scenario = sample_scenario();
    let mut cmd = cargo_bin_cmd!("rao-cli");
    cmd.args([
        "optimize",
        "--scenario",
        scenario.to_str().unwrap(),
        "--threads",
        "zero",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("invalid --threads value"));
}

#[test]
fn test_params_round_trip() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("default.toml");

    let mut cmd = cargo_bin_cmd!("rao-cli");
    cmd.args(["params", "--out", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote default parameters"));

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("max_run_duration_seconds = 86400"));
    assert!(text.contains("[logging]"));

    let mut cmd = cargo_bin_cmd!("rao-cli");
    cmd.arg("params")
        .assert()
        .success()
        .stdout(predicate::str::contains("[multithreading]"));
}
