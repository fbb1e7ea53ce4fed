use std::fs;
use std::path::Path;

use assert_cmd::Command;
use serde_json::Value;

fn config_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("base.toml"),
        r#"
        [telemetry]
        log_level = "warn"
        log_format = "compact"
        "#,
    )
    .unwrap();
    fs::write(
        dir.path().join("development.toml"),
        r#"
        [[provision.databases]]
        name = "changeapp_transactions_dev"
        environment = "development"
        id_as_primary_key = true
        "#,
    )
    .unwrap();
    dir
}

fn changeapp(dir: &Path, env: &str) -> Command {
    let mut cmd = Command::cargo_bin("changeapp").unwrap();
    cmd.env_remove("RUST_LOG")
        .arg("--config-dir")
        .arg(dir)
        .args(["--env", env]);
    cmd
}

fn stdout(cmd: &mut Command) -> String {
    let output = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(output).unwrap()
}

#[test]
fn plan_json_lists_full_rollout_without_password() {
    let dir = config_dir();
    let out = stdout(changeapp(dir.path(), "test").args(["plan", "--format", "json"]));

    assert!(!out.contains("changeapp123"));
    let plan: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(plan["databases"].as_array().unwrap().len(), 4);
    assert_eq!(plan["user"]["roles"].as_array().unwrap().len(), 4);
    assert_eq!(
        plan["databases"][0]["collections"][0]["indexes"]
            .as_array()
            .unwrap()
            .len(),
        13
    );
}

#[test]
fn development_overlay_retires_identifier_index() {
    let dir = config_dir();
    let out = stdout(changeapp(dir.path(), "development").args(["plan", "--format", "json"]));

    let plan: Value = serde_json::from_str(&out).unwrap();
    let databases = plan["databases"].as_array().unwrap();
    assert_eq!(databases.len(), 1);
    let collection = &databases[0]["collections"][0];
    assert_eq!(collection["indexes"].as_array().unwrap().len(), 12);
    assert_eq!(collection["retired_indexes"][0], "transactionId_1");
}

#[test]
fn plan_only_filters_databases() {
    let dir = config_dir();
    let out = stdout(changeapp(dir.path(), "test").args(["plan", "--only", "hm"]));

    assert!(out.contains("database changeapp_transactions_hm (staging)"));
    assert!(!out.contains("database changeapp_transactions_dev"));
    assert!(out.contains("index transactionId_1 { transactionId: 1 } unique"));
}

#[test]
fn apply_against_memory_backend_creates_everything() {
    let dir = config_dir();
    let out = stdout(changeapp(dir.path(), "test").args(["--mongo-uri", "mem://", "apply"]));

    assert!(out.contains("user: created"));
    assert!(out.contains(
        "changeapp_transactions_hm.transactions: collection created, 13 indexes created, 0 unchanged, 0 dropped"
    ));
    // user + 4 collections + 4 x 13 indexes
    assert!(out.contains("57 changes"));
}

#[test]
fn dry_run_reports_json() {
    let dir = config_dir();
    let out = stdout(changeapp(dir.path(), "test").args([
        "--mongo-uri",
        "mem://",
        "apply",
        "--dry-run",
        "--format",
        "json",
    ]));

    let report: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(report["dry_run"], true);
    assert_eq!(report["user"]["outcome"], "created");
}

#[test]
fn verify_on_empty_server_exits_with_drift_code() {
    let dir = config_dir();
    let assert = changeapp(dir.path(), "test")
        .args(["--mongo-uri", "mem://", "verify"])
        .assert()
        .code(2);

    let out = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(out.contains("user 'changeapp' does not exist"));
    assert!(out.contains("collection changeapp_transactions.transactions does not exist"));
}

#[test]
fn unknown_environment_fails() {
    let dir = config_dir();
    let assert = changeapp(dir.path(), "qa").arg("plan").assert().failure();

    let err = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    assert!(err.contains("unsupported environment 'qa'"));
}
