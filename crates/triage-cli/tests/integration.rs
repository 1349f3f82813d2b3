#![allow(deprecated)]
use assert_cmd::Command;
use mockito::{Matcher, Server, ServerGuard};
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;

fn triage(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("triage").unwrap();
    cmd.current_dir(dir.path())
        .env("TRIAGE_ROOT", dir.path())
        .env_remove("RUST_LOG");
    cmd
}

fn init_against(dir: &TempDir, server: &ServerGuard) {
    triage(dir)
        .args(["config", "init", "--base-url", &server.url()])
        .assert()
        .success();
}

fn write_action(dir: &TempDir, action: serde_json::Value) -> std::path::PathBuf {
    let path = dir.path().join("action.json");
    std::fs::write(&path, action.to_string()).unwrap();
    path
}

fn catalog_mock(server: &mut ServerGuard) -> mockito::Mock {
    server
        .mock("GET", "/api/v1/action/operations")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!([
                {
                    "id": "add_label",
                    "title": "Add label",
                    "priority": 1,
                    "triggers": ["create"],
                    "steps": [{
                        "args": ["label"],
                        "validation": {
                            "warn": { "query": "labels:$label", "message": "already labelled" },
                            "error": { "query": "status:closed", "message": "closed items" }
                        }
                    }]
                },
                {
                    "id": "delete",
                    "title": "Delete",
                    "priority": 9,
                    "roles": ["admin"],
                    "steps": []
                }
            ])
            .to_string(),
        )
        .create()
}

fn count_mock(server: &mut ServerGuard, query: &str, total: u64) -> mockito::Mock {
    server
        .mock("POST", "/api/v1/search")
        .match_body(Matcher::PartialJson(json!({ "query": query, "rows": 0 })))
        .with_status(200)
        .with_body(json!({ "total": total, "items": [], "offset": 0, "rows": 0 }).to_string())
        .create()
}

// ---------------------------------------------------------------------------
// triage config
// ---------------------------------------------------------------------------

#[test]
fn help_lists_commands() {
    let dir = TempDir::new().unwrap();
    triage(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("operations"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("apply"));
}

#[test]
fn config_init_writes_defaults_once() {
    let dir = TempDir::new().unwrap();
    triage(&dir).args(["config", "init"]).assert().success();
    assert!(dir.path().join(".triage/config.yaml").exists());

    triage(&dir)
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    triage(&dir)
        .args(["config", "init", "--force", "--base-url", "https://triage.example"])
        .assert()
        .success();
    triage(&dir)
        .args(["config", "show", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://triage.example"));
}

#[test]
fn config_validate_reports_clean_config() {
    let dir = TempDir::new().unwrap();
    triage(&dir).args(["config", "init"]).assert().success();
    triage(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_fails_on_bad_base_url() {
    let dir = TempDir::new().unwrap();
    triage(&dir)
        .args(["config", "init", "--base-url", "localhost:5000"])
        .assert()
        .success();
    triage(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"))
        .stderr(predicate::str::contains("config validation found errors"));
}

#[test]
fn commands_require_config() {
    let dir = TempDir::new().unwrap();
    triage(&dir)
        .arg("operations")
        .assert()
        .failure()
        .stderr(predicate::str::contains("triage config init"));
}

// ---------------------------------------------------------------------------
// triage operations
// ---------------------------------------------------------------------------

#[test]
fn operations_are_filtered_by_roles() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    let _catalog = catalog_mock(&mut server);
    init_against(&dir, &server);

    triage(&dir)
        .arg("operations")
        .assert()
        .success()
        .stdout(predicate::str::contains("add_label"))
        .stdout(predicate::str::contains("delete").not());

    let output = triage(&dir)
        .args(["operations", "--all", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let ops: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let ids: Vec<_> = ops
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["add_label", "delete"]);
}

// ---------------------------------------------------------------------------
// triage check
// ---------------------------------------------------------------------------

#[test]
fn check_ready_action_with_preview() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    let _catalog = catalog_mock(&mut server);
    let _base = count_mock(&mut server, "status:open", 5);
    let _warn = count_mock(&mut server, "(status:open) AND (labels:phishing)", 2);
    let _error = count_mock(&mut server, "(status:open) AND (status:closed)", 0);
    init_against(&dir, &server);

    let file = write_action(
        &dir,
        json!({
            "name": "Label phishing",
            "query": "status:open",
            "operations": [{ "operation_id": "add_label", "data_json": "{\"label\":\"phishing\"}" }],
            "triggers": ["create"]
        }),
    );

    triage(&dir)
        .args(["check", "--preview"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("5 matching"))
        .stdout(predicate::str::contains("Ready to run."))
        .stdout(predicate::str::contains("add_label step 1: warning"))
        .stdout(predicate::str::contains("already labelled"));
}

#[test]
fn failed_preview_leaves_step_unset_without_blocking() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    let _catalog = catalog_mock(&mut server);
    let _base = count_mock(&mut server, "status:open", 5);
    let _error = count_mock(&mut server, "(status:open) AND (status:closed)", 0);
    let _warn = server
        .mock("POST", "/api/v1/search")
        .match_body(Matcher::PartialJson(json!({
            "query": "(status:open) AND (labels:phishing)"
        })))
        .with_status(500)
        .with_body("index unavailable")
        .create();
    init_against(&dir, &server);

    let file = write_action(
        &dir,
        json!({
            "name": "Label phishing",
            "query": "status:open",
            "operations": [{ "operation_id": "add_label", "data_json": "{\"label\":\"phishing\"}" }]
        }),
    );

    let output = triage(&dir)
        .args(["check", "--preview", "--json"])
        .arg(&file)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let body: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["ready"], true);
    let preview = &body["previews"][0];
    assert_eq!(preview["operation_id"], "add_label");
    assert_eq!(preview["status"], "unset");
    assert!(preview.get("warn_total").is_none());
    assert!(preview["error"].as_str().unwrap().contains("500"));
}

#[test]
fn check_lists_issues_and_fails() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    let _catalog = catalog_mock(&mut server);
    let _base = count_mock(&mut server, "status:open", 5);
    init_against(&dir, &server);

    let file = write_action(
        &dir,
        json!({
            "query": "status:open",
            "operations": [
                { "operation_id": "add_label", "data_json": "{}" },
                { "operation_id": "nope" }
            ]
        }),
    );

    let output = triage(&dir)
        .args(["check", "--json"])
        .arg(&file)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let body: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["ready"], false);
    assert_eq!(body["matches"], 5);
    let issues: Vec<_> = body["issues"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i.as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        issues,
        vec![
            "give this action a name",
            "operation 'add_label' is missing: label",
            "operation 'nope' is not in the catalog",
        ]
    );
}

#[test]
fn check_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    triage(&dir).args(["config", "init"]).assert().success();
    triage(&dir)
        .args(["check", "missing.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read"));
}

// ---------------------------------------------------------------------------
// triage run / apply
// ---------------------------------------------------------------------------

#[test]
fn run_executes_inline_and_prints_report() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    let _catalog = catalog_mock(&mut server);
    let _base = count_mock(&mut server, "status:open", 5);
    let _events = server
        .mock("GET", "/api/v1/events")
        .with_status(404)
        .create();
    let execute = server
        .mock("POST", "/api/v1/action/execute")
        .match_body(Matcher::PartialJson(json!({
            "query": "status:open",
            "operations": [{ "operation_id": "add_label" }]
        })))
        .with_status(200)
        .with_body(
            json!({
                "add_label": [
                    { "title": "Labelled", "message": "5 items", "query": "status:open", "outcome": "success" }
                ]
            })
            .to_string(),
        )
        .create();
    init_against(&dir, &server);

    let file = write_action(
        &dir,
        json!({
            "name": "Label phishing",
            "query": "status:open",
            "operations": [{ "operation_id": "add_label", "data_json": "{\"label\":\"phishing\"}" }]
        }),
    );

    triage(&dir)
        .arg("run")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Labelled"))
        .stdout(predicate::str::contains("1 succeeded, 0 skipped, 0 failed"))
        .stderr(predicate::str::contains("completed"));
    execute.assert();
}

#[test]
fn run_reports_failed_execution() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    let _catalog = catalog_mock(&mut server);
    let _base = count_mock(&mut server, "status:open", 5);
    let _events = server
        .mock("GET", "/api/v1/events")
        .with_status(404)
        .create();
    let _execute = server
        .mock("POST", "/api/v1/action/execute")
        .with_status(500)
        .with_body("boom")
        .create();
    init_against(&dir, &server);

    let file = write_action(
        &dir,
        json!({
            "name": "Label phishing",
            "query": "status:open",
            "operations": [{ "operation_id": "add_label", "data_json": "{\"label\":\"phishing\"}" }]
        }),
    );

    triage(&dir)
        .arg("run")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed\n"))
        .stderr(predicate::str::contains("execution failed"));
}

#[test]
fn run_refuses_unready_action() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    let _catalog = catalog_mock(&mut server);
    let _base = count_mock(&mut server, "status:open", 5);
    let execute = server
        .mock("POST", "/api/v1/action/execute")
        .expect(0)
        .create();
    init_against(&dir, &server);

    let file = write_action(
        &dir,
        json!({
            "name": "Incomplete",
            "query": "status:open",
            "operations": [{ "operation_id": "add_label", "data_json": "{}" }]
        }),
    );

    triage(&dir)
        .arg("run")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("action is not ready"));
    execute.assert();
}

#[test]
fn apply_unknown_action_fails() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    let _lookup = server
        .mock("POST", "/api/v1/search")
        .match_body(Matcher::PartialJson(json!({ "query": "action_id:a404" })))
        .with_status(200)
        .with_body(json!({ "total": 0, "items": [], "offset": 0, "rows": 1 }).to_string())
        .create();
    init_against(&dir, &server);

    triage(&dir)
        .args(["apply", "a404"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("action not found: a404"));
}

#[test]
fn apply_executes_by_reference() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    let stored = json!({
        "action_id": "a1",
        "name": "Close noise",
        "query": "status:open",
        "operations": [{ "operation_id": "add_label", "data_json": "{\"label\":\"noise\"}" }],
        "triggers": []
    });
    let _lookup = server
        .mock("POST", "/api/v1/search")
        .match_body(Matcher::PartialJson(json!({ "query": "action_id:a1" })))
        .with_status(200)
        .with_body(json!({ "total": 1, "items": [stored], "offset": 0, "rows": 1 }).to_string())
        .create();
    let _events = server
        .mock("GET", "/api/v1/events")
        .with_status(404)
        .create();
    let execute = server
        .mock("POST", "/api/v1/action/execute")
        .match_body(Matcher::PartialJson(json!({
            "action_id": "a1",
            "query": "status:new"
        })))
        .with_status(200)
        .with_body(
            json!({ "add_label": [{ "title": "Skipped", "outcome": "skipped" }] }).to_string(),
        )
        .create();
    init_against(&dir, &server);

    let output = triage(&dir)
        .args(["apply", "a1", "--query", "status:new", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let body: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["summary"]["skipped"], 1);
    execute.assert();
}
