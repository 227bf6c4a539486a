//! Binary-level tests for the keyprobe CLI.
//!
//! Covers:
//! - Provider listing (human and JSON)
//! - Input errors and their exit codes
//! - Config file errors
//! - A full `check` run against a mock upstream
//! - The `session` line protocol over stdin/stdout

mod common;

use assert_cmd::Command;
use keyprobe::core::models::{Credential, ProviderConfig};
use keyprobe::core::protocol::ClientCommand;
use keyprobe::test_utils::{TestDir, make_test_config_toml};
use predicates::prelude::*;
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::logger::TestLogger;

/// Command with an isolated config path and no ambient overrides.
#[allow(deprecated)]
fn keyprobe(dir: &TestDir) -> Command {
    let mut cmd = Command::cargo_bin("keyprobe").unwrap();
    cmd.env("KEYPROBE_CONFIG", dir.file_path("config.toml"))
        .env("NO_COLOR", "1")
        .env("RUST_LOG", "off")
        .env_remove("KEYPROBE_CONCURRENCY")
        .env_remove("KEYPROBE_TIMEOUT")
        .env_remove("KEYPROBE_BATCH_SIZE")
        .env_remove("KEYPROBE_KEY")
        .env_remove("KEYPROBE_LOG");
    cmd
}

/// Config with a `local` provider pointed at the mock server.
fn local_config(dir: &TestDir, server: &MockServer) {
    let config = make_test_config_toml().replace("http://127.0.0.1:8000", &server.uri());
    dir.create_file("config.toml", &config);
}

fn parse_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("stdout is JSON")
}

// =============================================================================
// Argument handling
// =============================================================================

#[test]
fn cli_definition_is_consistent() {
    use clap::CommandFactory;
    keyprobe::cli::Cli::command().debug_assert();
}

#[test]
fn unknown_subcommand_is_rejected() {
    let dir = TestDir::new();
    keyprobe(&dir)
        .arg("notacommand")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized").or(predicate::str::contains("error")));
}

#[test]
fn help_lists_commands() {
    let dir = TestDir::new();
    keyprobe(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("check")
                .and(predicate::str::contains("models"))
                .and(predicate::str::contains("providers"))
                .and(predicate::str::contains("session")),
        );
}

// =============================================================================
// Providers
// =============================================================================

#[test]
fn providers_human_lists_builtins() {
    let dir = TestDir::new();
    keyprobe(&dir)
        .arg("providers")
        .assert()
        .success()
        .stdout(predicate::str::contains("openai").and(predicate::str::contains("anthropic")));
}

#[test]
fn providers_json_includes_config_entries() {
    let log = TestLogger::new("providers_json_includes_config_entries");
    let dir = TestDir::new();
    dir.create_file("config.toml", &make_test_config_toml());

    let output = keyprobe(&dir)
        .args(["providers", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let body = parse_json(&output.stdout);
    assert_eq!(body["schemaVersion"], "keyprobe.v1");
    assert_eq!(body["command"], "providers");
    let keys: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["key"].as_str())
        .collect();
    assert!(keys.contains(&"openai"));
    assert!(keys.contains(&"local"));
    log.finish_ok();
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn empty_input_exits_with_invalid_input() {
    let dir = TestDir::new();
    keyprobe(&dir)
        .args(["check", "--keys", " , \n "])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("KP-I001"));
}

#[test]
fn empty_stdin_exits_with_invalid_input() {
    let dir = TestDir::new();
    keyprobe(&dir)
        .arg("check")
        .write_stdin("")
        .assert()
        .code(2);
}

#[test]
fn out_of_range_concurrency_is_rejected() {
    let dir = TestDir::new();
    let output = keyprobe(&dir)
        .args(["check", "--keys", "sk-1", "--concurrency", "21", "--json"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));

    let error = parse_json(&output.stderr);
    assert_eq!(error["errorCode"], "KP-I003");
    assert_eq!(error["exitCode"], 2);
}

#[test]
fn unknown_provider_suggests_listing() {
    let dir = TestDir::new();
    keyprobe(&dir)
        .args(["check", "--provider", "nope", "--keys", "sk-1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("keyprobe providers"));
}

#[test]
fn malformed_config_is_reported_without_panicking() {
    let dir = TestDir::new();
    dir.create_file("config.toml", "[general\ntimeout_seconds = ");
    keyprobe(&dir)
        .arg("providers")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("config").and(predicate::str::contains("panicked").not()));
}

#[test]
fn private_base_url_is_blocked_by_default() {
    let dir = TestDir::new();
    keyprobe(&dir)
        .args(["check", "--base-url", "http://127.0.0.1:9/v1", "--keys", "sk-1"])
        .assert()
        .code(2);
}

// =============================================================================
// Check against a mock upstream
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn check_json_reports_every_key() {
    let log = TestLogger::new("check_json_reports_every_key");
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-good-1111111111"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "x" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({})))
        .mount(&server)
        .await;

    let dir = TestDir::new();
    local_config(&dir, &server);

    log.phase("run");
    let output = keyprobe(&dir)
        .args(["check", "--provider", "local", "--json"])
        .args(["--keys", "sk-good-1111111111\nsk-nope-2222222222\nsk-good-1111111111"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let body = parse_json(&output.stdout);
    let data = &body["data"];
    assert_eq!(data["phase"], "completed");
    assert_eq!(data["total"], 3);
    assert_eq!(data["counts"]["valid"], 1);
    assert_eq!(data["counts"]["invalid"], 1);
    assert_eq!(data["counts"]["duplicate"], 1);

    let results = data["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    // Keys are masked unless --show-keys is given.
    assert!(
        results
            .iter()
            .all(|r| !r["key"].as_str().unwrap().contains("1111111111"))
    );
    log.finish_ok();
}

#[tokio::test(flavor = "multi_thread")]
async fn check_only_filters_human_sections() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let dir = TestDir::new();
    local_config(&dir, &server);

    keyprobe(&dir)
        .args(["check", "--provider", "local", "--only", "valid", "--keys", "sk-a sk-b"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Invalid").not());
}

// =============================================================================
// Session
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn session_streams_results_then_closes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let dir = TestDir::new();
    local_config(&dir, &server);

    let start = ClientCommand::start(
        vec![Credential::new("sk-a", 0), Credential::new("sk-b", 1)],
        ProviderConfig::for_provider("local"),
        2,
    );
    let output = keyprobe(&dir)
        .arg("session")
        .write_stdin(format!("{}\n", start.to_text()))
        .output()
        .unwrap();
    assert!(output.status.success());

    let lines: Vec<Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|l| serde_json::from_str(l).expect("JSON line"))
        .collect();
    let results = lines.iter().filter(|l| l["type"] == "result").count();
    assert_eq!(results, 2);
    assert!(lines.iter().any(|l| l["type"] == "done"));
    let last = lines.last().unwrap();
    assert_eq!(last["type"], "close");
    assert_eq!(last["code"], 1000);
}

#[test]
fn session_without_start_closes_as_stopped() {
    let dir = TestDir::new();
    let output = keyprobe(&dir)
        .arg("session")
        .write_stdin("")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let last: Value = serde_json::from_str(stdout.lines().last().expect("close line")).unwrap();
    assert_eq!(last["type"], "close");
}
