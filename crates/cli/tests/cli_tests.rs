//! CLI integration tests

use std::process::{Command, Output};

fn mla(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mla"))
        .args(args)
        .env("NO_COLOR", "1")
        .env_remove("MLA_API_URL")
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = mla(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("ML Analytics"), "Should show app name");
    assert!(stdout.contains("train"), "Should show train command");
    assert!(stdout.contains("validate"), "Should show validate command");
    assert!(stdout.contains("probe"), "Should show probe command");
    assert!(stdout.contains("health"), "Should show health command");
    assert!(stdout.contains("--api-url"), "Should show api-url option");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = mla(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("mla"), "Should show binary name");
}

/// Test that unknown model kinds are rejected before any request
#[test]
fn test_train_rejects_unknown_model() {
    let output = mla(&["train", "classifier"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("forecaster"), "Should list valid models");
}

/// Test validate subcommand help
#[test]
fn test_validate_help() {
    let output = mla(&["validate", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--limit"), "Should show limit option");
    assert!(stdout.contains("anomaly"), "Should show model values");
}

/// Test a successful training run against a mock service
#[test]
fn test_train_against_mock_service() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/api/train/anomaly")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"status":"success","message":"Anomaly detection model trained on 240 records and saved to artifacts/anomaly_model.json","training_records":240,"threshold":0.6123}"#,
        )
        .create();

    let url = server.url();
    let output = mla(&["--api-url", &url, "train", "anomaly"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    mock.assert();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("trained on 240 records"));
    assert!(stdout.contains("training_records"));
}

/// Test that an error envelope yields a failing exit status
#[test]
fn test_validate_error_exits_nonzero() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/api/validate/recommender")
        .with_status(500)
        .with_body(
            r#"{"status":"error","message":"Model not found at artifacts/recommender_model.json or artifacts/recommender_labels.json. Run training first."}"#,
        )
        .create();

    let url = server.url();
    let output = mla(&["--api-url", &url, "--format", "json", "validate", "recommender"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stdout.contains("\"status\": \"error\""));
    assert!(stderr.contains("HTTP 500"));
}
