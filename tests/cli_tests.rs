use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn write_config(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("runner.toml");
    let contents = format!(
        r#"[orchestrator]
poll_interval_seconds = 0

[persistence]
directory = "{}"

[simulation]
state_directory = "{}"
run_duration_seconds = 0

[observability]
log_level = "warn"
json_logs = false
metrics_enabled = false
"#,
        dir.path().join("continuations").display(),
        dir.path().join("jobs").display()
    );
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("omics-runner").unwrap();

    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("resume"))
        .stdout(predicate::str::contains("worker"))
        .stdout(predicate::str::contains("graph"));
}

#[test]
fn test_graph_prints_every_state() {
    let mut cmd = Command::cargo_bin("omics-runner").unwrap();

    cmd.arg("graph")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"CheckStartRequest\""))
        .stdout(predicate::str::contains("\"WaitForJob\""))
        .stdout(predicate::str::contains("\"Failed\""));
}

#[test]
fn test_run_drives_simulated_job_to_success() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    let input = dir.path().join("input.json");
    std::fs::write(
        &input,
        r#"{"analysisId":"cli-1","startRequest":{"workflowId":"1234567","name":"demo"}}"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("omics-runner").unwrap();
    cmd.arg("--config")
        .arg(&config)
        .arg("run")
        .arg("--input")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"completed\""))
        .stdout(predicate::str::contains("\"result\": \"succeeded\""));
}

#[test]
fn test_run_exits_non_zero_when_analysis_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    let input = dir.path().join("input.json");
    std::fs::write(
        &input,
        r#"{"analysisId":"cli-2","startRequest":{"workflowId":"1234567","parameters":{"simulateFailure":true}}}"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("omics-runner").unwrap();
    cmd.arg("--config")
        .arg(&config)
        .arg("run")
        .arg("--input")
        .arg(&input)
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"status\": \"completed\""))
        .stdout(predicate::str::contains("\"result\": \"failed\""))
        .stderr(predicate::str::contains("FAILED"));
}

#[test]
fn test_status_of_unknown_invocation_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    let mut cmd = Command::cargo_bin("omics-runner").unwrap();
    cmd.arg("--config")
        .arg(&config)
        .arg("status")
        .arg("missing")
        .assert()
        .failure()
        .stdout(predicate::str::contains("NotFound"));
}
