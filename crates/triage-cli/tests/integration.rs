#![allow(deprecated)]
use assert_cmd::Command;
use mockito::{Matcher, Server, ServerGuard};
use predicates::prelude::*;
use tempfile::TempDir;

const ID: &str = "Xcac5C8gRqiOT13YsVRX8A";

const FAST_CONFIG: &str = "\
http:
  timeout_seconds: 5
  max_attempts: 1
  backoff_ms: 0
treeherder:
  push_limit: 1
";

fn write_config(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    path
}

fn triage(dir: &TempDir, server: &ServerGuard) -> Command {
    let mut cmd = Command::cargo_bin("sheriff-triage").unwrap();
    cmd.env("TASKCLUSTER_ROOT_URL", server.url())
        .env("TREEHERDER_URL", server.url())
        .env("SHERIFF_TRIAGE_CONFIG", write_config(dir, "fast.yaml", FAST_CONFIG))
        .env_remove("RUST_LOG");
    cmd
}

// ---------------------------------------------------------------------------
// Mock upstreams
// ---------------------------------------------------------------------------

fn mock_task(server: &mut ServerGuard, worker_type: &str) {
    server
        .mock("GET", format!("/api/queue/v1/task/{ID}").as_str())
        .with_body(
            serde_json::json!({
                "provisionerId": "gecko-t",
                "workerType": worker_type,
                "metadata": { "name": "test-windows11-64-24h2/opt-mochitest-1" }
            })
            .to_string(),
        )
        .create();
    server
        .mock("GET", format!("/api/queue/v1/task/{ID}/status").as_str())
        .with_body(r#"{"status":{"state":"failed","runs":[{"runId":0,"state":"failed"}]}}"#)
        .create();
}

fn mock_pool(server: &mut ServerGuard, pool: &str, version: &str) {
    server
        .mock("GET", format!("/api/worker-manager/v1/worker-pool/{pool}").as_str())
        .with_body(
            serde_json::json!({
                "workerPoolId": pool,
                "config": { "launchConfigs": [ { "workerConfig": { "genericWorker": { "config": {
                    "workerTypeMetaData": { "sbom": format!("https://sbom.example/img-{version}.md") }
                }}}}]}
            })
            .to_string(),
        )
        .create();
}

fn mock_branches(server: &mut ServerGuard, failing_jobs: usize) {
    let jobs: Vec<_> = (0..failing_jobs)
        .map(|i| {
            serde_json::json!({
                "id": i,
                "job_type_name": "test-windows11-64-24h2/opt-mochitest-1",
                "result": "testfailed"
            })
        })
        .collect();
    for branch in ["autoland", "mozilla-central"] {
        server
            .mock("GET", format!("/api/project/{branch}/push/").as_str())
            .match_query(Matcher::Any)
            .with_body(r#"{"results":[{"id":1,"revision":"abc"}]}"#)
            .create();
        server
            .mock("GET", format!("/api/project/{branch}/jobs/").as_str())
            .match_query(Matcher::UrlEncoded("push_id".into(), "1".into()))
            .with_body(serde_json::json!({ "results": jobs }).to_string())
            .create();
    }
}

fn mock_classification(server: &mut ServerGuard, id: u32) {
    server
        .mock("GET", "/api/project/autoland/jobs/")
        .match_query(Matcher::UrlEncoded("task_id".into(), ID.into()))
        .with_body(format!(
            r#"{{"results":[{{"id":55,"failure_classification_id":{id}}}]}}"#
        ))
        .create();
}

fn mock_alpha_image_change(server: &mut ServerGuard) {
    mock_task(server, "win11-64-24h2-alpha");
    mock_pool(server, "gecko-t/win11-64-24h2-alpha", "1.0.9");
    mock_pool(server, "gecko-t/win11-64-24h2", "1.0.8");
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

#[test]
fn json_reports_image_regression() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    mock_alpha_image_change(&mut server);
    mock_branches(&mut server, 0);
    mock_classification(&mut server, 1);

    let output = triage(&dir, &server)
        .args(["--json", ID])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report = stdout_json(&output);
    assert_eq!(report["task_id"], ID);
    assert_eq!(report["verdict"], "IMAGE_REGRESSION");
    assert_eq!(report["confidence"], "high");
    assert_eq!(report["rule"], "alpha_image_changed");
    assert_eq!(report["production_pool"], "gecko-t/win11-64-24h2");
    assert_eq!(report["context"]["job_name"], "opt-mochitest-1");
}

#[test]
fn json_mode_keeps_progress_off_stderr() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    mock_alpha_image_change(&mut server);
    mock_branches(&mut server, 0);
    mock_classification(&mut server, 1);

    triage(&dir, &server)
        .args(["-j", ID])
        .assert()
        .success()
        .stderr(predicate::str::contains("[1/5]").not());
}

#[test]
fn intermittent_classification_wins() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    mock_alpha_image_change(&mut server);
    mock_branches(&mut server, 4);
    mock_classification(&mut server, 4);

    let output = triage(&dir, &server)
        .args(["--json", ID])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["verdict"], "INTERMITTENT");
}

#[test]
fn production_failures_are_code_regression() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    mock_task(&mut server, "win11-64-24h2");
    mock_pool(&mut server, "gecko-t/win11-64-24h2", "1.0.8");
    mock_branches(&mut server, 2);
    mock_classification(&mut server, 1);

    let output = triage(&dir, &server)
        .args(["--json", ID])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["verdict"], "CODE_REGRESSION");
    assert_eq!(report["confidence"], "medium");
}

// ---------------------------------------------------------------------------
// Prose output
// ---------------------------------------------------------------------------

#[test]
fn prose_report_with_progress_on_stderr() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    mock_alpha_image_change(&mut server);
    mock_branches(&mut server, 0);
    mock_classification(&mut server, 1);

    triage(&dir, &server)
        .arg(ID)
        .assert()
        .success()
        .stdout(predicate::str::starts_with(format!("## Triage Report: {ID}")))
        .stdout(predicate::str::contains("### Verdict: **IMAGE_REGRESSION**"))
        .stdout(predicate::str::contains("### Recommended Actions"))
        .stdout(predicate::str::contains("[1/5]").not())
        .stderr(predicate::str::contains(format!("Triaging task: {ID}")))
        .stderr(predicate::str::contains("[1/5] Getting task info..."))
        .stderr(predicate::str::contains("[5/5] Determining verdict..."));
}

#[test]
fn task_url_is_accepted() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    mock_alpha_image_change(&mut server);
    mock_branches(&mut server, 0);
    mock_classification(&mut server, 1);

    let url = format!("https://firefox-ci-tc.services.mozilla.com/tasks/{ID}/runs/0");
    let output = triage(&dir, &server)
        .args(["--json", url.as_str()])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["task_id"], ID);
}

// ---------------------------------------------------------------------------
// Degraded signals
// ---------------------------------------------------------------------------

#[test]
fn skip_treeherder_marks_branches_unavailable() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    mock_alpha_image_change(&mut server);
    mock_classification(&mut server, 1);
    let pushes = server
        .mock("GET", Matcher::Regex(r"^/api/project/[\w-]+/push/$".into()))
        .match_query(Matcher::Any)
        .expect(0)
        .create();

    let output = triage(&dir, &server)
        .args(["--json", "--skip-treeherder", ID])
        .output()
        .unwrap();
    assert!(output.status.success());
    pushes.assert();

    let report = stdout_json(&output);
    assert_eq!(report["verdict"], "NEEDS_INVESTIGATION");
    let branch = &report["raw_signals"]["cross_branch_failure_count"]["autoland"];
    assert_eq!(branch["status"], "unknown");
    assert_eq!(branch["value"], "skipped");
}

#[test]
fn unreachable_treeherder_still_exits_zero() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    mock_alpha_image_change(&mut server);

    triage(&dir, &server)
        .env("TREEHERDER_URL", "http://127.0.0.1:1")
        .arg(ID)
        .assert()
        .success()
        .stdout(predicate::str::contains("NEEDS_INVESTIGATION"))
        .stdout(predicate::str::contains("unavailable"));
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn missing_task_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    server
        .mock("GET", format!("/api/queue/v1/task/{ID}").as_str())
        .with_status(404)
        .create();

    triage(&dir, &server)
        .args(["--json", ID])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("task not found"));
}

#[test]
fn path_like_input_stays_inside_task_endpoint() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    mock_task(&mut server, "win11-64-24h2");
    server
        .mock("GET", format!("/api/queue/v1/task/{ID}%2Fstatus").as_str())
        .with_status(404)
        .create();

    let input = format!("{ID}/status");
    triage(&dir, &server)
        .args(["--json", input.as_str()])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("task not found"));
}

#[test]
fn invalid_config_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    let path = write_config(&dir, "bad.yaml", "http:\n  timeout_seconds: 0\n");
    let upstream = server.mock("GET", Matcher::Any).expect(0).create();

    triage(&dir, &server)
        .env("SHERIFF_TRIAGE_CONFIG", &path)
        .arg(ID)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("invalid configuration"))
        .stderr(predicate::str::contains("http.timeout_seconds=0 is outside 1..=300"));
    upstream.assert();
}

#[test]
fn missing_config_file_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    let server = Server::new();

    triage(&dir, &server)
        .arg("--config")
        .arg(dir.path().join("nope.yaml"))
        .arg(ID)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

#[test]
fn task_argument_is_required() {
    let dir = TempDir::new().unwrap();
    let server = Server::new();
    triage(&dir, &server).assert().failure();
}
