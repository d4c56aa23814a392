//! End-to-end integration tests for the complete burndown flow.
//!
//! Tests the full pipeline: import → sprint set → report / sprints / events,
//! against a database in a temporary directory.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use serde_json::Value;
use tempfile::TempDir;

fn burndown_binary() -> String {
    env!("CARGO_BIN_EXE_burndown").to_string()
}

/// A `burndown` command isolated to `temp`, with days bucketed in UTC.
fn burndown(temp: &Path) -> Command {
    let mut cmd = Command::new(burndown_binary());
    cmd.env("HOME", temp)
        .env_remove("XDG_CONFIG_HOME")
        .env_remove("XDG_DATA_HOME")
        .env_remove("RUST_LOG")
        .env("BURNDOWN_DATABASE_PATH", temp.join("burndown.db"))
        .env("TZ", "UTC");
    cmd
}

fn run(temp: &Path, args: &[&str]) -> Output {
    burndown(temp).args(args).output().expect("failed to run burndown")
}

fn import(temp: &Path, input: &str) -> Output {
    let mut child = burndown(temp)
        .arg("import")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn burndown import");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn assert_success(output: &Output, what: &str) {
    assert!(
        output.status.success(),
        "{what} should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Sprint 12 with two tasks: T1 carried in with 3 points and closed on
/// Tuesday, T2 added Monday with 2 points and re-estimated to 5 on Wednesday.
const SPRINT_JSONL: &str = r#"
{"type":"scope","id":"PHID-PROJ-12","name":"Sprint 12"}
{"type":"scope","id":"PHID-PROJ-1","name":"Backend"}
{"type":"task","id":"PHID-TASK-1","monogram":"T1","title":"Fix login","status":"resolved","scopes":["PHID-PROJ-12","PHID-PROJ-1"]}
{"type":"task","id":"PHID-TASK-2","monogram":"T2","title":"Add logout","status":"open","owner":"alice","scopes":["PHID-PROJ-12"]}
{"type":"mutation","id":"x1","subject_id":"PHID-TASK-1","kind":"title","new_value":"Fix login","timestamp":1748772000}
{"type":"mutation","id":"x2","subject_id":"PHID-TASK-1","kind":"status","new_value":"open","timestamp":1748772000}
{"type":"mutation","id":"x3","subject_id":"PHID-TASK-1","kind":"customfield","new_value":"3","timestamp":1748772000,"metadata":{"customfield:key":"isdc:sprint:storypoints"}}
{"type":"mutation","id":"x4","subject_id":"PHID-TASK-1","kind":"projects","old_value":[],"new_value":["PHID-PROJ-12","PHID-PROJ-1"],"timestamp":1748772000}
{"type":"mutation","id":"x5","subject_id":"PHID-TASK-2","kind":"title","new_value":"Add logout","timestamp":1748854800}
{"type":"mutation","id":"x6","subject_id":"PHID-TASK-2","kind":"status","new_value":"open","timestamp":1748854800}
{"type":"mutation","id":"x7","subject_id":"PHID-TASK-2","kind":"customfield","new_value":2,"timestamp":1748854800,"metadata":{"customfield:key":"isdc:sprint:storypoints"}}
{"type":"mutation","id":"x8","subject_id":"PHID-TASK-2","kind":"projects","old_value":[],"new_value":["PHID-PROJ-12"],"timestamp":1748854800}
{"type":"mutation","id":"x9","subject_id":"PHID-TASK-1","kind":"status","old_value":"open","new_value":"resolved","timestamp":1748962800}
{"type":"mutation","id":"x10","subject_id":"PHID-TASK-2","kind":"customfield","old_value":2,"new_value":5,"timestamp":1749034800,"metadata":{"customfield:key":"isdc:sprint:storypoints"}}
{"type":"mutation","id":"x11","subject_id":"PHID-TASK-2","kind":"comment","new_value":"looks good","timestamp":1749034900}
"#;

/// Imports the fixture sprint and sets its window to Mon Jun 2 to Wed Jun 4 2025.
fn setup_sprint(temp: &Path) {
    let output = import(temp, SPRINT_JSONL);
    assert_success(&output, "import");

    let output = run(
        temp,
        &[
            "sprint",
            "set",
            "PHID-PROJ-12",
            "--start",
            "2025-06-02",
            "--end",
            "2025-06-04",
        ],
    );
    assert_success(&output, "sprint set");
}

#[test]
fn test_import_reports_counts_and_is_idempotent() {
    let temp = TempDir::new().unwrap();

    let first = import(temp.path(), SPRINT_JSONL);
    assert_success(&first, "first import");
    assert_eq!(
        String::from_utf8_lossy(&first.stdout).trim(),
        "Imported 2 scopes, 2 tasks, 11 mutation records (11 new)"
    );

    let second = import(temp.path(), SPRINT_JSONL);
    assert_success(&second, "second import");
    assert!(String::from_utf8_lossy(&second.stdout).contains("(0 new)"));
}

#[test]
fn test_report_json_end_to_end() {
    let temp = TempDir::new().unwrap();
    setup_sprint(temp.path());

    let output = run(temp.path(), &["report", "PHID-PROJ-12", "--json"]);
    assert_success(&output, "report --json");

    let json: Value = serde_json::from_slice(&output.stdout).expect("report output is JSON");
    assert_eq!(json["scope"]["name"], "Sprint 12");
    assert!(json["timezone"].is_string());

    let buckets = json["buckets"].as_array().unwrap();
    assert_eq!(buckets.len(), 5);
    let totals: Vec<f64> = buckets
        .iter()
        .map(|b| b["total_points"].as_f64().unwrap())
        .collect();
    assert_eq!(totals, vec![3.0, 5.0, 5.0, 8.0, 8.0]);
    let remaining: Vec<f64> = buckets
        .iter()
        .map(|b| b["remaining_points"].as_f64().unwrap())
        .collect();
    assert_eq!(remaining, vec![3.0, 5.0, 2.0, 5.0, 5.0]);

    // The sprint is in the past, so every chart point is plotted.
    let chart = json["chart"].as_array().unwrap();
    assert!(chart.iter().all(|p| !p["remaining_points"].is_null()));
    let ideal: Vec<f64> = chart
        .iter()
        .map(|p| p["ideal_points"].as_f64().unwrap())
        .collect();
    assert_eq!(ideal, vec![3.0, 2.0, 1.0, 0.0, 0.0]);

    assert_eq!(json["events"].as_array().unwrap().len(), 8);
    assert_eq!(json["tasks"][1]["owner"], "alice");
}

#[test]
fn test_report_text_end_to_end() {
    let temp = TempDir::new().unwrap();
    setup_sprint(temp.path());

    let output = run(temp.path(), &["report", "PHID-PROJ-12"]);
    assert_success(&output, "report");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("BURNDOWN: Sprint 12"));
    assert!(stdout.contains("Sprint: Mon Jun 2 to Wed Jun 4"));
    assert!(stdout.contains("T2: Add logout  open"));
    assert!(stdout.contains("closed as resolved"));
}

#[test]
fn test_report_without_window_is_a_plain_error() {
    let temp = TempDir::new().unwrap();
    assert_success(&import(temp.path(), SPRINT_JSONL), "import");

    let output = run(temp.path(), &["report", "PHID-PROJ-12"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("PHID-PROJ-12 is not set up for burndowns"),
        "unexpected stderr: {stderr}"
    );
    assert!(!stderr.contains("Error:"));
}

#[test]
fn test_report_on_empty_sprint_fails() {
    let temp = TempDir::new().unwrap();
    let input = r#"{"type":"scope","id":"PHID-PROJ-99","name":"Sprint 99","sprint_start":1748822400,"sprint_end":1749081599}"#;
    assert_success(&import(temp.path(), input), "import");

    let output = run(temp.path(), &["report", "PHID-PROJ-99"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("has no tasks"));
}

#[test]
fn test_sprint_set_rejects_non_sprint() {
    let temp = TempDir::new().unwrap();
    assert_success(&import(temp.path(), SPRINT_JSONL), "import");

    let output = run(
        temp.path(),
        &[
            "sprint",
            "set",
            "PHID-PROJ-1",
            "--start",
            "2025-06-02",
            "--end",
            "2025-06-04",
        ],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Backend is not a sprint"));
}

#[test]
fn test_sprints_lists_only_sprints() {
    let temp = TempDir::new().unwrap();
    setup_sprint(temp.path());

    let output = run(temp.path(), &["sprints", "--json"]);
    assert_success(&output, "sprints --json");

    let json: Value = serde_json::from_slice(&output.stdout).unwrap();
    let sprints = json.as_array().unwrap();
    assert_eq!(sprints.len(), 1);
    assert_eq!(sprints[0]["id"], "PHID-PROJ-12");
    assert_eq!(sprints[0]["start"], "2025-06-02T00:00:00+00:00");
    assert_eq!(sprints[0]["end"], "2025-06-04T23:59:59+00:00");
}

#[test]
fn test_events_for_non_sprint_scope() {
    let temp = TempDir::new().unwrap();
    assert_success(&import(temp.path(), SPRINT_JSONL), "import");

    let output = run(temp.path(), &["events", "PHID-PROJ-1"]);
    assert_success(&output, "events");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let events: Vec<Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    // create, points, scope add, close for T1 only.
    assert_eq!(events.len(), 4);
    assert!(events.iter().all(|e| e["subject_id"] == "PHID-TASK-1"));
    assert_eq!(events[3]["kind"]["type"], "close");
    assert_eq!(events[2]["label"], "added to scope");
}
