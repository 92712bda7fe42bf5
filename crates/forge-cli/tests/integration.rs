#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn forge(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("forge").unwrap();
    cmd.current_dir(dir.path())
        .env("FORGE_ROOT", dir.path())
        .env_remove("FORGE_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

fn write_events(dir: &TempDir, lines: &[&str]) -> std::path::PathBuf {
    let path = dir.path().join("events.jsonl");
    std::fs::write(&path, lines.join("\n")).unwrap();
    path
}

const HELLO: &[&str] = &[
    r#"{"type":"artifact_add","artifact_id":"m1","title":"Hello app"}"#,
    r#"{"type":"action_add","artifact_id":"m1","action_id":"0","action":{"type":"file","path":"src/hello.txt","content":"hello"}}"#,
    r#"{"type":"action_run","artifact_id":"m1","action_id":"0","action":{"type":"file","path":"src/hello.txt","content":"hello"}}"#,
    r#"{"type":"action_add","artifact_id":"m1","action_id":"1","action":{"type":"shell","command":"cat src/hello.txt > copy.txt"}}"#,
    r#"{"type":"action_run","artifact_id":"m1","action_id":"1","action":{"type":"shell","command":"cat src/hello.txt > copy.txt"}}"#,
    r#"{"type":"artifact_update","artifact_id":"m1","closed":true}"#,
];

// ---------------------------------------------------------------------------
// forge replay
// ---------------------------------------------------------------------------

#[test]
fn replay_executes_actions_in_sandbox() {
    let dir = TempDir::new().unwrap();
    let events = write_events(&dir, HELLO);

    forge(&dir)
        .arg("replay")
        .arg(&events)
        .assert()
        .success()
        .stdout(predicate::str::contains("m1: Hello app (closed)"))
        .stdout(predicate::str::contains("complete"));

    let project = dir.path().join("home/project");
    assert_eq!(std::fs::read_to_string(project.join("src/hello.txt")).unwrap(), "hello");
    assert_eq!(std::fs::read_to_string(project.join("copy.txt")).unwrap(), "hello");
}

#[test]
fn replay_json_reports_statuses() {
    let dir = TempDir::new().unwrap();
    let events = write_events(
        &dir,
        &[
            r#"{"type":"artifact_add","artifact_id":"m1","title":"Broken"}"#,
            r#"{"type":"action_add","artifact_id":"m1","action_id":"0","action":{"type":"shell","command":"false"}}"#,
            r#"{"type":"action_run","artifact_id":"m1","action_id":"0","action":{"type":"shell","command":"false"}}"#,
        ],
    );

    let output = forge(&dir)
        .args(["--json", "replay"])
        .arg(&events)
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let action = &value["artifacts"][0]["actions"][0];
    assert_eq!(action["status"]["type"], "failed");
    assert!(action["status"]["reason"]
        .as_str()
        .unwrap()
        .contains("exit code 1"));
    assert_eq!(action["executed"], true);
}

#[test]
fn replay_reads_stdin() {
    let dir = TempDir::new().unwrap();
    forge(&dir)
        .args(["replay", "-"])
        .write_stdin(HELLO.join("\n"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello app"));
    assert!(dir.path().join("home/project/copy.txt").exists());
}

#[test]
fn replay_rejects_action_for_unknown_artifact() {
    let dir = TempDir::new().unwrap();
    let events = write_events(
        &dir,
        &[
            r#"{"type":"action_add","artifact_id":"ghost","action_id":"0","action":{"type":"shell","command":"true"}}"#,
        ],
    );

    forge(&dir)
        .arg("replay")
        .arg(&events)
        .assert()
        .failure()
        .stderr(predicate::str::contains("artifact not found"))
        .stderr(predicate::str::contains("1 event(s) rejected"));
}

#[test]
fn replay_reports_malformed_line() {
    let dir = TempDir::new().unwrap();
    let events = write_events(
        &dir,
        &[
            r#"{"type":"artifact_add","artifact_id":"m1","title":"x"}"#,
            "this is not json",
        ],
    );

    forge(&dir)
        .arg("replay")
        .arg(&events)
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 2"));
}

#[test]
fn replay_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    forge(&dir)
        .args(["replay", "nope.jsonl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read nope.jsonl"));
}

#[test]
fn replay_follow_prints_status_changes() {
    let dir = TempDir::new().unwrap();
    let events = write_events(&dir, HELLO);

    forge(&dir)
        .args(["replay", "--follow"])
        .arg(&events)
        .assert()
        .success()
        .stdout(predicate::str::contains("[m1] artifact added: Hello app"))
        .stdout(predicate::str::contains("[m1/1] complete"));
}

#[test]
fn replay_uses_configured_workdir() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("forge.yaml"), "workdir: /srv/app\n").unwrap();
    let events = write_events(&dir, HELLO);

    forge(&dir).arg("replay").arg(&events).assert().success();
    assert!(dir.path().join("srv/app/src/hello.txt").exists());
}

#[test]
fn replay_does_not_leave_background_processes_behind() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("forge.yaml"),
        "shell:\n  settle_timeout_ms: 200\n",
    )
    .unwrap();
    let events = write_events(
        &dir,
        &[
            r#"{"type":"artifact_add","artifact_id":"m1","title":"Dev server"}"#,
            r#"{"type":"action_add","artifact_id":"m1","action_id":"0","action":{"type":"shell","command":"sleep 1 && echo alive > survived.txt && npm start"}}"#,
            r#"{"type":"action_run","artifact_id":"m1","action_id":"0","action":{"type":"shell","command":"sleep 1 && echo alive > survived.txt && npm start"}}"#,
        ],
    );

    forge(&dir)
        .arg("replay")
        .arg(&events)
        .assert()
        .success()
        .stdout(predicate::str::contains("complete"));

    std::thread::sleep(std::time::Duration::from_millis(1500));
    assert!(!dir.path().join("home/project/survived.txt").exists());
}

// ---------------------------------------------------------------------------
// forge config
// ---------------------------------------------------------------------------

#[test]
fn config_shows_defaults_without_file() {
    let dir = TempDir::new().unwrap();
    forge(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("workdir: /home/project"))
        .stdout(predicate::str::contains("settle_timeout_ms: 5000"))
        .stdout(predicate::str::contains("No warnings"));
}

#[test]
fn config_flag_overrides_location() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("custom.yaml");
    std::fs::write(&path, "shell:\n  settle_timeout_ms: 250\n").unwrap();

    let output = forge(&dir)
        .args(["--json", "config", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["config"]["shell"]["settle_timeout_ms"], 250);
    assert_eq!(value["config"]["shell"]["program"], "sh");
}

#[test]
fn config_with_errors_fails() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("forge.yaml"),
        "workdir: relative/dir\nshell:\n  long_running_patterns: [\"(\"]\n",
    )
    .unwrap();

    forge(&dir)
        .arg("config")
        .assert()
        .failure()
        .stdout(predicate::str::contains("must be an absolute path"))
        .stdout(predicate::str::contains("does not compile"))
        .stderr(predicate::str::contains("config validation found errors"));
}
