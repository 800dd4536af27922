//! End-to-end CLI tests over a temporary store.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn qt(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("qt").expect("qt binary");
    cmd.current_dir(dir.path())
        .arg("--store")
        .arg(dir.path().join("tally.db"));
    cmd
}

const EVENTS: &str = r#"{"kind":"created","userId":"x","codeId":"c","score":10}
{"kind":"created","userId":"y","codeId":"c","score":10}
{"kind":"deleted","userId":"y","codeId":"c","score":10}
"#;

#[test]
fn init_apply_user_round_trip() {
    let dir = tempfile::tempdir().expect("temp dir");
    let events = dir.path().join("events.jsonl");
    std::fs::write(&events, EVENTS).expect("write events");

    qt(&dir).arg("init").assert().success();

    qt(&dir)
        .arg("apply")
        .arg(&events)
        .assert()
        .success()
        .stdout(predicate::str::contains("applied 3 event(s)"));

    // After create/collide/delete, c is unique to x again.
    qt(&dir)
        .args(["user", "x", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"bestUnique\""))
        .stdout(predicate::str::contains("\"totalScore\": 10"));

    qt(&dir)
        .arg("verify")
        .assert()
        .success()
        .stdout(predicate::str::contains("no drift"));
}

#[test]
fn apply_reads_stdin_and_skips_duplicates() {
    let dir = tempfile::tempdir().expect("temp dir");
    qt(&dir).arg("init").assert().success();

    let one_event = r#"{"kind":"created","userId":"x","codeId":"c","score":5}"#;
    let doubled = format!("{one_event}\n{one_event}\n");

    qt(&dir)
        .args(["apply", "-"])
        .write_stdin(doubled)
        .assert()
        .success()
        .stdout(predicate::str::contains("applied 1 event(s), 1 duplicate(s)"));
}

#[test]
fn rank_prints_the_board() {
    let dir = tempfile::tempdir().expect("temp dir");
    let events = dir.path().join("events.jsonl");
    std::fs::write(
        &events,
        r#"{"kind":"created","userId":"alice","codeId":"c1","score":40}
{"kind":"created","userId":"bob","codeId":"c2","score":15}
"#,
    )
    .expect("write events");

    qt(&dir).arg("apply").arg(&events).assert().success();
    qt(&dir)
        .arg("rank")
        .assert()
        .success()
        .stdout(predicate::str::contains("alice"))
        .stdout(predicate::str::contains("bob"));
}

#[test]
fn malformed_event_line_fails_with_line_number() {
    let dir = tempfile::tempdir().expect("temp dir");
    qt(&dir).arg("init").assert().success();

    qt(&dir)
        .args(["apply", "-"])
        .write_stdin("{not json}\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 1"));
}
