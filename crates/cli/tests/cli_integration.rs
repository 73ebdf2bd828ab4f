//! CLI integration tests for every subcommand.
//!
//! Uses `assert_cmd` to spawn the `rips` binary and verify exit codes,
//! stdout content and stderr content. Rule files live in
//! `tests/fixtures/`.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// Helper: create a Command for the `rips` binary, rooted at the fixtures.
fn rips() -> Command {
    let mut cmd = cargo_bin_cmd!("rips");
    cmd.current_dir(fixtures());
    cmd.env_remove("RIPS_LOG");
    cmd
}

/// Level scripts that always succeed.
fn scripts_for(levels: &[&str]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for level in levels {
        for suffix in ["from", "to"] {
            let path = dir.path().join(format!("{}.{}", level, suffix));
            fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
    }
    dir
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    rips()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Reactive intrusion prevention"));
}

#[test]
fn version_exits_0() {
    rips()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rips"));
}

#[test]
fn run_rejects_socket_with_stdin() {
    rips()
        .args(["run", "--stdin", "--socket", "/tmp/x.sock", "dead.rul"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

// ──────────────────────────────────────────────
// 2. Check
// ──────────────────────────────────────────────

#[test]
fn check_valid_file_exits_0() {
    rips()
        .args(["check", "monitor.rul"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ok (3 levels, 1 vars, 6 rules)"));
}

#[test]
fn check_dump_prints_the_folded_program() {
    rips()
        .args(["check", "--dump", "dead.rul"])
        .assert()
        .success()
        .stdout(predicate::str::contains("set(num, 16)"))
        .stdout(predicate::str::contains("topicin(\"/a\")").not());
}

#[test]
fn check_reports_errors_with_position() {
    rips()
        .args(["check", "divzero.rul"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("divzero.rul:4:"))
        .stderr(predicate::str::contains("division by zero"));
}

#[test]
fn check_json_lists_errors() {
    let out = rips()
        .args(["--output", "json", "check", "divzero.rul"])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let errors: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let errors = errors.as_array().expect("array of errors");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["line"], 4);
    assert!(errors[0]["message"].as_str().unwrap().contains("division by zero"));
}

#[test]
fn check_missing_file_fails() {
    rips()
        .args(["check", "nope.rul"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read file"));
}

// ──────────────────────────────────────────────
// 3. Render
// ──────────────────────────────────────────────

#[test]
fn render_prints_rust_source() {
    rips()
        .args(["render", "monitor.rul"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pub struct Rules {"))
        .stdout(predicate::str::contains("fn section_external("));
}

#[test]
fn render_writes_the_output_file() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("rules.rs");
    rips()
        .args(["render", "dead.rul", "-o"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote"));
    let text = fs::read_to_string(&out).unwrap();
    assert!(text.contains("pub num: Value,"));
}

// ──────────────────────────────────────────────
// 4. Run
// ──────────────────────────────────────────────

const CHATTER: &str = "---\nevent: message\nfromtopic: /chatter\n...\n---\nevent: message\nfromtopic: /chatter\n...\n";

#[test]
fn run_stdin_serves_the_stream() {
    let scripts = scripts_for(&["normal", "alarm"]);
    let ids = TempDir::new().unwrap();
    rips()
        .args(["run", "--stdin", "--scripts"])
        .arg(scripts.path())
        .arg("--ids-dir")
        .arg(ids.path())
        .arg("dead.rul")
        .write_stdin(CHATTER)
        .assert()
        .success()
        .stdout(predicate::str::contains("level: 'normal'\ngravity: 0.000000"))
        .stdout(predicate::str::contains("alert: '16'"))
        .stdout(predicate::str::contains("level: 'alarm'\ngravity: 1.000000"))
        .stderr(predicate::str::contains("Compiling:"));
}

#[test]
fn run_requires_level_scripts() {
    let scripts = TempDir::new().unwrap();
    rips()
        .args(["run", "--stdin", "--scripts"])
        .arg(scripts.path())
        .arg("dead.rul")
        .write_stdin(CHATTER)
        .assert()
        .failure()
        .stderr(predicate::str::contains("4 level script(s) missing"));
}

#[test]
fn run_reports_decode_errors() {
    let scripts = scripts_for(&["normal", "alarm"]);
    rips()
        .args(["--quiet", "run", "--stdin", "--scripts"])
        .arg(scripts.path())
        .arg("dead.rul")
        .write_stdin("---\nevent: [message\n...\n")
        .assert()
        .code(1);
}

#[test]
fn run_reads_settings_from_config() {
    let scripts = scripts_for(&["normal", "alarm"]);
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("rips.toml");
    fs::write(
        &config,
        format!("scripts = {:?}\npoll_ms = 20\n", scripts.path().display().to_string()),
    )
    .unwrap();
    rips()
        .args(["run", "--stdin", "--config"])
        .arg(&config)
        .arg("dead.rul")
        .write_stdin(CHATTER)
        .assert()
        .success()
        .stdout(predicate::str::contains("alert: '16'"));
}

#[test]
fn run_rejects_unknown_config_keys() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("rips.toml");
    fs::write(&config, "sockett = \"/tmp/x\"\n").unwrap();
    rips()
        .args(["run", "--stdin", "--config"])
        .arg(&config)
        .arg("dead.rul")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error parsing config"));
}
