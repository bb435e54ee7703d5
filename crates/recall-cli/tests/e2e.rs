//! End-to-end tests for recall CLI commands.
//!
//! These tests run the real binary: one-shot chunking commands against
//! temporary files, and a full session lifecycle against a served address.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin for tests

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

fn recall() -> Command {
    let mut cmd = Command::cargo_bin("recall").expect("Failed to find recall binary");
    cmd.env_remove("RECALL_ADDR");
    cmd
}

/// Write `content` to a file in a fresh temp dir.
fn temp_file(name: &str, content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join(name);
    fs::write(&path, content).expect("Failed to write file");
    (temp_dir, path)
}

fn json_stdout(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("stdout is not JSON")
}

// =============================================================================
// Chunking
// =============================================================================

#[test]
fn test_info_reports_metrics() {
    let (_dir, path) = temp_file("notes.md", &format!("# Notes\n{}", "a".repeat(250_000)));
    let info = json_stdout(recall().arg("info").arg(&path));

    assert_eq!(info["character_count"], 250_008);
    assert_eq!(info["line_count"], 2);
    assert_eq!(info["estimated_unit_count"], 62_502);
    assert_eq!(info["suggested_chunk_count"], 3);
    assert_eq!(info["has_structure"], true);
    assert_eq!(info["structure_types"][0], "markdown_headings");
    assert!(info["file"].as_str().unwrap().ends_with("notes.md"));
}

#[test]
fn test_boundaries_lists_kinds() {
    let (_dir, path) = temp_file("code.py", "import os\n\ndef main():\n    pass\n\nx = 1\n");
    let boundaries = json_stdout(recall().arg("boundaries").arg(&path));
    let boundaries = boundaries.as_array().unwrap();

    assert_eq!(boundaries.len(), 2);
    assert_eq!(boundaries[0]["kind"], "definition");
    assert_eq!(boundaries[0]["line"], 3);
    assert_eq!(boundaries[0]["text"], "def main():");
    assert_eq!(boundaries[1]["kind"], "paragraph-break");
    assert_eq!(boundaries[1]["line"], 6);
}

#[test]
fn test_chunk_with_custom_size() {
    let (_dir, path) = temp_file("flat.txt", &"z".repeat(2_500));
    let chunks = json_stdout(
        recall()
            .args(["chunk", "--size", "1000", "--overlap", "100"])
            .arg(&path),
    );
    let chunks = chunks.as_array().unwrap();

    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[1]["start_offset"], 900);
    assert_eq!(chunks[1]["overlap_with_previous"], 100);
    assert_eq!(chunks[2]["end_offset"], 2_500);
}

#[test]
fn test_missing_file_fails() {
    recall()
        .args(["info", "/nonexistent/recall/input.txt"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("is not a file"));
}

// =============================================================================
// Sessions
// =============================================================================

#[test]
fn test_addr_prints_fresh_addresses() {
    let first = recall().arg("addr").assert().success().get_output().stdout.clone();
    let second = recall().arg("addr").assert().success().get_output().stdout.clone();
    assert_ne!(first, second);

    recall()
        .args(["addr", "--tcp"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^127\.0\.0\.1:\d+\n$").unwrap());
}

#[test]
fn test_submit_without_server_is_refused() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let address = temp_dir.path().join("nobody.sock");

    recall()
        .arg("submit")
        .arg(&address)
        .arg("x = 1")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("connection refused"))
        .stderr(predicate::str::contains("hint:"));
}

/// A `recall serve` child process.
#[cfg(unix)]
struct ServedSession {
    _temp_dir: TempDir,
    address: PathBuf,
    child: std::process::Child,
}

#[cfg(unix)]
impl ServedSession {
    fn start() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let address = temp_dir.path().join("session.sock");
        let child = std::process::Command::new(assert_cmd::cargo::cargo_bin("recall"))
            .arg("serve")
            .arg(&address)
            .stderr(std::process::Stdio::null())
            .spawn()
            .expect("Failed to spawn server");

        wait_for(&address, true);
        Self {
            _temp_dir: temp_dir,
            address,
            child,
        }
    }

    fn submit(&self) -> Command {
        let mut cmd = recall();
        cmd.arg("submit").arg(&self.address);
        cmd
    }
}

#[cfg(unix)]
impl Drop for ServedSession {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(unix)]
fn wait_for(path: &Path, exists: bool) {
    for _ in 0..200 {
        if path.exists() == exists {
            return;
        }
        std::thread::sleep(std::time::Duration::from_millis(25));
    }
    panic!("Timed out waiting for {}", path.display());
}

#[cfg(unix)]
#[test]
fn test_session_lifecycle() {
    let mut session = ServedSession::start();

    // No output: the visible names are printed instead.
    session
        .submit()
        .arg("x = 41")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"x\""));

    session
        .submit()
        .arg("x += 1\nprint(x)")
        .assert()
        .success()
        .stdout("42\n");

    session
        .submit()
        .arg("print('partial')\ny = 1 / 0")
        .assert()
        .code(1)
        .stdout("partial\n")
        .stderr(predicate::str::contains("ZeroDivisionError"));

    session
        .submit()
        .write_stdin("results['worker-1'] = {'found': x}\n")
        .assert()
        .success();

    let (_dir, code_file) = temp_file("step.rc", "print(results['worker-1']['found'])\n");
    let mut at_file = std::ffi::OsString::from("@");
    at_file.push(&code_file);
    session
        .submit()
        .arg(&at_file)
        .assert()
        .success()
        .stdout("42\n");
    session
        .submit()
        .arg("--file")
        .arg(&code_file)
        .assert()
        .success()
        .stdout("42\n");

    let vars = json_stdout(session.submit().arg("--vars"));
    assert_eq!(vars["results"], "dict");
    assert_eq!(vars["x"], "int");

    session.submit().arg("--shutdown").assert().success();
    let status = session.child.wait().expect("Failed to wait for server");
    assert!(status.success());
    wait_for(&session.address, false);

    session
        .submit()
        .arg("print(x)")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("connection refused"));
}

#[cfg(unix)]
#[test]
fn test_serve_refuses_live_address() {
    let session = ServedSession::start();

    recall()
        .arg("serve")
        .arg(&session.address)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("address in use"));

    session.submit().arg("--shutdown").assert().success();
}

#[cfg(unix)]
#[test]
fn test_sigterm_stops_a_busy_session() {
    let mut session = ServedSession::start();

    let mut busy = std::process::Command::new(assert_cmd::cargo::cargo_bin("recall"))
        .arg("submit")
        .arg(&session.address)
        .arg("while True:\n    pass")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .expect("Failed to spawn submit");
    std::thread::sleep(std::time::Duration::from_millis(500));

    let pid = session.child.id().to_string();
    let status = std::process::Command::new("kill")
        .args(["-TERM", pid.as_str()])
        .status()
        .expect("Failed to run kill");
    assert!(status.success());

    let mut exited = None;
    for _ in 0..200 {
        exited = session.child.try_wait().expect("Failed to poll server");
        if exited.is_some() {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(25));
    }
    let exited = exited.expect("Server kept running after SIGTERM");
    assert!(exited.success());
    assert!(!session.address.exists());

    // The submitter loses its connection instead of hanging.
    let submitted = busy.wait().expect("Failed to wait for submit");
    assert!(!submitted.success());
}

#[test]
fn test_address_from_environment() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let address = temp_dir.path().join("env.sock");

    recall()
        .env("RECALL_ADDR", &address)
        .args(["submit", "--vars"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("env.sock"));
}
