use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const BIN: &str = "resolve-bridge";

const ISOLATED_VARS: &[&str] = &[
    "RESOLVE_BRIDGE_URL",
    "RESOLVE_BRIDGE_TOKEN",
    "RESOLVE_BRIDGE_TIMEOUT_SECONDS",
    "RESOLVE_BRIDGE_LOG_DIR",
    "RESOLVE_PYTHON",
    "RESOLVE_TIMEOUT_SECONDS",
    "BRIDGE_TOKEN",
    "BRIDGE_BIND",
    "BRIDGE_PORT",
    "DAVINCI_MCP_PATH",
    "DAVINCI_MCP_COMMAND",
    "FAKE_TOOL_SERVER_MODE",
    "RUST_LOG",
];

/// Command with a throwaway HOME, no config file and none of our env vars inherited.
fn cli(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin(BIN).unwrap();
    for var in ISOLATED_VARS {
        cmd.env_remove(var);
    }
    cmd.env("HOME", home.path())
        .arg("--config")
        .arg(home.path().join("missing.toml"));
    cmd
}

#[cfg(unix)]
fn fake_interpreter(dir: &Path, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-python");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

#[test]
fn test_help_lists_commands() {
    let home = TempDir::new().unwrap();
    cli(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("exec"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("proxy"));
}

#[test]
fn test_exec_list_blocked_prints_denylist() {
    let home = TempDir::new().unwrap();
    cli(&home)
        .args(["exec", "--list-blocked"])
        .assert()
        .success()
        .stdout(predicate::str::contains("os.system("))
        .stdout(predicate::str::contains("import requests"));
}

#[test]
fn test_exec_blocked_code_exits_with_failure_json() {
    let home = TempDir::new().unwrap();
    let output = cli(&home)
        .args(["exec", "import socket\nsocket.socket()"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["exitCode"], 1);
    assert_eq!(result["stdout"], "");
    assert!(result["stderr"]
        .as_str()
        .unwrap()
        .contains("\"import socket\""));
}

#[cfg(unix)]
#[test]
fn test_exec_propagates_script_exit_code() {
    let home = TempDir::new().unwrap();
    let interpreter = fake_interpreter(home.path(), "basename \"$1\"\nexit 4");
    let output = cli(&home)
        .env("RESOLVE_PYTHON", interpreter)
        .args(["exec", "print('hi')"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(4));
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    let stdout = result["stdout"].as_str().unwrap();
    assert!(stdout.starts_with("resolve_script_"), "{}", stdout);
    assert!(stdout.ends_with(".py"), "{}", stdout);
}

#[cfg(unix)]
#[test]
fn test_exec_reads_file_and_stdin_with_preamble() {
    let home = TempDir::new().unwrap();
    let interpreter = fake_interpreter(home.path(), "cat \"$1\"");
    let script = home.path().join("grade.py");
    fs::write(&script, "print('from file')\n").unwrap();

    let output = cli(&home)
        .env("RESOLVE_PYTHON", &interpreter)
        .arg("exec")
        .arg("--file")
        .arg(&script)
        .output()
        .unwrap();
    assert!(output.status.success());
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    let text = result["stdout"].as_str().unwrap();
    assert!(text.starts_with("import sys, os, json"));
    assert!(text.ends_with("print('from file')"));

    let output = cli(&home)
        .env("RESOLVE_PYTHON", &interpreter)
        .arg("exec")
        .write_stdin("print('from stdin')")
        .output()
        .unwrap();
    assert!(output.status.success());
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(result["stdout"]
        .as_str()
        .unwrap()
        .ends_with("print('from stdin')"));
}

#[test]
fn test_serve_refuses_without_token() {
    let home = TempDir::new().unwrap();
    cli(&home)
        .args(["serve", "--bind", "127.0.0.1", "--port", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("BRIDGE_TOKEN"));
}

#[test]
fn test_health_requires_bridge_url() {
    let home = TempDir::new().unwrap();
    cli(&home)
        .arg("health")
        .assert()
        .failure()
        .stderr(predicate::str::contains("RESOLVE_BRIDGE_URL"));
}

#[test]
fn test_invalid_timeout_is_a_usage_error() {
    let home = TempDir::new().unwrap();
    cli(&home)
        .args(["exec", "print(1)", "--timeout", "soon"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_proxy_list_and_call_through_tool_server() {
    let home = TempDir::new().unwrap();
    let server = env!("CARGO_BIN_EXE_fake_tool_server");

    cli(&home)
        .env("DAVINCI_MCP_COMMAND", server)
        .args(["proxy", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("resolve-add_marker"))
        .stdout(predicate::str::contains("resolve-read-clips-properties"))
        .stdout(predicate::str::contains("get-editing-context"));

    cli(&home)
        .env("DAVINCI_MCP_COMMAND", server)
        .args(["proxy", "call", "resolve-add_marker", "--args", r#"{"frame": 12}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"add_marker {"color":"Blue","frame":12}"#));

    cli(&home)
        .env("DAVINCI_MCP_COMMAND", server)
        .args(["proxy", "call", "resolve-fail_tool"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Resolve error: No timeline open"));
}

#[test]
fn test_proxy_reports_unavailable_tool_server() {
    let home = TempDir::new().unwrap();
    cli(&home)
        .env("DAVINCI_MCP_COMMAND", "/nonexistent/tool-server")
        .args(["proxy", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("/nonexistent/tool-server"));
}
