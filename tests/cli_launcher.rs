use assert_cmd::Command;
use predicates::prelude::*;

fn edgeguard() -> Command {
    Command::new(env!("CARGO_BIN_EXE_edgeguard"))
}

#[test]
fn dry_run_prints_effective_config() {
    let output = edgeguard()
        .args(["--dry-run", "--socket", "/tmp/custom.sock", "--name", "edge-1"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(v["socket_path"], "/tmp/custom.sock");
    assert_eq!(v["agent_name_override"], "edge-1");
    assert_eq!(v["transport"], "uds");
}

#[test]
fn key_equals_value_form_is_accepted() {
    let output = edgeguard()
        .args(["--dry-run", "--transport=tcp", "--port=7171", "--json-logs"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    // tcp aliases the grpc transport
    assert_eq!(v["transport"], "grpc");
    assert_eq!(v["port"], 7171);
    assert_eq!(v["json_logs"], true);
}

#[test]
fn unknown_options_are_ignored() {
    edgeguard()
        .args([
            "--dry-run",
            "--port",
            "7272",
            "--definitely-not-a-flag",
            "value",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("7272"));
}

#[test]
fn bind_failure_exits_nonzero() {
    edgeguard()
        .args(["--transport", "tcp", "--host", "203.0.113.1", "--port", "1"])
        .assert()
        .failure();
}
