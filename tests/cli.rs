use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("sustainable-ai").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: sustainable-ai <COMMAND>"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("footprint"))
        .stdout(predicate::str::contains("--version"));
}

#[test]
fn test_cli_serve_help() {
    let mut cmd = Command::cargo_bin("sustainable-ai").unwrap();
    cmd.arg("serve")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: sustainable-ai serve"))
        .stdout(predicate::str::contains("--port <PORT>"));
}

#[test]
fn test_cli_chat_help() {
    let mut cmd = Command::cargo_bin("sustainable-ai").unwrap();
    cmd.arg("chat")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--car-km <CAR_KM>"))
        .stdout(predicate::str::contains("--temperature <TEMPERATURE>"))
        .stdout(predicate::str::contains("--local"));
}

#[test]
fn test_footprint_hundred_km_by_car() {
    let mut cmd = Command::cargo_bin("sustainable-ai").unwrap();
    cmd.args(["footprint", "--car-km", "100"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Weekly footprint: 230.0 kg CO2"))
        .stdout(predicate::str::contains("11 trees"))
        .stdout(predicate::str::contains("0 short-haul flights"))
        .stdout(predicate::str::contains("1 trips of 100 km"));
}

#[test]
fn test_footprint_json() {
    let mut cmd = Command::cargo_bin("sustainable-ai").unwrap();
    let output = cmd
        .args(["footprint", "--meat-meals", "7", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["total_emissions"], 42.0);
    assert_eq!(value["stats"]["trees"], 2);
    assert_eq!(value["stats"]["flights"], 0);
    assert_eq!(value["stats"]["driving100km"], 0);
}

#[test]
fn test_footprint_rejects_negative_input() {
    let mut cmd = Command::cargo_bin("sustainable-ai").unwrap();
    cmd.args(["footprint", "--bus-km", "-3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("bus_km"));
}

#[test]
fn test_cli_no_command() {
    let mut cmd = Command::cargo_bin("sustainable-ai").unwrap();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage: sustainable-ai <COMMAND>"));
}

#[test]
fn test_footprint_rejects_overflowing_total() {
    let mut cmd = Command::cargo_bin("sustainable-ai").unwrap();
    cmd.args(["footprint", "--car-km", "1e308"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("too large"));
}

#[test]
fn test_chat_no_sample_requires_local() {
    let mut cmd = Command::cargo_bin("sustainable-ai").unwrap();
    cmd.args(["chat", "--no-sample"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--local"));
}
