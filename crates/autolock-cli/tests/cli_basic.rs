//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run and verify outputs.

use std::path::PathBuf;
use std::process::Command;

fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-q", "-p", "autolock-cli", "--"])
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_json(args: &[&str]) -> serde_json::Value {
    let (stdout, stderr, code) = run_cli(args);
    assert_eq!(code, 0, "command {args:?} failed: {stderr}");
    serde_json::from_str(&stdout).expect("Failed to parse JSON output")
}

#[test]
fn test_check_lists_doors() {
    let config = fixture("doors.toml");
    let (stdout, stderr, code) = run_cli(&["check", "--config", &config]);
    assert_eq!(code, 0, "check failed: {stderr}");
    assert!(stdout.contains("config ok, 2 door(s)"));
    assert!(stdout.contains("front_door"));
    assert!(stdout.contains("sensor binary_sensor.back_door closes"));
}

#[test]
fn test_check_json() {
    let config = fixture("doors.toml");
    let doors = run_json(&["check", "--config", &config, "--json"]);
    let doors = doors.as_array().expect("expected array");
    assert_eq!(doors.len(), 2);
    assert_eq!(doors[0]["id"], "front_door");
    assert_eq!(doors[0]["retry_count"], 2);
    assert_eq!(doors[1]["backoff"], "exponential");
    assert_eq!(doors[1]["trigger"]["kind"], "sensor");
}

#[test]
fn test_check_rejects_bad_time() {
    let config = fixture("bad_time.toml");
    let (_stdout, stderr, code) = run_cli(&["check", "--config", &config]);
    assert_ne!(code, 0);
    assert!(stderr.contains("Invalid time format: 25:00"));
}

#[test]
fn test_check_missing_file() {
    let (_stdout, stderr, code) = run_cli(&["check", "--config", "/nonexistent/autolock.toml"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("Failed to load configuration"));
}

#[test]
fn test_delay_night_and_day() {
    let config = fixture("doors.toml");
    let night = run_json(&[
        "delay", "--door", "front_door", "--at", "23:00", "--config", &config, "--json",
    ]);
    assert_eq!(night["minutes"], 2);
    assert_eq!(night["night"], true);

    let day = run_json(&[
        "delay", "--door", "front_door", "--at", "12:00", "--config", &config, "--json",
    ]);
    assert_eq!(day["minutes"], 5);
    assert_eq!(day["night"], false);
}

#[test]
fn test_delay_without_window_is_day() {
    let config = fixture("doors.toml");
    let (stdout, _stderr, code) = run_cli(&[
        "delay", "--door", "back_door", "--at", "03:00", "--config", &config,
    ]);
    assert_eq!(code, 0);
    assert!(stdout.contains("back_door: 10 min at 03:00 (day)"));
}

#[test]
fn test_delay_unknown_door() {
    let config = fixture("doors.toml");
    let (_stdout, stderr, code) = run_cli(&[
        "delay", "--door", "garage", "--at", "12:00", "--config", &config,
    ]);
    assert_ne!(code, 0);
    assert!(stderr.contains("unknown door: garage"));
}

#[test]
fn test_simulate_locks_door() {
    let config = fixture("doors.toml");
    let report = run_json(&[
        "simulate", "--door", "front_door", "--at", "23:30", "--config", &config,
    ]);
    assert_eq!(report["countdown"], "00:02:00");
    assert_eq!(report["locked"], true);
    assert_eq!(report["lock_attempts"], 1);
    assert!(report["notifications"].as_array().unwrap().is_empty());
}

#[test]
fn test_simulate_slow_lock_still_verifies() {
    let config = fixture("doors.toml");
    let report = run_json(&[
        "simulate", "--door", "front_door", "--at", "12:00", "--lock", "slow", "--config", &config,
    ]);
    assert_eq!(report["countdown"], "00:05:00");
    assert_eq!(report["locked"], true);
    assert_eq!(report["lock_attempts"], 1);
}

#[test]
fn test_simulate_rejecting_lock_notifies_once() {
    let config = fixture("doors.toml");
    let report = run_json(&[
        "simulate", "--door", "front_door", "--at", "12:00", "--lock", "reject", "--config",
        &config,
    ]);
    assert_eq!(report["locked"], false);
    assert_eq!(report["lock_attempts"], 3);
    let notes = report["notifications"].as_array().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0]["data"]["title"], "AutoLock Failed: Front Door");
}

#[test]
fn test_simulate_open_door_never_commands_lock() {
    let config = fixture("doors.toml");
    let report = run_json(&[
        "simulate", "--door", "back_door", "--at", "12:00", "--door-open", "--config", &config,
    ]);
    assert_eq!(report["countdown"], "00:10:00");
    assert_eq!(report["lock_attempts"], 0);
    assert_eq!(report["notifications"].as_array().unwrap().len(), 1);
}

#[test]
fn test_simulate_door_open_needs_sensor() {
    let config = fixture("doors.toml");
    let (_stdout, stderr, code) = run_cli(&[
        "simulate", "--door", "front_door", "--door-open", "--config", &config,
    ]);
    assert_ne!(code, 0);
    assert!(stderr.contains("has no sensor"));
}

#[test]
fn test_simulate_rejects_unknown_lock_mode() {
    let config = fixture("doors.toml");
    let (_stdout, _stderr, code) = run_cli(&[
        "simulate", "--door", "front_door", "--lock", "explode", "--config", &config,
    ]);
    assert_ne!(code, 0);
}
