//! Integration tests for the `flowtrace` CLI binary.
//!
//! Every test runs against the checked-in fixture snapshot or a
//! throwaway config directory, never the user's real configuration.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/linear.yaml");

/// The `flowtrace` binary with env isolation.
///
/// Clears all `FLOWTRACE_*` variables and points the config directory
/// at `home`, which need not exist.
fn flowtrace_in(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("flowtrace");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("RUST_LOG")
        .env_remove("FLOWTRACE_PROFILE")
        .env_remove("FLOWTRACE_SNAPSHOT")
        .env_remove("FLOWTRACE_OUTPUT")
        .env_remove("FLOWTRACE_TIMEOUT")
        .env_remove("FLOWTRACE_DEFAULTS_OUTPUT")
        .env_remove("FLOWTRACE_DEFAULTS_TIMEOUT");
    cmd
}

fn flowtrace() -> assert_cmd::Command {
    flowtrace_in(Path::new("/tmp/flowtrace-cli-test-nonexistent"))
}

/// `flowtrace --snapshot <fixture>` plus `args`.
fn on_fixture(args: &[&str]) -> assert_cmd::Command {
    let mut cmd = flowtrace();
    cmd.args(["--snapshot", FIXTURE]).args(args);
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = flowtrace().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_lists_commands() {
    flowtrace().arg("--help").assert().success().stdout(
        predicate::str::contains("trace")
            .and(predicate::str::contains("trace-hosts"))
            .and(predicate::str::contains("ping-all")),
    );
}

#[test]
fn test_version_flag() {
    flowtrace()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("flowtrace"));
}

#[test]
fn test_completions_zsh() {
    flowtrace()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Packet traces ───────────────────────────────────────────────────

#[test]
fn test_trace_reaches_destination() {
    on_fixture(&[
        "-o",
        "plain",
        "trace",
        "ETH_TYPE=ipv4, IPV4_DST=10.0.0.2/32",
        "--ingress",
        "s1/1",
    ])
    .assert()
    .success()
    .stdout(predicate::str::diff("SUCCESS\n"));
}

#[test]
fn test_trace_table_shows_path_and_message() {
    on_fixture(&[
        "--color",
        "never",
        "trace",
        "ETH_TYPE=ipv4, IPV4_DST=10.0.0.2/32",
        "-i",
        "s1/1",
    ])
    .assert()
    .success()
    .stdout(
        predicate::str::contains("s1/1 -> s1/2 -> s2/1 -> s2/2 -> s3/1 -> s3/2")
            .and(predicate::str::contains("Reached required destination Host s3/2"))
            .and(predicate::str::contains("SUCCESS")),
    );
}

#[test]
fn test_trace_without_match_fails() {
    let output = on_fixture(&[
        "-o",
        "json",
        "trace",
        "ETH_TYPE=ipv4, IPV4_DST=10.9.9.9/32",
        "-i",
        "s1/1",
    ])
    .output()
    .unwrap();
    assert_eq!(output.status.code(), Some(5));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["paths"][0]["outcome"], "no_match");
}

#[test]
fn test_trace_with_expected_host() {
    on_fixture(&[
        "-o",
        "plain",
        "trace",
        "ETH_TYPE=ipv4, IPV4_DST=10.0.0.1/32",
        "-i",
        "s3/2",
        "--expect",
        "00:00:00:00:00:01",
    ])
    .assert()
    .success();
}

#[test]
fn test_trace_rejects_malformed_packet() {
    let output = on_fixture(&["trace", "IPV4_DST", "-i", "s1/1"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("TYPE=value"));
}

#[test]
fn test_trace_rejects_contradicting_in_port() {
    let output = on_fixture(&["trace", "IN_PORT=2, ETH_TYPE=ipv4", "-i", "s1/1"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

// ── Host traces ─────────────────────────────────────────────────────

#[test]
fn test_trace_hosts_json() {
    let output = on_fixture(&[
        "-o",
        "json",
        "trace-hosts",
        "00:00:00:00:00:01",
        "00:00:00:00:00:02",
    ])
    .output()
    .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let traces = json.as_array().unwrap();
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0]["success"], true);
}

#[test]
fn test_trace_hosts_unknown_host() {
    let output = on_fixture(&["trace-hosts", "00:00:00:00:00:01", "00:00:00:00:00:99"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
    assert!(combined_output(&output).contains("not found"));
}

#[test]
fn test_ping_all_plain() {
    on_fixture(&["-o", "plain", "ping-all"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("00:00:00:00:00:01/None 00:00:00:00:00:02/None SUCCESS")
                .and(predicate::str::contains(
                    "00:00:00:00:00:02/None 00:00:00:00:00:01/None SUCCESS",
                )),
        );
}

// ── Inventory ───────────────────────────────────────────────────────

#[test]
fn test_devices_plain() {
    on_fixture(&["-o", "plain", "devices"])
        .assert()
        .success()
        .stdout(predicate::str::diff("s1\ns2\ns3\n"));
}

#[test]
fn test_flows_filtered_by_device() {
    let output = on_fixture(&["-o", "json", "flows", "--device", "s2"])
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let flows = json.as_array().unwrap();
    assert_eq!(flows.len(), 2);
    assert!(flows.iter().all(|f| f["device"] == "s2"));
}

#[test]
fn test_flows_unknown_device() {
    let output = on_fixture(&["flows", "--device", "s9"]).output().unwrap();
    assert_eq!(output.status.code(), Some(4));
}

#[test]
fn test_overlays_lists_builtin_drivers() {
    on_fixture(&["-o", "plain", "overlays"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ofdpa3 ofdpa").and(predicate::str::contains(
            "ofdpa-ovs ofdpa-ovs",
        )));
}

// ── Snapshot and config errors ──────────────────────────────────────

#[test]
fn test_no_snapshot_configured() {
    let output = flowtrace().arg("devices").output().unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert!(combined_output(&output).contains("No snapshot"));
}

#[test]
fn test_missing_snapshot_file() {
    let output = flowtrace()
        .args(["--snapshot", "/tmp/flowtrace-missing.json", "devices"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_unknown_profile() {
    let output = flowtrace().args(["--profile", "lab", "devices"]).output().unwrap();
    assert_eq!(output.status.code(), Some(4));
    assert!(combined_output(&output).contains("Profile 'lab' not found"));
}

#[test]
fn test_config_init_then_use_profile() {
    let home = tempfile::tempdir().unwrap();

    flowtrace_in(home.path())
        .args(["config", "init", FIXTURE, "--name", "lab"])
        .assert()
        .success();

    flowtrace_in(home.path())
        .args(["config", "profiles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lab *"));

    flowtrace_in(home.path())
        .args(["-o", "plain", "devices"])
        .assert()
        .success()
        .stdout(predicate::str::contains("s2"));

    flowtrace_in(home.path())
        .args(["config", "set", "timeout", "0"])
        .assert()
        .success();
    let output = flowtrace_in(home.path()).arg("devices").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}
