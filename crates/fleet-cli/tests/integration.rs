#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn fleet(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("fleet").unwrap();
    cmd.current_dir(dir.path()).env("FLEET_ROOT", dir.path());
    cmd
}

fn init(dir: &TempDir) {
    fleet(dir).arg("init").assert().success();
}

fn add(dir: &TempDir, token: &str, channel: &str) {
    fleet(dir)
        .args([
            "tenant",
            "add",
            "--name",
            "Demo",
            "--token",
            token,
            "--registration-link",
            "https://example.com/register",
            "--channel",
            channel,
        ])
        .assert()
        .success();
}

// ---------------------------------------------------------------------------
// fleet init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_config_and_registry() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    assert!(dir.path().join(".fleet/config.yaml").exists());
    assert!(dir.path().join(".fleet/registry.redb").exists());

    // idempotent
    fleet(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already present"));
}

// ---------------------------------------------------------------------------
// fleet tenant
// ---------------------------------------------------------------------------

#[test]
fn tenant_add_normalizes_channel_and_lists() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    fleet(&dir)
        .args([
            "tenant",
            "add",
            "--name",
            "Demo",
            "--token",
            "1:abc",
            "--registration-link",
            "https://example.com/register",
            "--channel",
            "https://t.me/demo_channel",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Channel: @demo_channel"));

    fleet(&dir)
        .args(["tenant", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("@demo_channel"))
        .stdout(predicate::str::contains("channel_signal"));
}

#[test]
fn duplicate_token_is_rejected() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    add(&dir, "1:abc", "@a");
    fleet(&dir)
        .args([
            "tenant",
            "add",
            "--name",
            "Other",
            "--token",
            "1:abc",
            "--registration-link",
            "https://example.com",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn toggle_play_url_and_remove_by_id() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    add(&dir, "1:abc", "@a");

    fleet(&dir)
        .args(["tenant", "toggle", "1:abc"])
        .assert()
        .success()
        .stdout(predicate::str::contains("inactive"));

    fleet(&dir)
        .args(["tenant", "set-play-url", "1", "https://example.com/play"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://example.com/play"));

    let out = fleet(&dir)
        .args(["--json", "tenant", "show", "1:abc"])
        .output()
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["is_active"], false);
    assert_eq!(value["play_url"], "https://example.com/play");

    fleet(&dir).args(["tenant", "remove", "1"]).assert().success();
    fleet(&dir)
        .args(["tenant", "show", "1:abc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("tenant not found"));
}

// ---------------------------------------------------------------------------
// fleet config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_flags_stale_threshold_below_completion() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    fleet(&dir).args(["config", "validate"]).assert().success();

    std::fs::write(
        dir.path().join(".fleet/config.yaml"),
        "signal:\n  stale_threshold_secs: 100\n",
    )
    .unwrap();
    fleet(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("stale_threshold_secs"));
}

#[test]
fn config_show_fills_defaults() {
    let dir = TempDir::new().unwrap();
    fleet(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("completion_offset_secs: 300"));
}

// ---------------------------------------------------------------------------
// fleet run
// ---------------------------------------------------------------------------

#[test]
fn run_requires_init() {
    let dir = TempDir::new().unwrap();
    fleet(&dir)
        .args(["run", "--once"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

#[test]
fn run_once_starts_active_tenants() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    add(&dir, "1:abc", "@a");

    let out = fleet(&dir)
        .args(["--json", "run", "--once"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["started"], serde_json::json!(["1:abc"]));
}
