//! Smoke tests -- verify the binary runs and its subcommands are wired.

use assert_cmd::Command;
use predicates::str::contains;
use std::path::{Path, PathBuf};

fn bin() -> Command {
    let mut cmd = Command::cargo_bin("cloudsecmonitor").unwrap();
    cmd.env_remove("CLOUDSEC_CONFIG").env("RUST_LOG", "error");
    cmd
}

/// Config file pointing the store at a fresh database inside `dir`.
fn write_config(dir: &Path) -> PathBuf {
    let db = dir.join("smoke.db");
    let path = dir.join("cloudsec.toml");
    let body = format!(
        "[storage]\npath = \"{}\"\n\n[alerts]\nsink = \"log\"\n",
        db.display().to_string().replace('\\', "/")
    );
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_cli_help() {
    bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("brute-force and port-scan detection"));
}

#[test]
fn test_cli_version() {
    bin()
        .arg("--version")
        .assert()
        .success()
        .stdout(contains("cloudsecmonitor"));
}

#[test]
fn test_subcommands_exist() {
    for args in [
        &["monitor", "--help"][..],
        &["analyze", "--help"],
        &["simulate", "brute-force", "--help"],
        &["incidents", "update", "--help"],
        &["serve", "--help"],
    ] {
        bin().args(args).assert().success();
    }
}

#[test]
fn test_missing_explicit_config_fails() {
    bin()
        .args(["--config", "/definitely/not/here.toml", "stats"])
        .assert()
        .failure();
}

#[test]
fn test_simulated_brute_force_is_detected_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let config = config.to_str().unwrap();

    bin()
        .args(["--config", config, "simulate", "brute-force", "--attempts", "6"])
        .assert()
        .success()
        .stdout(contains("6 failed SSH logins written from 203.45.12.88"));

    bin()
        .args(["--config", config, "analyze"])
        .assert()
        .success()
        .stdout(contains("1 new incident(s) recorded"));

    bin()
        .args(["--config", config, "analyze"])
        .assert()
        .success()
        .stdout(contains("0 new incident(s) recorded"));

    bin()
        .args(["--config", config, "incidents", "list"])
        .assert()
        .success()
        .stdout(contains("Brute Force SSH"))
        .stdout(contains("CRITICAL"));
}

#[test]
fn test_resolve_requires_resolution_details() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let config = config.to_str().unwrap();

    bin()
        .args(["--config", config, "simulate", "port-scan"])
        .assert()
        .success();
    bin().args(["--config", config, "analyze"]).assert().success();

    bin()
        .args(["--config", config, "incidents", "update", "1", "--status", "resolved"])
        .assert()
        .failure();

    bin()
        .args([
            "--config", config, "incidents", "update", "1", "--status", "resolved",
            "--resolved-by", "Admin", "--notes", "fixed",
        ])
        .assert()
        .success()
        .stdout(contains("Incident #1 updated: RESOLVED"));
}
