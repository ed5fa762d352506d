//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

/// Runs the binary from an empty directory with a scrubbed environment so no
/// stray configuration file or variable is discovered.
fn isolated(tmp: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("quayside");
    cmd.current_dir(tmp.path())
        .env_clear()
        .env("HOME", tmp.path())
        .env("XDG_CONFIG_HOME", tmp.path().join("config"))
        .env("RUST_LOG", "off");
    cmd
}

#[test]
fn cli_without_arguments_prints_usage() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    isolated(&tmp)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn check_accepts_minimal_environment() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    isolated(&tmp)
        .arg("check")
        .env("QUAYSIDE_NAME", "worker")
        .env("QUAYSIDE_IMAGE", "busybox")
        .assert()
        .success()
        .stdout(predicate::str::contains("error:").not());
}

#[test]
fn check_fails_without_image_or_dockerfile() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    isolated(&tmp)
        .arg("check")
        .env("QUAYSIDE_NAME", "worker")
        .assert()
        .failure()
        .stdout(predicate::str::contains("no image to run"));
}

#[test]
fn check_rejects_malformed_api_version() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    isolated(&tmp)
        .arg("check")
        .env("QUAYSIDE_NAME", "worker")
        .env("QUAYSIDE_IMAGE", "busybox")
        .env("QUAYSIDE_API_VERSION", "latest")
        .assert()
        .failure()
        .stdout(predicate::str::contains("invalid api_version `latest`"));
}
