#![allow(deprecated)]

use assert_cmd::cargo::cargo_bin;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn bookaimark_cmd() -> Command {
    let mut cmd = Command::new(cargo_bin("bookaimark"));
    for key in [
        "BOOKAIMARK_DATA_DIR",
        "BOOKAIMARK_RATE_LIMIT_WRITES",
        "BOOKAIMARK_RATE_LIMIT_ALGORITHM",
        "BOOKAIMARK_CACHE_TTL_SECS",
        "BOOKAIMARK_SESSION_TOKENS",
        "SUPABASE_SERVICE_ROLE_KEY",
        "GITHUB_OWNER",
        "GITHUB_TOKEN",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

#[test]
fn test_config_prints_template() {
    let temp = TempDir::new().unwrap();
    bookaimark_cmd()
        .current_dir(temp.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("data_dir"))
        .stdout(predicate::str::contains("BOOKAIMARK_RATE_LIMIT_ALGORITHM"));
}

#[test]
fn test_config_effective_reads_the_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("custom.toml");
    fs::write(
        &path,
        "data_dir = \"/srv/bookaimark\"\n\n[limits]\nwrite_requests = 5\nalgorithm = \"sliding_window\"\n",
    )
    .unwrap();

    bookaimark_cmd()
        .current_dir(temp.path())
        .args(["config", "--effective", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"data_dir\": \"/srv/bookaimark\""))
        .stdout(predicate::str::contains("\"write_requests\": 5"))
        .stdout(predicate::str::contains("\"algorithm\": \"sliding_window\""));
}

#[test]
fn test_env_overrides_the_file() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("bookaimark.toml"), "[cache]\nttl_secs = 5\n").unwrap();

    bookaimark_cmd()
        .current_dir(temp.path())
        .env("BOOKAIMARK_CACHE_TTL_SECS", "90")
        .args(["config", "--effective"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ttl_secs\": 90"));
}

#[test]
fn test_effective_config_masks_secrets() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("bookaimark.toml"),
        "[repo]\nowner = \"octo\"\ntoken = \"ghp_from_file\"\n",
    )
    .unwrap();

    bookaimark_cmd()
        .current_dir(temp.path())
        .env("SUPABASE_SERVICE_ROLE_KEY", "service-role-secret")
        .env("BOOKAIMARK_SESSION_TOKENS", "tok123:user-1")
        .args(["config", "--effective"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"owner\": \"octo\""))
        .stdout(predicate::str::contains("\"<redacted>:user-1\""))
        .stdout(predicate::str::contains("ghp_from_file").not())
        .stdout(predicate::str::contains("service-role-secret").not())
        .stdout(predicate::str::contains("tok123").not());
}

#[test]
fn test_invalid_config_fails_with_message() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("bookaimark.toml"), "[limits]\nalgorithm = \"leaky\"\n").unwrap();

    bookaimark_cmd()
        .current_dir(temp.path())
        .args(["config", "--effective"])
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("Error:"));
}
