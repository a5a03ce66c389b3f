//! End-to-end tests for the halo-stats binary
//!
//! None of these reach the network: they cover argument handling, the
//! configuration checks that run before any client is built, and the
//! offline reset command.

use assert_cmd::Command;
use halo_stats::cache::{keys, FileStore, IdentityIndex, PersistentCache, PlayerStatsCache};
use halo_stats::Xuid;
use std::sync::Arc;
use tempfile::TempDir;

fn halo_stats() -> Command {
    let mut cmd = Command::cargo_bin("halo-stats").unwrap();
    cmd.env_remove("HALO_CLIENT_ID")
        .env_remove("HALO_CLIENT_SECRET")
        .env_remove("LOG_FORMAT")
        .env("RUST_LOG", "halo_stats=info");
    cmd
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Cache directory holding stats for one indexed player
async fn prepared_cache(dir: &TempDir, xuid: Xuid, name: &str) -> PersistentCache {
    let cache = PersistentCache::new(Arc::new(FileStore::new(dir.path())));
    let mut index = IdentityIndex::new();
    index.insert(xuid, name);
    cache.merge_identity_index(index).await.unwrap();
    cache
        .save_player(&PlayerStatsCache::new(xuid, Some(name.to_string())))
        .await
        .unwrap();
    cache
}

#[test]
fn test_help_lists_subcommands() {
    let output = halo_stats().arg("--help").output().unwrap();
    assert!(output.status.success());

    let stdout = stdout_of(&output);
    for command in ["stats", "populate", "login", "reset"] {
        assert!(stdout.contains(command), "missing {command} in:\n{stdout}");
    }
}

#[test]
fn test_stats_requires_gamertag() {
    let output = halo_stats().arg("stats").output().unwrap();
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("GAMERTAG"));
}

#[test]
fn test_stats_without_client_credentials_fails_before_network() {
    let dir = TempDir::new().unwrap();
    let output = halo_stats()
        .args(["--cache-dir", dir.path().to_str().unwrap(), "stats", "Spartan"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr_of(&output).contains("HALO_CLIENT_ID"));
    assert!(stdout_of(&output).is_empty());
}

#[test]
fn test_match_count_out_of_range_is_rejected() {
    let output = halo_stats().args(["stats", "Spartan", "--matches", "0"]).output().unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_login_without_code_prints_authorize_url() {
    let output = halo_stats()
        .args(["--client-id", "abc", "--client-secret", "s", "login", "main"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("https://login.live.com/oauth20_authorize.srf"));
    assert!(stdout.contains("client_id=abc"));
    assert!(!stdout.contains("client_secret"));
}

#[test]
fn test_login_reads_client_id_from_env() {
    let output = halo_stats()
        .env("HALO_CLIENT_ID", "from-env")
        .env("HALO_CLIENT_SECRET", "s")
        .args(["--output-format", "json", "login", "main"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_str(stdout_of(&output).trim()).unwrap();
    assert_eq!(value["account"], "main");
    assert!(value["authorize_url"].as_str().unwrap().contains("client_id=from-env"));
}

#[tokio::test]
async fn test_reset_removes_cached_player() {
    let dir = TempDir::new().unwrap();
    let xuid = Xuid::new(2533274800000001);
    prepared_cache(&dir, xuid, "Spartan Main").await;
    let path = FileStore::new(dir.path()).path_for(&keys::player(Some("Spartan Main"), xuid));
    assert!(path.exists());

    let output = halo_stats()
        .args([
            "--cache-dir",
            dir.path().to_str().unwrap(),
            "--output-format",
            "json",
            "reset",
            "spartan main",
        ])
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr_of(&output));
    let value: serde_json::Value = serde_json::from_str(stdout_of(&output).trim()).unwrap();
    assert_eq!(value["removed"], true);
    assert!(!path.exists());

    // The identity itself is kept
    let cache = PersistentCache::new(Arc::new(FileStore::new(dir.path())));
    let index = cache.load_identity_index().await.unwrap();
    assert_eq!(index.xuid_for("Spartan Main"), Some(xuid));
}

#[test]
fn test_reset_unknown_player() {
    let dir = TempDir::new().unwrap();
    let output = halo_stats()
        .args(["--cache-dir", dir.path().to_str().unwrap(), "reset", "Nobody"])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(stdout_of(&output).contains("No cached stats for Nobody"));
}
