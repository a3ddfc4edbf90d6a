//! CLI integration tests for the satchel command-line interface.
//!
//! Each test points the CLI at a fresh temporary config directory, so the
//! session database lives under it and nothing touches the real config dir.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the satchel binary, isolated in `dir`.
fn satchel(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("satchel").unwrap();
    cmd.env("SATCHEL_CONFIG_DIR", dir.path())
        .env("SATCHEL_SECRET", "integration-secret")
        .env_remove("SATCHEL_CONFIG");
    cmd
}

fn start_with(dir: &TempDir, sets: &[&str]) -> String {
    let mut cmd = satchel(dir);
    cmd.arg("start");
    for set in sets {
        cmd.args(["--set", set]);
    }
    let output = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(output).unwrap().trim().to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Parsing
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    satchel(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("destroy"));
}

#[test]
fn test_bad_set_rejected() {
    let dir = TempDir::new().unwrap();
    satchel(&dir)
        .args(["start", "--set", "novalue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=VALUE"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_start_prints_generated_id() {
    let dir = TempDir::new().unwrap();
    let sid = start_with(&dir, &[]);
    assert_eq!(sid.len(), 36);
    assert!(dir.path().join("sessions.db").exists());
}

#[test]
fn test_start_then_show() {
    let dir = TempDir::new().unwrap();
    let sid = start_with(&dir, &["user=ada", "theme=dark"]);

    satchel(&dir)
        .args(["show", &sid])
        .assert()
        .success()
        .stdout(predicate::str::contains("user = \"ada\""))
        .stdout(predicate::str::contains("theme = \"dark\""));

    satchel(&dir)
        .args(["show", &sid, "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"user\": \"ada\""));
}

#[test]
fn test_resume_adds_values() {
    let dir = TempDir::new().unwrap();
    let sid = start_with(&dir, &["a=1"]);

    satchel(&dir)
        .args(["start", "--id", &sid, "--set", "b=2"])
        .assert()
        .success()
        .stdout(predicate::str::contains(sid.as_str()));

    satchel(&dir)
        .args(["show", &sid])
        .assert()
        .success()
        .stdout(predicate::str::contains("a = \"1\""))
        .stdout(predicate::str::contains("b = \"2\""));
}

#[test]
fn test_destroy() {
    let dir = TempDir::new().unwrap();
    let sid = start_with(&dir, &["k=v"]);

    satchel(&dir)
        .args(["destroy", &sid])
        .assert()
        .success()
        .stdout(predicate::str::contains("destroyed"));

    satchel(&dir)
        .args(["show", &sid])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no session"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Secrets and Config
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_missing_secret_fails() {
    let dir = TempDir::new().unwrap();
    satchel(&dir)
        .env_remove("SATCHEL_SECRET")
        .arg("start")
        .assert()
        .failure()
        .stderr(predicate::str::contains("SATCHEL_SECRET"));
}

#[test]
fn test_wrong_secret_cannot_show() {
    let dir = TempDir::new().unwrap();
    let sid = start_with(&dir, &["k=v"]);

    satchel(&dir)
        .env("SATCHEL_SECRET", "another-secret")
        .args(["show", &sid])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Integrity"));
}

#[test]
fn test_explicit_config_file() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("custom").join("store.db");
    let config = dir.path().join("satchel.toml");
    std::fs::write(
        &config,
        format!(
            "[store]\npath = {:?}\nsecret_env = \"CUSTOM_SECRET\"\n",
            db.display().to_string()
        ),
    )
    .unwrap();

    satchel(&dir)
        .env("CUSTOM_SECRET", "s")
        .args(["--config", config.to_str().unwrap(), "start"])
        .assert()
        .success();
    assert!(db.exists());
}
