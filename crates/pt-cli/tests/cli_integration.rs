//! CLI integration tests
//!
//! Tests the podtunnel CLI using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn podtunnel() -> Command {
    let mut cmd = Command::cargo_bin("podtunnel")
        .expect("Failed to locate podtunnel binary - ensure it's built before running tests");
    cmd.env_remove("RUST_LOG").env_remove("KUBECONFIG");
    cmd
}

#[test]
fn test_cli_help() {
    podtunnel()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("podtunnel"))
        .stdout(predicate::str::contains("Kubernetes"));
}

#[test]
fn test_cli_version() {
    podtunnel()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("podtunnel"));
}

#[test]
fn test_forward_help_lists_overrides() {
    podtunnel()
        .args(["forward", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--kubeconfig"))
        .stdout(predicate::str::contains("--context"))
        .stdout(predicate::str::contains("--log-level"));
}

#[test]
fn test_forward_rejects_bad_ports() {
    podtunnel()
        .args(["forward", "default", "web", "8080:http"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid port"));
}

#[test]
fn test_forward_rejects_zero_remote_port() {
    podtunnel()
        .args(["forward", "default", "web", "8080:0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("remote port must be greater than 0"));
}

#[test]
fn test_forward_with_missing_kubeconfig() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "").unwrap();
    let kubeconfig = dir.path().join("no-such-kubeconfig");

    podtunnel()
        .arg("--config")
        .arg(&config)
        .args(["forward", "default", "web", "8080:80", "--kubeconfig"])
        .arg(&kubeconfig)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Failed to forward default/web"))
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_forward_with_unknown_context() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "").unwrap();
    let kubeconfig = dir.path().join("kubeconfig");
    std::fs::write(
        &kubeconfig,
        "current-context: dev\ncontexts: []\nclusters: []\nusers: []\n",
    )
    .unwrap();

    podtunnel()
        .arg("--config")
        .arg(&config)
        .args(["forward", "default", "web", "80", "--context", "prod", "--kubeconfig"])
        .arg(&kubeconfig)
        .assert()
        .failure()
        .stderr(predicate::str::contains("context prod not found"));
}

#[test]
fn test_explicit_config_must_exist() {
    let dir = TempDir::new().unwrap();
    podtunnel()
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg("up")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_up_without_entries() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "log_level = \"warn\"\n").unwrap();

    podtunnel()
        .arg("--config")
        .arg(&config)
        .arg("up")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No [[forward]] entries configured"));
}

#[test]
fn test_up_rejects_zero_remote_port() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(
        &config,
        "[[forward]]\nnamespace = \"default\"\ntarget = \"web\"\nlocal_port = 8080\nremote_port = 0\n",
    )
    .unwrap();

    podtunnel()
        .arg("--config")
        .arg(&config)
        .arg("up")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid ports for default/web"))
        .stderr(predicate::str::contains("remote port must be greater than 0"));
}

#[test]
fn test_config_init_show_path() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("podtunnel.toml");

    podtunnel()
        .arg("--config")
        .arg(&config)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration file"));
    assert!(config.exists());

    podtunnel()
        .arg("--config")
        .arg(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fault_policy = \"terminate\""));

    podtunnel()
        .arg("--config")
        .arg(&config)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("podtunnel.toml"));
}
