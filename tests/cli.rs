use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn itera_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_itera"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[server]
bind = "127.0.0.1:8788"

[db]
path = "{}/data/itera.sqlite"
"#,
        root.display()
    );

    let config_path = config_dir.join("itera.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_itera(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = itera_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run itera binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_itera(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/itera.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_itera(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_itera(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_contacts_empty_after_init() {
    let (_tmp, config_path) = setup_test_env();
    run_itera(&config_path, &["init"]);

    let (stdout, stderr, success) = run_itera(&config_path, &["contacts", "--limit", "5"]);
    assert!(success, "contacts failed: {}", stderr);
    assert!(stdout.contains("No contacts stored yet."));
}

#[test]
fn test_stats_after_init() {
    let (_tmp, config_path) = setup_test_env();
    run_itera(&config_path, &["init"]);

    let (stdout, stderr, success) = run_itera(&config_path, &["stats", "--days", "3"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Contacts:        0"));
    assert!(stdout.contains("LEADS"));
}

#[test]
fn test_classify_ransomware() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_itera(&config_path, &["classify", "Errore: ransomware sul server"]);
    assert!(success, "classify failed: {}", stderr);

    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["triage"]["priority"], "immediate");
    assert_eq!(json["triage"]["escalateImmediately"], true);
    assert!(json["leadScore"].as_u64().is_some());
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");

    let (_, stderr, success) = run_itera(&missing, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_stats_rejects_out_of_range_days() {
    let (_tmp, config_path) = setup_test_env();
    run_itera(&config_path, &["init"]);

    let (_, stderr, success) = run_itera(&config_path, &["stats", "--days", "100000000"]);
    assert!(!success);
    assert!(stderr.contains("--days"), "stderr: {}", stderr);

    let (_, _, success) = run_itera(&config_path, &["stats", "--days", "0"]);
    assert!(!success);
}
