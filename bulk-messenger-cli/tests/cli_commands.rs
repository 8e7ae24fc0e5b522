//! End-to-end tests of the `bulk-messenger` binary

use std::fs;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

fn run(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_bulk-messenger"))
        .arg("--log-level")
        .arg("warn")
        .arg("--config")
        .arg(config)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .expect("failed to run bulk-messenger")
}

fn write_fast_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    fs::write(
        &path,
        r#"
[gateway]
backend = "dry_run"
api_key = "secret-key"

[delays]
content_min_secs = 0
content_max_secs = 0
contact_min_secs = 0
contact_max_secs = 0
failure_delay_secs = 0
"#,
    )
    .unwrap();
    path
}

#[test]
fn test_version() {
    let dir = TempDir::new().unwrap();
    let output = run(&dir.path().join("config.toml"), &["version"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Bulk Messenger v"));
}

#[test]
fn test_config_masks_api_key() {
    let dir = TempDir::new().unwrap();
    let config = write_fast_config(dir.path());

    let output = run(&config, &["config"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("secret-key"));
    assert!(stdout.contains("dry_run"));
}

#[test]
fn test_contacts_listing() {
    let dir = TempDir::new().unwrap();
    let config = write_fast_config(dir.path());
    let sheet = dir.path().join("contacts.csv");
    fs::write(&sheet, "Name,Number\nAsha,9876543210\nRavi,+44 7700 900123\n").unwrap();

    let output = run(&config, &["contacts", "--contacts", sheet.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2 contacts"));
    assert!(stdout.contains("+919876543210"));
    assert!(stdout.contains("+447700900123"));
}

#[test]
fn test_missing_number_column_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_fast_config(dir.path());
    let sheet = dir.path().join("contacts.csv");
    fs::write(&sheet, "Name,Phone\nAsha,9876543210\n").unwrap();

    let output = run(&config, &["contacts", "--contacts", sheet.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("'Number'"));
}

#[test]
fn test_dry_run_send_completes() {
    let dir = TempDir::new().unwrap();
    let config = write_fast_config(dir.path());
    let sheet = dir.path().join("contacts.csv");
    fs::write(&sheet, "Number\n9876543210\n9123456789\n").unwrap();

    let output = run(
        &config,
        &[
            "send",
            "--contacts",
            sheet.to_str().unwrap(),
            "--no-image",
            "--no-document",
            "--caption",
            "Season's greetings",
        ],
    );
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Completed (2 of 2) [100%] sent: 2"));

    let saved = fs::read_to_string(&config).unwrap();
    assert!(saved.contains("contacts.csv"));
}

#[test]
fn test_send_requires_selected_image() {
    let dir = TempDir::new().unwrap();
    let config = write_fast_config(dir.path());
    let sheet = dir.path().join("contacts.csv");
    fs::write(&sheet, "Number\n9876543210\n").unwrap();

    let output = run(
        &config,
        &["send", "--contacts", sheet.to_str().unwrap(), "--no-document"],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("select an image"));
}

#[test]
fn test_send_rejects_invalid_country_code() {
    let dir = TempDir::new().unwrap();
    let config = write_fast_config(dir.path());
    let mut body = fs::read_to_string(&config).unwrap();
    body.push_str("\n[addressing]\ncountry_code = \"India\"\n");
    fs::write(&config, body).unwrap();
    let sheet = dir.path().join("contacts.csv");
    fs::write(&sheet, "Number\n9876543210\n").unwrap();

    let output = run(
        &config,
        &[
            "send",
            "--contacts",
            sheet.to_str().unwrap(),
            "--no-image",
            "--no-document",
            "--caption",
            "hi",
        ],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("country_code must be digits"));
}
