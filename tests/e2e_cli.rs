//! E2E tests for the command-line binary

use std::process::Command;

fn multitx() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_multitx"));
    command.env_remove("RUST_LOG");
    command
}

#[test]
fn test_log_file_receives_log_lines() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("logs").join("multitx.log");
    let missing = dir.path().join("missing.wav");

    let output = multitx()
        .arg("--log-file")
        .arg(&log)
        .arg("--report")
        .arg(&missing)
        .output()
        .unwrap();
    assert!(!output.status.success());

    let written = std::fs::read_to_string(&log).unwrap();
    assert!(written.contains("Failed to analyze file"), "log: {written}");
    assert!(written.contains("ERROR"));
    // Plain text, no terminal colors
    assert!(!written.contains('\u{1b}'));

    // Still mirrored on stderr
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to analyze file"));
}

#[test]
fn test_check_without_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = multitx()
        .current_dir(dir.path())
        .args(["--tone-check", "67.0", "--center", "462562500", "--check"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Configuration OK"));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
