//! Runs the `sql-read-only` binary the way a user would

use std::io::Write;
use std::process::{Command, Stdio};

const BLOCKED: &str = "Write queries are currently disabled.";

/// Feed `input` to the binary on stdin and return its stdout
fn run_shell(settings_file: Option<&std::path::Path>, input: &str) -> String {
    let mut command = Command::new(env!("CARGO_BIN_EXE_sql-read-only"));
    command
        .env("DJANGO_READ_ONLY", "1")
        .env_remove("DATABASE_URL")
        .env_remove("SQL_READ_ONLY_SETTINGS")
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    if let Some(path) = settings_file {
        command.env("SQL_READ_ONLY_SETTINGS", path);
    }

    let mut child = command.spawn().expect("spawn sql-read-only");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(input.as_bytes())
        .expect("write stdin");
    let output = child.wait_with_output().expect("wait for sql-read-only");
    assert!(output.status.success(), "exit status {}", output.status);
    String::from_utf8(output.stdout).expect("utf-8 stdout")
}

#[test]
fn test_environment_turns_read_only_on() {
    let stdout = run_shell(None, "CREATE TABLE site (id INTEGER)\nSELECT 1\nexit\n");
    let lines: Vec<&str> = stdout.lines().collect();

    assert_eq!(lines.len(), 2, "unexpected output: {stdout}");
    assert!(lines[0].starts_with(BLOCKED));
    assert!(lines[1].contains(r#""rows":[[1]]"#));
}

#[test]
fn test_explicit_setting_beats_environment() {
    let mut settings = tempfile::NamedTempFile::new().expect("settings file");
    write!(settings, r#"{{"DJANGO_READ_ONLY": false}}"#).expect("write settings");

    let stdout = run_shell(
        Some(settings.path()),
        "CREATE TABLE site (id INTEGER)\nINSERT INTO site (id) VALUES (1)\n",
    );

    assert!(!stdout.contains(BLOCKED), "unexpected output: {stdout}");
    assert_eq!(stdout.lines().count(), 2);
}

#[test]
fn test_read_only_command_toggles_writes() {
    let stdout = run_shell(
        None,
        "%read_only off\nCREATE TABLE site (id INTEGER)\n%read_only on\nDROP TABLE site\n",
    );
    let lines: Vec<&str> = stdout.lines().collect();

    assert_eq!(lines.len(), 4, "unexpected output: {stdout}");
    assert_eq!(lines[0], "Write queries enabled.");
    assert!(!lines[1].starts_with(BLOCKED));
    assert_eq!(lines[2], "Write queries disabled.");
    assert!(lines[3].starts_with(BLOCKED));
}
