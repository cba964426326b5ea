//! End-to-end tests for the `uc` binary.
//!
//! Each test points the binary at a throwaway database and usage log through
//! a config file, then drives it the way a user would.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

// 2026-01-15T10:00:00Z
const T0: i64 = 1_768_471_200_000;
const NOW: &str = "2026-01-15T10:30:00Z";

struct Env {
    temp: TempDir,
    config: PathBuf,
}

impl Env {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        std::fs::write(
            &config,
            format!(
                "database_path = \"{}\"\nevents_path = \"{}\"\n",
                temp.path().join("uc.db").display(),
                temp.path().join("usage.jsonl").display()
            ),
        )
        .unwrap();
        Self { temp, config }
    }

    fn events_path(&self) -> PathBuf {
        self.temp.path().join("usage.jsonl")
    }

    fn write_events(&self, events: &[(&str, i64, &str)]) {
        let lines: Vec<String> = events
            .iter()
            .map(|(package, offset_secs, kind)| {
                format!(
                    r#"{{"package":"{package}","timestamp_ms":{},"kind":"{kind}"}}"#,
                    T0 + offset_secs * 1000
                )
            })
            .collect();
        std::fs::write(self.events_path(), lines.join("\n")).unwrap();
    }

    fn run(&self, args: &[&str]) -> Output {
        uc(self.temp.path(), &self.config, args)
    }

    fn stdout(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "uc {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).unwrap()
    }
}

fn uc(home: &Path, config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_uc"))
        .env("HOME", home)
        .env_remove("XDG_CONFIG_HOME")
        .env_remove("XDG_DATA_HOME")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("failed to run uc")
}

#[test]
fn test_no_subcommand_prints_help() {
    let env = Env::new();
    let stdout = env.stdout(&[]);
    assert!(stdout.contains("Usage:"), "{stdout}");
}

#[test]
fn test_login_status_logout() {
    let env = Env::new();

    let stdout = env.stdout(&[
        "login",
        "--email",
        "user@example.com",
        "--id-token",
        "id-token",
        "--access-token",
        "ya29.a",
    ]);
    assert_eq!(stdout, "Signed in as user@example.com\n");

    let stdout = env.stdout(&["status"]);
    assert!(
        stdout.contains("Account: user@example.com (calendar access granted)"),
        "{stdout}"
    );

    assert_eq!(env.stdout(&["logout"]), "Signed out\n");
    let stdout = env.stdout(&["status"]);
    assert!(stdout.contains("Account: not signed in"), "{stdout}");
}

#[test]
fn test_apps_registry_round_trip() {
    let env = Env::new();

    env.stdout(&["apps", "add", "com.example.reader", "--name", "Reader"]);
    env.stdout(&["apps", "add", "com.android.settings", "--system"]);

    let listed = env.stdout(&["apps", "list"]);
    assert_eq!(
        listed,
        "system    com.android.settings\ntracked   com.example.reader (Reader)\n"
    );

    assert_eq!(
        env.stdout(&["apps", "remove", "com.android.settings"]),
        "Removed com.android.settings\n"
    );
    let listed = env.stdout(&["apps", "list", "--json"]);
    let rows: serde_json::Value = serde_json::from_str(&listed).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 1);
}

#[test]
fn test_sessions_reconstructs_flicker_as_one_session() {
    let env = Env::new();
    env.stdout(&["apps", "add", "com.example.reader", "--name", "Reader"]);
    env.write_events(&[
        ("com.example.reader", 0, "foreground"),
        ("com.example.reader", 120, "background"),
        ("com.example.reader", 121, "foreground"),
        ("com.example.reader", 300, "background"),
    ]);

    let stdout = env.stdout(&["sessions", "--now", NOW, "--json"]);
    let rows: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1, "{stdout}");
    assert_eq!(rows[0]["start_ms"], T0);
    assert_eq!(rows[0]["end_ms"], T0 + 300_000);
}

#[test]
fn test_sync_requires_login() {
    let env = Env::new();
    env.write_events(&[("com.example.reader", 0, "foreground")]);

    let stdout = env.stdout(&["sync", "--now", NOW, "--no-consent"]);
    assert_eq!(stdout, "Not signed in. Run `uc login` first.\n");
}

#[test]
fn test_sync_without_usage_log_explains_access() {
    let env = Env::new();
    let stdout = env.stdout(&["sync", "--now", NOW, "--no-consent"]);
    assert!(stdout.starts_with("Usage access not granted"), "{stdout}");
}

#[test]
fn test_invalid_now_fails() {
    let env = Env::new();
    env.write_events(&[]);
    let output = env.run(&["sessions", "--now", "soon"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid datetime"), "{stderr}");
}
