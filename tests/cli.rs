use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, extra: &str) -> String {
    let config_path = dir.path().join("config.toml");
    let content = format!(
        "[database]\npath = \"{}\"\n{}",
        dir.path().join("db").display(),
        extra
    );
    fs::write(&config_path, content).unwrap();
    config_path.to_str().unwrap().to_string()
}

fn event_line(id: &str, kind: u32, content: &str) -> String {
    let created_at = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    serde_json::json!({
        "type": "new",
        "event": {
            "id": id,
            "pubkey": "d0".repeat(32),
            "created_at": created_at,
            "kind": kind,
            "tags": [],
            "content": content,
            "sig": "",
        },
        "sourceType": "IP4",
        "sourceInfo": "203.0.113.7",
    })
    .to_string()
}

#[test]
fn version_flag_prints_version() {
    Command::cargo_bin("gatr")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn help_lists_flags() {
    let output = Command::cargo_bin("gatr")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();
    for flag in ["--config", "--use-defaults", "--validate", "--dry-run"] {
        assert!(text.contains(flag));
    }
}

#[test]
fn validate_accepts_a_good_config() {
    let dir = TempDir::new().unwrap();
    let config_path = write_config(&dir, "[policy]\nallowed_kinds = [1, 7]\n");

    Command::cargo_bin("gatr")
        .unwrap()
        .args(["--config", &config_path, "--validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is VALID."));
}

#[test]
fn validate_rejects_a_bad_config() {
    let dir = TempDir::new().unwrap();
    // Allow and deny the same kind.
    let config_path = write_config(
        &dir,
        "[policy]\nallowed_kinds = [1]\ndenied_kinds = [1]\n",
    );

    Command::cargo_bin("gatr")
        .unwrap()
        .args(["--config", &config_path, "--validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration is INVALID"));
}

#[test]
fn missing_config_without_defaults_fails() {
    let dir = TempDir::new().unwrap();
    let absent = dir.path().join("absent.toml");

    Command::cargo_bin("gatr")
        .unwrap()
        .args(["--config", absent.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));
}

#[test]
fn stdin_round_trip_applies_kind_rules() {
    let dir = TempDir::new().unwrap();
    let config_path = write_config(
        &dir,
        "[policy]\nallowed_kinds = [1, 7]\ndenied_kinds = [3]\n",
    );

    let input = format!(
        "{}\n{}\nnot-json\n{}\n",
        event_line(&"a1".repeat(32), 3, "contact list"),
        event_line(&"a2".repeat(32), 1, "hello"),
        event_line(&"a3".repeat(32), 7, "+")
    );

    let output = Command::cargo_bin("gatr")
        .unwrap()
        .args(["--config", &config_path])
        .write_stdin(input)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let responses: Vec<serde_json::Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0]["id"], "a1".repeat(32));
    assert_eq!(responses[0]["action"], "reject");
    assert_eq!(responses[0]["msg"], "kind_3_denied");
    assert_eq!(responses[1]["action"], "accept");
    assert_eq!(responses[2]["action"], "accept");
}

#[test]
fn dry_run_never_rejects() {
    let dir = TempDir::new().unwrap();
    let config_path = write_config(&dir, "[policy]\ndenied_kinds = [3]\n");

    let output = Command::cargo_bin("gatr")
        .unwrap()
        .args(["--config", &config_path, "--dry-run"])
        .write_stdin(event_line(&"a1".repeat(32), 3, ""))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let response: serde_json::Value =
        serde_json::from_str(String::from_utf8(output).unwrap().lines().next().unwrap()).unwrap();
    assert_eq!(response["action"], "accept");
}

#[test]
fn use_defaults_runs_without_a_config_file() {
    let dir = TempDir::new().unwrap();
    let absent = dir.path().join("absent.toml");

    let output = Command::cargo_bin("gatr")
        .unwrap()
        .current_dir(dir.path())
        .args(["--config", absent.to_str().unwrap(), "--use-defaults"])
        .write_stdin(event_line(&"a1".repeat(32), 1, "hello"))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let response: serde_json::Value =
        serde_json::from_str(String::from_utf8(output).unwrap().lines().next().unwrap()).unwrap();
    assert_eq!(response["action"], "accept");
}
