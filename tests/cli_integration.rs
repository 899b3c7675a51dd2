
use mock_jmap::MockJmapServer;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Runs the binary against a mock JMAP server with config, rules, store and
/// log all under one temp dir.
struct Harness {
    server: MockJmapServer,
    dir: tempfile::TempDir,
}

impl Harness {
    fn start() -> Self {
        let server = MockJmapServer::start();
        let dir = tempfile::tempdir().expect("create temp dir");
        let config = format!(
            r#"[account]
well_known_url = "{}/.well-known/jmap"
username = "test@example.com"
password_command = "echo test"

[mail]
fetch_mailbox = "INBOX"

[store]
path = "{}"
"#,
            server.url(),
            dir.path().join("store").join("emails.redb").display()
        );
        std::fs::write(dir.path().join("config.toml"), config).expect("write config");
        Harness { server, dir }
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    fn write_rules(&self, json: &str) {
        std::fs::write(self.dir.path().join("rules.json"), json).expect("write rules");
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_mailrules"))
            .arg(format!("--config={}", self.config_path().display()))
            .args(args)
            .env("XDG_STATE_HOME", self.dir.path().join("state"))
            .env("XDG_CACHE_HOME", self.dir.path().join("cache"))
            .output()
            .expect("run mailrules")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn run_bare(args: &[&str], state_home: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mailrules"))
        .args(args)
        .env("XDG_STATE_HOME", state_home)
        .output()
        .expect("run mailrules")
}

const RULES: &str = r#"{
  "rules": [
    {
      "name": "newsletters",
      "predicate_type": "all",
      "conditions": [
        {"field": "from", "predicate": "contains", "value": "NEWSLETTER@"},
        {"field": "attachment", "predicate": "equals", "value": "true"}
      ],
      "actions": [
        {"type": "mark_as_read"},
        {"type": "move_message", "folder": "Newsletters"}
      ]
    },
    {
      "name": "old meetings",
      "predicate_type": "any",
      "conditions": [
        {"field": "subject", "predicate": "contains", "value": "meeting"},
        {"field": "body", "predicate": "contains", "value": "never present"}
      ],
      "actions": [{"type": "move_message", "folder": "archive"}]
    },
    {
      "name": "stale mail",
      "predicate_type": "all",
      "conditions": [
        {"field": "date_received", "predicate": "greater_than", "value": 30},
        {"field": "sender", "predicate": "contains", "value": "alice"}
      ],
      "actions": [{"type": "mark_as_unread"}]
    }
  ]
}"#;

#[test]
fn test_help() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_bare(&["--help"], dir.path());
    assert!(output.status.success());
    assert!(stdout(&output).contains("--apply-rules"));
}

#[test]
fn test_unknown_flag_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_bare(&["--bogus"], dir.path());
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("unknown option"));
}

#[test]
fn test_missing_config_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let config = format!("--config={}", dir.path().join("absent.toml").display());
    let output = run_bare(&[&config, "--refresh"], dir.path());
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Error loading config"));
}

#[test]
fn test_print_rules() {
    let h = Harness::start();
    h.write_rules(RULES);
    let output = h.run(&["--print-rules"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Rules loaded: 3"), "got: {}", out);
    assert!(out.contains("Rule 1: newsletters"), "got: {}", out);
    assert!(out.contains("move_message=Newsletters"), "got: {}", out);
}

#[test]
fn test_invalid_rules_exit_nonzero() {
    let h = Harness::start();
    h.write_rules(
        r#"{"rules": [{"name": "bad", "predicate_type": "all",
            "conditions": [{"field": "subject", "predicate": "greater_than", "value": 3}],
            "actions": []}]}"#,
    );
    let output = h.run(&["--apply-rules"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("not valid for field 'subject'"));
    assert!(h.server.calls().is_empty());
}

#[test]
fn test_refresh_stores_newest_first_up_to_count() {
    let h = Harness::start();
    let output = h.run(&["--refresh", "-c", "2"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Fetching 2 emails..."), "got: {}", out);
    assert!(out.contains("Stored/Updated email: Weekly Digest"), "got: {}", out);
    assert!(out.contains("Stored/Updated email: Meeting Tomorrow"), "got: {}", out);
    assert!(!out.contains("Hello World"), "got: {}", out);
    assert!(!h.server.calls().contains(&"Email/set".to_string()));
}

#[test]
fn test_display_prints_without_storing() {
    let h = Harness::start();
    let output = h.run(&["--display", "--count=1"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("Subject: Weekly Digest"), "got: {}", out);
    assert!(out.contains("Attachment Types: application/pdf"), "got: {}", out);
    assert!(!h.dir.path().join("store").join("emails.redb").exists());
}

#[test]
fn test_mark_read_updates_server() {
    let h = Harness::start();
    let output = h.run(&["--mark-read"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Marked as read: Meeting Tomorrow"));
    for id in ["email-001", "email-002", "email-003"] {
        assert_eq!(h.server.email(id)["keywords"]["$seen"], true, "{}", id);
    }
}

#[test]
fn test_default_run_fetches_stores_and_applies_rules() {
    let h = Harness::start();
    h.write_rules(RULES);

    let output = h.run(&[]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Rule 'newsletters' matched: Weekly Digest"), "got: {}", out);
    assert!(out.contains("Rule 'old meetings' matched: Meeting Tomorrow"), "got: {}", out);
    assert!(out.contains("Rule 'stale mail' matched: Hello World"), "got: {}", out);
    assert!(out.contains("0 action failure(s)"), "got: {}", out);

    // Missing folder is created, then the message is moved into it.
    let newsletters = h.server.mailbox_id("Newsletters").expect("folder created");
    let digest = h.server.email("email-003");
    assert_eq!(digest["keywords"]["$seen"], true);
    assert_eq!(digest["mailboxIds"][newsletters.as_str()], true);
    assert!(digest["mailboxIds"].get("mbox-inbox").is_none());

    // "archive" resolves case-insensitively to the existing Archive mailbox.
    let meeting = h.server.email("email-002");
    assert_eq!(meeting["mailboxIds"]["mbox-archive"], true);
    assert_eq!(h.server.calls().iter().filter(|c| *c == "Mailbox/set").count(), 1);

    let hello = h.server.email("email-001");
    assert!(hello["keywords"].get("$seen").is_none());
}

#[test]
fn test_apply_rules_uses_stored_emails() {
    let h = Harness::start();
    h.write_rules(RULES);

    let output = h.run(&["--refresh"]);
    assert!(output.status.success());
    let calls_after_refresh = h.server.calls().len();

    let output = h.run(&["--apply-rules"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Processed 3 email(s): 3 matched"), "got: {}", out);

    let calls = h.server.calls();
    assert!(!calls[calls_after_refresh..].contains(&"Email/query".to_string()));
}

#[test]
fn test_unreachable_server_is_reported_not_fatal() {
    let h = Harness::start();
    let config = std::fs::read_to_string(h.config_path())
        .unwrap()
        .replace(&h.server.url(), "http://127.0.0.1:1");
    std::fs::write(h.config_path(), config).unwrap();

    let output = h.run(&["--refresh"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("Error:"));
}
