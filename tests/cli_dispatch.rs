use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use uuid::Uuid;

const CONFIG: &str = r#"
[roles]
"root@example.com" = "SUPERUSER"
"ana@example.com" = "AUDITOR"

[[teams]]
lead = "Maria"
members = ["u@example.com"]

[escalation]
threshold = 2
"#;

struct Workspace {
    root: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let root = std::env::temp_dir().join(format!("sticket-cli-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&root).expect("workspace should be creatable");
        std::fs::write(root.join("sticket.toml"), CONFIG).expect("config should be writable");
        Self { root }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn run(&self, user: &str, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_sticket"))
            .env_remove("STICKET_USER")
            .env_remove("STICKET_LOG")
            .env("NO_COLOR", "1")
            .arg("--db")
            .arg(self.path(".sticket/state.sqlite"))
            .arg("--config")
            .arg(self.path("sticket.toml"))
            .arg("--user")
            .arg(user)
            .args(args)
            .output()
            .expect("sticket command should run")
    }

    fn json(&self, user: &str, args: &[&str]) -> (bool, Value) {
        let mut with_json = args.to_vec();
        with_json.push("--json");
        let output = self.run(user, &with_json);
        let value = parse_outcome(&output);
        (output.status.success(), value)
    }

    fn create(&self, user: &str, sheet: &str) -> String {
        let (ok, value) = self.json(
            user,
            &[
                "new",
                "--client",
                "U123",
                "--case",
                "C-1",
                "--tool",
                "CRM",
                "--sheet",
                sheet,
                "--motive",
                "Acceso bloqueado",
                "--derivation",
                "D-9",
            ],
        );
        assert!(ok, "create failed: {value}");
        value["ticket_id"]
            .as_str()
            .expect("ticket id should be a string")
            .to_string()
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

fn parse_outcome(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).unwrap_or_else(|err| {
        panic!(
            "stdout should be a JSON outcome ({err}).\nstdout:\n{}\nstderr:\n{}",
            stdout,
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

fn count(value: &Value, key: &str) -> usize {
    value[key].as_array().map_or(0, Vec::len)
}

#[test]
fn ticket_lifecycle_end_to_end() {
    let ws = Workspace::new();
    let id = ws.create("u@example.com", "ClienteX");
    assert!(id.starts_with("TK-") && id.len() == 9, "unexpected id {id}");

    let (ok, taken) = ws.json("ana@example.com", &["take", &id]);
    assert!(ok);
    assert_eq!(taken["status"], "success");
    assert_eq!(taken["assignee"], "ana");

    let (ok, again) = ws.json("ana@example.com", &["take", &id]);
    assert!(ok);
    assert_eq!(again["status"], "info");

    let (ok, updated) = ws.json(
        "ana@example.com",
        &["update", &id, "--status", "En Progreso"],
    );
    assert!(ok);
    assert_eq!(count(&updated, "changed_fields"), 1);

    let (_, history) = ws.json("u@example.com", &["history", &id]);
    let descriptions: Vec<&str> = history["history"]
        .as_array()
        .expect("history should be an array")
        .iter()
        .map(|entry| entry["description"].as_str().expect("description"))
        .collect();
    assert_eq!(descriptions.len(), 3);
    assert!(descriptions[0].starts_with("Ticket created"));
    assert!(descriptions[1].starts_with("Ticket taken"));
    assert!(descriptions[2].starts_with("Status changed"));

    let (_, inbox) = ws.json("u@example.com", &["notifications"]);
    assert_eq!(count(&inbox, "notifications"), 2);
    let first = inbox["notifications"][0]["id"]
        .as_str()
        .expect("notification id")
        .to_string();

    let (ok, denied) = ws.json("ana@example.com", &["read", &first]);
    assert!(!ok);
    assert_eq!(denied["status"], "error");
    assert_eq!(denied["error_kind"], "permission");

    let (ok, _) = ws.json("u@example.com", &["read", &first]);
    assert!(ok);
    let (_, inbox) = ws.json("u@example.com", &["notifications"]);
    assert_eq!(count(&inbox, "notifications"), 1);
}

#[test]
fn unchanged_update_is_informational() {
    let ws = Workspace::new();
    let id = ws.create("u@example.com", "ClienteX");
    let (ok, value) = ws.json(
        "ana@example.com",
        &["update", &id, "--status", " Registrado ", "--priority", "Normal"],
    );
    assert!(ok);
    assert_eq!(value["status"], "info");
    assert_eq!(count(&value, "changed_fields"), 0);
}

#[test]
fn users_cannot_triage() {
    let ws = Workspace::new();
    let id = ws.create("u@example.com", "ClienteX");
    let (ok, value) = ws.json("u@example.com", &["take", &id]);
    assert!(!ok);
    assert_eq!(value["error_kind"], "permission");

    let (ok, value) = ws.json("ana@example.com", &["take", "TK-000000"]);
    assert!(!ok);
    assert_eq!(value["error_kind"], "not_found");
}

#[test]
fn missing_identity_and_fields_are_validation_errors() {
    let ws = Workspace::new();
    let (ok, value) = ws.json("", &["notifications"]);
    assert!(!ok);
    assert_eq!(value["error_kind"], "validation");

    let (ok, value) = ws.json(
        "u@example.com",
        &[
            "new", "--client", "U", "--case", "C", "--tool", "T", "--sheet", "S", "--motive",
            "  ", "--derivation", "D",
        ],
    );
    assert!(!ok);
    assert_eq!(value["error_kind"], "validation");
}

#[test]
fn escalation_runs_once_per_overloaded_sheet() {
    let ws = Workspace::new();
    for _ in 0..3 {
        ws.create("u@example.com", "ClienteX");
    }
    ws.create("u@example.com", "ClienteY");

    let (ok, first) = ws.json("", &["escalate"]);
    assert!(ok);
    assert_eq!(first["status"], "success");
    assert_eq!(count(&first["summary"], "escalated"), 3);

    let (ok, second) = ws.json("", &["escalate"]);
    assert!(ok);
    assert_eq!(second["status"], "info");

    let (_, urgent) = ws.json("u@example.com", &["ls", "--priority", "Urgente"]);
    assert_eq!(urgent["total_tickets"], 3);
}

#[test]
fn dashboard_paginates_and_scopes_to_team() {
    let ws = Workspace::new();
    for _ in 0..3 {
        ws.create("u@example.com", "ClienteX");
    }
    ws.create("other@example.com", "ClienteX");

    let (_, page) = ws.json("ana@example.com", &["ls", "--page-size", "2", "--page", "2"]);
    assert_eq!(page["total_tickets"], 4);
    assert_eq!(count(&page, "tickets"), 2);
    assert_eq!(count(&page, "all_tickets_for_stats"), 4);

    let (_, team) = ws.json("ana@example.com", &["ls", "--team", "Maria"]);
    assert_eq!(team["total_tickets"], 3);

    let (_, mine) = ws.json("other@example.com", &["ls", "--mine"]);
    assert_eq!(mine["total_tickets"], 1);
}

#[test]
fn comments_and_reference_data_round_out_the_ticket_view() {
    let ws = Workspace::new();
    let id = ws.create("u@example.com", "ClienteX");

    let (ok, _) = ws.json("u@example.com", &["comment", &id, "any news?"]);
    assert!(ok);
    let (_, comments) = ws.json("ana@example.com", &["comments", &id]);
    assert_eq!(comments["comments"][0]["text"], "any news?");

    let (ok, denied) = ws.json(
        "ana@example.com",
        &["ref", "set", "Acceso bloqueado", "--sheet", "Accesos"],
    );
    assert!(!ok);
    assert_eq!(denied["error_kind"], "permission");
    let (ok, _) = ws.json(
        "root@example.com",
        &[
            "ref",
            "set",
            "Acceso bloqueado",
            "--sheet",
            "Accesos",
            "--route",
            "/accesos",
        ],
    );
    assert!(ok);

    let (_, shown) = ws.json("u@example.com", &["show", &id]);
    assert_eq!(shown["ticket"]["motive"], "Acceso bloqueado");
    assert_eq!(shown["reference"]["route"], "/accesos");
}

#[test]
fn attachments_are_copied_into_the_store() {
    let ws = Workspace::new();
    let source = ws.path("capture.png");
    std::fs::write(&source, b"png-bytes").expect("attachment should be writable");
    let (ok, value) = ws.json(
        "u@example.com",
        &[
            "new",
            "--client",
            "U",
            "--case",
            "C",
            "--tool",
            "T",
            "--sheet",
            "S",
            "--motive",
            "M",
            "--derivation",
            "D",
            "--attach",
            source.to_str().expect("utf8 path"),
        ],
    );
    assert!(ok, "create failed: {value}");
    let url = value["ticket"]["attachment_url"]
        .as_str()
        .expect("attachment url");
    assert!(url.starts_with("file://"));
    assert!(url.ends_with("-capture.png"));
    assert!(Path::new(url.trim_start_matches("file://")).exists());
}

#[test]
fn human_output_reports_errors_on_stderr() {
    let ws = Workspace::new();
    let output = ws.run("u@example.com", &["show", "TK-000000"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: ticket 'TK-000000' not found"), "stderr: {stderr}");
}

#[test]
fn completions_print_without_a_store() {
    let output = Command::new(env!("CARGO_BIN_EXE_sticket"))
        .args(["completions", "bash"])
        .output()
        .expect("sticket command should run");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("sticket"));
}
