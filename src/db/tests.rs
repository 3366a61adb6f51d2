use super::{
    apply_field_intent, get_notification, get_ticket, insert_history, insert_notification,
    insert_ticket, list_history, list_tickets, list_unread_notifications, mark_notification_read,
    open_connection, FieldIntent, IntentOutcome, CURRENT_SCHEMA_VERSION,
};
use crate::domain::priority::Priority;
use crate::domain::ticket::{HistoryEntry, Notification, Ticket, TicketField};
use rusqlite::params;
use uuid::Uuid;

fn unique_db_path() -> String {
    std::env::temp_dir()
        .join(format!("sticket-db-{}.sqlite", Uuid::now_v7()))
        .display()
        .to_string()
}

fn cleanup_db_files(path: &str) {
    for suffix in ["", "-wal", "-shm"] {
        let candidate = format!("{path}{suffix}");
        let _ = std::fs::remove_file(candidate);
    }
}

fn table_exists(conn: &rusqlite::Connection, table_name: &str) -> bool {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1)",
            params![table_name],
            |row| row.get(0),
        )
        .expect("table existence query should be readable");
    exists == 1
}

fn sample_ticket(id: &str, created_at: &str) -> Ticket {
    Ticket {
        created_at: created_at.to_string(),
        created_by: "user@example.com".to_string(),
        client_user: "U1".to_string(),
        case_number: "C-1".to_string(),
        target_sheet: "ClienteX".to_string(),
        attachment_url: "No attachment".to_string(),
        tool: "CRM".to_string(),
        motive: "Acceso bloqueado".to_string(),
        derivation_id: "D-1".to_string(),
        external_ticket_number: String::new(),
        id: id.to_string(),
        status: "Registrado".to_string(),
        observations: String::new(),
        priority: Priority::Normal,
        assignee: String::new(),
    }
}

#[test]
fn configures_connection_pragmas() {
    let path = unique_db_path();
    let conn = open_connection(&path).expect("connection should open");

    let journal_mode: String = conn
        .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
        .expect("journal_mode pragma should be readable");
    assert_eq!(journal_mode.to_uppercase(), "WAL");

    let busy_timeout: i64 = conn
        .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
        .expect("busy_timeout pragma should be readable");
    assert_eq!(busy_timeout, 5000);

    cleanup_db_files(&path);
}

#[test]
fn initializes_required_tables_and_schema_version() {
    let path = unique_db_path();
    let conn = open_connection(&path).expect("connection should open");

    for table in [
        "schema_migrations",
        "meta",
        "tickets",
        "history",
        "comments",
        "notifications",
        "reference_data",
    ] {
        assert!(table_exists(&conn, table), "missing table {table}");
    }

    let version: String = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .expect("schema version should be recorded");
    assert_eq!(version, CURRENT_SCHEMA_VERSION.to_string());

    cleanup_db_files(&path);
}

#[test]
fn reopening_does_not_reapply_migrations() {
    let path = unique_db_path();
    drop(open_connection(&path).expect("first open should succeed"));
    let conn = open_connection(&path).expect("second open should succeed");
    let applied: i64 = conn
        .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
        .expect("migration count should be readable");
    assert_eq!(applied, CURRENT_SCHEMA_VERSION);
    cleanup_db_files(&path);
}

#[test]
fn ticket_round_trips_through_typed_mapping() {
    let path = unique_db_path();
    let conn = open_connection(&path).expect("connection should open");
    let ticket = sample_ticket("TK-100001", "2026-03-01T10:00:00Z");
    insert_ticket(&conn, &ticket).expect("insert should succeed");

    let loaded = get_ticket(&conn, "TK-100001")
        .expect("lookup should succeed")
        .expect("ticket should exist");
    assert_eq!(loaded, ticket);
    assert!(get_ticket(&conn, "TK-999999")
        .expect("lookup should succeed")
        .is_none());

    cleanup_db_files(&path);
}

#[test]
fn duplicate_internal_id_is_rejected() {
    let path = unique_db_path();
    let conn = open_connection(&path).expect("connection should open");
    insert_ticket(&conn, &sample_ticket("TK-100001", "2026-03-01T10:00:00Z"))
        .expect("first insert should succeed");
    assert!(insert_ticket(&conn, &sample_ticket("TK-100001", "2026-03-01T11:00:00Z")).is_err());
    assert_eq!(list_tickets(&conn).expect("scan should succeed").len(), 1);
    cleanup_db_files(&path);
}

#[test]
fn compare_and_set_intent_reports_stale_value() {
    let path = unique_db_path();
    let conn = open_connection(&path).expect("connection should open");
    insert_ticket(&conn, &sample_ticket("TK-100001", "2026-03-01T10:00:00Z"))
        .expect("insert should succeed");

    let first = apply_field_intent(
        &conn,
        &FieldIntent {
            ticket_id: "TK-100001",
            field: TicketField::Assignee,
            expected: Some(""),
            value: "ana",
        },
    )
    .expect("intent should run");
    assert_eq!(first, IntentOutcome::Applied);

    let second = apply_field_intent(
        &conn,
        &FieldIntent {
            ticket_id: "TK-100001",
            field: TicketField::Assignee,
            expected: Some(""),
            value: "bob",
        },
    )
    .expect("intent should run");
    assert_eq!(
        second,
        IntentOutcome::Stale {
            current: "ana".to_string()
        }
    );

    let missing = apply_field_intent(
        &conn,
        &FieldIntent {
            ticket_id: "TK-000000",
            field: TicketField::Status,
            expected: None,
            value: "Cerrado",
        },
    )
    .expect("intent should run");
    assert_eq!(missing, IntentOutcome::Missing);

    cleanup_db_files(&path);
}

#[test]
fn history_lists_in_insertion_order() {
    let path = unique_db_path();
    let conn = open_connection(&path).expect("connection should open");
    for description in ["created", "taken", "status changed"] {
        insert_history(
            &conn,
            &HistoryEntry {
                ticket_id: "TK-100001".to_string(),
                occurred_at: "2026-03-01T10:00:00Z".to_string(),
                description: description.to_string(),
                actor: "a@example.com".to_string(),
            },
        )
        .expect("history insert should succeed");
    }
    let descriptions: Vec<String> = list_history(&conn, "TK-100001")
        .expect("history should list")
        .into_iter()
        .map(|entry| entry.description)
        .collect();
    assert_eq!(descriptions, vec!["created", "taken", "status changed"]);
    cleanup_db_files(&path);
}

#[test]
fn unread_notifications_are_scoped_and_newest_first() {
    let path = unique_db_path();
    let conn = open_connection(&path).expect("connection should open");
    let rows = [
        ("N-1", "2026-03-01T10:00:00Z", "u@example.com"),
        ("N-2", "2026-03-01T12:00:00Z", "u@example.com"),
        ("N-3", "2026-03-01T11:00:00Z", "other@example.com"),
    ];
    for (id, at, recipient) in rows {
        insert_notification(
            &conn,
            &Notification {
                id: id.to_string(),
                occurred_at: at.to_string(),
                recipient: recipient.to_string(),
                message: "hello".to_string(),
                read: false,
                ticket_id: None,
            },
        )
        .expect("notification insert should succeed");
    }

    let unread = list_unread_notifications(&conn, "u@example.com").expect("list should succeed");
    let ids: Vec<&str> = unread.iter().map(|row| row.id.as_str()).collect();
    assert_eq!(ids, vec!["N-2", "N-1"]);

    mark_notification_read(&conn, "N-2").expect("mark should succeed");
    let stored = get_notification(&conn, "N-2")
        .expect("lookup should succeed")
        .expect("notification should exist");
    assert!(stored.read);
    assert_eq!(
        list_unread_notifications(&conn, "u@example.com")
            .expect("list should succeed")
            .len(),
        1
    );

    cleanup_db_files(&path);
}
