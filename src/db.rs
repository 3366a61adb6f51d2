use std::time::Duration;

use rusqlite::{params, Connection, DatabaseName, OptionalExtension, Result, Row};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::domain::priority::Priority;
use crate::domain::ticket::{
    Comment, HistoryEntry, Notification, ReferenceMapping, Ticket, TicketField,
};

pub const CURRENT_SCHEMA_VERSION: i64 = 2;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: [Migration; 2] = [
    Migration {
        version: 1,
        name: "baseline_helpdesk_schema_v1",
        sql: r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tickets (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    created_by TEXT NOT NULL,
    client_user TEXT NOT NULL,
    case_number TEXT NOT NULL,
    target_sheet TEXT NOT NULL,
    attachment_url TEXT NOT NULL,
    tool TEXT NOT NULL,
    motive TEXT NOT NULL,
    derivation_id TEXT NOT NULL,
    external_ticket_number TEXT NOT NULL DEFAULT '',
    internal_id TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS history (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    ticket_id TEXT NOT NULL,
    occurred_at TEXT NOT NULL,
    description TEXT NOT NULL,
    actor TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS comments (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    ticket_id TEXT NOT NULL,
    occurred_at TEXT NOT NULL,
    author TEXT NOT NULL,
    body TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notifications (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    occurred_at TEXT NOT NULL,
    recipient TEXT NOT NULL,
    message TEXT NOT NULL,
    read INTEGER NOT NULL DEFAULT 0,
    ticket_id TEXT
);

CREATE TABLE IF NOT EXISTS reference_data (
    motive TEXT PRIMARY KEY,
    sheet_name TEXT NOT NULL,
    route TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_history_ticket ON history(ticket_id);
CREATE INDEX IF NOT EXISTS idx_comments_ticket ON comments(ticket_id);
CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications(recipient, read);
"#,
    },
    Migration {
        version: 2,
        name: "ticket_triage_columns_v1",
        sql: r#"
ALTER TABLE tickets ADD COLUMN observations TEXT NOT NULL DEFAULT '';
ALTER TABLE tickets ADD COLUMN priority TEXT NOT NULL DEFAULT 'Normal';
ALTER TABLE tickets ADD COLUMN assignee TEXT NOT NULL DEFAULT '';
CREATE INDEX IF NOT EXISTS idx_tickets_sheet_status ON tickets(target_sheet, status);
"#,
    },
];

pub fn open_connection(path: &str) -> Result<Connection> {
    let mut conn = Connection::open(path)?;
    configure_for_speed(&conn)?;
    apply_migrations(&mut conn)?;
    Ok(conn)
}

fn configure_for_speed(conn: &Connection) -> Result<()> {
    conn.pragma_update(None::<DatabaseName>, "journal_mode", "WAL")?;
    conn.pragma_update(None::<DatabaseName>, "synchronous", "NORMAL")?;
    conn.pragma_update(None::<DatabaseName>, "temp_store", "MEMORY")?;
    conn.pragma_update(None::<DatabaseName>, "busy_timeout", 5000i64)?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(())
}

fn apply_migrations(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
);
"#,
    )?;

    for migration in MIGRATIONS {
        let already_applied: Option<i64> = tx
            .query_row(
                "SELECT version FROM schema_migrations WHERE version = ?1",
                params![migration.version],
                |row| row.get(0),
            )
            .optional()?;

        if already_applied.is_some() {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, now_utc_rfc3339()],
        )?;
    }

    tx.execute(
        r#"
INSERT INTO meta (key, value)
VALUES ('schema_version', ?1)
ON CONFLICT(key) DO UPDATE SET value = excluded.value
"#,
        params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;

    tx.commit()
}

/// Whole-second UTC timestamps keep stored values fixed-width, so text order is time order.
pub fn now_utc_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .replace_nanosecond(0)
        .expect("zero nanoseconds is always in range")
        .format(&Rfc3339)
        .expect("RFC3339 formatting for UTC timestamp should never fail")
}

const TICKET_COLUMNS: &str = r#"
created_at, created_by, client_user, case_number, target_sheet, attachment_url, tool,
motive, derivation_id, external_ticket_number, internal_id, status, observations,
priority, assignee
"#;

fn ticket_from_row(row: &Row<'_>) -> Result<Ticket> {
    let priority: String = row.get(13)?;
    Ok(Ticket {
        created_at: row.get(0)?,
        created_by: row.get(1)?,
        client_user: row.get(2)?,
        case_number: row.get(3)?,
        target_sheet: row.get(4)?,
        attachment_url: row.get(5)?,
        tool: row.get(6)?,
        motive: row.get(7)?,
        derivation_id: row.get(8)?,
        external_ticket_number: row.get(9)?,
        id: row.get(10)?,
        status: row.get(11)?,
        observations: row.get(12)?,
        priority: Priority::from_stored(&priority),
        assignee: row.get(14)?,
    })
}

pub fn insert_ticket(conn: &Connection, ticket: &Ticket) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO tickets ({TICKET_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        ),
        params![
            ticket.created_at,
            ticket.created_by,
            ticket.client_user,
            ticket.case_number,
            ticket.target_sheet,
            ticket.attachment_url,
            ticket.tool,
            ticket.motive,
            ticket.derivation_id,
            ticket.external_ticket_number,
            ticket.id,
            ticket.status,
            ticket.observations,
            ticket.priority.as_str(),
            ticket.assignee,
        ],
    )?;
    Ok(())
}

pub fn ticket_exists(conn: &Connection, id: &str) -> Result<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM tickets WHERE internal_id = ?1)",
        params![id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub fn get_ticket(conn: &Connection, id: &str) -> Result<Option<Ticket>> {
    conn.query_row(
        &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE internal_id = ?1"),
        params![id],
        ticket_from_row,
    )
    .optional()
}

/// Full scan in insertion order.
pub fn list_tickets(conn: &Connection) -> Result<Vec<Ticket>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TICKET_COLUMNS} FROM tickets ORDER BY seq ASC"
    ))?;
    let mut rows = stmt.query([])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(ticket_from_row(row)?);
    }
    Ok(result)
}

/// Full scan paired with each priority cell exactly as stored, for writers
/// that compare-and-set against it.
pub fn list_tickets_with_stored_priority(conn: &Connection) -> Result<Vec<(Ticket, String)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TICKET_COLUMNS} FROM tickets ORDER BY seq ASC"
    ))?;
    let mut rows = stmt.query([])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        let stored_priority: String = row.get(13)?;
        result.push((ticket_from_row(row)?, stored_priority));
    }
    Ok(result)
}

/// A single-cell write against one of the mutable ticket columns.
///
/// With `expected` set the write only lands when the stored value still
/// equals it; without it the write is last-write-wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIntent<'a> {
    pub ticket_id: &'a str,
    pub field: TicketField,
    pub expected: Option<&'a str>,
    pub value: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentOutcome {
    Applied,
    Stale { current: String },
    Missing,
}

pub fn apply_field_intent(conn: &Connection, intent: &FieldIntent<'_>) -> Result<IntentOutcome> {
    let column = intent.field.column();
    let changed = match intent.expected {
        Some(expected) => conn.execute(
            &format!("UPDATE tickets SET {column} = ?1 WHERE internal_id = ?2 AND {column} = ?3"),
            params![intent.value, intent.ticket_id, expected],
        )?,
        None => conn.execute(
            &format!("UPDATE tickets SET {column} = ?1 WHERE internal_id = ?2"),
            params![intent.value, intent.ticket_id],
        )?,
    };
    if changed > 0 {
        return Ok(IntentOutcome::Applied);
    }

    let current: Option<String> = conn
        .query_row(
            &format!("SELECT {column} FROM tickets WHERE internal_id = ?1"),
            params![intent.ticket_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(match current {
        Some(current) => IntentOutcome::Stale { current },
        None => IntentOutcome::Missing,
    })
}

pub fn insert_history(conn: &Connection, entry: &HistoryEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO history (ticket_id, occurred_at, description, actor) VALUES (?1, ?2, ?3, ?4)",
        params![
            entry.ticket_id,
            entry.occurred_at,
            entry.description,
            entry.actor
        ],
    )?;
    Ok(())
}

pub fn list_history(conn: &Connection, ticket_id: &str) -> Result<Vec<HistoryEntry>> {
    let mut stmt = conn.prepare(
        r#"
SELECT ticket_id, occurred_at, description, actor
FROM history
WHERE ticket_id = ?1
ORDER BY seq ASC
"#,
    )?;
    let mut rows = stmt.query(params![ticket_id])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(HistoryEntry {
            ticket_id: row.get(0)?,
            occurred_at: row.get(1)?,
            description: row.get(2)?,
            actor: row.get(3)?,
        });
    }
    Ok(result)
}

pub fn insert_comment(conn: &Connection, comment: &Comment) -> Result<()> {
    conn.execute(
        "INSERT INTO comments (ticket_id, occurred_at, author, body) VALUES (?1, ?2, ?3, ?4)",
        params![
            comment.ticket_id,
            comment.occurred_at,
            comment.author,
            comment.text
        ],
    )?;
    Ok(())
}

pub fn list_comments(conn: &Connection, ticket_id: &str) -> Result<Vec<Comment>> {
    let mut stmt = conn.prepare(
        r#"
SELECT ticket_id, occurred_at, author, body
FROM comments
WHERE ticket_id = ?1
ORDER BY occurred_at ASC, seq ASC
"#,
    )?;
    let mut rows = stmt.query(params![ticket_id])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(Comment {
            ticket_id: row.get(0)?,
            occurred_at: row.get(1)?,
            author: row.get(2)?,
            text: row.get(3)?,
        });
    }
    Ok(result)
}

fn notification_from_row(row: &Row<'_>) -> Result<Notification> {
    let read: i64 = row.get(4)?;
    Ok(Notification {
        id: row.get(0)?,
        occurred_at: row.get(1)?,
        recipient: row.get(2)?,
        message: row.get(3)?,
        read: read != 0,
        ticket_id: row.get(5)?,
    })
}

pub fn insert_notification(conn: &Connection, notification: &Notification) -> Result<()> {
    conn.execute(
        r#"
INSERT INTO notifications (id, occurred_at, recipient, message, read, ticket_id)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#,
        params![
            notification.id,
            notification.occurred_at,
            notification.recipient,
            notification.message,
            i64::from(notification.read),
            notification.ticket_id
        ],
    )?;
    Ok(())
}

/// Unread rows for one recipient, newest first.
pub fn list_unread_notifications(conn: &Connection, recipient: &str) -> Result<Vec<Notification>> {
    let mut stmt = conn.prepare(
        r#"
SELECT id, occurred_at, recipient, message, read, ticket_id
FROM notifications
WHERE recipient = ?1 AND read = 0
ORDER BY occurred_at DESC, seq DESC
"#,
    )?;
    let mut rows = stmt.query(params![recipient])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(notification_from_row(row)?);
    }
    Ok(result)
}

pub fn get_notification(conn: &Connection, id: &str) -> Result<Option<Notification>> {
    conn.query_row(
        r#"
SELECT id, occurred_at, recipient, message, read, ticket_id
FROM notifications
WHERE id = ?1
"#,
        params![id],
        notification_from_row,
    )
    .optional()
}

pub fn mark_notification_read(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(
        "UPDATE notifications SET read = 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

pub fn upsert_reference(conn: &Connection, mapping: &ReferenceMapping) -> Result<()> {
    conn.execute(
        r#"
INSERT INTO reference_data (motive, sheet_name, route)
VALUES (?1, ?2, ?3)
ON CONFLICT(motive) DO UPDATE SET
    sheet_name = excluded.sheet_name,
    route = excluded.route
"#,
        params![mapping.motive, mapping.sheet_name, mapping.route],
    )?;
    Ok(())
}

pub fn list_references(conn: &Connection) -> Result<Vec<ReferenceMapping>> {
    let mut stmt =
        conn.prepare("SELECT motive, sheet_name, route FROM reference_data ORDER BY motive ASC")?;
    let mut rows = stmt.query([])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(ReferenceMapping {
            motive: row.get(0)?,
            sheet_name: row.get(1)?,
            route: row.get(2)?,
        });
    }
    Ok(result)
}

#[cfg(test)]
mod tests;
