use rusqlite::Connection;

use crate::db;
use crate::domain::ticket::HistoryEntry;

pub const SYSTEM_ACTOR: &str = "system";

/// Append-only change log keyed by ticket id.
pub struct HistoryLog<'a> {
    conn: &'a Connection,
}

impl<'a> HistoryLog<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Best-effort: a failed append is logged and reported as `false`, never raised.
    pub fn record(&self, ticket_id: &str, description: &str, actor: &str) -> bool {
        let entry = HistoryEntry {
            ticket_id: ticket_id.to_string(),
            occurred_at: db::now_utc_rfc3339(),
            description: description.to_string(),
            actor: actor.to_string(),
        };
        match db::insert_history(self.conn, &entry) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(ticket_id, error = %err, "failed to append history entry");
                false
            }
        }
    }

    pub fn list(&self, ticket_id: &str) -> rusqlite::Result<Vec<HistoryEntry>> {
        db::list_history(self.conn, ticket_id)
    }
}
