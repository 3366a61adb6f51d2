use rusqlite::Connection;
use uuid::Uuid;

use crate::app::AppError;
use crate::db;
use crate::directory::Directory;
use crate::domain::role::{Principal, Role};
use crate::domain::ticket::Notification;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient<'r> {
    Identity(&'r str),
    Broadcast(Role),
}

impl<'r> Recipient<'r> {
    /// Role names expand to every holder; anything else is a concrete identity.
    pub fn parse(raw: &'r str) -> Self {
        match raw.trim() {
            "SUPERUSER" => Recipient::Broadcast(Role::Superuser),
            "AUDITOR" => Recipient::Broadcast(Role::Auditor),
            other => Recipient::Identity(other),
        }
    }
}

pub fn new_notification_id() -> String {
    format!("N-{}", Uuid::now_v7())
}

pub struct Notifier<'a> {
    conn: &'a Connection,
    directory: &'a Directory,
}

impl<'a> Notifier<'a> {
    pub fn new(conn: &'a Connection, directory: &'a Directory) -> Self {
        Self { conn, directory }
    }

    /// Writes one unread row per resolved recipient and returns how many landed.
    /// Storage failures are logged, never propagated.
    pub fn notify(&self, recipient: Recipient<'_>, message: &str, ticket_id: Option<&str>) -> usize {
        let recipients = match recipient {
            Recipient::Identity(identity) if identity.trim().is_empty() => Vec::new(),
            Recipient::Identity(identity) => vec![identity.trim().to_string()],
            Recipient::Broadcast(role) => self.directory.members_with_role(role),
        };
        let occurred_at = db::now_utc_rfc3339();

        let mut written = 0;
        for identity in recipients {
            let notification = Notification {
                id: new_notification_id(),
                occurred_at: occurred_at.clone(),
                recipient: identity,
                message: message.to_string(),
                read: false,
                ticket_id: ticket_id.map(str::to_string),
            };
            match db::insert_notification(self.conn, &notification) {
                Ok(()) => written += 1,
                Err(err) => tracing::warn!(
                    recipient = %notification.recipient,
                    error = %err,
                    "failed to write notification"
                ),
            }
        }
        tracing::debug!(?recipient, written, "notification fan-out");
        written
    }

    pub fn list_unread(&self, principal: &Principal) -> Result<Vec<Notification>, AppError> {
        Ok(db::list_unread_notifications(
            self.conn,
            &principal.identity,
        )?)
    }

    pub fn mark_read(&self, id: &str, principal: &Principal) -> Result<Notification, AppError> {
        let mut notification = db::get_notification(self.conn, id.trim())?
            .ok_or_else(|| AppError::NotFound(format!("notification '{}'", id.trim())))?;
        if notification.recipient != principal.identity {
            return Err(AppError::Permission(
                "notification belongs to another recipient".to_string(),
            ));
        }
        if !notification.read {
            db::mark_notification_read(self.conn, &notification.id)?;
            notification.read = true;
        }
        Ok(notification)
    }
}
