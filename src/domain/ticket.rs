use serde::Serialize;

use super::priority::Priority;

pub const STATUS_REGISTERED: &str = "Registrado";
pub const STATUS_IN_PROGRESS: &str = "En Progreso";
pub const NO_ATTACHMENT: &str = "No attachment";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ticket {
    pub created_at: String,
    pub created_by: String,
    pub client_user: String,
    pub case_number: String,
    pub target_sheet: String,
    pub attachment_url: String,
    pub tool: String,
    pub motive: String,
    pub derivation_id: String,
    pub external_ticket_number: String,
    pub id: String,
    pub status: String,
    pub observations: String,
    pub priority: Priority,
    pub assignee: String,
}

impl Ticket {
    pub const COLUMN_NAMES: [&'static str; 15] = [
        "created_at",
        "created_by",
        "client_user",
        "case_number",
        "target_sheet",
        "attachment_url",
        "tool",
        "motive",
        "derivation_id",
        "external_ticket_number",
        "id",
        "status",
        "observations",
        "priority",
        "assignee",
    ];

    pub fn is_assigned(&self) -> bool {
        !self.assignee.trim().is_empty()
    }

    /// Every column as display text, in store column order.
    pub fn column_values(&self) -> [(&'static str, &str); 15] {
        [
            ("created_at", &self.created_at),
            ("created_by", &self.created_by),
            ("client_user", &self.client_user),
            ("case_number", &self.case_number),
            ("target_sheet", &self.target_sheet),
            ("attachment_url", &self.attachment_url),
            ("tool", &self.tool),
            ("motive", &self.motive),
            ("derivation_id", &self.derivation_id),
            ("external_ticket_number", &self.external_ticket_number),
            ("id", &self.id),
            ("status", &self.status),
            ("observations", &self.observations),
            ("priority", self.priority.as_str()),
            ("assignee", &self.assignee),
        ]
    }
}

/// The only ticket columns that change after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketField {
    Status,
    Observations,
    Priority,
    Assignee,
}

impl TicketField {
    pub fn column(self) -> &'static str {
        match self {
            TicketField::Status => "status",
            TicketField::Observations => "observations",
            TicketField::Priority => "priority",
            TicketField::Assignee => "assignee",
        }
    }

    pub fn stored_value(self, ticket: &Ticket) -> &str {
        match self {
            TicketField::Status => &ticket.status,
            TicketField::Observations => &ticket.observations,
            TicketField::Priority => ticket.priority.as_str(),
            TicketField::Assignee => &ticket.assignee,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub filename: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketSubmission {
    pub client_user: String,
    pub case_number: String,
    pub tool: String,
    pub target_sheet: String,
    pub motive: String,
    pub derivation_id: String,
    pub external_ticket_number: Option<String>,
    pub attachment: Option<Attachment>,
}

impl TicketSubmission {
    /// Name of the first required field that is blank after trimming.
    pub fn first_missing_field(&self) -> Option<&'static str> {
        let required = [
            ("client user", &self.client_user),
            ("case number", &self.case_number),
            ("tool", &self.tool),
            ("target sheet", &self.target_sheet),
            ("escalation motive", &self.motive),
            ("derivation id", &self.derivation_id),
        ];
        required
            .into_iter()
            .find(|(_, value)| value.trim().is_empty())
            .map(|(label, _)| label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub ticket_id: String,
    pub occurred_at: String,
    pub description: String,
    pub actor: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub ticket_id: String,
    pub occurred_at: String,
    pub author: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: String,
    pub occurred_at: String,
    pub recipient: String,
    pub message: String,
    pub read: bool,
    pub ticket_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceMapping {
    pub motive: String,
    pub sheet_name: String,
    pub route: String,
}
