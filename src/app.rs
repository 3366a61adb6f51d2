use std::collections::BTreeSet;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use rusqlite::Connection;
use serde::Serialize;

use crate::assistant::{relevant_ticket_context, AssistantError, CommandGenerator, TextGenerator};
use crate::attachments::{AttachmentError, AttachmentStore, DirAttachmentStore};
use crate::config::{Config, ConfigError};
use crate::db::{self, FieldIntent, IntentOutcome};
use crate::directory::Directory;
use crate::domain::priority::Priority;
use crate::domain::role::{Principal, Role};
use crate::domain::ticket::{
    Comment, HistoryEntry, Notification, ReferenceMapping, Ticket, TicketField, TicketSubmission,
    NO_ATTACHMENT, STATUS_REGISTERED,
};
use crate::escalation::{plan_volume_escalation, EscalationSummary, VOLUME_ESCALATION_NOTE};
use crate::export::{self, ExportRequest, ExportSummary};
use crate::history::{HistoryLog, SYSTEM_ACTOR};
use crate::listing::{build_dashboard, DashboardPage, DashboardQuery};
use crate::notify::{Notifier, Recipient};
use crate::ticket_id::generate_ticket_id;

const MAX_TAKE_ATTEMPTS: usize = 3;

pub struct App {
    conn: Connection,
    directory: Directory,
    attachments: Box<dyn AttachmentStore>,
    config: Config,
}

/// Auditor-mutable fields a caller wants to set; `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketUpdate {
    pub status: Option<String>,
    pub observations: Option<String>,
    pub priority: Option<String>,
    pub assignee: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: TicketField,
    pub from: String,
    pub to: String,
}

impl FieldChange {
    fn label(&self) -> &'static str {
        match self.field {
            TicketField::Status => "Status",
            TicketField::Observations => "Observations",
            TicketField::Priority => "Priority",
            TicketField::Assignee => "Assignee",
        }
    }

    fn history_line(&self) -> String {
        format!("{} changed: '{}' -> '{}'", self.label(), self.from, self.to)
    }

    fn creator_notice(&self, ticket_id: &str) -> String {
        match self.field {
            TicketField::Status => format!(
                "Your ticket #{ticket_id} changed status: {} -> {}",
                self.from, self.to
            ),
            TicketField::Observations => {
                format!("New observation on your ticket #{ticket_id}: {}", self.to)
            }
            TicketField::Priority => {
                format!("Priority of your ticket #{ticket_id} changed to {}", self.to)
            }
            TicketField::Assignee if self.to.is_empty() => {
                format!("Your ticket #{ticket_id} is no longer assigned")
            }
            TicketField::Assignee => {
                format!("Your ticket #{ticket_id} was assigned to {}", self.to)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub ticket_id: String,
    pub changed: Vec<FieldChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TakeOutcome {
    Taken { assignee: String },
    AlreadyYours,
    AlreadyTaken { by: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketDetail {
    pub ticket: Ticket,
    pub reference: Option<ReferenceMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub identity: String,
    pub short_name: String,
    pub role: Role,
    pub team_lead: Option<String>,
}

impl App {
    pub fn open(db_path: &str, config: Config) -> Result<Self, AppError> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = db::open_connection(db_path)?;
        let directory = Directory::from_config(&config)?;
        let attachments = Box::new(DirAttachmentStore::new(config.attachments.dir.clone()));
        Ok(Self {
            conn,
            directory,
            attachments,
            config,
        })
    }

    pub fn with_attachment_store(mut self, store: Box<dyn AttachmentStore>) -> Self {
        self.attachments = store;
        self
    }

    pub fn principal(&self, identity: &str) -> Result<Principal, AppError> {
        if identity.trim().is_empty() {
            return Err(AppError::Validation(
                "no acting identity: pass --user or set STICKET_USER".to_string(),
            ));
        }
        Ok(self.directory.principal(identity))
    }

    pub fn whoami(&self, actor: &Principal) -> Profile {
        Profile {
            identity: actor.identity.clone(),
            short_name: actor.short_name().to_string(),
            role: actor.role,
            team_lead: self
                .directory
                .team_lead_for(&actor.identity)
                .map(str::to_string),
        }
    }

    pub fn create_ticket(
        &self,
        submission: TicketSubmission,
        actor: &Principal,
    ) -> Result<Ticket, AppError> {
        if let Some(field) = submission.first_missing_field() {
            return Err(AppError::Validation(format!("{field} is required")));
        }

        let mut lookup_error = None;
        let id = generate_ticket_id(|candidate| match db::ticket_exists(&self.conn, candidate) {
            Ok(exists) => exists,
            Err(err) => {
                lookup_error.get_or_insert(err);
                true
            }
        });
        if let Some(err) = lookup_error {
            return Err(err.into());
        }
        let id = id.ok_or_else(|| {
            AppError::Conflict("could not allocate an unused ticket id".to_string())
        })?;

        let attachment_url = match submission.attachment.as_ref() {
            Some(attachment) => self.attachments.store(
                &attachment.bytes,
                &attachment.mime_type,
                &attachment.filename,
            )?,
            None => NO_ATTACHMENT.to_string(),
        };

        let ticket = Ticket {
            created_at: db::now_utc_rfc3339(),
            created_by: actor.identity.clone(),
            client_user: submission.client_user.trim().to_string(),
            case_number: submission.case_number.trim().to_string(),
            target_sheet: submission.target_sheet.trim().to_string(),
            attachment_url,
            tool: submission.tool.trim().to_string(),
            motive: submission.motive.trim().to_string(),
            derivation_id: submission.derivation_id.trim().to_string(),
            external_ticket_number: submission
                .external_ticket_number
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            id,
            status: STATUS_REGISTERED.to_string(),
            observations: String::new(),
            priority: Priority::Normal,
            assignee: String::new(),
        };
        if let Err(err) = db::insert_ticket(&self.conn, &ticket) {
            if ticket.attachment_url != NO_ATTACHMENT {
                tracing::warn!(
                    ticket_id = %ticket.id,
                    attachment_url = %ticket.attachment_url,
                    "ticket insert failed; attachment left orphaned"
                );
            }
            return Err(err.into());
        }
        tracing::info!(ticket_id = %ticket.id, actor = %actor.identity, "ticket created");

        HistoryLog::new(&self.conn).record(
            &ticket.id,
            &format!("Ticket created by {}", actor.identity),
            &actor.identity,
        );
        let notice = format!(
            "New ticket #{} created by {} - Motive: {}",
            ticket.id, actor.identity, ticket.motive
        );
        let notifier = self.notifier();
        for token in ["SUPERUSER", "AUDITOR"] {
            notifier.notify(Recipient::parse(token), &notice, Some(&ticket.id));
        }
        Ok(ticket)
    }

    /// Applies each changed field as its own last-write-wins intent, with one
    /// history entry and one creator notification per field.
    pub fn update_ticket(
        &self,
        ticket_id: &str,
        actor: &Principal,
        update: TicketUpdate,
    ) -> Result<UpdateOutcome, AppError> {
        require_triage(actor, "updating a ticket")?;
        let ticket = self.load_ticket(ticket_id)?;
        let changed = diff_update(&ticket, &update)?;
        if changed.is_empty() {
            return Ok(UpdateOutcome {
                ticket_id: ticket.id,
                changed,
            });
        }

        let history = HistoryLog::new(&self.conn);
        let notifier = self.notifier();
        for change in &changed {
            let intent = FieldIntent {
                ticket_id: &ticket.id,
                field: change.field,
                expected: None,
                value: &change.to,
            };
            if db::apply_field_intent(&self.conn, &intent)? == IntentOutcome::Missing {
                return Err(AppError::NotFound(format!("ticket '{}'", ticket.id)));
            }
            history.record(&ticket.id, &change.history_line(), &actor.identity);
            notifier.notify(
                Recipient::Identity(&ticket.created_by),
                &change.creator_notice(&ticket.id),
                Some(&ticket.id),
            );
        }
        tracing::info!(
            ticket_id = %ticket.id,
            actor = %actor.identity,
            changed = changed.len(),
            "ticket updated"
        );
        Ok(UpdateOutcome {
            ticket_id: ticket.id,
            changed,
        })
    }

    /// Claims an unassigned ticket with a compare-and-set on the assignee.
    pub fn take_ticket(&self, ticket_id: &str, actor: &Principal) -> Result<TakeOutcome, AppError> {
        require_triage(actor, "taking a ticket")?;
        let ticket = self.load_ticket(ticket_id)?;
        self.claim_loaded_ticket(&ticket, actor)
    }

    /// Starts from the assignee seen when `ticket` was loaded; each lost race
    /// re-classifies against the value that won.
    fn claim_loaded_ticket(
        &self,
        ticket: &Ticket,
        actor: &Principal,
    ) -> Result<TakeOutcome, AppError> {
        let short_name = actor.short_name().to_string();

        let mut observed = ticket.assignee.clone();
        for _ in 0..MAX_TAKE_ATTEMPTS {
            if let Some(outcome) = classify_assignee(&observed, &short_name) {
                return Ok(outcome);
            }
            let intent = FieldIntent {
                ticket_id: &ticket.id,
                field: TicketField::Assignee,
                expected: Some(observed.as_str()),
                value: &short_name,
            };
            match db::apply_field_intent(&self.conn, &intent)? {
                IntentOutcome::Applied => {
                    tracing::info!(ticket_id = %ticket.id, assignee = %short_name, "ticket taken");
                    HistoryLog::new(&self.conn).record(
                        &ticket.id,
                        &format!("Ticket taken by {short_name}"),
                        &actor.identity,
                    );
                    if ticket.created_by != actor.identity {
                        self.notifier().notify(
                            Recipient::Identity(&ticket.created_by),
                            &format!("Your ticket #{} has been taken by {short_name}", ticket.id),
                            Some(&ticket.id),
                        );
                    }
                    return Ok(TakeOutcome::Taken {
                        assignee: short_name,
                    });
                }
                IntentOutcome::Stale { current } => {
                    tracing::debug!(ticket_id = %ticket.id, current = %current, "take lost a race");
                    observed = current;
                }
                IntentOutcome::Missing => {
                    return Err(AppError::NotFound(format!("ticket '{}'", ticket.id)));
                }
            }
        }
        Err(AppError::Conflict(format!(
            "assignee of ticket '{}' kept changing; try again",
            ticket.id
        )))
    }

    /// Bumps every member of an overloaded sheet to Urgente. Each bump is a
    /// compare-and-set on the priority read during planning, so a concurrent
    /// manual change wins and the ticket is reported as skipped.
    pub fn run_volume_escalation(&self) -> Result<EscalationSummary, AppError> {
        let rows = db::list_tickets_with_stored_priority(&self.conn)?;
        let (overloaded_sheets, targets) = plan_volume_escalation(
            &rows,
            &self.config.escalation.active_statuses,
            self.config.escalation.threshold,
        );
        let history = HistoryLog::new(&self.conn);
        let mut summary = EscalationSummary {
            overloaded_sheets,
            ..EscalationSummary::default()
        };

        for target in targets {
            let intent = FieldIntent {
                ticket_id: &target.ticket_id,
                field: TicketField::Priority,
                expected: Some(target.stored_priority.as_str()),
                value: Priority::Urgente.as_str(),
            };
            match db::apply_field_intent(&self.conn, &intent)? {
                IntentOutcome::Applied => {
                    history.record(&target.ticket_id, VOLUME_ESCALATION_NOTE, SYSTEM_ACTOR);
                    summary.escalated.push(target.ticket_id);
                }
                IntentOutcome::Stale { current } => {
                    tracing::debug!(
                        ticket_id = %target.ticket_id,
                        current = %current,
                        "priority changed since planning; not escalated"
                    );
                    summary.skipped_stale.push(target.ticket_id);
                }
                IntentOutcome::Missing => summary.skipped_stale.push(target.ticket_id),
            }
        }
        tracing::info!(
            sheets = summary.overloaded_sheets.len(),
            escalated = summary.escalated.len(),
            skipped = summary.skipped_stale.len(),
            "volume escalation finished"
        );
        Ok(summary)
    }

    pub fn list_tickets(
        &self,
        query: &DashboardQuery,
        actor: &Principal,
    ) -> Result<DashboardPage, AppError> {
        let tickets = db::list_tickets(&self.conn)?;
        build_dashboard(
            tickets,
            query,
            actor,
            &self.directory,
            self.config.dashboard.page_size,
        )
    }

    pub fn show_ticket(&self, ticket_id: &str) -> Result<TicketDetail, AppError> {
        let ticket = self.load_ticket(ticket_id)?;
        let reference = self.lookup_reference(&ticket.motive)?;
        Ok(TicketDetail { ticket, reference })
    }

    pub fn get_history(&self, ticket_id: &str) -> Result<Vec<HistoryEntry>, AppError> {
        let ticket_id = required(ticket_id, "ticket id")?;
        Ok(HistoryLog::new(&self.conn).list(ticket_id)?)
    }

    pub fn add_comment(
        &self,
        ticket_id: &str,
        actor: &Principal,
        text: &str,
    ) -> Result<Comment, AppError> {
        let ticket_id = required(ticket_id, "ticket id")?;
        let text = required(text, "comment text")?;
        if !db::ticket_exists(&self.conn, ticket_id)? {
            return Err(AppError::NotFound(format!("ticket '{ticket_id}'")));
        }
        let comment = Comment {
            ticket_id: ticket_id.to_string(),
            occurred_at: db::now_utc_rfc3339(),
            author: actor.identity.clone(),
            text: text.to_string(),
        };
        db::insert_comment(&self.conn, &comment)?;
        tracing::info!(ticket_id, author = %actor.identity, "comment added");
        Ok(comment)
    }

    pub fn list_comments(&self, ticket_id: &str) -> Result<Vec<Comment>, AppError> {
        let ticket_id = required(ticket_id, "ticket id")?;
        Ok(db::list_comments(&self.conn, ticket_id)?)
    }

    pub fn list_unread_notifications(
        &self,
        actor: &Principal,
    ) -> Result<Vec<Notification>, AppError> {
        self.notifier().list_unread(actor)
    }

    pub fn mark_notification_read(
        &self,
        notification_id: &str,
        actor: &Principal,
    ) -> Result<Notification, AppError> {
        let notification_id = required(notification_id, "notification id")?;
        self.notifier().mark_read(notification_id, actor)
    }

    pub fn set_reference(
        &self,
        actor: &Principal,
        motive: &str,
        sheet_name: &str,
        route: &str,
    ) -> Result<ReferenceMapping, AppError> {
        if actor.role != Role::Superuser {
            return Err(AppError::Permission(
                "editing reference data requires SUPERUSER role".to_string(),
            ));
        }
        let mapping = ReferenceMapping {
            motive: required(motive, "motive")?.to_string(),
            sheet_name: sheet_name.trim().to_string(),
            route: route.trim().to_string(),
        };
        db::upsert_reference(&self.conn, &mapping)?;
        tracing::info!(motive = %mapping.motive, "reference mapping saved");
        Ok(mapping)
    }

    pub fn lookup_reference(&self, motive: &str) -> Result<Option<ReferenceMapping>, AppError> {
        let wanted = motive.trim().to_lowercase();
        if wanted.is_empty() {
            return Ok(None);
        }
        Ok(db::list_references(&self.conn)?
            .into_iter()
            .find(|mapping| mapping.motive.trim().to_lowercase() == wanted))
    }

    pub fn list_motives(&self) -> Result<Vec<String>, AppError> {
        Ok(db::list_references(&self.conn)?
            .into_iter()
            .map(|mapping| mapping.motive.trim().to_string())
            .filter(|motive| !motive.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect())
    }

    pub fn export_tickets(
        &self,
        actor: &Principal,
        request: &ExportRequest,
    ) -> Result<ExportSummary, AppError> {
        require_triage(actor, "exporting tickets")?;
        let tickets = db::list_tickets(&self.conn)?;
        let (columns, rows) = export::select_rows(&tickets, request)?;
        let path = export::write_export(&self.config.export.dir, &rows)?;
        tracing::info!(path = %path.display(), rows = rows.len(), "tickets exported");
        Ok(ExportSummary {
            path,
            rows: rows.len(),
            columns: columns.into_iter().map(str::to_string).collect(),
        })
    }

    pub fn configured_generator(&self) -> Result<CommandGenerator, AppError> {
        let command = self
            .config
            .assistant
            .command
            .as_deref()
            .map(str::trim)
            .filter(|command| !command.is_empty())
            .ok_or(AssistantError::NotConfigured)?;
        Ok(
            CommandGenerator::new(command, self.config.assistant.args.clone())
                .with_timeout(Duration::from_secs(self.config.assistant.timeout_secs)),
        )
    }

    pub fn ask(&self, query: &str, generator: &dyn TextGenerator) -> Result<String, AppError> {
        let query = required(query, "question")?;
        let tickets = db::list_tickets(&self.conn)?;
        let mut blocks = vec![format!(
            "Recent related tickets:\n{}",
            relevant_ticket_context(&tickets, query)
        )];
        if let Some(path) = self.config.assistant.knowledge_base.as_ref() {
            match fs::read_to_string(path) {
                Ok(knowledge) => blocks.push(format!("Knowledge base:\n{knowledge}")),
                Err(err) => tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "knowledge base unavailable"
                ),
            }
        }
        Ok(generator.ask(query, &blocks)?)
    }

    fn notifier(&self) -> Notifier<'_> {
        Notifier::new(&self.conn, &self.directory)
    }

    fn load_ticket(&self, ticket_id: &str) -> Result<Ticket, AppError> {
        let ticket_id = required(ticket_id, "ticket id")?;
        db::get_ticket(&self.conn, ticket_id)?
            .ok_or_else(|| AppError::NotFound(format!("ticket '{ticket_id}'")))
    }
}

fn require_triage(actor: &Principal, action: &str) -> Result<(), AppError> {
    if actor.role.can_triage() {
        Ok(())
    } else {
        Err(AppError::Permission(format!(
            "{action} requires AUDITOR or SUPERUSER role"
        )))
    }
}

fn required<'v>(value: &'v str, label: &str) -> Result<&'v str, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(AppError::Validation(format!("{label} is required")))
    } else {
        Ok(trimmed)
    }
}

/// Every proposed value is validated before the first field is written.
fn diff_update(ticket: &Ticket, update: &TicketUpdate) -> Result<Vec<FieldChange>, AppError> {
    let status = update.status.as_deref().map(str::trim);
    if status == Some("") {
        return Err(AppError::Validation("status cannot be empty".to_string()));
    }
    let priority = update
        .priority
        .as_deref()
        .map(Priority::from_str)
        .transpose()
        .map_err(|err| AppError::Validation(err.to_string()))?;

    let proposals = [
        (TicketField::Status, status),
        (
            TicketField::Observations,
            update.observations.as_deref().map(str::trim),
        ),
        (TicketField::Priority, priority.map(Priority::as_str)),
        (
            TicketField::Assignee,
            update.assignee.as_deref().map(str::trim),
        ),
    ];
    Ok(proposals
        .into_iter()
        .filter_map(|(field, proposed)| {
            let proposed = proposed?;
            let current = field.stored_value(ticket).trim();
            (current != proposed).then(|| FieldChange {
                field,
                from: current.to_string(),
                to: proposed.to_string(),
            })
        })
        .collect())
}

fn classify_assignee(observed: &str, short_name: &str) -> Option<TakeOutcome> {
    let observed = observed.trim();
    if observed == short_name {
        Some(TakeOutcome::AlreadyYours)
    } else if !observed.is_empty() {
        Some(TakeOutcome::AlreadyTaken {
            by: observed.to_string(),
        })
    } else {
        None
    }
}

#[derive(Debug)]
pub enum AppError {
    Io(std::io::Error),
    Db(rusqlite::Error),
    Config(ConfigError),
    Attachment(AttachmentError),
    Assistant(AssistantError),
    Json(serde_json::Error),
    Validation(String),
    Permission(String),
    NotFound(String),
    Conflict(String),
}

impl AppError {
    /// Stable machine-readable category for outcome payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Io(_) | AppError::Db(_) | AppError::Json(_) => "storage",
            AppError::Config(_) => "config",
            AppError::Attachment(_) => "attachment",
            AppError::Assistant(_) => "assistant",
            AppError::Validation(_) => "validation",
            AppError::Permission(_) => "permission",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Io(err) => write!(f, "I/O error: {}", err),
            AppError::Db(err) => write!(f, "storage error: {}", err),
            AppError::Config(err) => write!(f, "{}", err),
            AppError::Attachment(err) => write!(f, "attachment error: {}", err),
            AppError::Assistant(err) => write!(f, "{}", err),
            AppError::Json(err) => write!(f, "JSON error: {}", err),
            AppError::Validation(message) => write!(f, "{}", message),
            AppError::Permission(message) => write!(f, "permission denied: {}", message),
            AppError::NotFound(what) => write!(f, "{} not found", what),
            AppError::Conflict(message) => write!(f, "{}", message),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Io(err) => Some(err),
            AppError::Db(err) => Some(err),
            AppError::Config(err) => Some(err),
            AppError::Attachment(err) => Some(err),
            AppError::Assistant(err) => Some(err),
            AppError::Json(err) => Some(err),
            AppError::Validation(_)
            | AppError::Permission(_)
            | AppError::NotFound(_)
            | AppError::Conflict(_) => None,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        AppError::Io(value)
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        AppError::Db(value)
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        AppError::Config(value)
    }
}

impl From<AttachmentError> for AppError {
    fn from(value: AttachmentError) -> Self {
        AppError::Attachment(value)
    }
}

impl From<AssistantError> for AppError {
    fn from(value: AssistantError) -> Self {
        AppError::Assistant(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::Json(value)
    }
}
