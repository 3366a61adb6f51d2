use std::io::{self, IsTerminal};

use crate::domain::priority::Priority;
use crate::domain::ticket::{Comment, HistoryEntry, Notification, Ticket};
use crate::listing::{DashboardPage, DashboardQuery};
use crate::outcome::{Outcome, OutcomeStatus};

pub fn print_outcome(outcome: &Outcome, json: bool) {
    if json {
        match serde_json::to_string_pretty(outcome) {
            Ok(raw) => println!("{raw}"),
            Err(err) => {
                tracing::error!(error = %err, "failed to render outcome");
                println!(r#"{{"status":"error","message":"failed to render outcome"}}"#);
            }
        }
        return;
    }

    let palette = Palette::auto();
    let rendered = palette.status(outcome.status, &outcome.message);
    if outcome.is_error() {
        eprintln!("{rendered}");
    } else {
        println!("{rendered}");
    }
    for line in &outcome.lines {
        println!("{line}");
    }
}

pub fn ticket_row(ticket: &Ticket) -> String {
    let palette = Palette::auto();
    let mut line = format!(
        "{} {} {} {} / {}",
        palette.id(&ticket.id),
        palette.ticket_status(&ticket.status),
        palette.priority(ticket.priority),
        ticket.target_sheet,
        ticket.motive
    );
    if ticket.is_assigned() {
        line.push(' ');
        line.push_str(&palette.dim(&format!("@{}", ticket.assignee.trim())));
    }
    line
}

pub fn ticket_detail(ticket: &Ticket) -> Vec<String> {
    let mut lines = vec![ticket_row(ticket)];
    lines.extend(
        ticket
            .column_values()
            .iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(name, value)| format!("  {name}: {value}")),
    );
    lines
}

pub fn dashboard_lines(page: &DashboardPage, query: &DashboardQuery) -> Vec<String> {
    let palette = Palette::auto();
    let mut lines = Vec::new();
    if let Some(summary) = filter_summary(query) {
        lines.push(palette.dim(&format!("filters: {summary}")));
    }
    if page.tickets.is_empty() {
        lines.push(palette.dim("no tickets matched"));
    }
    lines.extend(page.tickets.iter().map(ticket_row));
    let pages = page.total_tickets.div_ceil(page.page_size.max(1)).max(1);
    lines.push(palette.dim(&format!(
        "page {}/{} - {} ticket(s)",
        page.page, pages, page.total_tickets
    )));
    lines
}

pub fn history_lines(entries: &[HistoryEntry]) -> Vec<String> {
    let palette = Palette::auto();
    entries
        .iter()
        .map(|entry| {
            format!(
                "{} {} {}",
                palette.dim(&entry.occurred_at),
                entry.description,
                palette.dim(&format!("({})", entry.actor))
            )
        })
        .collect()
}

pub fn comment_lines(comments: &[Comment]) -> Vec<String> {
    let palette = Palette::auto();
    comments
        .iter()
        .map(|comment| {
            format!(
                "{} {}: {}",
                palette.dim(&comment.occurred_at),
                comment.author,
                comment.text
            )
        })
        .collect()
}

pub fn notification_lines(notifications: &[Notification]) -> Vec<String> {
    let palette = Palette::auto();
    notifications
        .iter()
        .map(|notification| {
            format!(
                "{} {} {}",
                palette.id(&notification.id),
                palette.dim(&notification.occurred_at),
                notification.message
            )
        })
        .collect()
}

fn filter_summary(query: &DashboardQuery) -> Option<String> {
    let text_filters = [
        ("search", &query.search),
        ("status", &query.status),
        ("tool", &query.tool),
        ("motive", &query.motive),
        ("created_by", &query.created_by),
        ("priority", &query.priority),
        ("from", &query.start_date),
        ("team", &query.team),
        ("to", &query.end_date),
    ];
    let mut parts: Vec<String> = text_filters
        .iter()
        .filter_map(|(name, value)| {
            value
                .as_deref()
                .and_then(non_empty)
                .map(|value| format!("{name}={value}"))
        })
        .collect();
    if query.mine_only {
        parts.push("mine=true".to_string());
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

fn non_empty(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

struct Palette {
    enabled: bool,
}

impl Palette {
    fn auto() -> Self {
        let enabled = std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
        Self { enabled }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn status(&self, status: OutcomeStatus, text: &str) -> String {
        match status {
            OutcomeStatus::Success => self.paint("1;32", text),
            OutcomeStatus::Info => self.paint("1;36", text),
            OutcomeStatus::Error => self.paint("1;31", &format!("error: {text}")),
        }
    }

    fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }

    fn id(&self, text: &str) -> String {
        self.paint("1;94", text)
    }

    fn ticket_status(&self, status: &str) -> String {
        self.paint(status_color_code(status), &format!("[{}]", status.trim()))
    }

    fn priority(&self, priority: Priority) -> String {
        match priority {
            Priority::Urgente => self.paint("1;31", priority.as_str()),
            Priority::Normal => self.paint("37", priority.as_str()),
        }
    }
}

fn status_color_code(status: &str) -> &'static str {
    match status.trim().to_lowercase().as_str() {
        "registrado" => "34",
        "en progreso" => "33",
        "resuelto" | "cerrado" => "32",
        _ => "37",
    }
}
