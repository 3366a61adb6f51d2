use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::priority::Priority;
use crate::domain::ticket::Ticket;

pub const VOLUME_ESCALATION_NOTE: &str = "Priority changed to 'Urgente' automatically by volume.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscalationTarget {
    pub ticket_id: String,
    pub target_sheet: String,
    /// Priority cell as stored, which may not be a canonical `Priority`.
    pub stored_priority: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EscalationSummary {
    pub overloaded_sheets: Vec<String>,
    pub escalated: Vec<String>,
    pub skipped_stale: Vec<String>,
}

/// Tickets to bump: members of sheets holding more than `threshold` active
/// tickets that are not already urgent. Rows pair each ticket with its stored
/// priority text.
pub fn plan_volume_escalation(
    rows: &[(Ticket, String)],
    active_statuses: &[String],
    threshold: usize,
) -> (Vec<String>, Vec<EscalationTarget>) {
    let mut groups: BTreeMap<&str, Vec<&(Ticket, String)>> = BTreeMap::new();
    for row in rows {
        let ticket = &row.0;
        let sheet = ticket.target_sheet.trim();
        if sheet.is_empty() {
            continue;
        }
        let status = ticket.status.trim();
        if active_statuses.iter().any(|active| active == status) {
            groups.entry(sheet).or_default().push(row);
        }
    }

    let mut overloaded = Vec::new();
    let mut targets = Vec::new();
    for (sheet, members) in groups {
        if members.len() <= threshold {
            continue;
        }
        overloaded.push(sheet.to_string());
        targets.extend(
            members
                .into_iter()
                .filter(|(ticket, _)| ticket.priority != Priority::Urgente)
                .map(|(ticket, stored)| EscalationTarget {
                    ticket_id: ticket.id.clone(),
                    target_sheet: sheet.to_string(),
                    stored_priority: stored.clone(),
                }),
        );
    }
    (overloaded, targets)
}
