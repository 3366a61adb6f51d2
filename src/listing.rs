use std::collections::BTreeSet;

use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::{Date, Duration, OffsetDateTime, Time};

use crate::app::AppError;
use crate::directory::Directory;
use crate::domain::role::Principal;
use crate::domain::ticket::Ticket;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DashboardQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub tool: Option<String>,
    pub motive: Option<String>,
    pub created_by: Option<String>,
    pub priority: Option<String>,
    pub start_date: Option<String>,
    pub team: Option<String>,
    pub end_date: Option<String>,
    pub mine_only: bool,
    pub page: usize,
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Facets {
    pub sheets: Vec<String>,
    pub creators: Vec<String>,
    pub motives: Vec<String>,
    pub team_leads: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardPage {
    pub tickets: Vec<Ticket>,
    pub all_tickets_for_stats: Vec<Ticket>,
    pub total_tickets: usize,
    pub page: usize,
    pub page_size: usize,
    pub facets: Facets,
}

pub fn build_dashboard(
    tickets: Vec<Ticket>,
    query: &DashboardQuery,
    principal: &Principal,
    directory: &Directory,
    default_page_size: usize,
) -> Result<DashboardPage, AppError> {
    let facets = Facets {
        sheets: distinct_sorted(tickets.iter().map(|ticket| ticket.target_sheet.as_str())),
        creators: distinct_sorted(tickets.iter().map(|ticket| ticket.created_by.as_str())),
        motives: distinct_sorted(tickets.iter().map(|ticket| ticket.motive.as_str())),
        team_leads: directory.team_leads(),
    };

    let filter = NormalizedFilter::build(query, principal, directory)?;
    let mut filtered: Vec<Ticket> = tickets
        .into_iter()
        .rev()
        .filter(|ticket| filter.matches(ticket))
        .collect();
    // Stable sort; equal timestamps stay newest-inserted first.
    filtered.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let page_size = query.page_size.filter(|size| *size > 0).unwrap_or(default_page_size);
    let page = query.page.max(1);
    let start = (page - 1).saturating_mul(page_size);
    let tickets = filtered
        .iter()
        .skip(start)
        .take(page_size)
        .cloned()
        .collect();

    Ok(DashboardPage {
        tickets,
        total_tickets: filtered.len(),
        all_tickets_for_stats: filtered,
        page,
        page_size,
        facets,
    })
}

#[derive(Debug, Default)]
struct NormalizedFilter {
    search: Option<String>,
    status: Option<String>,
    tool: Option<String>,
    motive: Option<String>,
    created_by: Option<String>,
    priority: Option<String>,
    start: Option<OffsetDateTime>,
    team_roster: Option<BTreeSet<String>>,
    end_exclusive: Option<OffsetDateTime>,
    mine_only: Option<String>,
}

impl NormalizedFilter {
    fn build(
        query: &DashboardQuery,
        principal: &Principal,
        directory: &Directory,
    ) -> Result<Self, AppError> {
        let team_roster = match non_empty(query.team.as_deref()) {
            Some(lead) => {
                let roster = directory.team_roster_for(&lead);
                if roster.is_empty() {
                    tracing::debug!(lead = %lead, "team has no roster; team filter skipped");
                    None
                } else {
                    Some(roster)
                }
            }
            None => None,
        };

        Ok(Self {
            search: non_empty(query.search.as_deref()).map(|value| value.to_lowercase()),
            status: non_empty(query.status.as_deref()),
            tool: non_empty(query.tool.as_deref()),
            motive: non_empty(query.motive.as_deref()),
            created_by: non_empty(query.created_by.as_deref()),
            priority: non_empty(query.priority.as_deref()),
            start: non_empty(query.start_date.as_deref())
                .map(|raw| start_of_day(&raw))
                .transpose()?,
            team_roster,
            end_exclusive: non_empty(query.end_date.as_deref())
                .map(|raw| start_of_day(&raw).map(|start| start + Duration::days(1)))
                .transpose()?,
            mine_only: query.mine_only.then(|| principal.identity.clone()),
        })
    }

    fn matches(&self, ticket: &Ticket) -> bool {
        if let Some(search) = self.search.as_deref() {
            let hit = ticket
                .column_values()
                .iter()
                .any(|(_, value)| value.to_lowercase().contains(search));
            if !hit {
                return false;
            }
        }
        if !equals(self.status.as_deref(), &ticket.status)
            || !equals(self.tool.as_deref(), &ticket.tool)
            || !equals(self.motive.as_deref(), &ticket.motive)
            || !equals(self.created_by.as_deref(), &ticket.created_by)
        {
            return false;
        }
        if let Some(priority) = self.priority.as_deref() {
            if !ticket.priority.as_str().eq_ignore_ascii_case(priority) {
                return false;
            }
        }
        if self.start.is_some() || self.end_exclusive.is_some() {
            let Some(created_at) = parse_timestamp(&ticket.created_at) else {
                return false;
            };
            if self.start.is_some_and(|start| created_at < start) {
                return false;
            }
            if self.end_exclusive.is_some_and(|end| created_at >= end) {
                return false;
            }
        }
        if let Some(roster) = self.team_roster.as_ref() {
            if !roster.contains(ticket.created_by.trim()) {
                return false;
            }
        }
        if let Some(identity) = self.mine_only.as_deref() {
            if ticket.created_by != identity {
                return false;
            }
        }
        true
    }
}

fn equals(expected: Option<&str>, actual: &str) -> bool {
    expected.map_or(true, |expected| actual.trim() == expected)
}

fn non_empty(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn distinct_sorted<'t>(values: impl Iterator<Item = &'t str>) -> Vec<String> {
    values
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339).ok()
}

/// Accepts `YYYY-MM-DD` (midnight UTC) or a full RFC3339 timestamp (its date is used).
pub fn start_of_day(raw: &str) -> Result<OffsetDateTime, AppError> {
    let date = match parse_timestamp(raw) {
        Some(timestamp) => timestamp.date(),
        None => parse_date(raw).ok_or_else(|| {
            AppError::Validation(format!("invalid date '{}': expected YYYY-MM-DD", raw.trim()))
        })?,
    };
    Ok(date.with_time(Time::MIDNIGHT).assume_utc())
}

fn parse_date(raw: &str) -> Option<Date> {
    let mut parts = raw.trim().splitn(3, '-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u8 = parts.next()?.parse().ok()?;
    let day: u8 = parts.next()?.parse().ok()?;
    let month = time::Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

#[cfg(test)]
mod tests {
    use super::{build_dashboard, start_of_day, DashboardQuery};
    use crate::app::AppError;
    use crate::config::Config;
    use crate::directory::Directory;
    use crate::domain::priority::Priority;
    use crate::domain::role::{Principal, Role};
    use crate::domain::ticket::Ticket;

    fn ticket(id: &str, created_at: &str, created_by: &str, sheet: &str, status: &str) -> Ticket {
        Ticket {
            created_at: created_at.to_string(),
            created_by: created_by.to_string(),
            client_user: "U1".to_string(),
            case_number: format!("case-{id}"),
            target_sheet: sheet.to_string(),
            attachment_url: "No attachment".to_string(),
            tool: "CRM".to_string(),
            motive: "Acceso bloqueado".to_string(),
            derivation_id: "D-1".to_string(),
            external_ticket_number: String::new(),
            id: id.to_string(),
            status: status.to_string(),
            observations: String::new(),
            priority: Priority::Normal,
            assignee: String::new(),
        }
    }

    fn directory() -> Directory {
        let config = Config::parse(
            r#"
[[teams]]
lead = "Maria"
members = ["u1@example.com"]

[[teams]]
lead = "Empty"
members = []
"#,
        )
        .expect("config should parse");
        Directory::from_config(&config).expect("directory should build")
    }

    fn fixtures() -> Vec<Ticket> {
        vec![
            ticket("TK-100001", "2026-03-01T09:00:00Z", "u1@example.com", "ClienteX", "Registrado"),
            ticket("TK-100002", "2026-03-02T09:00:00Z", "u2@example.com", "ClienteY", "En Progreso"),
            ticket("TK-100003", "2026-03-03T23:30:00Z", "u1@example.com", "ClienteX", "Cerrado"),
            ticket("TK-100004", "2026-03-04T09:00:00Z", "u2@example.com", "ClienteX", "Registrado"),
        ]
    }

    fn viewer() -> Principal {
        Principal::new("u1@example.com", Role::User)
    }

    fn ids(tickets: &[Ticket]) -> Vec<&str> {
        tickets.iter().map(|ticket| ticket.id.as_str()).collect()
    }

    #[test]
    fn sorts_newest_first_and_paginates() {
        let query = DashboardQuery {
            page: 2,
            page_size: Some(3),
            ..DashboardQuery::default()
        };
        let page = build_dashboard(fixtures(), &query, &viewer(), &directory(), 10)
            .expect("dashboard should build");
        assert_eq!(page.total_tickets, 4);
        assert_eq!(ids(&page.tickets), vec!["TK-100001"]);
        assert_eq!(
            ids(&page.all_tickets_for_stats),
            vec!["TK-100004", "TK-100003", "TK-100002", "TK-100001"]
        );
    }

    #[test]
    fn total_is_independent_of_page_size() {
        for page_size in [1, 2, 10] {
            let query = DashboardQuery {
                status: Some("Registrado".to_string()),
                page: 1,
                page_size: Some(page_size),
                ..DashboardQuery::default()
            };
            let page = build_dashboard(fixtures(), &query, &viewer(), &directory(), 10)
                .expect("dashboard should build");
            assert_eq!(page.total_tickets, 2);
            assert!(page.tickets.len() <= page_size);
        }
    }

    #[test]
    fn applies_filters_conjunctively() {
        let query = DashboardQuery {
            search: Some("clientex".to_string()),
            status: Some("Registrado".to_string()),
            created_by: Some("u2@example.com".to_string()),
            ..DashboardQuery::default()
        };
        let page = build_dashboard(fixtures(), &query, &viewer(), &directory(), 10)
            .expect("dashboard should build");
        assert_eq!(ids(&page.tickets), vec!["TK-100004"]);
    }

    #[test]
    fn date_range_is_inclusive_through_end_of_day() {
        let query = DashboardQuery {
            start_date: Some("2026-03-02".to_string()),
            end_date: Some("2026-03-03".to_string()),
            ..DashboardQuery::default()
        };
        let page = build_dashboard(fixtures(), &query, &viewer(), &directory(), 10)
            .expect("dashboard should build");
        assert_eq!(ids(&page.tickets), vec!["TK-100003", "TK-100002"]);
    }

    #[test]
    fn team_and_mine_only_scope_to_creators() {
        let team = DashboardQuery {
            team: Some("Maria".to_string()),
            ..DashboardQuery::default()
        };
        let page = build_dashboard(fixtures(), &team, &viewer(), &directory(), 10)
            .expect("dashboard should build");
        assert_eq!(ids(&page.tickets), vec!["TK-100003", "TK-100001"]);

        let empty_team = DashboardQuery {
            team: Some("Empty".to_string()),
            ..DashboardQuery::default()
        };
        let page = build_dashboard(fixtures(), &empty_team, &viewer(), &directory(), 10)
            .expect("dashboard should build");
        assert_eq!(page.total_tickets, 4);

        let mine = DashboardQuery {
            mine_only: true,
            ..DashboardQuery::default()
        };
        let other = Principal::new("u2@example.com", Role::Auditor);
        let page = build_dashboard(fixtures(), &mine, &other, &directory(), 10)
            .expect("dashboard should build");
        assert_eq!(ids(&page.tickets), vec!["TK-100004", "TK-100002"]);
    }

    #[test]
    fn facets_cover_the_unfiltered_set() {
        let query = DashboardQuery {
            status: Some("nothing-matches".to_string()),
            ..DashboardQuery::default()
        };
        let page = build_dashboard(fixtures(), &query, &viewer(), &directory(), 10)
            .expect("dashboard should build");
        assert!(page.tickets.is_empty());
        assert_eq!(page.facets.sheets, vec!["ClienteX", "ClienteY"]);
        assert_eq!(page.facets.creators.len(), 2);
        assert_eq!(page.facets.team_leads, vec!["Empty", "Maria"]);
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(matches!(
            start_of_day("03/04/2026"),
            Err(AppError::Validation(_))
        ));
        assert!(start_of_day("2026-03-04T10:00:00Z").is_ok());
    }
}
