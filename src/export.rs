use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use time::{Duration, OffsetDateTime};

use crate::app::AppError;
use crate::domain::ticket::Ticket;
use crate::listing::{parse_timestamp, start_of_day};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub rows: usize,
    pub columns: Vec<String>,
}

/// Column names kept by an export: the requested ones that exist, in ticket
/// column order, or every column when none are requested.
pub fn resolve_columns(requested: &[String]) -> Vec<&'static str> {
    let known = Ticket::COLUMN_NAMES;
    let wanted: Vec<String> = requested
        .iter()
        .map(|column| column.trim().to_ascii_lowercase())
        .filter(|column| !column.is_empty())
        .collect();
    if wanted.is_empty() {
        return known.to_vec();
    }
    known
        .iter()
        .copied()
        .filter(|column| wanted.iter().any(|want| want == column))
        .collect()
}

pub fn select_rows(
    tickets: &[Ticket],
    request: &ExportRequest,
) -> Result<(Vec<&'static str>, Vec<Map<String, Value>>), AppError> {
    let start = parse_bound(request.start_date.as_deref())?;
    let end_exclusive =
        parse_bound(request.end_date.as_deref())?.map(|start| start + Duration::days(1));
    let columns = resolve_columns(&request.columns);
    if columns.is_empty() {
        return Err(AppError::Validation(
            "none of the requested export columns exist".to_string(),
        ));
    }

    let rows = tickets
        .iter()
        .filter(|ticket| {
            if start.is_none() && end_exclusive.is_none() {
                return true;
            }
            let Some(created_at) = parse_timestamp(&ticket.created_at) else {
                return false;
            };
            start.map_or(true, |start| created_at >= start)
                && end_exclusive.map_or(true, |end| created_at < end)
        })
        .map(|ticket| {
            ticket
                .column_values()
                .into_iter()
                .filter(|(name, _)| columns.contains(name))
                .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
                .collect::<Map<String, Value>>()
        })
        .collect();
    Ok((columns, rows))
}

/// Writes rows as a pretty JSON array to a fresh timestamped file under `dir`.
pub fn write_export(dir: &Path, rows: &[Map<String, Value>]) -> Result<PathBuf, AppError> {
    fs::create_dir_all(dir)?;
    let stamp = crate::db::now_utc_rfc3339().replace(':', "");
    let path = dir.join(format!("tickets-{stamp}-{}.json", rows.len()));
    let body = serde_json::to_vec_pretty(rows)?;
    fs::write(&path, body)?;
    Ok(path)
}

fn parse_bound(raw: Option<&str>) -> Result<Option<OffsetDateTime>, AppError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => start_of_day(value).map(Some),
        None => Ok(None),
    }
}
