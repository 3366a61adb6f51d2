use serde::Serialize;
use serde_json::{Map, Value};

use crate::app::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Info,
    Error,
}

/// What every command reports: `{status, message, ...data}` on the wire,
/// plus optional detail lines for the human renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub status: OutcomeStatus,
    pub message: String,
    #[serde(flatten)]
    pub data: Map<String, Value>,
    #[serde(skip)]
    pub lines: Vec<String>,
}

impl Outcome {
    fn new(status: OutcomeStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: Map::new(),
            lines: Vec::new(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::Success, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::Info, message)
    }

    pub fn failure(err: &AppError) -> Self {
        let mut outcome = Self::new(OutcomeStatus::Error, err.to_string());
        outcome
            .data
            .insert("error_kind".to_string(), Value::from(err.kind()));
        outcome
    }

    pub fn with(mut self, key: &str, value: &impl Serialize) -> Result<Self, AppError> {
        self.data
            .insert(key.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    pub fn lines(mut self, lines: impl IntoIterator<Item = String>) -> Self {
        self.lines.extend(lines);
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == OutcomeStatus::Error
    }
}
