use std::error::Error;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Priority {
    #[default]
    Normal,
    Urgente,
}

impl Priority {
    pub const ALL: [Priority; 2] = [Priority::Normal, Priority::Urgente];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Normal => "Normal",
            Priority::Urgente => "Urgente",
        }
    }

    /// Stored rows predating the priority column carry an empty value.
    pub fn from_stored(raw: &str) -> Priority {
        Priority::from_str(raw).unwrap_or_default()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Priority::Normal),
            "urgente" | "urgent" => Ok(Priority::Urgente),
            _ => Err(ParsePriorityError {
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePriorityError {
    value: String,
}

impl fmt::Display for ParsePriorityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid priority '{}': expected one of {}",
            self.value,
            Priority::ALL
                .iter()
                .map(|priority| priority.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl Error for ParsePriorityError {}

#[cfg(test)]
mod tests {
    use super::Priority;
    use std::str::FromStr;

    #[test]
    fn parses_known_priorities() {
        assert_eq!(Priority::from_str("Normal").unwrap(), Priority::Normal);
        assert_eq!(Priority::from_str("urgente").unwrap(), Priority::Urgente);
        assert_eq!(Priority::from_str("URGENT").unwrap(), Priority::Urgente);
        assert!(Priority::from_str("high").is_err());
    }

    #[test]
    fn empty_stored_value_reads_as_normal() {
        assert_eq!(Priority::from_stored(""), Priority::Normal);
        assert_eq!(Priority::from_stored("Urgente"), Priority::Urgente);
    }
}
