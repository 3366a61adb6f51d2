use std::error::Error;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Auditor,
    Superuser,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::User, Role::Auditor, Role::Superuser];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Auditor => "AUDITOR",
            Role::Superuser => "SUPERUSER",
        }
    }

    /// Auditors and superusers triage tickets; plain users only submit them.
    pub fn can_triage(self) -> bool {
        matches!(self, Role::Auditor | Role::Superuser)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "AUDITOR" => Ok(Role::Auditor),
            "SUPERUSER" => Ok(Role::Superuser),
            _ => Err(ParseRoleError {
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRoleError {
    value: String,
}

impl fmt::Display for ParseRoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid role '{}': expected one of {}",
            self.value,
            Role::ALL
                .iter()
                .map(|role| role.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl Error for ParseRoleError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub identity: String,
    pub role: Role,
}

impl Principal {
    pub fn new(identity: impl Into<String>, role: Role) -> Self {
        Self {
            identity: identity.into(),
            role,
        }
    }

    /// Local part of the identity, used as the stored assignee.
    pub fn short_name(&self) -> &str {
        short_name(&self.identity)
    }
}

pub fn short_name(identity: &str) -> &str {
    identity
        .split_once('@')
        .map_or(identity, |(local, _)| local)
}
