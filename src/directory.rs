use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crate::config::{Config, ConfigError, TeamConfig};
use crate::domain::role::{Principal, Role};

/// Static identity directory: roles and team rosters, injected from config.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    roles: BTreeMap<String, Role>,
    teams: Vec<TeamConfig>,
}

impl Directory {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut roles = BTreeMap::new();
        for (identity, raw_role) in &config.roles {
            let role = Role::from_str(raw_role).map_err(|err| {
                ConfigError::Invalid(format!("roles.\"{identity}\": {err}"))
            })?;
            roles.insert(identity.trim().to_string(), role);
        }
        let teams = config
            .teams
            .iter()
            .map(|team| TeamConfig {
                lead: team.lead.trim().to_string(),
                members: team
                    .members
                    .iter()
                    .map(|member| member.trim().to_string())
                    .filter(|member| !member.is_empty())
                    .collect(),
            })
            .filter(|team| !team.lead.is_empty())
            .collect();
        Ok(Self { roles, teams })
    }

    pub fn role_of(&self, identity: &str) -> Role {
        self.roles
            .get(identity.trim())
            .copied()
            .unwrap_or(Role::User)
    }

    pub fn principal(&self, identity: &str) -> Principal {
        let identity = identity.trim();
        Principal::new(identity, self.role_of(identity))
    }

    /// Every identity holding `role`, in stable order.
    pub fn members_with_role(&self, role: Role) -> Vec<String> {
        self.roles
            .iter()
            .filter(|(_, held)| **held == role)
            .map(|(identity, _)| identity.clone())
            .collect()
    }

    pub fn team_roster_for(&self, lead: &str) -> BTreeSet<String> {
        let lead = lead.trim();
        self.teams
            .iter()
            .filter(|team| team.lead == lead)
            .flat_map(|team| team.members.iter().cloned())
            .collect()
    }

    pub fn team_lead_for(&self, identity: &str) -> Option<&str> {
        let identity = identity.trim();
        self.teams
            .iter()
            .find(|team| team.members.iter().any(|member| member == identity))
            .map(|team| team.lead.as_str())
    }

    pub fn team_leads(&self) -> Vec<String> {
        self.teams
            .iter()
            .map(|team| team.lead.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
