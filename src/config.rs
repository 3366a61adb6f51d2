use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::domain::ticket::{STATUS_IN_PROGRESS, STATUS_REGISTERED};

pub const DEFAULT_ESCALATION_THRESHOLD: usize = 5;
pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const DEFAULT_ASSISTANT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub roles: BTreeMap<String, String>,
    #[serde(default)]
    pub teams: Vec<TeamConfig>,
    #[serde(default)]
    pub attachments: AttachmentsConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TeamConfig {
    pub lead: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AttachmentsConfig {
    #[serde(default = "default_attachments_dir")]
    pub dir: PathBuf,
}

impl Default for AttachmentsConfig {
    fn default() -> Self {
        Self {
            dir: default_attachments_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EscalationConfig {
    #[serde(default = "default_threshold")]
    pub threshold: usize,
    #[serde(default = "default_active_statuses")]
    pub active_statuses: Vec<String>,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            active_statuses: default_active_statuses(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DashboardConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AssistantConfig {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub knowledge_base: Option<PathBuf>,
    #[serde(default = "default_assistant_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            knowledge_base: None,
            timeout_secs: default_assistant_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ExportConfig {
    #[serde(default = "default_export_dir")]
    pub dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: default_export_dir(),
        }
    }
}

fn default_attachments_dir() -> PathBuf {
    PathBuf::from(".sticket/attachments")
}

fn default_export_dir() -> PathBuf {
    PathBuf::from(".sticket/exports")
}

fn default_threshold() -> usize {
    DEFAULT_ESCALATION_THRESHOLD
}

fn default_active_statuses() -> Vec<String> {
    vec![
        STATUS_REGISTERED.to_string(),
        STATUS_IN_PROGRESS.to_string(),
    ]
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_assistant_timeout_secs() -> u64 {
    DEFAULT_ASSISTANT_TIMEOUT_SECS
}

impl Config {
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.to_path_buf(),
            source: err,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw).map_err(ConfigError::Parse)?;
        if config.escalation.threshold == 0 {
            return Err(ConfigError::Invalid(
                "escalation.threshold must be at least 1".to_string(),
            ));
        }
        if config.dashboard.page_size == 0 {
            return Err(ConfigError::Invalid(
                "dashboard.page_size must be at least 1".to_string(),
            ));
        }
        if config.assistant.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "assistant.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    /// Relative directories resolve against `base`.
    pub fn resolve_dirs(mut self, base: &Path) -> Self {
        if self.attachments.dir.is_relative() {
            self.attachments.dir = base.join(&self.attachments.dir);
        }
        if self.export.dir.is_relative() {
            self.export.dir = base.join(&self.export.dir);
        }
        if let Some(kb) = self.assistant.knowledge_base.as_ref() {
            if kb.is_relative() {
                self.assistant.knowledge_base = Some(base.join(kb));
            }
        }
        self
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse(err) => write!(f, "invalid config: {}", err),
            ConfigError::Invalid(message) => write!(f, "invalid config: {}", message),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse(err) => Some(err),
            ConfigError::Invalid(_) => None,
        }
    }
}
