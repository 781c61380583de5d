//! Configuration handling for the circulation desk
//!
//! Configuration is stored in `.circulation/config.toml` (desk) and
//! `~/.config/circ/config.toml` (global).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{PersonId, PolicyCategory};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Settings for outgoing notices
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotifierConfig {
    /// Subject line for every notice
    pub subject: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            subject: "Library circulation notice".to_string(),
        }
    }
}

/// Who is working the desk
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Librarian id (defaults to $CIRC_AGENT)
    pub id: Option<String>,
}

impl AgentConfig {
    /// Gets the effective agent from config, then the environment
    pub fn effective_id(&self) -> Option<PersonId> {
        self.id
            .clone()
            .or_else(|| std::env::var("CIRC_AGENT").ok())
            .and_then(|raw| raw.parse().ok())
    }
}

/// Desk-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeskConfig {
    /// Category used when a member's category is blank or unknown
    pub default_category: PolicyCategory,

    /// Days before the due date when a reminder goes out
    pub reminder_lead_days: u32,

    pub notifier: NotifierConfig,

    pub agent: AgentConfig,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            default_category: PolicyCategory::General,
            reminder_lead_days: 2,
            notifier: NotifierConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

impl DeskConfig {
    /// Rejects values the circulation core cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.notifier.subject.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "notifier.subject must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

/// Global user configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default output format (text or json)
    pub default_format: OutputFormat,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Combined configuration (global + desk)
#[derive(Debug, Clone)]
pub struct Config {
    pub desk: DeskConfig,
    pub global: GlobalConfig,
}

impl Config {
    /// Loads configuration from default locations
    pub fn load() -> Result<Self> {
        let global = Self::load_global()?;
        let desk = match Self::find_desk_root() {
            Some(root) => Self::load_desk_config(&root)?,
            None => DeskConfig::default(),
        };

        Ok(Self { desk, global })
    }

    /// Loads configuration for a specific desk
    pub fn for_desk(desk_root: &Path) -> Result<Self> {
        let global = Self::load_global()?;
        let desk = Self::load_desk_config(desk_root)?;

        Ok(Self { desk, global })
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("org", "circulation", "circ").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Loads global configuration
    fn load_global() -> Result<GlobalConfig> {
        let config_dir = match Self::global_config_dir() {
            Some(dir) => dir,
            None => return Ok(GlobalConfig::default()),
        };

        let config_path = config_dir.join("config.toml");
        if !config_path.exists() {
            return Ok(GlobalConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read global config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse global config")
    }

    /// Loads desk configuration from a specific root
    pub fn load_desk_config(desk_root: &Path) -> Result<DeskConfig> {
        let config_path = Self::desk_config_path(desk_root);

        if !config_path.exists() {
            return Ok(DeskConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read desk config: {}", config_path.display()))?;

        let config: DeskConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse desk config")?;
        config.validate()?;
        Ok(config)
    }

    fn desk_config_path(desk_root: &Path) -> PathBuf {
        desk_root.join(".circulation").join("config.toml")
    }

    /// Finds the desk root by looking for a `.circulation/` directory
    pub fn find_desk_root() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;

        loop {
            if current.join(".circulation").is_dir() {
                return Some(current);
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// Writes `config` into the desk at `desk_root`
    pub fn write_desk_config(desk_root: &Path, config: &DeskConfig) -> Result<()> {
        let config_path = Self::desk_config_path(desk_root);

        let content =
            toml::to_string_pretty(config).context("Failed to serialize desk config")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write desk config: {}", config_path.display()))
    }
}
