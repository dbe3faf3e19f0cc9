//! Configuration management for Botfleet

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub bots: Vec<BotConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// One bot instance: a generator implementation, its publishers, and a
/// posting interval policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub name: String,

    /// Content generator implementation key (e.g. "potentials", "static").
    pub implementation: String,

    /// Posting interval policy: "asap", a duration like "60m", or
    /// "random:MIN-MAX".
    #[serde(default = "default_interval")]
    pub interval: String,

    #[serde(default)]
    pub publishers: Vec<PublisherConfig>,

    /// Words this bot may always reuse; merged into the built-in
    /// stoplist together with the bot's own name.
    #[serde(default)]
    pub allowed_words: Vec<String>,
}

fn default_interval() -> String {
    "asap".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Service identifier, unique within a bot.
    pub service: String,

    /// Adapter type; defaults to the service name.
    #[serde(default)]
    pub kind: Option<String>,

    /// Output path for the file adapter.
    #[serde(default)]
    pub path: Option<String>,
}

impl PublisherConfig {
    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or(&self.service)
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    pub fn bot(&self, name: &str) -> Option<&BotConfig> {
        self.bots.iter().find(|b| b.name == name)
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("BOTFLEET_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("botfleet").join("config.toml"))
}
