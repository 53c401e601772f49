//! Configuration loading

use anyhow::{Context, Result, bail};
use section_core::{EnvSecrets, PurgerSettings, SecretResolver, StaticSecrets};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub purgers: Vec<PurgerSettings>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Where secret references such as the purger password are resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    #[serde(default)]
    pub source: SecretSource,
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,
    /// Inline values, keyed by reference
    #[serde(default)]
    pub values: HashMap<String, String>,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            source: SecretSource::default(),
            env_prefix: default_env_prefix(),
            values: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretSource {
    #[default]
    Inline,
    Env,
}

impl SecretsConfig {
    pub fn resolver(&self) -> Arc<dyn SecretResolver> {
        match self.source {
            SecretSource::Inline => Arc::new(StaticSecrets::new(self.values.clone())),
            SecretSource::Env => Arc::new(EnvSecrets::new(self.env_prefix.clone())),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_env_prefix() -> String {
    "SECTION_SECRET_".to_string()
}

const DEFAULT_PURGER_ID: &str = "section";

impl Config {
    /// Load configuration from file
    pub fn load(path: &str) -> Result<Self> {
        let config_path = Path::new(path);

        if !config_path.exists() {
            info!("Config file not found at {}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        if config.purgers.is_empty() {
            warn!("No [[purgers]] configured, using a default '{}' purger", DEFAULT_PURGER_ID);
            config.purgers.push(PurgerSettings::new(DEFAULT_PURGER_ID));
        }
        config.validate()?;

        info!("Loaded configuration from {}", path);
        Ok(config)
    }

    /// Reject configurations the purgers cannot be built from.
    ///
    /// Field-level settings are checked by each purger before a batch.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for purger in &self.purgers {
            if purger.id.trim().is_empty() {
                bail!("Purger id must not be empty");
            }
            if !seen.insert(purger.id.as_str()) {
                bail!("Duplicate purger id: {}", purger.id);
            }
        }
        Ok(())
    }

    /// Settings of the purger named `id`, or the first configured purger
    pub fn select_purger(&self, id: Option<&str>) -> Result<&PurgerSettings> {
        match id {
            Some(id) => self
                .purgers
                .iter()
                .find(|p| p.id == id)
                .with_context(|| format!("Purger not configured: {}", id)),
            None => self.purgers.first().context("No purgers configured"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            secrets: SecretsConfig::default(),
            purgers: vec![PurgerSettings::new(DEFAULT_PURGER_ID)],
        }
    }
}
