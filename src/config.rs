//! chatpace configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::resource;
use crate::scheduler::{LimiterConfig, LimiterOverride};

/// Main chatpace configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    /// Rate budget per resource
    pub limiters: BTreeMap<String, LimiterConfig>,
}

/// Shape of a config file; unknown keys are rejected
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub limiters: BTreeMap<String, LimiterOverride>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limiters: default_limiters(),
        }
    }
}

/// Built-in budgets: slow, jittery platform limiters and a fast dashboard one
pub fn default_limiters() -> BTreeMap<String, LimiterConfig> {
    [
        (resource::CHATGPT, LimiterConfig::continuous(5.0, 0.5).with_delay(2127, 5341)),
        (resource::CLAUDE, LimiterConfig::continuous(3.0, 0.2).with_delay(2413, 6897)),
        (resource::GEMINI, LimiterConfig::continuous(5.0, 0.5).with_delay(2817, 4729)),
        (resource::DEEPSEEK, LimiterConfig::continuous(4.0, 0.4).with_delay(2000, 4500)),
        (resource::PERPLEXITY, LimiterConfig::continuous(3.0, 0.3).with_delay(2000, 5000)),
        (resource::GROK, LimiterConfig::continuous(3.0, 0.2).with_delay(2500, 6000)),
        (resource::QWEN, LimiterConfig::continuous(5.0, 0.5).with_delay(2000, 4500)),
        (resource::LMARENA, LimiterConfig::continuous(2.0, 0.1).with_delay(3000, 7000)),
        (resource::DASHBOARD, LimiterConfig::continuous(20.0, 5.0).with_delay(127, 347)),
    ]
    .into_iter()
    .map(|(name, budget)| (name.to_string(), budget))
    .collect()
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks every budget so a bad entry fails at startup, not on first use.
    pub fn validate(&self) -> Result<()> {
        if self.limiters.is_empty() {
            return Err(eyre::eyre!("No limiters configured"));
        }
        for (name, budget) in &self.limiters {
            budget
                .validate()
                .with_context(|| format!("Invalid budget for limiter '{}'", name))?;
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .chatpace.yml
        let local_config = PathBuf::from(".chatpace.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/chatpace/chatpace.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("chatpace").join("chatpace.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Parse a config file, overlaying its limiters on the built-in ones
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config = Self::from_yaml(&content)?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Parse YAML, overlaying its limiters on the built-in ones
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(content).context("Failed to parse config file")?;
        Ok(Self::default().overlay(file))
    }

    /// Merge a file's entries field by field
    ///
    /// An entry for a known resource only changes the fields it sets. An entry
    /// for a new resource starts from `LimiterConfig::default()`.
    pub fn overlay(mut self, file: ConfigFile) -> Self {
        for (name, entry) in file.limiters {
            let base = self.limiters.remove(&name).unwrap_or_default();
            self.limiters.insert(name, entry.apply_to(base));
        }
        self
    }
}
