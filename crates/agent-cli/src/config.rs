use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const CONFIG_DIR: &str = ".mcp-chat";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Settings read from `~/.mcp-chat/config.toml`, then overridden by the
/// environment. Command-line flags are applied last by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub model: Option<String>,
    pub max_output_tokens: Option<u32>,
    pub max_rounds: Option<usize>,
    pub system_prompt_file: Option<PathBuf>,
}

pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join(CONFIG_FILE_NAME)
}

impl Config {
    /// Loads the default config file and applies environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::from_file(&default_config_path())?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// A missing file yields the defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str::<Config>(&content)
            .map_err(|e| anyhow::anyhow!("invalid config file {}: {}", path.display(), e))?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_key) = lookup("ANTHROPIC_API_KEY") {
            self.api_key = Some(api_key);
        }
        if let Some(api_base) = lookup("ANTHROPIC_BASE_URL") {
            self.api_base = Some(api_base);
        }
        if let Some(model) = lookup("MODEL") {
            self.model = Some(model);
        }
        if let Some(raw) = lookup("MAX_OUTPUT_TOKENS") {
            match raw.trim().parse::<u32>() {
                Ok(tokens) => self.max_output_tokens = Some(tokens),
                Err(_) => tracing::warn!("Ignoring invalid MAX_OUTPUT_TOKENS value: {}", raw),
            }
        }
    }
}
