use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrellisError};

/// Top-level Trellis configuration, loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub ollama: OllamaSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Model used by agentic nodes when the workflow document does not
    /// name one.
    #[serde(default)]
    pub default_model: Option<String>,
    /// Upper bound on dispatched nodes per run. Authored graphs are
    /// assumed to terminate; this guard turns a cycle into a clean error.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_model: None,
            max_steps: default_max_steps(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Residency window requested on every generation call.
    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,
    /// Seconds between background keep-alive pings.
    #[serde(default = "default_keep_alive_interval")]
    pub keep_alive_interval_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            keep_alive: default_keep_alive(),
            keep_alive_interval_secs: default_keep_alive_interval(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_max_steps() -> usize {
    1000
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_keep_alive() -> String {
    "5m".to_string()
}

fn default_keep_alive_interval() -> u64 {
    180
}

fn default_request_timeout() -> u64 {
    120
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TrellisError::ConfigNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| TrellisError::Config(e.to_string()))
    }

    /// Load configuration, falling back to defaults when the file is
    /// absent or malformed.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(TrellisError::ConfigNotFound(_)) => Self::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load config, using defaults");
                Self::default()
            }
        }
    }
}
