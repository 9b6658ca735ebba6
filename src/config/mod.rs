//! Configuration Management
//!
//! This module resolves the client configuration: where the backend lives,
//! how long to wait for it, how often to poll training progress, and where
//! durable state is kept.
//!
//! # Resolution Precedence
//! 1. Explicit overrides (CLI flags, highest priority)
//! 2. Environment variables (`SQLIZER_*`)
//! 3. Config file (`~/.config/sqlizer/config.json`)
//! 4. Built-in defaults
//!
//! A missing config file is fine. A config file that is not valid JSON is a
//! `ConfigError` rather than being silently ignored.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SqlizerError};

pub const ENV_API_URL: &str = "SQLIZER_API_URL";
pub const ENV_STATE_DIR: &str = "SQLIZER_STATE_DIR";
pub const ENV_POLL_INTERVAL_MS: &str = "SQLIZER_POLL_INTERVAL_MS";
pub const ENV_TIMEOUT_MS: &str = "SQLIZER_TIMEOUT_MS";

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Resolved client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Backend base URL, without trailing slash
    pub api_base_url: String,

    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Training progress poll interval in milliseconds
    pub poll_interval_ms: u64,

    /// Ask the backend to generate synthetic training data with its LLM
    pub use_llm_for_training: bool,

    /// Directory holding the durable state file
    pub state_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            use_llm_for_training: true,
            state_dir: default_state_dir().unwrap_or_else(|_| PathBuf::from(".sqlizer")),
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Config file contents; every field optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_llm_for_training: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
}

/// Explicit overrides, typically from CLI flags
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_base_url: Option<String>,
    pub state_dir: Option<PathBuf>,
}

/// Get path to the config file (`~/.config/sqlizer/config.json`)
pub fn config_file_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| SqlizerError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join("sqlizer").join("config.json"))
}

/// Default durable state directory (`~/.config/sqlizer`)
pub fn default_state_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| SqlizerError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join("sqlizer"))
}

/// Load a config file; a missing file yields the empty config
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| SqlizerError::config_error(format!("Could not read config file: {e}")))?;

    serde_json::from_str(&contents)
        .map_err(|e| SqlizerError::config_error(format!("Invalid config file format: {e}")))
}

/// Resolve the configuration from the process environment and default file
pub fn resolve_config(overrides: ConfigOverrides) -> Result<ClientConfig> {
    let file = load_config_file(&config_file_path()?)?;
    resolve_with(file, |name| std::env::var(name).ok(), overrides)
}

/// Resolve from explicit layers
///
/// `env` looks up an environment variable by name; injected so resolution can
/// be tested without touching the process environment.
pub fn resolve_with(
    file: ConfigFile,
    env: impl Fn(&str) -> Option<String>,
    overrides: ConfigOverrides,
) -> Result<ClientConfig> {
    let mut config = ClientConfig::default();

    // Layer 3: file
    if let Some(url) = file.api_base_url {
        config.api_base_url = url;
    }
    if let Some(ms) = file.request_timeout_ms {
        config.request_timeout_ms = ms;
    }
    if let Some(ms) = file.poll_interval_ms {
        config.poll_interval_ms = ms;
    }
    if let Some(use_llm) = file.use_llm_for_training {
        config.use_llm_for_training = use_llm;
    }
    if let Some(dir) = file.state_dir {
        config.state_dir = dir;
    }

    // Layer 2: environment
    if let Some(url) = env(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
        config.api_base_url = url;
    }
    if let Some(dir) = env(ENV_STATE_DIR).filter(|v| !v.trim().is_empty()) {
        config.state_dir = PathBuf::from(dir);
    }
    if let Some(raw) = env(ENV_POLL_INTERVAL_MS) {
        config.poll_interval_ms = parse_millis(ENV_POLL_INTERVAL_MS, &raw)?;
    }
    if let Some(raw) = env(ENV_TIMEOUT_MS) {
        config.request_timeout_ms = parse_millis(ENV_TIMEOUT_MS, &raw)?;
    }

    // Layer 1: explicit overrides
    if let Some(url) = overrides.api_base_url {
        config.api_base_url = url;
    }
    if let Some(dir) = overrides.state_dir {
        config.state_dir = dir;
    }

    config.api_base_url = config.api_base_url.trim().trim_end_matches('/').to_string();
    if config.api_base_url.is_empty() {
        return Err(SqlizerError::config_error("Backend URL cannot be empty"));
    }
    if config.poll_interval_ms == 0 {
        return Err(SqlizerError::config_error("Poll interval must be greater than zero"));
    }

    Ok(config)
}

fn parse_millis(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| SqlizerError::config_error(format!("{name} must be a whole number of milliseconds, got '{raw}'")))
}
