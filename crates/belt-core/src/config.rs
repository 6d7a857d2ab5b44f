use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::BeltError;

/// Top-level Belt configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub belt: BeltConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeltConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Timezone attached to calendar events.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for BeltConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            timezone: default_timezone(),
        }
    }
}

/// Provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider")]
    pub default: String,
    #[serde(default)]
    pub anthropic: Option<AnthropicConfig>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            default: default_provider(),
            anthropic: None,
        }
    }
}

/// Anthropic API provider config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_anthropic_model")]
    pub model: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_anthropic_model(),
        }
    }
}

impl AnthropicConfig {
    /// The configured key, or `ANTHROPIC_API_KEY` when the file leaves it blank.
    pub fn resolved_api_key(&self) -> String {
        if self.api_key.trim().is_empty() {
            std::env::var("ANTHROPIC_API_KEY").unwrap_or_default()
        } else {
            self.api_key.clone()
        }
    }
}

/// Where conversation state lives.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryBackend {
    /// SQLite file (default).
    #[default]
    Sqlite,
    /// Process-local maps; lost on restart.
    Memory,
}

/// Memory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub backend: MemoryBackend,
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: MemoryBackend::default(),
            db_path: default_db_path(),
        }
    }
}

/// Orchestration engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Inactivity after which a wizard is discarded.
    #[serde(default = "default_wizard_timeout_secs")]
    pub wizard_timeout_secs: u64,
    #[serde(default = "default_max_clarification_questions")]
    pub max_clarification_questions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            wizard_timeout_secs: default_wizard_timeout_secs(),
            max_clarification_questions: default_max_clarification_questions(),
        }
    }
}

/// Call initiation retry and completion polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Attempts after the first one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            poll_interval_secs: default_poll_interval_secs(),
            poll_max_attempts: default_poll_max_attempts(),
        }
    }
}

impl VoiceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

// --- Defaults ---

fn default_name() -> String {
    "Belt".to_string()
}
fn default_data_dir() -> String {
    "~/.belt".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_timezone() -> String {
    "Europe/Amsterdam".to_string()
}
fn default_provider() -> String {
    "anthropic".to_string()
}
fn default_anthropic_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}
fn default_db_path() -> String {
    "~/.belt/belt.db".to_string()
}
fn default_wizard_timeout_secs() -> u64 {
    300
}
fn default_max_clarification_questions() -> usize {
    4
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    2000
}
fn default_retry_max_delay_ms() -> u64 {
    10_000
}
fn default_poll_interval_secs() -> u64 {
    5
}
fn default_poll_max_attempts() -> u32 {
    60
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file. A missing file yields defaults.
pub fn load(path: &str) -> Result<Config, BeltError> {
    let path = Path::new(path);
    if !path.exists() {
        tracing::info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| BeltError::Config(format!("failed to read {}: {}", path.display(), e)))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| BeltError::Config(format!("failed to parse config: {}", e)))?;

    Ok(config)
}
