//! Configuration Loader
//!
//! Loads and validates configuration from TOML files. Every section has
//! defaults, so a file only needs the values it changes; secrets usually
//! come from the environment instead.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::adapters::bit2me::Bit2MeConfig;
use crate::adapters::telegram::TelegramConfig;
use crate::application::{BotConfig, PairSelection, SinkConfig, DEFAULT_TOP_N};
use crate::domain::{
    EngineConfig, LevelModel, MaxUpdatePolicy, PairSymbol, RecoveryPolicy, RecoveryStep,
    DEFAULT_STATE_FILE,
};

pub const ENV_TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";
pub const ENV_BIT2ME_API_KEY: &str = "BIT2ME_API_KEY";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorSection,
    pub pairs: PairsSection,
    pub signals: SignalsSection,
    pub reset: ResetSection,
    pub exchange: ExchangeSection,
    pub telegram: TelegramSection,
    pub storage: StorageSection,
    pub logging: LoggingSection,
}

/// Polling loop section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    /// Seconds between poll cycles
    pub check_interval_secs: u64,
    /// Pause after a failed cycle
    pub error_backoff_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            error_backoff_secs: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    #[default]
    TopByVolume,
    AllowList,
}

/// Monitored pairs section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PairsSection {
    /// Quote currency of every monitored pair
    pub quote: String,
    pub selection: SelectionMode,
    pub top_n: usize,
    /// Pairs as `BTC/EUR`, `BTC_EUR` or `BTCEUR`
    pub allow_list: Vec<String>,
}

impl Default for PairsSection {
    fn default() -> Self {
        Self {
            quote: "EUR".to_string(),
            selection: SelectionMode::TopByVolume,
            top_n: DEFAULT_TOP_N,
            allow_list: Vec::new(),
        }
    }
}

impl PairsSection {
    fn parse_allow_list(&self) -> Result<Vec<PairSymbol>, ConfigError> {
        self.allow_list
            .iter()
            .map(|entry| {
                PairSymbol::parse_with_quote(entry, &self.quote).map_err(|e| {
                    ConfigError::ValidationError(format!("allow_list entry '{}': {}", entry, e))
                })
            })
            .collect()
    }
}

/// Signal generation section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalsSection {
    pub levels: LevelModel,
    pub max_update_policy: MaxUpdatePolicy,
    /// Rise above the local max (percent) treated as noise
    pub max_tolerance_pct: f64,
}

impl Default for SignalsSection {
    fn default() -> Self {
        Self {
            levels: LevelModel::default(),
            max_update_policy: MaxUpdatePolicy::default(),
            max_tolerance_pct: 0.01,
        }
    }
}

/// Session reset section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResetSection {
    /// Reset this long after the last signal
    pub cooldown_secs: u64,
    /// Force a reset when the local max is older than this; unset disables
    pub max_session_age_secs: Option<u64>,
    pub default_growth_pct: f64,
    pub growth_by_level: Vec<RecoveryStep>,
}

impl Default for ResetSection {
    fn default() -> Self {
        let recovery = RecoveryPolicy::default();
        Self {
            cooldown_secs: 24 * 3600,
            max_session_age_secs: None,
            default_growth_pct: recovery.default_growth_pct,
            growth_by_level: recovery.steps,
        }
    }
}

impl ResetSection {
    pub fn recovery_policy(&self) -> RecoveryPolicy {
        RecoveryPolicy {
            default_growth_pct: self.default_growth_pct,
            steps: self.growth_by_level.clone(),
        }
    }
}

/// Exchange API section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeSection {
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Buy link for the message button; `{coin}` is the lower-case base asset
    pub buy_link_template: String,
}

impl Default for ExchangeSection {
    fn default() -> Self {
        Self {
            api_url: Bit2MeConfig::default().api_base_url,
            api_key: None,
            timeout_secs: 5,
            buy_link_template: SinkConfig::default().buy_link_template,
        }
    }
}

/// Telegram section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramSection {
    pub api_url: String,
    pub bot_token: String,
    pub chat_id: String,
    pub timeout_secs: u64,
    pub button_label: String,
    pub dedup_key_window_secs: u64,
    pub dedup_text_window_secs: u64,
}

impl Default for TelegramSection {
    fn default() -> Self {
        let sink = SinkConfig::default();
        Self {
            api_url: TelegramConfig::default().api_base_url,
            bot_token: String::new(),
            chat_id: String::new(),
            timeout_secs: 3,
            button_label: sink.button_label,
            dedup_key_window_secs: sink.key_window.as_secs(),
            dedup_text_window_secs: sink.text_window.as_secs(),
        }
    }
}

/// State storage section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// State file path; `~` is expanded
    pub state_file: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            state_file: DEFAULT_STATE_FILE.to_string(),
        }
    }
}

impl StorageSection {
    pub fn state_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.state_file).to_string())
    }
}

/// Logging section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file, fill secrets from the environment
/// and validate
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;
    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Fill empty secrets from `lookup` (normally the process environment)
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let fetch = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.telegram.bot_token.trim().is_empty() {
            if let Some(token) = fetch(ENV_TELEGRAM_BOT_TOKEN) {
                self.telegram.bot_token = token;
            }
        }
        if self.telegram.chat_id.trim().is_empty() {
            if let Some(chat_id) = fetch(ENV_TELEGRAM_CHAT_ID) {
                self.telegram.chat_id = chat_id;
            }
        }
        if self.exchange.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            self.exchange.api_key = fetch(ENV_BIT2ME_API_KEY);
        }
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Monitor
        if self.monitor.check_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "check_interval_secs must be > 0".to_string(),
            ));
        }

        // Pairs
        if self.pairs.quote.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "pairs.quote cannot be empty".to_string(),
            ));
        }
        match self.pairs.selection {
            SelectionMode::TopByVolume if self.pairs.top_n == 0 => {
                return Err(ConfigError::ValidationError(
                    "top_n must be > 0".to_string(),
                ));
            }
            SelectionMode::AllowList if self.pairs.allow_list.is_empty() => {
                return Err(ConfigError::ValidationError(
                    "allow_list cannot be empty when selection = \"allow_list\"".to_string(),
                ));
            }
            SelectionMode::AllowList => {
                self.pairs.parse_allow_list()?;
            }
            SelectionMode::TopByVolume => {}
        }

        // Signals and reset
        self.signals
            .levels
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        if !(self.signals.max_tolerance_pct >= 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "max_tolerance_pct must be >= 0, got {}",
                self.signals.max_tolerance_pct
            )));
        }
        self.reset
            .recovery_policy()
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        if self.reset.cooldown_secs == 0 {
            return Err(ConfigError::ValidationError(
                "cooldown_secs must be > 0".to_string(),
            ));
        }
        if self.reset.max_session_age_secs == Some(0) {
            return Err(ConfigError::ValidationError(
                "max_session_age_secs must be > 0 when set".to_string(),
            ));
        }

        // Exchange
        if self.exchange.api_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "exchange.api_url cannot be empty".to_string(),
            ));
        }
        if self.exchange.timeout_secs == 0 || self.telegram.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "timeouts must be > 0".to_string(),
            ));
        }

        // Storage
        if self.storage.state_file.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "storage.state_file cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Chat credentials are only needed by commands that send messages
    pub fn validate_credentials(&self) -> Result<(), ConfigError> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "telegram.bot_token is empty and {} is not set",
                ENV_TELEGRAM_BOT_TOKEN
            )));
        }
        if self.telegram.chat_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "telegram.chat_id is empty and {} is not set",
                ENV_TELEGRAM_CHAT_ID
            )));
        }
        Ok(())
    }
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        EngineConfig {
            levels: config.signals.levels.clone(),
            recovery: config.reset.recovery_policy(),
            max_update: config.signals.max_update_policy,
            max_tolerance_pct: config.signals.max_tolerance_pct,
            reset_cooldown: chrono::Duration::seconds(config.reset.cooldown_secs as i64),
            max_session_age: config
                .reset
                .max_session_age_secs
                .map(|secs| chrono::Duration::seconds(secs as i64)),
        }
    }
}

impl From<&Config> for SinkConfig {
    fn from(config: &Config) -> Self {
        SinkConfig {
            button_label: config.telegram.button_label.clone(),
            buy_link_template: config.exchange.buy_link_template.clone(),
            key_window: Duration::from_secs(config.telegram.dedup_key_window_secs),
            text_window: Duration::from_secs(config.telegram.dedup_text_window_secs),
        }
    }
}

// Allow-list entries were checked by `validate`; anything unparseable is skipped
impl From<&Config> for PairSelection {
    fn from(config: &Config) -> Self {
        match config.pairs.selection {
            SelectionMode::TopByVolume => PairSelection::TopByVolume {
                limit: config.pairs.top_n,
            },
            SelectionMode::AllowList => PairSelection::AllowList(
                config
                    .pairs
                    .allow_list
                    .iter()
                    .filter_map(|entry| PairSymbol::parse_with_quote(entry, &config.pairs.quote).ok())
                    .collect(),
            ),
        }
    }
}

impl From<&Config> for BotConfig {
    fn from(config: &Config) -> Self {
        BotConfig {
            poll_interval: Duration::from_secs(config.monitor.check_interval_secs),
            error_backoff: Duration::from_secs(config.monitor.error_backoff_secs),
        }
    }
}

impl From<&Config> for Bit2MeConfig {
    fn from(config: &Config) -> Self {
        Bit2MeConfig {
            api_base_url: config.exchange.api_url.trim_end_matches('/').to_string(),
            api_key: config.exchange.api_key.clone().filter(|k| !k.trim().is_empty()),
            timeout: Duration::from_secs(config.exchange.timeout_secs),
        }
    }
}

impl From<&Config> for TelegramConfig {
    fn from(config: &Config) -> Self {
        TelegramConfig {
            api_base_url: config.telegram.api_url.trim_end_matches('/').to_string(),
            bot_token: config.telegram.bot_token.clone(),
            chat_id: config.telegram.chat_id.clone(),
            timeout: Duration::from_secs(config.telegram.timeout_secs),
        }
    }
}
