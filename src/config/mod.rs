//! Configuration Module
//!
//! Loads and validates configuration from TOML files.

pub mod loader;

pub use loader::{
    Config, ConfigError, SelectionMode, load_config,
    ENV_BIT2ME_API_KEY, ENV_TELEGRAM_BOT_TOKEN, ENV_TELEGRAM_CHAT_ID,
};
