//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - Bit2Me: exchange ticker client
//! - Telegram: Bot API notifier
//! - CLI: Command-line interface definitions

pub mod bit2me;
pub mod telegram;
pub mod cli;

pub use bit2me::{Bit2MeClient, Bit2MeConfig};
pub use telegram::{TelegramClient, TelegramConfig};
pub use cli::CliApp;
