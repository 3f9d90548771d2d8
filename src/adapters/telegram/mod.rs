//! Telegram Adapter
//!
//! Bot API client implementing the `Notifier` port.

mod client;

pub use client::{build_send_payload, TelegramClient, TelegramConfig};
