//! Ports Layer - Trait definitions for external dependencies
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - Exchange ticker snapshots (prices, volumes, halted flags)
//! - Chat channel delivery (signals and status notices)

pub mod ticker_source;
pub mod notifier;
pub mod mocks;

pub use ticker_source::{FeedError, Ticker, TickerSource};
pub use notifier::{ActionButton, Notifier, NotifyError, OutgoingMessage, ParseMode};
