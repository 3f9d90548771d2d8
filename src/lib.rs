//! Dipwatch - Drawdown Signal Bot Library
//!
//! Watches Bit2Me spot pairs for drops from their local maximum and posts
//! one Telegram signal per drop level per session.
//!
//! # Modules
//!
//! - `domain`: Core logic (PairState, SignalEngine, StateStore, SignalCache)
//! - `ports`: Trait abstractions (TickerSource, Notifier)
//! - `adapters`: External implementations (Bit2Me, Telegram, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Price feed, notification sink and the polling loop

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod config;
pub mod application;
