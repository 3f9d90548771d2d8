//! Bit2Me Exchange Adapter
//!
//! Ticker snapshot client implementing the `TickerSource` port.

mod client;

pub use client::{parse_tickers, Bit2MeClient, Bit2MeConfig};
