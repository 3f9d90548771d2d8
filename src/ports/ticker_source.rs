use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::PairSymbol;

/// Price feed error type
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Exchange returned status {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("Exchange returned an empty payload")]
    EmptyPayload,

    #[error("Malformed ticker payload: {0}")]
    Malformed(String),

    #[error("No usable tickers in response ({skipped} skipped)")]
    NoUsableEntries { skipped: usize },
}

/// One ticker row as the exchange reported it.
///
/// `last_price` is `None` when the field was missing or unparseable; the
/// price feed decides what is usable.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticker {
    pub pair: PairSymbol,
    pub last_price: Option<f64>,
    /// Volume in quote currency
    pub quote_volume: f64,
    pub frozen: bool,
}

/// Exchange ticker port
#[async_trait]
pub trait TickerSource: Send + Sync {
    /// Fetch every ticker in one round-trip
    async fn fetch_tickers(&self) -> Result<Vec<Ticker>, FeedError>;

    /// Name for logs
    fn name(&self) -> &str;
}
