//! Scriptable test doubles for the ports.
//!
//! Clones share their inner state, so a test can keep one handle while the
//! component under test owns another.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::PairSymbol;
use super::notifier::{Notifier, NotifyError, OutgoingMessage};
use super::ticker_source::{FeedError, Ticker, TickerSource};

/// Ticker source serving a settable snapshot
#[derive(Debug, Clone, Default)]
pub struct MockTickerSource {
    tickers: Arc<Mutex<Vec<Ticker>>>,
    fail: Arc<Mutex<bool>>,
    calls: Arc<Mutex<usize>>,
}

impl MockTickerSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: serve these (exchange symbol, price) rows with volume 1.0
    pub fn with_prices(self, prices: &[(&str, f64)]) -> Self {
        self.set_prices(prices);
        self
    }

    /// Replace the served snapshot with (exchange symbol, price) rows
    pub fn set_prices(&self, prices: &[(&str, f64)]) {
        let tickers = prices
            .iter()
            .filter_map(|(symbol, price)| {
                PairSymbol::from_exchange(symbol).ok().map(|pair| Ticker {
                    pair,
                    last_price: Some(*price),
                    quote_volume: 1.0,
                    frozen: false,
                })
            })
            .collect();
        self.set_tickers(tickers);
    }

    /// Replace the served snapshot with arbitrary rows
    pub fn set_tickers(&self, tickers: Vec<Ticker>) {
        *self.tickers.lock().unwrap() = tickers;
    }

    /// Make subsequent fetches fail (or succeed again)
    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl TickerSource for MockTickerSource {
    async fn fetch_tickers(&self) -> Result<Vec<Ticker>, FeedError> {
        *self.calls.lock().unwrap() += 1;
        if *self.fail.lock().unwrap() {
            return Err(FeedError::HttpError("mock feed unavailable".to_string()));
        }
        Ok(self.tickers.lock().unwrap().clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Notifier that records what it was asked to send
#[derive(Debug, Clone, Default)]
pub struct MockNotifier {
    sent: Arc<Mutex<Vec<OutgoingMessage>>>,
    attempts: Arc<Mutex<usize>>,
    fail_sends: Arc<Mutex<bool>>,
    reject_auth: Arc<Mutex<bool>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail (or succeed again)
    pub fn set_failing(&self, fail: bool) {
        *self.fail_sends.lock().unwrap() = fail;
    }

    /// Make `verify` fail
    pub fn set_reject_auth(&self, reject: bool) {
        *self.reject_auth.lock().unwrap() = reject;
    }

    /// Successfully delivered messages
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Delivered message texts
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.text).collect()
    }

    /// Every send call, delivered or not
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn verify(&self) -> Result<String, NotifyError> {
        if *self.reject_auth.lock().unwrap() {
            return Err(NotifyError::Unauthorized("mock token rejected".to_string()));
        }
        Ok("mock_bot".to_string())
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<(), NotifyError> {
        *self.attempts.lock().unwrap() += 1;
        if *self.fail_sends.lock().unwrap() {
            return Err(NotifyError::HttpError("mock delivery failure".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}
