//! Bit2Me Ticker Client
//!
//! One GET per cycle against the trading gateway's ticker endpoint.
//! The payload maps `BTC_EUR`-style symbols to ticker objects; numbers may
//! arrive as JSON numbers or strings.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::domain::PairSymbol;
use crate::ports::ticker_source::{FeedError, Ticker, TickerSource};

/// Bit2Me client configuration
#[derive(Debug, Clone)]
pub struct Bit2MeConfig {
    /// Trading gateway base URL
    pub api_base_url: String,
    /// Optional API key sent as `X-Bit2Me-Key`
    pub api_key: Option<String>,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for Bit2MeConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://gateway.bit2me.com/v1/trading".to_string(),
            api_key: None,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Bit2Me ticker client
#[derive(Debug, Clone)]
pub struct Bit2MeClient {
    config: Bit2MeConfig,
    http: Client,
}

impl Bit2MeClient {
    pub fn new() -> Result<Self, FeedError> {
        Self::with_config(Bit2MeConfig::default())
    }

    pub fn with_config(config: Bit2MeConfig) -> Result<Self, FeedError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FeedError::HttpError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    pub fn api_base_url(&self) -> &str {
        &self.config.api_base_url
    }

    fn map_request_error(&self, e: reqwest::Error) -> FeedError {
        if e.is_timeout() {
            FeedError::Timeout(self.config.timeout)
        } else {
            FeedError::HttpError(e.to_string())
        }
    }
}

#[async_trait]
impl TickerSource for Bit2MeClient {
    async fn fetch_tickers(&self) -> Result<Vec<Ticker>, FeedError> {
        let url = format!("{}/ticker", self.config.api_base_url);
        // Cache-buster: the gateway sometimes serves stale snapshots otherwise
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let mut req = self
            .http
            .get(&url)
            .query(&[("t", stamp.to_string())])
            .header("Content-Type", "application/json");

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("X-Bit2Me-Key", api_key);
        }

        let response = req.send().await.map_err(|e| self.map_request_error(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_request_error(e))?;

        if !status.is_success() {
            return Err(FeedError::BadStatus {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        parse_tickers(&body)
    }

    fn name(&self) -> &str {
        "bit2me"
    }
}

/// Parse a ticker payload.
///
/// Rows whose symbol cannot be split into base and quote are dropped here;
/// price validity is left to the caller.
pub fn parse_tickers(body: &str) -> Result<Vec<Ticker>, FeedError> {
    if body.trim().is_empty() {
        return Err(FeedError::EmptyPayload);
    }

    let payload: Value = serde_json::from_str(body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        FeedError::Malformed(format!("{} (body: {})", e, preview))
    })?;

    let rows: Vec<(String, &Value)> = match &payload {
        Value::Object(map) if !map.is_empty() => {
            map.iter().map(|(symbol, info)| (symbol.clone(), info)).collect()
        }
        Value::Array(items) if !items.is_empty() => items
            .iter()
            .filter_map(|item| {
                item.get("symbol")
                    .and_then(Value::as_str)
                    .map(|s| (s.replace('/', "_"), item))
            })
            .collect(),
        Value::Object(_) | Value::Array(_) => return Err(FeedError::EmptyPayload),
        other => {
            return Err(FeedError::Malformed(format!(
                "expected object or array, got {}",
                type_name(other)
            )))
        }
    };

    let tickers = rows
        .into_iter()
        .filter(|(_, info)| info.is_object())
        .filter_map(|(symbol, info)| {
            let pair = PairSymbol::from_exchange(&symbol).ok()?;
            Some(Ticker {
                pair,
                last_price: info.get("last_price").and_then(number),
                quote_volume: info.get("quote_volume").and_then(number).unwrap_or(0.0),
                frozen: info.get("isFrozen").map(is_truthy).unwrap_or(false),
            })
        })
        .collect();

    Ok(tickers)
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !matches!(s.trim(), "" | "0" | "false"),
        _ => false,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
