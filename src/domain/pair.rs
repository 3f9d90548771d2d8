//! Trading Pair Symbols
//!
//! Bit2Me names pairs `BTC_EUR`. Internally a pair is keyed by the
//! concatenated form `BTCEUR`, and humans see `BTC/EUR`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PairParseError {
    #[error("Empty pair symbol")]
    Empty,

    #[error("Cannot split '{0}' into base and quote asset")]
    Unsplittable(String),
}

/// A base asset quoted against a quote currency (e.g. BTC against EUR)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairSymbol {
    base: String,
    quote: String,
}

impl PairSymbol {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    /// Parse the exchange-native form (`BTC_EUR`)
    pub fn from_exchange(symbol: &str) -> Result<Self, PairParseError> {
        match symbol.trim().split_once('_') {
            Some((base, quote)) if !base.is_empty() && !quote.is_empty() => {
                Ok(Self::new(base, quote))
            }
            _ if symbol.trim().is_empty() => Err(PairParseError::Empty),
            _ => Err(PairParseError::Unsplittable(symbol.to_string())),
        }
    }

    /// Parse any of `BTC/EUR`, `BTC_EUR`, or `BTCEUR`.
    ///
    /// The concatenated form needs the quote currency to find the split point.
    pub fn parse_with_quote(symbol: &str, quote: &str) -> Result<Self, PairParseError> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(PairParseError::Empty);
        }

        if let Some((base, q)) = symbol.split_once('/').or_else(|| symbol.split_once('_')) {
            if base.is_empty() || q.is_empty() {
                return Err(PairParseError::Unsplittable(symbol));
            }
            return Ok(Self::new(base, q));
        }

        let quote = quote.to_uppercase();
        match symbol.strip_suffix(quote.as_str()) {
            Some(base) if !base.is_empty() => Ok(Self::new(base, quote)),
            _ => Err(PairParseError::Unsplittable(symbol)),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Storage key and log identifier (`BTCEUR`)
    pub fn id(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }

    /// Exchange-native form (`BTC_EUR`)
    pub fn exchange_symbol(&self) -> String {
        format!("{}_{}", self.base, self.quote)
    }

    /// Human form (`BTC/EUR`)
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }
}

impl fmt::Display for PairSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for PairSymbol {
    type Err = PairParseError;

    /// Accepts the slash or underscore forms only
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/').or_else(|| s.split_once('_')) {
            Some((base, quote)) if !base.is_empty() && !quote.is_empty() => {
                Ok(Self::new(base, quote))
            }
            _ if s.is_empty() => Err(PairParseError::Empty),
            _ => Err(PairParseError::Unsplittable(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_exchange() {
        let pair = PairSymbol::from_exchange("BTC_EUR").unwrap();
        assert_eq!(pair.base(), "BTC");
        assert_eq!(pair.quote(), "EUR");
        assert_eq!(pair.id(), "BTCEUR");
        assert_eq!(pair.display_name(), "BTC/EUR");
        assert_eq!(pair.exchange_symbol(), "BTC_EUR");
    }

    #[test]
    fn test_from_exchange_rejects_garbage() {
        assert_eq!(PairSymbol::from_exchange(""), Err(PairParseError::Empty));
        assert!(PairSymbol::from_exchange("BTCEUR").is_err());
        assert!(PairSymbol::from_exchange("_EUR").is_err());
    }

    #[test]
    fn test_parse_with_quote_all_forms() {
        let expected = PairSymbol::new("SOL", "EUR");
        assert_eq!(PairSymbol::parse_with_quote("SOL/EUR", "EUR").unwrap(), expected);
        assert_eq!(PairSymbol::parse_with_quote("SOL_EUR", "EUR").unwrap(), expected);
        assert_eq!(PairSymbol::parse_with_quote("SOLEUR", "EUR").unwrap(), expected);
        assert_eq!(PairSymbol::parse_with_quote("soleur", "eur").unwrap(), expected);
    }

    #[test]
    fn test_parse_with_quote_wrong_suffix() {
        assert!(PairSymbol::parse_with_quote("SOLUSDT", "EUR").is_err());
        assert!(PairSymbol::parse_with_quote("EUR", "EUR").is_err());
    }

    #[test]
    fn test_display_and_from_str() {
        let pair: PairSymbol = "pepe/eur".parse().unwrap();
        assert_eq!(pair.to_string(), "PEPE/EUR");
        assert!("PEPEEUR".parse::<PairSymbol>().is_err());
    }
}
