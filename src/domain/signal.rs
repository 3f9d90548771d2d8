use std::fmt;

use chrono::{DateTime, Utc};

use super::pair::PairSymbol;

/// A drop level crossed by a pair, ready to be announced
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub pair: PairSymbol,
    pub level: u32,
    /// Percent change from the local max (negative)
    pub drop_percent: f64,
    pub price: f64,
    pub local_max: f64,
    pub time: DateTime<Utc>,
}

impl Signal {
    /// Identity used for duplicate suppression
    pub fn key(&self) -> (String, u32) {
        (self.pair.id(), self.level)
    }

    /// Chat text, e.g. `💎 BTC/EUR | −8.5% | 91.50€`
    pub fn render(&self) -> String {
        format!(
            "💎 {} | \u{2212}{:.1}% | {}",
            self.pair.display_name(),
            self.drop_percent.abs(),
            format_price(self.price, self.pair.quote()),
        )
    }

    /// Buy link with `{coin}` replaced by the lower-case base asset
    pub fn buy_link(&self, template: &str) -> String {
        template.replace("{coin}", &self.pair.base().to_lowercase())
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} L{} {:.2}% @ {}",
            self.pair.id(),
            self.level,
            self.drop_percent,
            self.price
        )
    }
}

/// Price with precision that keeps small coins readable
pub fn format_price(price: f64, quote: &str) -> String {
    let symbol = match quote {
        "EUR" => "€",
        "USD" | "USDT" | "USDC" => "$",
        _ => "",
    };
    let digits = if price >= 1.0 {
        2
    } else if price >= 0.01 {
        4
    } else {
        8
    };
    if symbol.is_empty() {
        format!("{:.*} {}", digits, price, quote)
    } else {
        format!("{:.*}{}", digits, price, symbol)
    }
}
