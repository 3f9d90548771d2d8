//! Monitored Pair Selection

use crate::domain::PairSymbol;
use crate::ports::ticker_source::Ticker;

/// Default number of pairs when selecting by volume
pub const DEFAULT_TOP_N: usize = 300;

/// How the monitored set is chosen at startup
#[derive(Debug, Clone, PartialEq)]
pub enum PairSelection {
    /// Most liquid tradable pairs by quote volume
    TopByVolume { limit: usize },
    /// Fixed list; pairs missing from the exchange are dropped with a warning
    AllowList(Vec<PairSymbol>),
}

impl Default for PairSelection {
    fn default() -> Self {
        PairSelection::TopByVolume { limit: DEFAULT_TOP_N }
    }
}

impl PairSelection {
    /// Apply the selection to a ticker snapshot.
    ///
    /// Only tradable rows count: matching quote, not frozen, positive price.
    pub fn select(&self, tickers: &[Ticker], quote: &str) -> Vec<PairSymbol> {
        let tradable: Vec<&Ticker> = tickers
            .iter()
            .filter(|t| t.pair.quote().eq_ignore_ascii_case(quote))
            .filter(|t| !t.frozen)
            .filter(|t| t.last_price.is_some_and(|p| p.is_finite() && p > 0.0))
            .collect();

        match self {
            PairSelection::TopByVolume { limit } => {
                let mut ranked = tradable;
                ranked.sort_by(|a, b| {
                    b.quote_volume
                        .total_cmp(&a.quote_volume)
                        .then_with(|| a.pair.cmp(&b.pair))
                });
                ranked
                    .into_iter()
                    .take(*limit)
                    .map(|t| t.pair.clone())
                    .collect()
            }
            PairSelection::AllowList(wanted) => {
                let mut selected = Vec::with_capacity(wanted.len());
                for pair in wanted {
                    if selected.contains(pair) {
                        continue;
                    }
                    if tradable.iter().any(|t| &t.pair == pair) {
                        selected.push(pair.clone());
                    } else {
                        tracing::warn!("Pair {} is not tradable on the exchange, skipping", pair);
                    }
                }
                selected
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            PairSelection::TopByVolume { limit } => format!("top {} by volume", limit),
            PairSelection::AllowList(pairs) => format!("allow-list of {}", pairs.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticker(symbol: &str, price: f64, volume: f64, frozen: bool) -> Ticker {
        Ticker {
            pair: PairSymbol::from_exchange(symbol).unwrap(),
            last_price: Some(price),
            quote_volume: volume,
            frozen,
        }
    }

    fn snapshot() -> Vec<Ticker> {
        vec![
            ticker("BTC_EUR", 60000.0, 5_000_000.0, false),
            ticker("ETH_EUR", 2500.0, 3_000_000.0, false),
            ticker("DOGE_EUR", 0.1, 4_000_000.0, true),
            ticker("SOL_EUR", 0.0, 9_000_000.0, false),
            ticker("ADA_EUR", 0.4, 100.0, false),
            ticker("BTC_USDT", 60000.0, 9_000_000.0, false),
        ]
    }

    #[test]
    fn test_top_by_volume() {
        let selected = PairSelection::TopByVolume { limit: 2 }.select(&snapshot(), "EUR");
        let names: Vec<String> = selected.iter().map(|p| p.id()).collect();
        assert_eq!(names, vec!["BTCEUR", "ETHEUR"]);
    }

    #[test]
    fn test_top_by_volume_limit_above_available() {
        let selected = PairSelection::default().select(&snapshot(), "EUR");
        assert_eq!(selected.len(), 3);
        assert_eq!(selected[2].id(), "ADAEUR");
    }

    #[test]
    fn test_allow_list_drops_untradable() {
        let selection = PairSelection::AllowList(vec![
            PairSymbol::new("ETH", "EUR"),
            PairSymbol::new("DOGE", "EUR"),
            PairSymbol::new("XYZ", "EUR"),
            PairSymbol::new("ETH", "EUR"),
        ]);
        let selected = selection.select(&snapshot(), "EUR");
        assert_eq!(selected, vec![PairSymbol::new("ETH", "EUR")]);
    }
}
