//! Price Feed
//!
//! One ticker round-trip per cycle, cached as a price-by-pair map for the
//! configured quote currency. Lookups between refreshes are pure.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::domain::PairSymbol;
use crate::ports::ticker_source::{FeedError, Ticker, TickerSource};

/// Consecutive refreshes with no price movement before the feed is reported stale
pub const STALE_REFRESH_THRESHOLD: u32 = 3;

/// Outcome of one refresh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshStats {
    /// Pairs whose price differs from the previous snapshot
    pub changed: usize,
    pub unchanged: usize,
    /// Pairs not in the previous snapshot
    pub new: usize,
    /// Non-positive or unparseable prices
    pub skipped_invalid: usize,
    pub skipped_frozen: usize,
    /// Rows received for the quote currency
    pub total: usize,
    pub latency: Duration,
}

impl RefreshStats {
    pub fn cached(&self) -> usize {
        self.changed + self.unchanged + self.new
    }
}

/// Cached exchange prices
pub struct PriceFeed<T: TickerSource> {
    source: T,
    quote: String,
    interest: Option<HashSet<PairSymbol>>,
    prices: HashMap<PairSymbol, f64>,
    tickers: Vec<Ticker>,
    last_refresh: Option<Instant>,
    stale_refreshes: u32,
}

impl<T: TickerSource> PriceFeed<T> {
    pub fn new(source: T, quote: impl Into<String>) -> Self {
        Self {
            source,
            quote: quote.into().to_uppercase(),
            interest: None,
            prices: HashMap::new(),
            tickers: Vec::new(),
            last_refresh: None,
            stale_refreshes: 0,
        }
    }

    /// Restrict the price cache to these pairs
    pub fn set_interest(&mut self, pairs: &[PairSymbol]) {
        self.interest = Some(pairs.iter().cloned().collect());
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Fetch all tickers and rebuild the cache.
    ///
    /// On error the previous cache is left untouched.
    pub async fn refresh(&mut self) -> Result<RefreshStats, FeedError> {
        let started = Instant::now();
        let tickers = self.source.fetch_tickers().await?;
        if tickers.is_empty() {
            return Err(FeedError::EmptyPayload);
        }

        let mut stats = RefreshStats::default();
        let mut prices = HashMap::new();
        let mut quoted = Vec::new();

        for ticker in tickers {
            if ticker.pair.quote() != self.quote {
                continue;
            }
            stats.total += 1;

            if ticker.frozen {
                stats.skipped_frozen += 1;
                quoted.push(ticker);
                continue;
            }
            let price = match ticker.last_price {
                Some(p) if p.is_finite() && p > 0.0 => p,
                _ => {
                    stats.skipped_invalid += 1;
                    quoted.push(ticker);
                    continue;
                }
            };

            let wanted = self
                .interest
                .as_ref()
                .map_or(true, |set| set.contains(&ticker.pair));
            if wanted {
                match self.prices.get(&ticker.pair) {
                    None => stats.new += 1,
                    Some(old) if *old != price => stats.changed += 1,
                    Some(_) => stats.unchanged += 1,
                }
                prices.insert(ticker.pair.clone(), price);
            }
            quoted.push(ticker);
        }

        if prices.is_empty() {
            return Err(FeedError::NoUsableEntries {
                skipped: stats.skipped_invalid + stats.skipped_frozen,
            });
        }

        stats.latency = started.elapsed();
        self.track_staleness(&stats);

        self.prices = prices;
        self.tickers = quoted;
        self.last_refresh = Some(Instant::now());

        tracing::debug!(
            "Feed refreshed from {}: {} cached ({} changed, {} new), {} invalid, {} frozen in {:?}",
            self.source.name(),
            stats.cached(),
            stats.changed,
            stats.new,
            stats.skipped_invalid,
            stats.skipped_frozen,
            stats.latency
        );

        Ok(stats)
    }

    fn track_staleness(&mut self, stats: &RefreshStats) {
        if stats.changed == 0 && stats.new == 0 && stats.unchanged > 0 {
            self.stale_refreshes += 1;
            if self.stale_refreshes >= STALE_REFRESH_THRESHOLD {
                tracing::warn!(
                    "No price changed in {} consecutive refreshes; exchange data may be stale",
                    self.stale_refreshes
                );
            }
        } else {
            self.stale_refreshes = 0;
        }
    }

    /// Price from the last successful refresh
    pub fn get_price(&self, pair: &PairSymbol) -> Option<f64> {
        self.prices.get(pair).copied()
    }

    /// Quote-currency rows from the last successful refresh, including
    /// frozen and unpriced ones
    pub fn tickers(&self) -> &[Ticker] {
        &self.tickers
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn last_refresh(&self) -> Option<Instant> {
        self.last_refresh
    }

    pub fn stale_refreshes(&self) -> u32 {
        self.stale_refreshes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mocks::MockTickerSource;

    fn pair(s: &str) -> PairSymbol {
        PairSymbol::from_exchange(s).unwrap()
    }

    fn ticker(symbol: &str, price: Option<f64>, frozen: bool) -> Ticker {
        Ticker {
            pair: pair(symbol),
            last_price: price,
            quote_volume: 1.0,
            frozen,
        }
    }

    #[test]
    fn test_refresh_filters_entries() {
        let source = MockTickerSource::new();
        source.set_tickers(vec![
            ticker("BTC_EUR", Some(100.0), false),
            ticker("ETH_EUR", Some(0.0), false),
            ticker("XRP_EUR", None, false),
            ticker("LUNA_EUR", Some(1.0), true),
            ticker("BTC_USDT", Some(101.0), false),
        ]);
        let mut feed = PriceFeed::new(source, "eur");

        let stats = tokio_test::block_on(feed.refresh()).unwrap();

        assert_eq!(stats.total, 4);
        assert_eq!(stats.new, 1);
        assert_eq!(stats.skipped_invalid, 2);
        assert_eq!(stats.skipped_frozen, 1);
        assert_eq!(feed.get_price(&pair("BTC_EUR")), Some(100.0));
        assert_eq!(feed.get_price(&pair("ETH_EUR")), None);
        assert_eq!(feed.get_price(&pair("LUNA_EUR")), None);
        assert_eq!(feed.get_price(&pair("BTC_USDT")), None);
        assert_eq!(feed.tickers().len(), 4);
    }

    #[test]
    fn test_change_counts() {
        let source = MockTickerSource::new().with_prices(&[("BTC_EUR", 100.0), ("ETH_EUR", 10.0)]);
        let mut feed = PriceFeed::new(source.clone(), "EUR");
        tokio_test::block_on(feed.refresh()).unwrap();

        source.set_prices(&[("BTC_EUR", 101.0), ("ETH_EUR", 10.0), ("SOL_EUR", 5.0)]);
        let stats = tokio_test::block_on(feed.refresh()).unwrap();

        assert_eq!(stats.changed, 1);
        assert_eq!(stats.unchanged, 1);
        assert_eq!(stats.new, 1);
        assert_eq!(feed.len(), 3);
    }

    #[test]
    fn test_failure_keeps_previous_cache() {
        let source = MockTickerSource::new().with_prices(&[("BTC_EUR", 100.0)]);
        let mut feed = PriceFeed::new(source.clone(), "EUR");
        tokio_test::block_on(feed.refresh()).unwrap();

        source.set_failing(true);
        assert!(tokio_test::block_on(feed.refresh()).is_err());
        assert_eq!(feed.get_price(&pair("BTC_EUR")), Some(100.0));
    }

    #[test]
    fn test_empty_and_unusable_snapshots() {
        let source = MockTickerSource::new();
        let mut feed = PriceFeed::new(source.clone(), "EUR");
        assert!(matches!(
            tokio_test::block_on(feed.refresh()),
            Err(FeedError::EmptyPayload)
        ));

        source.set_tickers(vec![ticker("BTC_EUR", Some(-1.0), false)]);
        assert!(matches!(
            tokio_test::block_on(feed.refresh()),
            Err(FeedError::NoUsableEntries { skipped: 1 })
        ));
        assert!(feed.is_empty());
    }

    #[test]
    fn test_interest_restricts_cache() {
        let source = MockTickerSource::new().with_prices(&[("BTC_EUR", 100.0), ("ETH_EUR", 10.0)]);
        let mut feed = PriceFeed::new(source, "EUR");
        feed.set_interest(&[pair("ETH_EUR")]);

        tokio_test::block_on(feed.refresh()).unwrap();

        assert_eq!(feed.len(), 1);
        assert_eq!(feed.get_price(&pair("BTC_EUR")), None);
        assert_eq!(feed.tickers().len(), 2);
    }

    #[test]
    fn test_stale_counter() {
        let source = MockTickerSource::new().with_prices(&[("BTC_EUR", 100.0)]);
        let mut feed = PriceFeed::new(source.clone(), "EUR");

        for _ in 0..4 {
            tokio_test::block_on(feed.refresh()).unwrap();
        }
        assert_eq!(feed.stale_refreshes(), 3);

        source.set_prices(&[("BTC_EUR", 99.0)]);
        tokio_test::block_on(feed.refresh()).unwrap();
        assert_eq!(feed.stale_refreshes(), 0);
    }
}
