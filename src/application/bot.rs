//! Signal Bot
//!
//! Polling loop: refresh prices, re-sync state, evaluate every monitored
//! pair, flush bookkeeping, then send the cycle's signals as one batch.
//! Levels are persisted by the engine before the batch is attempted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Mutex, Notify, RwLock};

use crate::application::notification_sink::NotificationSink;
use crate::application::pair_selection::PairSelection;
use crate::application::price_feed::PriceFeed;
use crate::domain::{EngineError, Evaluation, PairSymbol, PersistError, Signal, SignalEngine};
use crate::ports::notifier::{Notifier, NotifyError};
use crate::ports::ticker_source::{FeedError, TickerSource};

/// Number of deepest drawdowns included in the cycle summary
const TOP_DRAWDOWNS: usize = 5;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("Price feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Notifier error: {0}")]
    Notify(#[from] NotifyError),

    #[error("State persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("No pairs to monitor ({0})")]
    NoPairs(String),
}

/// Loop timing
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub poll_interval: Duration,
    /// Pause after a cycle fails for a reason other than the feed
    pub error_backoff: Duration,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            error_backoff: Duration::from_secs(1),
        }
    }
}

/// Summary of one poll cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle: u64,
    pub processed: usize,
    pub no_price: usize,
    pub bootstrapped: usize,
    pub max_raised: usize,
    pub resets: usize,
    pub monitoring: usize,
    pub signals: Vec<Signal>,
    pub delivered: usize,
    /// Evaluations dropped because another process wrote a newer session
    pub superseded: usize,
    pub errors: usize,
    pub fetch_latency: Duration,
    /// Deepest (pair, percent vs local max) pairs this cycle
    pub top_drawdowns: Vec<(PairSymbol, f64)>,
}

/// Status snapshot of the bot
#[derive(Debug, Clone)]
pub struct BotStatus {
    pub is_running: bool,
    pub cycles: u64,
    pub pairs: usize,
    pub tracked_states: usize,
}

pub struct SignalBot<T: TickerSource, N: Notifier> {
    feed: Arc<Mutex<PriceFeed<T>>>,
    engine: Arc<Mutex<SignalEngine>>,
    sink: Arc<Mutex<NotificationSink<N>>>,
    selection: PairSelection,
    pairs: Arc<RwLock<Vec<PairSymbol>>>,
    config: BotConfig,
    is_running: Arc<RwLock<bool>>,
    wake: Arc<Notify>,
    cycles: Arc<AtomicU64>,
}

impl<T: TickerSource, N: Notifier> SignalBot<T, N> {
    pub fn new(
        feed: PriceFeed<T>,
        engine: SignalEngine,
        sink: NotificationSink<N>,
        selection: PairSelection,
        config: BotConfig,
    ) -> Self {
        Self {
            feed: Arc::new(Mutex::new(feed)),
            engine: Arc::new(Mutex::new(engine)),
            sink: Arc::new(Mutex::new(sink)),
            selection,
            pairs: Arc::new(RwLock::new(Vec::new())),
            config,
            is_running: Arc::new(RwLock::new(false)),
            wake: Arc::new(Notify::new()),
            cycles: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Authenticate the notifier and pick the monitored pairs.
    ///
    /// Any failure here is fatal: the loop never runs without pairs.
    pub async fn start(&self) -> Result<usize, BotError> {
        let identity = self.sink.lock().await.verify().await?;
        tracing::info!("Notifier authenticated as {}", identity);

        let mut feed = self.feed.lock().await;
        feed.refresh().await?;
        let pairs = self.selection.select(feed.tickers(), feed.quote());
        if pairs.is_empty() {
            return Err(BotError::NoPairs(self.selection.describe()));
        }
        feed.set_interest(&pairs);
        drop(feed);

        tracing::info!(
            "Monitoring {} pairs ({})",
            pairs.len(),
            self.selection.describe()
        );
        let count = pairs.len();
        *self.pairs.write().await = pairs;
        Ok(count)
    }

    /// Run until stopped: start, announce, loop, then flush and say goodbye
    pub async fn run(&self) -> Result<(), BotError> {
        *self.is_running.write().await = true;
        let pair_count = self.start().await?;
        self.announce_start(pair_count).await;

        tracing::info!(
            "Starting signal loop - interval: {:?}",
            self.config.poll_interval
        );

        while *self.is_running.read().await {
            let pause = match self.tick().await {
                Ok(_) => self.config.poll_interval,
                Err(BotError::Feed(e)) => {
                    tracing::warn!("Cycle skipped, price feed unavailable: {}", e);
                    self.config.poll_interval
                }
                Err(e) => {
                    tracing::error!("Cycle error: {}", e);
                    self.config.error_backoff
                }
            };

            if !*self.is_running.read().await {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = self.wake.notified() => {}
            }
        }

        self.shutdown().await;
        tracing::info!("Signal bot stopped");
        Ok(())
    }

    /// Execute one poll cycle
    pub async fn tick(&self) -> Result<CycleReport, BotError> {
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let mut report = CycleReport {
            cycle,
            ..Default::default()
        };

        let mut feed = self.feed.lock().await;
        let stats = feed.refresh().await?;
        report.fetch_latency = stats.latency;

        // Pick up external writers (manual reset, a restarted instance) after
        // the fetch; every later write merges the file again before replacing it
        let mut engine = self.engine.lock().await;
        match engine.store_mut().load() {
            Ok(sync) if sync.adopted > 0 || sync.inserted > 0 => tracing::info!(
                "State re-sync: {} adopted, {} inserted, {} merged",
                sync.adopted,
                sync.inserted,
                sync.merged
            ),
            Ok(_) => {}
            Err(e) => tracing::warn!("State re-sync failed, keeping memory: {}", e),
        }

        let pairs = self.pairs.read().await.clone();
        let mut drawdowns = Vec::with_capacity(pairs.len());
        let now = Utc::now();

        for pair in &pairs {
            let Some(price) = feed.get_price(pair) else {
                report.no_price += 1;
                continue;
            };
            report.processed += 1;

            match engine.evaluate(pair, price, now) {
                Ok(Evaluation::Bootstrapped) => report.bootstrapped += 1,
                Ok(Evaluation::Reset(_)) => report.resets += 1,
                Ok(Evaluation::MaxRaised { .. }) => report.max_raised += 1,
                Ok(Evaluation::Monitoring { drop_percent }) => {
                    report.monitoring += 1;
                    drawdowns.push((pair.clone(), drop_percent));
                }
                Ok(Evaluation::Signal(signal)) => {
                    drawdowns.push((pair.clone(), signal.drop_percent));
                    report.signals.push(signal);
                }
                Err(EngineError::Persist(PersistError::Superseded(_))) => {
                    report.superseded += 1;
                }
                Err(e) => {
                    report.errors += 1;
                    tracing::error!("Failed to evaluate {}: {}", pair, e);
                }
            }
        }
        drop(feed);

        if let Err(e) = engine.store_mut().flush() {
            tracing::error!("Failed to persist price bookkeeping: {}", e);
        }
        drop(engine);

        drawdowns.sort_by(|a, b| a.1.total_cmp(&b.1));
        drawdowns.truncate(TOP_DRAWDOWNS);
        report.top_drawdowns = drawdowns;

        if !report.signals.is_empty() {
            let delivery = self.sink.lock().await.deliver(&report.signals).await;
            report.delivered = delivery.delivered;
        }

        log_report(&report);
        Ok(report)
    }

    /// Stop the loop after the current cycle
    pub async fn stop(&self) {
        *self.is_running.write().await = false;
        self.wake.notify_one();
        tracing::info!("Stop signal sent to signal bot");
    }

    /// Flush state and send the stop notice
    pub async fn shutdown(&self) {
        if let Err(e) = self.engine.lock().await.store_mut().flush() {
            tracing::error!("Failed to save final state: {}", e);
        }

        let text = format!(
            "<b>🛑 Bot stopped</b>\n🕐 {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        );
        if let Err(e) = self.sink.lock().await.send_status(&text).await {
            tracing::warn!("Failed to send stop notice: {}", e);
        }
    }

    async fn announce_start(&self, pair_count: usize) {
        let levels = self.engine.lock().await.config().levels.describe();
        let text = format!(
            "<b>🤖 Bot Started</b>\n\n📊 Pairs: {}\n⏱ Interval: {}s\n📉 Levels: {}\n🕐 {}",
            pair_count,
            self.config.poll_interval.as_secs(),
            levels,
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        );
        if let Err(e) = self.sink.lock().await.send_status(&text).await {
            tracing::warn!("Failed to send start notice: {}", e);
        }
    }

    pub async fn monitored_pairs(&self) -> Vec<PairSymbol> {
        self.pairs.read().await.clone()
    }

    /// Get current status snapshot
    pub async fn status(&self) -> BotStatus {
        BotStatus {
            is_running: *self.is_running.read().await,
            cycles: self.cycles.load(Ordering::SeqCst),
            pairs: self.pairs.read().await.len(),
            tracked_states: self.engine.lock().await.store().len(),
        }
    }
}

fn log_report(report: &CycleReport) {
    tracing::info!(
        "Cycle #{}: processed={} no_price={} new={} max_raised={} resets={} monitoring={} signals={} delivered={} superseded={} errors={} fetch={:?}",
        report.cycle,
        report.processed,
        report.no_price,
        report.bootstrapped,
        report.max_raised,
        report.resets,
        report.monitoring,
        report.signals.len(),
        report.delivered,
        report.superseded,
        report.errors,
        report.fetch_latency
    );

    if !report.top_drawdowns.is_empty() {
        let top = report
            .top_drawdowns
            .iter()
            .map(|(pair, pct)| format!("{} {:.2}%", pair, pct))
            .collect::<Vec<_>>()
            .join(", ");
        tracing::info!("Top drawdowns: {}", top);
    }
}

// Shares all inner state, so a clone can stop the original
impl<T: TickerSource, N: Notifier> Clone for SignalBot<T, N> {
    fn clone(&self) -> Self {
        Self {
            feed: Arc::clone(&self.feed),
            engine: Arc::clone(&self.engine),
            sink: Arc::clone(&self.sink),
            selection: self.selection.clone(),
            pairs: Arc::clone(&self.pairs),
            config: self.config.clone(),
            is_running: Arc::clone(&self.is_running),
            wake: Arc::clone(&self.wake),
            cycles: Arc::clone(&self.cycles),
        }
    }
}
