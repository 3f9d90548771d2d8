//! Dipwatch - Drawdown Signal Bot for Bit2Me
//!
//! Polls exchange tickers and posts Telegram signals when pairs fall through
//! configured drop levels.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use dipwatch::adapters::bit2me::{Bit2MeClient, Bit2MeConfig};
use dipwatch::adapters::cli::{CliApp, Command, PairsCmd, ResetCmd, RunCmd, StatusCmd};
use dipwatch::adapters::telegram::{TelegramClient, TelegramConfig};
use dipwatch::application::{
    BotConfig, NotificationSink, PairSelection, PriceFeed, SignalBot, SinkConfig,
};
use dipwatch::config::{load_config, Config};
use dipwatch::domain::{
    EngineConfig, JsonFileBackend, PairState, PairSymbol, SignalEngine, StateStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (secrets go here, not in the TOML file)
    dotenvy::dotenv().ok();

    let app = CliApp::parse();

    let config_path = match &app.command {
        Command::Run(cmd) => &cmd.config,
        Command::Status(cmd) => &cmd.config,
        Command::Pairs(cmd) => &cmd.config,
        Command::Reset(cmd) => &cmd.config,
    };
    let config = load_config(config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    init_logging(app.verbose, app.debug, &config.logging.level)?;

    match app.command {
        Command::Run(cmd) => run_command(cmd, config).await,
        Command::Status(cmd) => status_command(cmd, config),
        Command::Pairs(cmd) => pairs_command(cmd, config).await,
        Command::Reset(cmd) => reset_command(cmd, config),
    }
}

/// `RUST_LOG` wins, then the CLI flags, then the config file
fn init_logging(verbose: bool, debug: bool, config_level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if debug => EnvFilter::new("debug"),
        Err(_) if verbose => EnvFilter::new("info"),
        Err(_) => EnvFilter::try_new(config_level)
            .with_context(|| format!("Invalid logging.level '{}'", config_level))?,
    };

    fmt().with_env_filter(filter).with_target(false).init();
    Ok(())
}

fn open_store(config: &Config) -> Result<StateStore> {
    let path = config.storage.state_path();
    StateStore::open(Box::new(JsonFileBackend::new(&path)))
        .with_context(|| format!("Failed to load state file {}", path.display()))
}

async fn run_command(cmd: RunCmd, config: Config) -> Result<()> {
    tracing::info!("Starting dipwatch signal bot...");
    config.validate_credentials()?;

    // A corrupted state file stops us here rather than re-firing every level
    let store = open_store(&config)?;
    tracing::info!("Loaded {} pair states from {}", store.len(), store.location());

    let engine = SignalEngine::new(EngineConfig::from(&config), store);
    let exchange = Bit2MeClient::with_config(Bit2MeConfig::from(&config))
        .context("Failed to create Bit2Me client")?;
    let telegram = TelegramClient::new(TelegramConfig::from(&config))
        .context("Failed to create Telegram client")?;

    let bot = SignalBot::new(
        PriceFeed::new(exchange, config.pairs.quote.clone()),
        engine,
        NotificationSink::new(telegram, SinkConfig::from(&config)),
        PairSelection::from(&config),
        BotConfig::from(&config),
    );

    if cmd.once {
        bot.start().await.context("Startup failed")?;
        let report = bot.tick().await.context("Cycle failed")?;
        println!(
            "Cycle complete: {} processed, {} signals, {} delivered",
            report.processed,
            report.signals.len(),
            report.delivered
        );
        return Ok(());
    }

    // Setup Ctrl+C handler
    let handle = bot.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
        handle.stop().await;
    });

    bot.run().await.context("Signal bot failed")?;
    tracing::info!("Dipwatch stopped");
    Ok(())
}

fn status_command(cmd: StatusCmd, config: Config) -> Result<()> {
    let store = open_store(&config)?;

    let filter = match cmd.pair.as_deref() {
        Some(raw) => Some(
            PairSymbol::parse_with_quote(raw, &config.pairs.quote)
                .with_context(|| format!("Invalid pair '{}'", raw))?
                .id(),
        ),
        None => None,
    };

    let mut rows: Vec<(&String, &PairState, f64)> = store
        .iter()
        .filter(|(id, _)| filter.as_ref().map_or(true, |f| *id == f))
        .map(|(id, state)| {
            let change = state
                .last_price
                .and_then(|price| state.change_from_max(price))
                .unwrap_or(0.0);
            (id, state, change)
        })
        .collect();

    if rows.is_empty() {
        match filter {
            Some(id) => bail!("No state recorded for {}", id),
            None => {
                println!("No pair states in {}", store.location());
                return Ok(());
            }
        }
    }

    rows.sort_by(|a, b| a.2.total_cmp(&b.2));

    println!("State file: {}", store.location());
    println!(
        "{:<12} {:>14} {:>14} {:>14} {:>8}  {:<10} {}",
        "PAIR", "LOCAL MAX", "LOCAL MIN", "LAST", "CHANGE", "LEVELS", "LAST SIGNAL"
    );
    for (id, state, change) in rows {
        let levels = if state.triggered_levels.is_empty() {
            "-".to_string()
        } else {
            state
                .triggered_levels
                .iter()
                .map(|l| l.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        let last_signal = state
            .last_signal_time
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<12} {:>14} {:>14} {:>14} {:>7.2}%  {:<10} {}",
            id,
            fmt_opt(state.local_max),
            fmt_opt(state.local_min),
            fmt_opt(state.last_price),
            change,
            levels,
            last_signal
        );
    }

    Ok(())
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{}", v))
}

async fn pairs_command(_cmd: PairsCmd, config: Config) -> Result<()> {
    let exchange = Bit2MeClient::with_config(Bit2MeConfig::from(&config))
        .context("Failed to create Bit2Me client")?;
    let mut feed = PriceFeed::new(exchange, config.pairs.quote.clone());
    let stats = feed.refresh().await.context("Failed to fetch tickers")?;

    let selection = PairSelection::from(&config);
    let pairs = selection.select(feed.tickers(), feed.quote());

    println!(
        "{} of {} {} pairs selected ({}), fetched in {:?}",
        pairs.len(),
        stats.total,
        feed.quote(),
        selection.describe(),
        stats.latency
    );
    for pair in &pairs {
        let volume = feed
            .tickers()
            .iter()
            .find(|t| &t.pair == pair)
            .map_or(0.0, |t| t.quote_volume);
        println!(
            "{:<12} {:>16} {:>18.0}",
            pair.display_name(),
            fmt_opt(feed.get_price(pair)),
            volume
        );
    }

    Ok(())
}

fn reset_command(cmd: ResetCmd, config: Config) -> Result<()> {
    let pair = PairSymbol::parse_with_quote(&cmd.pair, &config.pairs.quote)
        .with_context(|| format!("Invalid pair '{}'", cmd.pair))?;

    let store = open_store(&config)?;
    let mut engine = SignalEngine::new(EngineConfig::from(&config), store);
    let price = engine
        .manual_reset(&pair, Utc::now())
        .with_context(|| format!("Failed to reset {}", pair))?;

    println!("{} reset: new session anchored at {}", pair, price);
    println!("A running bot picks this up on its next cycle.");
    Ok(())
}
