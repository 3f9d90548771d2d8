//! CLI Command Definitions
//!
//! Argument structures for every dipwatch command.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/dipwatch.toml";

/// Dipwatch - Drawdown signal bot for Bit2Me spot pairs
#[derive(Parser, Debug)]
#[command(
    name = "dipwatch",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Drawdown signal bot for Bit2Me spot pairs",
    long_about = "Dipwatch polls Bit2Me tickers, tracks each pair's local max and min, \
                  and posts a Telegram signal once per drop level per session."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the polling loop
    Run(RunCmd),

    /// Show persisted pair states
    Status(StatusCmd),

    /// List the pairs that would be monitored
    Pairs(PairsCmd),

    /// Start a new session for a pair at its last observed price
    Reset(ResetCmd),
}

/// Start polling loop
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,
}

/// Show pair states
#[derive(Parser, Debug)]
pub struct StatusCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Only show this pair (BTC/EUR, BTC_EUR or BTCEUR)
    #[arg(short, long, value_name = "PAIR")]
    pub pair: Option<String>,
}

/// List monitored pairs
#[derive(Parser, Debug)]
pub struct PairsCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

/// Manual session reset
#[derive(Parser, Debug)]
pub struct ResetCmd {
    /// Pair to reset (BTC/EUR, BTC_EUR or BTCEUR)
    #[arg(value_name = "PAIR")]
    pub pair: String,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_defaults() {
        let app = CliApp::try_parse_from(["dipwatch", "run"]).unwrap();
        assert!(!app.verbose);
        match app.command {
            Command::Run(cmd) => {
                assert_eq!(cmd.config, PathBuf::from(DEFAULT_CONFIG_PATH));
                assert!(!cmd.once);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_reset_with_global_flag() {
        let app =
            CliApp::try_parse_from(["dipwatch", "reset", "BTC/EUR", "--debug", "-c", "x.toml"])
                .unwrap();
        assert!(app.debug);
        match app.command {
            Command::Reset(cmd) => {
                assert_eq!(cmd.pair, "BTC/EUR");
                assert_eq!(cmd.config, PathBuf::from("x.toml"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_reset_requires_pair() {
        assert!(CliApp::try_parse_from(["dipwatch", "reset"]).is_err());
    }
}
