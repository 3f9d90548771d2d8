//! CLI Adapter
//!
//! Command-line interface for the dipwatch bot.
//! Uses clap derive macros for argument parsing.

mod commands;

pub use commands::{CliApp, Command, PairsCmd, ResetCmd, RunCmd, StatusCmd, DEFAULT_CONFIG_PATH};

/// Initialize the CLI application
pub fn init() -> CliApp {
    use clap::Parser;
    CliApp::parse()
}
