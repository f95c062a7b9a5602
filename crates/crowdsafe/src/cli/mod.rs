//! Command-line interface for crowdsafe.
//!
//! This module provides the CLI structure for the `crowdsafe` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ClearCommand, ConfigCommand, HistoryCommand, ServeCommand, StatsCommand};

use crate::logging::Verbosity;

/// crowdsafe - Crowd-safety risk predictions
///
/// Serves the prediction API and inspects the recorded prediction history.
#[derive(Debug, Parser)]
#[command(name = "crowdsafe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API server
    Serve(ServeCommand),

    /// Show prediction totals per risk tier
    Stats(StatsCommand),

    /// List the most recent predictions
    History(HistoryCommand),

    /// Delete all stored predictions (the CSV export is kept)
    Clear(ClearCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Logging verbosity selected by `-q` and `-v`.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}
