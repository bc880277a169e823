//! Command-line interface for feedlog.
//!
//! This module provides the CLI structure for the `feedlog` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logging::Verbosity;

pub use commands::{
    ClearCommand, ConfigCommand, DoctorCommand, FeedCommand, HistoryCommand, SetupCommand,
    ShareCommand, WatchCommand,
};

/// feedlog - Who fed the dog?
///
/// Records pet feedings into a database shared by everyone in the household
/// and shows the most recent ones.
#[derive(Debug, Parser)]
#[command(name = "feedlog")]
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
    /// Store your name and your pet's name on this device
    Setup(SetupCommand),

    /// Record that you just fed your pet
    Feed(FeedCommand),

    /// Show the most recent feedings
    History(HistoryCommand),

    /// Delete every feeding record in the household
    Clear(ClearCommand),

    /// Show the invitation for other household members
    Share(ShareCommand),

    /// Keep showing the history as it changes
    Watch(WatchCommand),

    /// Check the account and the household database
    Doctor(DoctorCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::Trace,
            }
        }
    }
}
