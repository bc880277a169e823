//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Setup command arguments.
#[derive(Debug, Args)]
pub struct SetupCommand {
    /// Your name, shown next to every feeding you record
    #[arg(short, long)]
    pub name: String,

    /// Name of the pet you feed
    #[arg(short, long)]
    pub pet: String,
}

/// Feed command arguments.
#[derive(Debug, Args)]
pub struct FeedCommand {
    /// Output the recorded feeding as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// History command arguments.
#[derive(Debug, Args)]
pub struct HistoryCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Clear command arguments.
#[derive(Debug, Args)]
pub struct ClearCommand {
    /// Confirm deletion of every household record
    #[arg(long)]
    pub yes: bool,
}

/// Share command arguments.
#[derive(Debug, Args)]
pub struct ShareCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Watch command arguments.
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Seconds between refreshes (overrides `sync.refresh_interval_secs`)
    #[arg(short, long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,
}

/// Doctor command arguments.
#[derive(Debug, Args)]
pub struct DoctorCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show configuration file path
    Path,

    /// Validate configuration file
    Validate {
        /// Path to config file (uses default if not specified)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
