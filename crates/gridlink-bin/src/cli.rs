// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! CLI argument parsing and command definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// GRIDLINK industrial IoT gateway.
///
/// Polls field devices over southbound protocol drivers and forwards tag
/// snapshots to northbound applications.
#[derive(Parser, Debug)]
#[command(
    name = "gridlink",
    version = gridlink_core::VERSION,
    about = "GRIDLINK industrial IoT gateway",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "gridlink.json",
        env = "GRIDLINK_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log", default_value = "info", env = "GRIDLINK_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json, compact)
    #[arg(long, default_value = "text", env = "GRIDLINK_LOG_FORMAT", global = true)]
    pub log_format: LogFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the gateway (default when no subcommand is given)
    Run(RunArgs),

    /// Validate the configuration file without starting the gateway
    Validate,

    /// Show version information
    Version,
}

/// Arguments for the `run` command.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Run detached from the terminal (for service managers)
    #[arg(short, long)]
    pub daemon: bool,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact format for minimal output
    Compact,
}

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The effective command, defaulting to `Run`.
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Run(RunArgs::default()))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command() {
        let cli = Cli::parse_from(["gridlink"]);
        assert!(cli.command.is_none());
        assert!(matches!(cli.effective_command(), Commands::Run(_)));
    }

    #[test]
    fn test_config_path() {
        let cli = Cli::parse_from(["gridlink", "-c", "/etc/gridlink/config.json"]);
        assert_eq!(cli.config, PathBuf::from("/etc/gridlink/config.json"));
    }

    #[test]
    fn test_log_level_and_format() {
        let cli = Cli::parse_from(["gridlink", "--log", "debug", "--log-format", "json"]);
        assert_eq!(cli.log_level, "debug");
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn test_daemon_flag() {
        let cli = Cli::parse_from(["gridlink", "run", "--daemon"]);
        if let Some(Commands::Run(args)) = cli.command {
            assert!(args.daemon);
        } else {
            panic!("expected run command");
        }
    }

    #[test]
    fn test_validate_command() {
        let cli = Cli::parse_from(["gridlink", "validate"]);
        assert!(matches!(cli.command, Some(Commands::Validate)));
    }
}
