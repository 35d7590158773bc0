// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `status`: Connect, probe and report connection status
//! - `read`: Read one node
//! - `write`: Write one node
//! - `browse`: List references of a node
//! - `watch`: Subscribe to nodes and stream value changes
//! - `validate`: Validate configuration file
//! - `version`: Show version information

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// plclink - OPC UA connection manager for PLC integration
#[derive(Parser, Debug)]
#[command(
    name = "plclink",
    author = "Sylvex <contact@sylvex.io>",
    version = crate::VERSION,
    about = "OPC UA connection manager for PLC integration",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "plclink.yaml",
        env = "PLCLINK_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Server endpoint, overrides the configuration file
    #[arg(short, long, global = true)]
    pub endpoint: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Log format (text, json, compact)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Output format for command results
    #[arg(short, long, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Enable quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands for the plclink CLI.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Connect, probe the server and print the connection status
    Status,

    /// Read the current value of a node
    Read(ReadArgs),

    /// Write a value to a node
    ///
    /// Without `--type`, the value is parsed as the node's current data type.
    Write(WriteArgs),

    /// List the references of a node
    Browse(BrowseArgs),

    /// Subscribe to nodes and print value changes until interrupted
    Watch(WatchArgs),

    /// Validate the configuration file
    Validate(ValidateArgs),

    /// Show detailed version information
    Version,
}

impl Commands {
    /// Returns `true` if the command talks to a server.
    pub fn needs_server(&self) -> bool {
        !matches!(self, Commands::Validate(_) | Commands::Version)
    }
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the `read` command.
#[derive(Args, Debug, Clone)]
pub struct ReadArgs {
    /// Node id, e.g. `ns=2;s=Line1.Speed`
    pub node: String,
}

/// Arguments for the `write` command.
#[derive(Args, Debug, Clone)]
pub struct WriteArgs {
    /// Node id
    pub node: String,

    /// Value as text
    pub value: String,

    /// Data type hint (e.g. int16, float, bool)
    #[arg(short = 't', long = "type")]
    pub data_type: Option<String>,
}

/// Arguments for the `browse` command.
#[derive(Args, Debug, Clone)]
pub struct BrowseArgs {
    /// Node to browse (default: Objects folder)
    pub node: Option<String>,
}

/// Arguments for the `watch` command.
#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Nodes to subscribe to
    #[arg(required = true)]
    pub nodes: Vec<String>,

    /// Publishing interval in milliseconds (default: from configuration)
    #[arg(short, long)]
    pub interval_ms: Option<u32>,

    /// Register nodes first and subscribe through their handles
    #[arg(short, long)]
    pub register: bool,
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Default, Clone)]
pub struct ValidateArgs {
    /// Show parsed configuration after validation
    #[arg(short, long)]
    pub show_config: bool,
}

// =============================================================================
// Enums
// =============================================================================

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

impl From<plclink_config::LogFormat> for LogFormat {
    fn from(format: plclink_config::LogFormat) -> Self {
        match format {
            plclink_config::LogFormat::Text => LogFormat::Text,
            plclink_config::LogFormat::Compact => LogFormat::Compact,
            plclink_config::LogFormat::Json => LogFormat::Json,
        }
    }
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for programmatic parsing
    Json,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective log level.
    ///
    /// `--quiet` and `--verbose` win over `--log-level`, which wins over
    /// the configured level.
    pub fn effective_log_level<'a>(&'a self, configured: Option<&'a str>) -> &'a str {
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            self.log_level
                .as_deref()
                .or(configured)
                .unwrap_or("info")
        }
    }

    /// Get the effective log format.
    pub fn effective_log_format(&self, configured: Option<LogFormat>) -> LogFormat {
        self.log_format.or(configured).unwrap_or_default()
    }
}

// =============================================================================
// Tests
// =============================================================================
