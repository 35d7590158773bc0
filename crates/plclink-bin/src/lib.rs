// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # plclink-bin
//!
//! CLI binary for the plclink OPC UA connection manager.
//!
//! This crate provides the `plclink` command, including:
//!
//! - CLI argument parsing with clap
//! - One managed connection per command, always torn down afterwards
//! - Graceful shutdown handling for `watch`
//! - Logging initialization
//! - Command implementations (status, read, write, browse, watch, validate, version)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         main.rs                              │
//! │                    (Entry Point)                             │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                    ┌──────▼──────┐
//!                    │    cli.rs   │
//!                    │ (Argument   │
//!                    │  Parsing)   │
//!                    └──────┬──────┘
//!                           │
//!               ┌───────────┼───────────┐
//!               ▼           ▼           ▼
//!        ┌──────────┐ ┌──────────┐ ┌──────────┐
//!        │ commands │ │ runtime  │ │ logging  │
//!        │          │ │          │ │          │
//!        └──────────┘ └──────────┘ └──────────┘
//!               │           │
//!               │    ┌──────▼──────┐
//!               │    │  shutdown   │
//!               │    │(Graceful)   │
//!               │    └─────────────┘
//!               │
//!        ┌──────┴──────────────────┐
//!        │ plclink-ua / -config    │
//!        └─────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Check the connection
//! plclink -c /etc/plclink/line1.yaml status
//!
//! # Read and write without a configuration file
//! plclink -e opc.tcp://10.0.0.5:4840 read "ns=2;s=Line1.Speed"
//! plclink -e opc.tcp://10.0.0.5:4840 write "ns=2;s=Line1.Setpoint" 42 --type int16
//!
//! # Stream value changes through registered handles
//! plclink watch "ns=2;s=Line1.Speed" "ns=2;s=Line1.Temp" -i 500 --register
//!
//! # Validate configuration
//! plclink validate --show-config
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

// =============================================================================
// Re-exports
// =============================================================================

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;
pub use runtime::{LinkRuntime, RuntimeBuilder};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
