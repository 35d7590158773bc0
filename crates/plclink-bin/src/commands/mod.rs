// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI command implementations.
//!
//! This module contains the implementation of all CLI commands:
//!
//! - `status`: Report connection status
//! - `read`: Read one node
//! - `write`: Write one node
//! - `browse`: List node references
//! - `watch`: Stream subscription values
//! - `validate`: Validate configuration file
//! - `version`: Show version information

mod browse;
mod read;
mod status;
mod validate;
mod version;
mod watch;
mod write;

pub use browse::browse;
pub use read::read;
pub use status::status;
pub use validate::validate;
pub use version::version;
pub use watch::watch;
pub use write::write;

use anyhow::Context;
use serde::Serialize;

use plclink_ua::{ConnectionManager, ProtocolSession};

use crate::cli::{Cli, Commands, OutputFormat};
use crate::error::BinResult;
use crate::logging::init_logging;
use crate::runtime::{LinkRuntime, RuntimeBuilder};

/// Executes the appropriate command based on CLI arguments.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match &cli.command {
        Commands::Version => {
            init_logging(cli.effective_log_level(None), cli.effective_log_format(None));
            version::version(&cli)
        }
        Commands::Validate(args) => {
            init_logging(cli.effective_log_level(None), cli.effective_log_format(None));
            validate::validate(&cli, args)
        }
        command => {
            let runtime = RuntimeBuilder::new()
                .config_path(&cli.config)
                .endpoint(cli.endpoint.clone())
                .build()?;

            let logging = &runtime.config().logging;
            init_logging(
                cli.effective_log_level(Some(logging.level.as_str())),
                cli.effective_log_format(Some(logging.format.into())),
            );

            runtime.run(command, cli.format).await
        }
    }
}

/// Runs a server command against an already connected manager.
pub async fn run_session_command<S: ProtocolSession>(
    manager: &ConnectionManager<S>,
    runtime: &LinkRuntime,
    command: &Commands,
    format: OutputFormat,
) -> BinResult<()> {
    match command {
        Commands::Status => status::status(manager, format).await,
        Commands::Read(args) => read::read(manager, args, format).await,
        Commands::Write(args) => write::write(manager, args, format).await,
        Commands::Browse(args) => browse::browse(manager, args, format).await,
        Commands::Watch(args) => watch::watch(manager, runtime, args, format).await,
        Commands::Validate(_) | Commands::Version => Ok(()),
    }
}

/// Prints `value` as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> BinResult<()> {
    let text = serde_json::to_string_pretty(value).context("serializing output")?;
    println!("{text}");
    Ok(())
}
