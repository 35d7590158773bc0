// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `status` command.

use plclink_ua::{ConnectionManager, ProtocolSession};

use super::print_json;
use crate::cli::OutputFormat;
use crate::error::{BinError, BinResult};

/// Probes the connection and prints its status.
///
/// Fails with a connection error when the probe does not succeed.
pub async fn status<S: ProtocolSession>(
    manager: &ConnectionManager<S>,
    format: OutputFormat,
) -> BinResult<()> {
    let status = manager.get_status().await;

    match format {
        OutputFormat::Text => {
            let icon = if status.connected { "✓" } else { "✗" };
            println!("{} {}", icon, status.endpoint.as_deref().unwrap_or("(no endpoint)"));
            println!("  State:          {}", status.state);
            println!(
                "  Session active: {}",
                if status.session_active { "yes" } else { "no" }
            );
        }
        OutputFormat::Json => print_json(&status)?,
    }

    if status.connected {
        Ok(())
    } else {
        Err(BinError::connection(format!(
            "Server did not answer the liveness probe (state: {})",
            status.state
        )))
    }
}
