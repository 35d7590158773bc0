// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! plclink - OPC UA connection manager for PLC integration
//!
//! Main binary entry point.

use plclink_bin::Cli;
use plclink_bin::commands::execute;
use plclink_bin::error::report_error_and_exit;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    if let Err(e) = execute(cli).await {
        report_error_and_exit(e);
    }
}
