// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `version` command.

use super::print_json;
use crate::cli::{Cli, OutputFormat};
use crate::error::BinResult;

/// Executes the `version` command to display version information.
pub fn version(cli: &Cli) -> BinResult<()> {
    let backend = if cfg!(feature = "opcua") { "opcua" } else { "none" };

    match cli.format {
        OutputFormat::Text => {
            println!("plclink - OPC UA connection manager for PLC integration");
            println!();
            println!("Version Information:");
            println!("  plclink-bin:    {}", crate::VERSION);
            println!("  plclink-ua:     {}", plclink_ua::VERSION);
            println!("  plclink-config: {}", plclink_config::VERSION);
            println!();
            println!("Build Information:");
            println!("  Rust Edition: 2024");
            println!("  Target:       {}", std::env::consts::ARCH);
            println!("  OS:           {}", std::env::consts::OS);
            println!();
            println!("Features:");
            println!("  Backend:      {}", backend);
            println!();
            println!("License: PolyForm Noncommercial License 1.0.0");
            println!("Copyright (c) 2025 Sylvex. All rights reserved.");
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "plclink-bin": crate::VERSION,
            "plclink-ua": plclink_ua::VERSION,
            "plclink-config": plclink_config::VERSION,
            "target": std::env::consts::ARCH,
            "os": std::env::consts::OS,
            "backend": backend,
        }))?,
    }

    Ok(())
}
