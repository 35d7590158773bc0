// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `browse` command.

use plclink_ua::{ConnectionManager, NodeId, ProtocolSession};

use super::print_json;
use crate::cli::{BrowseArgs, OutputFormat};
use crate::error::BinResult;

/// Lists the references of a node, the Objects folder by default.
pub async fn browse<S: ProtocolSession>(
    manager: &ConnectionManager<S>,
    args: &BrowseArgs,
    format: OutputFormat,
) -> BinResult<()> {
    let node_id = match &args.node {
        Some(node) => node.parse()?,
        None => NodeId::OBJECTS_FOLDER,
    };

    let references = manager.browse(&node_id).await?;

    match format {
        OutputFormat::Text => {
            println!("{} ({} references)", node_id, references.len());
            for reference in &references {
                println!(
                    "  {:<32} {:<14} {}",
                    reference.node_id.to_string(),
                    reference.node_class.to_string(),
                    reference.display_name
                );
            }
        }
        OutputFormat::Json => print_json(&references)?,
    }

    Ok(())
}
