// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `read` command.

use plclink_ua::{ConnectionManager, NodeId, ProtocolSession};

use super::print_json;
use crate::cli::{OutputFormat, ReadArgs};
use crate::error::BinResult;

/// Reads one node and prints its value.
pub async fn read<S: ProtocolSession>(
    manager: &ConnectionManager<S>,
    args: &ReadArgs,
    format: OutputFormat,
) -> BinResult<()> {
    let node_id: NodeId = args.node.parse()?;
    let snapshot = manager.read(&node_id).await?;

    match format {
        OutputFormat::Text => {
            println!("{} = {}", node_id, snapshot.value);
            println!("  Type:      {}", snapshot.data_type);
            println!("  Status:    {}", snapshot.status);
            if let Some(timestamp) = snapshot.timestamp {
                println!("  Timestamp: {}", timestamp.to_rfc3339());
            }
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "node_id": node_id,
            "value": snapshot,
        }))?,
    }

    Ok(())
}
