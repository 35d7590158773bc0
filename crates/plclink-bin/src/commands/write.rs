// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `write` command.

use tracing::debug;

use plclink_ua::{ConnectionManager, DataType, NodeId, ProtocolSession, UaError, Variant};

use super::print_json;
use crate::cli::{OutputFormat, WriteArgs};
use crate::error::BinResult;

/// Writes one node.
///
/// The text value is parsed as `--type` when given, otherwise as the
/// node's current data type, falling back to a string.
pub async fn write<S: ProtocolSession>(
    manager: &ConnectionManager<S>,
    args: &WriteArgs,
    format: OutputFormat,
) -> BinResult<()> {
    let node_id: NodeId = args.node.parse()?;

    let data_type = match &args.data_type {
        Some(hint) => hint.parse::<DataType>()?,
        None => current_data_type(manager, &node_id).await,
    };

    let value = Variant::from_text(&args.value, data_type).map_err(UaError::from)?;
    let status = manager.write(&node_id, value.clone(), Some(data_type)).await?;

    match format {
        OutputFormat::Text => {
            println!("✓ {} <- {} ({})", node_id, value, data_type);
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "node_id": node_id,
            "value": value,
            "data_type": data_type,
            "status": status,
        }))?,
    }

    Ok(())
}

async fn current_data_type<S: ProtocolSession>(
    manager: &ConnectionManager<S>,
    node_id: &NodeId,
) -> DataType {
    match manager.read(node_id).await {
        Ok(snapshot) if snapshot.data_type != DataType::Null => snapshot.data_type,
        Ok(_) => DataType::String,
        Err(e) => {
            debug!(node_id = %node_id, error = %e, "Could not read current type, writing as string");
            DataType::String
        }
    }
}
