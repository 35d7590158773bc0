// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `watch` command.

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use plclink_ua::{
    ConnectionManager, NodeId, ProtocolSession, SubscriptionTarget, ValueUpdate,
};

use crate::cli::{OutputFormat, WatchArgs};
use crate::error::{BinError, BinResult};
use crate::runtime::LinkRuntime;

/// Subscribes to nodes and prints value changes until shutdown.
///
/// Subscriptions and registrations are left for the disconnect teardown.
/// Fails with a connection error if the connection drops while watching.
pub async fn watch<S: ProtocolSession>(
    manager: &ConnectionManager<S>,
    runtime: &LinkRuntime,
    args: &WatchArgs,
    format: OutputFormat,
) -> BinResult<()> {
    let interval_ms = args
        .interval_ms
        .unwrap_or(runtime.config().subscriptions.default_interval_ms);

    let mut values = manager.watch_values();
    let mut state = manager.subscribe_state();

    for node in &args.nodes {
        let node_id: NodeId = node.parse()?;
        let target = if args.register {
            SubscriptionTarget::Registered(manager.register_node(&node_id).await?)
        } else {
            SubscriptionTarget::Node(node_id)
        };

        let handle = manager.subscribe(target.clone(), interval_ms).await?;
        info!(handle = %handle, target = %target, interval_ms, "Watching");

        if let Some(value) = manager.get_subscription_value(&handle).await? {
            print_update(&ValueUpdate { handle, target, value }, format)?;
        }
    }

    let shutdown = runtime.shutdown().clone();
    let signal_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = shutdown.wait_for_os_signal().await {
                warn!(error = %e, "Could not install signal handlers");
            }
        }
    });

    let signal = shutdown.shutdown_signal().wait();
    tokio::pin!(signal);

    let result = loop {
        tokio::select! {
            _ = &mut signal => break Ok(()),

            update = values.recv() => match update {
                Ok(update) => {
                    if let Err(e) = print_update(&update, format) {
                        break Err(e);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Output fell behind, skipped value changes");
                }
                Err(RecvError::Closed) => break Err(BinError::runtime("Value stream closed")),
            },

            changed = state.changed() => {
                let current = *state.borrow();
                if changed.is_err() || !current.is_connected() {
                    break Err(BinError::connection(format!(
                        "Connection lost while watching (state: {current})"
                    )));
                }
            }
        }
    };

    signal_task.abort();
    result
}

fn print_update(update: &ValueUpdate, format: OutputFormat) -> BinResult<()> {
    match format {
        OutputFormat::Text => {
            let timestamp = update
                .value
                .timestamp
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{} {} = {} ({})",
                timestamp, update.target, update.value.value, update.value.status
            );
        }
        OutputFormat::Json => {
            let line = serde_json::to_string(update).context("serializing value update")?;
            println!("{line}");
        }
    }
    Ok(())
}
