// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Node Registry.
//!
//! Maps server-issued registered handles to the node they alias. A node is
//! registered only after a verification read returns a good status, and a
//! handle is released only after every subscription targeting it has been
//! cancelled.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{SessionError, UaError, UaResult};
use crate::session::ProtocolSession;
use crate::types::{NodeId, StatusCode};

use super::{ConnectionManager, Inner};

// =============================================================================
// RegisteredHandle
// =============================================================================

/// Server-issued alias for a registered node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegisteredHandle(NodeId);

impl RegisteredHandle {
    /// Wraps a server-issued alias.
    pub fn new(alias: NodeId) -> Self {
        Self(alias)
    }

    /// Returns the alias node id used on the wire.
    pub fn node_id(&self) -> &NodeId {
        &self.0
    }
}

impl fmt::Display for RegisteredHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RegisteredHandle {
    type Err = UaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl From<NodeId> for RegisteredHandle {
    fn from(alias: NodeId) -> Self {
        Self(alias)
    }
}

// =============================================================================
// RegisteredNode
// =============================================================================

/// One registered node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredNode {
    /// Server-issued handle.
    pub handle: RegisteredHandle,
    /// The node that was registered.
    pub node_id: NodeId,
    /// When the registration completed.
    pub registered_at: DateTime<Utc>,
}

/// Result of `unregister_node`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnregisterOutcome {
    /// The released handle.
    pub handle: RegisteredHandle,
    /// Subscriptions cancelled because they targeted the handle.
    pub cascaded_subscriptions: usize,
    /// Server-side cancellation failures; the local entries are gone regardless.
    pub cancellation_errors: Vec<String>,
}

// =============================================================================
// NodeRegistry
// =============================================================================

/// Registered handle bookkeeping.
#[derive(Debug, Default)]
pub(crate) struct NodeRegistry {
    entries: HashMap<RegisteredHandle, RegisteredNode>,
}

impl NodeRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, node: RegisteredNode) {
        self.entries.insert(node.handle.clone(), node);
    }

    pub(crate) fn contains(&self, handle: &RegisteredHandle) -> bool {
        self.entries.contains_key(handle)
    }

    pub(crate) fn remove(&mut self, handle: &RegisteredHandle) -> Option<RegisteredNode> {
        self.entries.remove(handle)
    }

    /// Aliases of every held registration, for batched release.
    pub(crate) fn aliases(&self) -> Vec<NodeId> {
        self.entries.keys().map(|h| h.node_id().clone()).collect()
    }

    /// Entries ordered by registration time.
    pub(crate) fn snapshot(&self) -> Vec<RegisteredNode> {
        let mut nodes: Vec<RegisteredNode> = self.entries.values().cloned().collect();
        nodes.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.handle.to_string().cmp(&b.handle.to_string()))
        });
        nodes
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

// =============================================================================
// Node operations
// =============================================================================

impl<S: ProtocolSession> ConnectionManager<S> {
    /// Registers `node_id` for optimized access.
    ///
    /// Fails with `NodeNotAccessible` and leaves the registry unchanged if the
    /// verification read does not return a good status.
    pub async fn register_node(&self, node_id: &NodeId) -> UaResult<RegisteredHandle> {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;
        let generation = inner.require_connected()?;

        let result = {
            let session = inner.session.read().await;
            match session.read_value(node_id).await {
                Ok(read) if !read.is_good() => {
                    return Err(UaError::node_not_accessible(node_id.to_string(), read.status));
                }
                Ok(_) => session.register_nodes(std::slice::from_ref(node_id)).await,
                Err(e) => Err(e),
            }
        };

        let alias = match result {
            Ok(aliases) => aliases.into_iter().next().ok_or_else(|| {
                UaError::from(SessionError::service_fault(
                    "RegisterNodes",
                    StatusCode::BAD_UNEXPECTED_ERROR,
                ))
            })?,
            Err(e) => {
                Inner::check_connection_loss(inner, generation, &e);
                return Err(e);
            }
        };

        let handle = RegisteredHandle::new(alias);
        inner.nodes.write().await.insert(RegisteredNode {
            handle: handle.clone(),
            node_id: node_id.clone(),
            registered_at: Utc::now(),
        });

        info!(node_id = %node_id, handle = %handle, "Registered node");
        Ok(handle)
    }

    /// Releases a registered handle.
    ///
    /// Subscriptions targeting the handle are cancelled first. Their local
    /// entries are removed even if the server-side cancel fails. The mapping
    /// is removed only after the server released the handle.
    pub async fn unregister_node(&self, handle: &RegisteredHandle) -> UaResult<UnregisterOutcome> {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;
        let generation = inner.require_connected()?;

        if !inner.nodes.read().await.contains(handle) {
            return Err(UaError::registered_node_not_found(handle.to_string()));
        }

        let cascaded = inner.subscriptions.write().await.remove_targeting(handle);
        let mut cancellation_errors = Vec::new();
        {
            let session = inner.session.read().await;
            for subscription in &cascaded {
                if let Err(e) = session
                    .delete_subscription(subscription.session_subscription_id)
                    .await
                {
                    warn!(
                        handle = %subscription.handle,
                        registered = %handle,
                        error = %e,
                        "Cascaded cancel failed on the server"
                    );
                    Inner::check_connection_loss(inner, generation, &e);
                    cancellation_errors.push(format!("{}: {e}", subscription.handle));
                }
            }
        }

        if !cascaded.is_empty() {
            debug!(registered = %handle, count = cascaded.len(), "Cancelled subscriptions on registered node");
        }

        let released = {
            let session = inner.session.read().await;
            session
                .unregister_nodes(std::slice::from_ref(handle.node_id()))
                .await
        };
        if let Err(e) = released {
            Inner::check_connection_loss(inner, generation, &e);
            return Err(e);
        }

        inner.nodes.write().await.remove(handle);
        info!(handle = %handle, cascaded = cascaded.len(), "Unregistered node");

        Ok(UnregisterOutcome {
            handle: handle.clone(),
            cascaded_subscriptions: cascaded.len(),
            cancellation_errors,
        })
    }

    /// Returns the current registrations ordered by registration time.
    pub async fn list_registered_nodes(&self) -> Vec<RegisteredNode> {
        self.inner.nodes.read().await.snapshot()
    }
}

// =============================================================================
// Tests
// =============================================================================
