// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connection and resource manager.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    ConnectionManager<S>                      │
//! │   lifecycle lock: connect / disconnect / register / cleanup  │
//! └──────────────────────────────────────────────────────────────┘
//!        │                 │                  │             │
//!        ▼                 ▼                  ▼             ▼
//! ┌─────────────┐  ┌──────────────┐  ┌───────────────┐ ┌──────────┐
//! │ Supervisor  │  │ NodeRegistry │  │ Subscription  │ │ Cleanup  │
//! │ state/probe │  │              │  │   Registry    │ │  steps   │
//! └─────────────┘  └──────────────┘  └───────────────┘ └──────────┘
//!        │                                    ▲
//!        ▼                                    │ value changes
//! ┌──────────────────┐   SessionEvent   ┌─────────────┐
//! │ ProtocolSession  │ ───────────────▶ │  listener   │
//! └──────────────────┘                  └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use plclink_ua::{ConnectionConfig, ConnectionManager, NodeId, OpcUaSession};
//!
//! let manager = ConnectionManager::new(OpcUaSession::new());
//! manager.connect(ConnectionConfig::new("opc.tcp://plc:4840")).await?;
//!
//! let value = manager.read(&"ns=2;s=Line1.Speed".parse()?).await?;
//! println!("{} ({})", value.value, value.status);
//!
//! manager.disconnect().await;
//! ```

mod cleanup;
mod events;
mod nodes;
mod subscriptions;
mod supervisor;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, broadcast, watch};
use tracing::{debug, trace};

use crate::error::{UaError, UaResult};
use crate::session::{BrowseReference, ProtocolSession, Variant};
use crate::types::{ConnectionConfig, DataType, NodeId, StatusCode};

pub use cleanup::{CleanupReason, StepFailure, TeardownReport, TeardownStep};
pub use nodes::{RegisteredHandle, RegisteredNode, UnregisterOutcome};
pub use subscriptions::{
    SubscriptionHandle, SubscriptionInfo, SubscriptionTarget, ValueSnapshot, ValueUpdate,
};
pub use supervisor::{ConnectInfo, ConnectionState, ConnectionStatus};

use events::ListenerHandle;
use nodes::NodeRegistry;
use subscriptions::{HandleGenerator, SubscriptionRegistry};
use supervisor::Supervisor;

// =============================================================================
// ManagerSettings
// =============================================================================

/// Default cleanup step timeout.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(5);
/// Default value broadcast capacity.
pub const DEFAULT_VALUE_CAPACITY: usize = 256;

/// Tuning for a [`ConnectionManager`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerSettings {
    /// Node read by the liveness probe.
    pub probe_node: NodeId,
    /// Read a subscribed node once to seed its cached value.
    pub seed_initial_value: bool,
    /// Capacity of the [`ConnectionManager::watch_values`] broadcast.
    pub value_capacity: usize,
    /// Upper bound for each cleanup step.
    #[serde(with = "duration_serde")]
    pub step_timeout: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            probe_node: NodeId::SERVER_STATUS_STATE,
            seed_initial_value: true,
            value_capacity: DEFAULT_VALUE_CAPACITY,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }
}

impl ManagerSettings {
    /// Sets the probe node.
    pub fn with_probe_node(mut self, probe_node: NodeId) -> Self {
        self.probe_node = probe_node;
        self
    }

    /// Enables or disables the seed read.
    pub fn with_seed_initial_value(mut self, enabled: bool) -> Self {
        self.seed_initial_value = enabled;
        self
    }

    /// Sets the broadcast capacity.
    pub fn with_value_capacity(mut self, capacity: usize) -> Self {
        self.value_capacity = capacity.max(1);
        self
    }

    /// Sets the cleanup step timeout.
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }
}

mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// ManagerStats
// =============================================================================

/// Counters for manager activity.
#[derive(Debug, Default)]
pub struct ManagerStats {
    connects: AtomicU64,
    failed_connects: AtomicU64,
    disconnects: AtomicU64,
    faults: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
    notifications: AtomicU64,
    cleanup_passes: AtomicU64,
    cleanup_step_errors: AtomicU64,
}

impl ManagerStats {
    pub(crate) fn record_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed_connect(&self) {
        self.failed_connects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_notification(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cleanup(&self, step_errors: usize) {
        self.cleanup_passes.fetch_add(1, Ordering::Relaxed);
        self.cleanup_step_errors
            .fetch_add(step_errors as u64, Ordering::Relaxed);
    }

    /// Successful connects.
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    /// Failed connects.
    pub fn failed_connects(&self) -> u64 {
        self.failed_connects.load(Ordering::Relaxed)
    }

    /// Explicit disconnects that tore something down.
    pub fn disconnects(&self) -> u64 {
        self.disconnects.load(Ordering::Relaxed)
    }

    /// Fault transitions.
    pub fn faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }

    /// Reads attempted while connected.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Writes attempted while connected.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Change notifications applied.
    pub fn notifications(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    /// Cleanup passes run.
    pub fn cleanup_passes(&self) -> u64 {
        self.cleanup_passes.load(Ordering::Relaxed)
    }

    /// Cleanup step failures recorded.
    pub fn cleanup_step_errors(&self) -> u64 {
        self.cleanup_step_errors.load(Ordering::Relaxed)
    }
}

// =============================================================================
// ConnectionManager
// =============================================================================

pub(crate) struct Inner<S> {
    session: RwLock<S>,
    settings: ManagerSettings,
    lifecycle: Mutex<()>,
    supervisor: Supervisor,
    nodes: RwLock<NodeRegistry>,
    subscriptions: RwLock<SubscriptionRegistry>,
    handles: HandleGenerator,
    listener: Mutex<Option<ListenerHandle>>,
    values: broadcast::Sender<ValueUpdate>,
    stats: ManagerStats,
    last_teardown: RwLock<Option<TeardownReport>>,
}

impl<S> Inner<S> {
    /// Returns the current generation if `Connected`.
    fn require_connected(&self) -> UaResult<u64> {
        if self.supervisor.state().is_connected() {
            Ok(self.supervisor.generation())
        } else {
            Err(UaError::not_connected())
        }
    }
}

/// Manages one connection and the resources created on top of it.
///
/// Cloning yields another handle to the same manager. The protocol session
/// is injected, so tests substitute a fake one.
///
/// # Thread Safety
///
/// `connect`, `disconnect`, `get_status`, `register_node`,
/// `unregister_node`, `subscribe`, `unsubscribe` and cleanup are
/// serialized by one lifecycle lock. Listings and cached values are read
/// under the registry locks only.
pub struct ConnectionManager<S: ProtocolSession> {
    inner: Arc<Inner<S>>,
}

impl<S: ProtocolSession> Clone for ConnectionManager<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ProtocolSession> ConnectionManager<S> {
    /// Creates a manager with default settings.
    pub fn new(session: S) -> Self {
        Self::with_settings(session, ManagerSettings::default())
    }

    /// Creates a manager with custom settings.
    pub fn with_settings(session: S, settings: ManagerSettings) -> Self {
        let (values, _) = broadcast::channel(settings.value_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                session: RwLock::new(session),
                settings,
                lifecycle: Mutex::new(()),
                supervisor: Supervisor::new(),
                nodes: RwLock::new(NodeRegistry::new()),
                subscriptions: RwLock::new(SubscriptionRegistry::new()),
                handles: HandleGenerator::new(),
                listener: Mutex::new(None),
                values,
                stats: ManagerStats::default(),
                last_teardown: RwLock::new(None),
            }),
        }
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Returns the settings.
    pub fn settings(&self) -> &ManagerSettings {
        &self.inner.settings
    }

    /// Returns the current state without probing.
    pub fn state(&self) -> ConnectionState {
        self.inner.supervisor.state()
    }

    /// Returns a receiver that observes every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.supervisor.watch()
    }

    /// Waits until the manager reaches `state`. Returns `false` on timeout.
    pub async fn wait_for_state(&self, state: ConnectionState, timeout: Duration) -> bool {
        self.inner.wait_for_state(state, timeout).await
    }

    /// Returns the configuration of the current connection.
    pub async fn active_config(&self) -> Option<ConnectionConfig> {
        self.inner.supervisor.config().await
    }

    /// Returns a receiver for pushed value changes.
    pub fn watch_values(&self) -> broadcast::Receiver<ValueUpdate> {
        self.inner.values.subscribe()
    }

    /// Returns activity counters.
    pub fn stats(&self) -> &ManagerStats {
        &self.inner.stats
    }

    /// Returns the report of the most recent cleanup pass.
    pub async fn last_teardown(&self) -> Option<TeardownReport> {
        self.inner.last_teardown.read().await.clone()
    }

    // =========================================================================
    // Attribute and View Operations
    // =========================================================================

    /// Reads the value of a node.
    ///
    /// A bad status fails with `ReadRejected`. Uncertain values are returned.
    /// A connection-loss failure faults the connection before returning.
    pub async fn read(&self, node_id: &NodeId) -> UaResult<ValueSnapshot> {
        let inner = &self.inner;
        let generation = inner.require_connected()?;
        inner.stats.record_read();

        let result = inner.session.read().await.read_value(node_id).await;
        match result {
            Ok(read) if read.is_bad() => Err(UaError::read_rejected(node_id.to_string(), read.status)),
            Ok(read) => {
                trace!(node_id = %node_id, status = %read.status, "Read");
                Ok(ValueSnapshot::from(read))
            }
            Err(e) => {
                Inner::check_connection_loss(inner, generation, &e);
                Err(e)
            }
        }
    }

    /// Writes a value, optionally coerced to `data_type` first.
    ///
    /// Returns the server status. A non-good status fails with
    /// `WriteRejected`.
    pub async fn write(
        &self,
        node_id: &NodeId,
        value: Variant,
        data_type: Option<DataType>,
    ) -> UaResult<StatusCode> {
        let inner = &self.inner;
        let generation = inner.require_connected()?;

        let value = match data_type {
            Some(data_type) => value.coerce_to(data_type)?,
            None => value,
        };
        inner.stats.record_write();

        let result = inner.session.read().await.write_value(node_id, value).await;
        match result {
            Ok(write) if !write.is_good() => {
                Err(UaError::write_rejected(node_id.to_string(), write.status))
            }
            Ok(write) => {
                debug!(node_id = %node_id, "Wrote value");
                Ok(write.status)
            }
            Err(e) => {
                Inner::check_connection_loss(inner, generation, &e);
                Err(e)
            }
        }
    }

    /// Lists the forward hierarchical references of a node.
    pub async fn browse(&self, node_id: &NodeId) -> UaResult<Vec<BrowseReference>> {
        let inner = &self.inner;
        let generation = inner.require_connected()?;

        let result = inner.session.read().await.browse(node_id).await;
        result.inspect_err(|e| Inner::check_connection_loss(inner, generation, e))
    }
}

impl<S: ProtocolSession> fmt::Debug for ConnectionManager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.inner.supervisor.state())
            .field("probe_node", &self.inner.settings.probe_node)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
