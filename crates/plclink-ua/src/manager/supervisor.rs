// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connection Supervisor.
//!
//! Owns the connection state machine:
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──success──▶ Connected
//!      ▲                        │                      │   │
//!      │                     failure            disconnect  probe / event failure
//!      │                        ▼                      │   ▼
//!      └──────────────── cleanup ◀─────────────────────┘ Faulted
//! ```
//!
//! Every failure edge passes through the cleanup coordinator before the
//! state returns to `Disconnected`.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

use crate::error::{ConnectionError, SessionError, UaError, UaResult};
use crate::session::{ProtocolSession, ReadResult};
use crate::types::{ConnectionConfig, SecurityMode, SecurityPolicy};

use super::cleanup::{CleanupReason, TeardownReport};
use super::{ConnectionManager, Inner};

// =============================================================================
// ConnectionState
// =============================================================================

/// State of the managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection. The only state that accepts `connect`.
    #[default]
    Disconnected,

    /// `connect` is in progress.
    Connecting,

    /// Connected with an active session.
    Connected,

    /// A failure was detected and cleanup is pending.
    Faulted,
}

impl ConnectionState {
    /// Returns `true` if operations may use the session.
    #[inline]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` if a connection or its leftovers exist.
    #[inline]
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Faulted => write!(f, "Faulted"),
        }
    }
}

// =============================================================================
// Status types
// =============================================================================

/// Result of a successful `connect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectInfo {
    /// The connected endpoint.
    pub endpoint: String,
    /// Security policy in use after normalisation.
    pub security_policy: SecurityPolicy,
    /// Security mode in use after normalisation.
    pub security_mode: SecurityMode,
}

/// Result of `get_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    /// `true` only if the liveness probe succeeded.
    pub connected: bool,
    /// Endpoint of the current connection, if any.
    pub endpoint: Option<String>,
    /// Whether the protocol session reports an active session.
    pub session_active: bool,
    /// Supervisor state after the probe.
    pub state: ConnectionState,
}

// =============================================================================
// Supervisor
// =============================================================================

/// State holder for the single managed connection.
pub(crate) struct Supervisor {
    state: watch::Sender<ConnectionState>,
    config: RwLock<Option<ConnectionConfig>>,
    generation: AtomicU64,
}

impl Supervisor {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state,
            config: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub(crate) fn set_state(&self, new_state: ConnectionState) {
        let old_state = self.state.send_replace(new_state);
        if old_state != new_state {
            debug!(old_state = %old_state, new_state = %new_state, "Connection state changed");
        }
    }

    /// Moves to `to` only if the current state is `from`.
    pub(crate) fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if changed {
            debug!(old_state = %from, new_state = %to, "Connection state changed");
        }
        changed
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Starts a new generation; events tagged with older ones are ignored.
    pub(crate) fn advance_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) async fn config(&self) -> Option<ConnectionConfig> {
        self.config.read().await.clone()
    }

    pub(crate) async fn endpoint(&self) -> Option<String> {
        self.config.read().await.as_ref().map(|c| c.endpoint.clone())
    }

    pub(crate) async fn set_config(&self, config: Option<ConnectionConfig>) {
        *self.config.write().await = config;
    }
}

/// Judges a liveness probe read.
///
/// Returns the failure reason, or `None` if the server looks healthy. A
/// numeric value other than 0 (`Running`) means the server is degraded.
pub(crate) fn probe_failure(result: &UaResult<ReadResult>) -> Option<String> {
    match result {
        Err(e) => Some(format!("probe read failed: {e}")),
        Ok(read) if !read.is_good() => Some(format!("probe returned {}", read.status)),
        Ok(read) => match read.value.as_ref().and_then(|v| v.as_i128()) {
            Some(0) | None => None,
            Some(server_state) => Some(format!("server state is {server_state}, not Running")),
        },
    }
}

// =============================================================================
// Supervisor operations
// =============================================================================

impl<S: ProtocolSession> ConnectionManager<S> {
    /// Connects to the endpoint in `config`.
    ///
    /// Fails with `AlreadyConnected` unless the manager is `Disconnected`,
    /// and with a configuration error before any network activity if the
    /// endpoint or credentials are missing. Any later failure runs a full
    /// cleanup before the classified [`ConnectionError`] is returned.
    pub async fn connect(&self, config: ConnectionConfig) -> UaResult<ConnectInfo> {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;

        if inner.supervisor.state() != ConnectionState::Disconnected {
            let endpoint = inner.supervisor.endpoint().await.unwrap_or_default();
            return Err(UaError::already_connected(endpoint));
        }

        config.validate()?;

        let config = normalized(config);
        inner.supervisor.set_state(ConnectionState::Connecting);
        inner.supervisor.set_config(Some(config.clone())).await;

        info!(
            endpoint = %config.endpoint,
            security_policy = %config.security_policy,
            security_mode = %config.security_mode,
            auth_mode = %config.auth_mode.name(),
            "Connecting"
        );

        match self.establish(&config).await {
            Ok(()) => {
                inner.stats.record_connect();
                info!(endpoint = %config.endpoint, "Connected");
                Ok(ConnectInfo {
                    endpoint: config.endpoint.clone(),
                    security_policy: config.security_policy,
                    security_mode: config.security_mode,
                })
            }
            Err(e) => {
                inner.stats.record_failed_connect();
                let classified = ConnectionError::classify(config.endpoint.clone(), &e);
                warn!(
                    endpoint = %config.endpoint,
                    kind = classified.kind(),
                    error = %e,
                    "Connect failed, cleaning up"
                );
                inner.teardown(CleanupReason::ConnectFailed).await;
                Err(classified.into())
            }
        }
    }

    async fn establish(&self, config: &ConnectionConfig) -> UaResult<()> {
        let inner = &self.inner;
        let timeout = config.connect_timeout;

        let events = {
            let mut session = inner.session.write().await;
            let handshake = async {
                session.connect(config).await?;
                session.create_session(&config.identity()).await
            };
            tokio::time::timeout(timeout, handshake)
                .await
                .map_err(|_| {
                    SessionError::timed_out("Connect", format!("no session within {timeout:?}"))
                })??;
            session.take_events()
        };

        let generation = inner.supervisor.advance_generation();
        if !inner
            .supervisor
            .transition(ConnectionState::Connecting, ConnectionState::Connected)
        {
            return Err(SessionError::closed("session failed while connecting").into());
        }

        // Events queued during the handshake are replayed once the listener runs.
        match events {
            Some(events) => Inner::start_listener(inner, events, generation).await,
            None => debug!("Protocol session provided no event channel"),
        }
        Ok(())
    }

    /// Disconnects and releases every server-side resource.
    ///
    /// Always succeeds and always ends in `Disconnected`. Teardown failures
    /// are recorded in the returned report instead of being returned.
    pub async fn disconnect(&self) -> TeardownReport {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;

        if inner.supervisor.state() == ConnectionState::Disconnected {
            debug!("Already disconnected");
            return TeardownReport::noop(CleanupReason::Disconnect);
        }

        let report = inner.teardown(CleanupReason::Disconnect).await;
        inner.stats.record_disconnect();
        report
    }

    /// Probes the server and reports connection status.
    ///
    /// While `Connected`, reads the probe node. A failed, degraded or
    /// timed out probe moves the manager to `Faulted`, schedules cleanup and
    /// returns `connected == false` without waiting for it. Never waits on
    /// a running connect, disconnect or cleanup.
    pub async fn get_status(&self) -> ConnectionStatus {
        let inner = &self.inner;
        let state = inner.supervisor.state();
        let endpoint = inner.supervisor.endpoint().await;

        if state != ConnectionState::Connected {
            return ConnectionStatus {
                connected: false,
                endpoint,
                session_active: false,
                state,
            };
        }

        let generation = inner.supervisor.generation();
        let liveness = tokio::time::timeout(inner.settings.step_timeout, async {
            let session = inner.session.read().await;
            let probe = session.read_value(&inner.settings.probe_node).await;
            (probe, session.is_session_active())
        })
        .await;

        let failure = match &liveness {
            Ok((probe, _)) => probe_failure(probe),
            Err(_) => Some(format!(
                "probe read timed out after {}",
                humantime::format_duration(inner.settings.step_timeout)
            )),
        };

        match (failure, liveness) {
            (None, Ok((_, session_active))) if inner.supervisor.generation() == generation => {
                ConnectionStatus {
                    connected: true,
                    endpoint,
                    session_active,
                    state: inner.supervisor.state(),
                }
            }
            (None, _) => ConnectionStatus {
                connected: false,
                endpoint,
                session_active: false,
                state: inner.supervisor.state(),
            },
            (Some(reason), _) => {
                warn!(probe_node = %inner.settings.probe_node, reason = %reason, "Liveness probe failed");
                Inner::begin_fault(inner, generation, reason);
                ConnectionStatus {
                    connected: false,
                    endpoint,
                    session_active: false,
                    state: inner.supervisor.state(),
                }
            }
        }
    }
}

impl<S: ProtocolSession> Inner<S> {
    /// Marks the connection `Faulted` and schedules cleanup.
    ///
    /// Ignored unless `generation` is current and the state is `Connected`.
    pub(crate) fn begin_fault(this: &Arc<Self>, generation: u64, reason: String) -> bool {
        if this.supervisor.generation() != generation {
            debug!(generation, reason = %reason, "Ignoring failure from a previous connection");
            return false;
        }
        if !this
            .supervisor
            .transition(ConnectionState::Connected, ConnectionState::Faulted)
        {
            return false;
        }

        this.stats.record_fault();
        warn!(reason = %reason, "Connection faulted, scheduling cleanup");

        let inner = Arc::clone(this);
        tokio::spawn(async move {
            inner.recover(generation, reason).await;
        });
        true
    }

    async fn recover(&self, generation: u64, reason: String) {
        let _lifecycle = self.lifecycle.lock().await;

        if self.supervisor.generation() != generation
            || self.supervisor.state() != ConnectionState::Faulted
        {
            debug!(generation, "Fault already recovered");
            return;
        }

        self.teardown(CleanupReason::Fault { reason }).await;
    }

    /// Faults the connection if `error` indicates connection loss.
    pub(crate) fn check_connection_loss(this: &Arc<Self>, generation: u64, error: &UaError) {
        if error.is_connection_loss() {
            Inner::begin_fault(this, generation, error.to_string());
        }
    }

    pub(crate) async fn wait_for_state(&self, state: ConnectionState, timeout: Duration) -> bool {
        let mut rx = self.supervisor.watch();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|s| *s == state)).await,
            Ok(Ok(_))
        )
    }
}

/// Normalises the security pair so a half-secured pair never reaches the session.
fn normalized(mut config: ConnectionConfig) -> ConnectionConfig {
    let policy_none = config.security_policy == SecurityPolicy::None;
    let mode_none = config.security_mode == SecurityMode::None;
    if policy_none != mode_none {
        warn!(
            security_policy = %config.security_policy,
            security_mode = %config.security_mode,
            "Incomplete security pair, falling back to no security"
        );
        config.security_policy = SecurityPolicy::None;
        config.security_mode = SecurityMode::None;
    }
    config
}

// =============================================================================
// Tests
// =============================================================================
