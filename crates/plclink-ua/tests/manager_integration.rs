// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connection manager integration tests.
//!
//! These tests drive a [`ConnectionManager`] over `FakeSession`, an
//! in-memory protocol session with shared, inspectable state. Failures are
//! injected through [`FakeState`] and lifecycle events are pushed through
//! the same channel a real session would use.
//!
//! ```bash
//! cargo test -p plclink-ua --test manager_integration
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use plclink_ua::{
    BrowseReference, CleanupReason, ConfigError, ConnectionConfig, ConnectionError,
    ConnectionManager, ConnectionState, DataType, Identity, ManagerSettings, MonitorParameters,
    NodeClass, NodeId, OperationError, ProtocolSession, PublishParameters, ReadResult,
    ResourceError, SessionError, SessionEvent, StateError, StatusCode, SubscriptionHandle,
    SubscriptionTarget, TeardownStep, UaError, UaResult, ValueChange, Variant, WriteResult,
};

// =============================================================================
// Test Configuration
// =============================================================================

const ENDPOINT: &str = "opc.tcp://plc.test:4840";
const SETTLE: Duration = Duration::from_secs(2);

fn config() -> ConnectionConfig {
    ConnectionConfig::new(ENDPOINT)
}

fn node(name: &str) -> NodeId {
    NodeId::string(2, name)
}

// =============================================================================
// Fake Protocol Session
// =============================================================================

/// Shared state behind a [`FakeSession`].
#[derive(Default)]
struct FakeState {
    values: Mutex<HashMap<NodeId, (Variant, StatusCode)>>,
    write_status: Mutex<HashMap<NodeId, StatusCode>>,
    written: Mutex<Vec<(NodeId, Variant)>>,
    aliases: Mutex<HashMap<NodeId, NodeId>>,
    subscriptions: Mutex<HashMap<u32, NodeId>>,
    calls: Mutex<Vec<String>>,
    events: Mutex<Option<mpsc::Sender<SessionEvent>>>,
    connect_error: Mutex<Option<SessionError>>,
    read_error: Mutex<Option<SessionError>>,
    fail_delete_subscription: AtomicBool,
    fail_unregister: AtomicBool,
    fail_close_session: AtomicBool,
    read_delay_ms: AtomicU64,
    delete_delay_ms: AtomicU64,
    session_active: AtomicBool,
    next_id: AtomicU32,
}

impl FakeState {
    fn new() -> Arc<Self> {
        let state = Arc::new(Self::default());
        state.set_value(NodeId::SERVER_STATUS_STATE, Variant::Int32(0), StatusCode::GOOD);
        state
    }

    fn set_value(&self, node_id: NodeId, value: Variant, status: StatusCode) {
        self.values.lock().unwrap().insert(node_id, (value, status));
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn position(&self, prefix: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.starts_with(prefix))
    }

    fn last_position(&self, prefix: &str) -> Option<usize> {
        self.calls().iter().rposition(|c| c.starts_with(prefix))
    }

    async fn delay(millis: &AtomicU64) {
        let millis = millis.load(Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    fn server_subscriptions(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }

    fn server_registrations(&self) -> usize {
        self.aliases.lock().unwrap().len()
    }

    fn subscription_for(&self, node_id: &NodeId) -> Option<u32> {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .find(|(_, n)| *n == node_id)
            .map(|(id, _)| *id)
    }

    fn resolve(&self, node_id: &NodeId) -> NodeId {
        self.aliases
            .lock()
            .unwrap()
            .get(node_id)
            .cloned()
            .unwrap_or_else(|| node_id.clone())
    }

    async fn emit(&self, event: SessionEvent) {
        let sender = self.events.lock().unwrap().clone();
        sender
            .expect("no active event channel")
            .send(event)
            .await
            .expect("listener dropped the channel");
    }
}

/// In-memory protocol session.
struct FakeSession {
    state: Arc<FakeState>,
    events: Option<mpsc::Receiver<SessionEvent>>,
}

impl FakeSession {
    fn new(state: Arc<FakeState>) -> Self {
        Self {
            state,
            events: None,
        }
    }
}

#[async_trait]
impl ProtocolSession for FakeSession {
    async fn connect(&mut self, config: &ConnectionConfig) -> UaResult<()> {
        self.state.record(format!("connect:{}", config.endpoint));
        match self.state.connect_error.lock().unwrap().clone() {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    async fn create_session(&mut self, identity: &Identity) -> UaResult<()> {
        let kind = match identity {
            Identity::Anonymous => "anonymous",
            Identity::UserName(_) => "username",
        };
        self.state.record(format!("create_session:{kind}"));

        let (tx, rx) = mpsc::channel(64);
        *self.state.events.lock().unwrap() = Some(tx);
        self.events = Some(rx);
        self.state.session_active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.events.take()
    }

    async fn close_session(&mut self) -> UaResult<()> {
        self.state.record("close_session");
        self.state.session_active.store(false, Ordering::SeqCst);
        if self.state.fail_close_session.load(Ordering::SeqCst) {
            return Err(SessionError::transport("close rejected").into());
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> UaResult<()> {
        self.state.record("disconnect");
        self.state.events.lock().unwrap().take();
        self.events = None;
        Ok(())
    }

    fn is_session_active(&self) -> bool {
        self.state.session_active.load(Ordering::SeqCst)
    }

    async fn read_value(&self, node_id: &NodeId) -> UaResult<ReadResult> {
        self.state.record(format!("read:{node_id}"));
        FakeState::delay(&self.state.read_delay_ms).await;
        if let Some(e) = self.state.read_error.lock().unwrap().clone() {
            return Err(e.into());
        }

        let original = self.state.resolve(node_id);
        let entry = self.state.values.lock().unwrap().get(&original).cloned();
        Ok(match entry {
            Some((value, status)) => {
                let mut read = ReadResult::good(node_id.clone(), value);
                read.status = status;
                read
            }
            None => ReadResult::with_status(node_id.clone(), StatusCode::BAD_NODE_ID_UNKNOWN),
        })
    }

    async fn write_value(&self, node_id: &NodeId, value: Variant) -> UaResult<WriteResult> {
        self.state.record(format!("write:{node_id}"));
        self.state
            .written
            .lock()
            .unwrap()
            .push((node_id.clone(), value));
        let status = self
            .state
            .write_status
            .lock()
            .unwrap()
            .get(node_id)
            .copied()
            .unwrap_or(StatusCode::GOOD);
        Ok(WriteResult {
            node_id: node_id.clone(),
            status,
        })
    }

    async fn browse(&self, node_id: &NodeId) -> UaResult<Vec<BrowseReference>> {
        self.state.record(format!("browse:{node_id}"));
        Ok(vec![
            BrowseReference {
                node_id: NodeId::SERVER,
                browse_name: "Server".into(),
                display_name: "Server".into(),
                node_class: NodeClass::Object,
                is_forward: true,
            },
            BrowseReference {
                node_id: node("Line1"),
                browse_name: "2:Line1".into(),
                display_name: "Line 1".into(),
                node_class: NodeClass::Object,
                is_forward: true,
            },
        ])
    }

    async fn create_subscription(&self, parameters: PublishParameters) -> UaResult<u32> {
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.record(format!(
            "create_subscription:{}/{}/{}",
            parameters.timing.publishing_interval_ms,
            parameters.timing.keep_alive_count,
            parameters.timing.lifetime_count
        ));
        self.state
            .subscriptions
            .lock()
            .unwrap()
            .insert(id, NodeId::numeric(0, 0));
        Ok(id)
    }

    async fn create_monitored_item(
        &self,
        subscription_id: u32,
        node_id: &NodeId,
        parameters: MonitorParameters,
    ) -> UaResult<u32> {
        self.state.record(format!(
            "create_monitored_item:{node_id}:{}:{}",
            parameters.queue_size, parameters.discard_oldest
        ));
        let original = self.state.resolve(node_id);
        if !self.state.values.lock().unwrap().contains_key(&original) {
            return Err(
                SessionError::service_fault("CreateMonitoredItems", StatusCode::BAD_NODE_ID_UNKNOWN)
                    .into(),
            );
        }
        self.state
            .subscriptions
            .lock()
            .unwrap()
            .insert(subscription_id, node_id.clone());
        Ok(subscription_id * 100)
    }

    async fn delete_subscription(&self, subscription_id: u32) -> UaResult<()> {
        self.state
            .record(format!("delete_subscription:{subscription_id}"));
        FakeState::delay(&self.state.delete_delay_ms).await;
        if self.state.fail_delete_subscription.load(Ordering::SeqCst) {
            return Err(SessionError::service_fault(
                "DeleteSubscriptions",
                StatusCode::BAD_INTERNAL_ERROR,
            )
            .into());
        }
        self.state
            .subscriptions
            .lock()
            .unwrap()
            .remove(&subscription_id);
        Ok(())
    }

    async fn register_nodes(&self, node_ids: &[NodeId]) -> UaResult<Vec<NodeId>> {
        self.state.record(format!("register_nodes:{}", node_ids.len()));
        let mut aliases = self.state.aliases.lock().unwrap();
        Ok(node_ids
            .iter()
            .map(|original| {
                let alias = NodeId::numeric(1, 5000 + self.state.next_id.fetch_add(1, Ordering::SeqCst));
                aliases.insert(alias.clone(), original.clone());
                alias
            })
            .collect())
    }

    async fn unregister_nodes(&self, node_ids: &[NodeId]) -> UaResult<()> {
        self.state
            .record(format!("unregister_nodes:{}", node_ids.len()));
        if self.state.fail_unregister.load(Ordering::SeqCst) {
            return Err(SessionError::service_fault("UnregisterNodes", StatusCode::BAD_INTERNAL_ERROR).into());
        }
        let mut aliases = self.state.aliases.lock().unwrap();
        for node_id in node_ids {
            aliases.remove(node_id);
        }
        Ok(())
    }

    fn display_name(&self) -> String {
        "fake".to_string()
    }
}

fn manager() -> (ConnectionManager<FakeSession>, Arc<FakeState>) {
    let state = FakeState::new();
    (ConnectionManager::new(FakeSession::new(state.clone())), state)
}

async fn connected() -> (ConnectionManager<FakeSession>, Arc<FakeState>) {
    let (manager, state) = manager();
    manager.connect(config()).await.unwrap();
    (manager, state)
}

// =============================================================================
// Connection Supervisor
// =============================================================================

#[tokio::test]
async fn test_connect_and_status() {
    let (manager, state) = manager();

    let info = manager.connect(config()).await.unwrap();
    assert_eq!(info.endpoint, ENDPOINT);
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(state.calls()[..2], ["connect:opc.tcp://plc.test:4840", "create_session:anonymous"]);

    let status = manager.get_status().await;
    assert!(status.connected);
    assert!(status.session_active);
    assert_eq!(status.endpoint.as_deref(), Some(ENDPOINT));
    assert_eq!(state.count_calls("read:i=2259"), 1);
    assert_eq!(manager.stats().connects(), 1);
}

#[tokio::test]
async fn test_second_connect_fails_with_already_connected() {
    let (manager, state) = manager();

    let (a, b) = tokio::join!(manager.connect(config()), manager.connect(config()));
    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(UaError::State(StateError::AlreadyConnected { .. }))
    )));

    let again = manager.connect(config()).await;
    assert!(matches!(again, Err(UaError::State(StateError::AlreadyConnected { .. }))));
    assert_eq!(state.count_calls("connect:"), 1);
}

#[tokio::test]
async fn test_connect_validates_before_touching_the_network() {
    let (manager, state) = manager();

    let missing_endpoint = manager.connect(ConnectionConfig::default()).await;
    assert!(matches!(
        missing_endpoint,
        Err(UaError::Config(ConfigError::MissingField { field: "endpoint" }))
    ));

    let no_password = ConnectionConfig::builder()
        .endpoint(ENDPOINT)
        .username("operator", "")
        .build();
    let result = manager.connect(no_password).await;
    assert!(matches!(result, Err(UaError::Config(ConfigError::MissingCredentials))));

    assert!(state.calls().is_empty());
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_unknown_security_tokens_default_to_none() {
    let (manager, _state) = manager();

    let config = ConnectionConfig::builder()
        .endpoint(ENDPOINT)
        .security(Some("Basic512"), Some("Paranoid"))
        .build();
    let info = manager.connect(config).await.unwrap();

    assert_eq!(info.security_policy, plclink_ua::SecurityPolicy::None);
    assert_eq!(info.security_mode, plclink_ua::SecurityMode::None);
}

#[tokio::test]
async fn test_username_identity_reaches_the_session() {
    let (manager, state) = manager();

    let config = ConnectionConfig::builder()
        .endpoint(ENDPOINT)
        .username("operator", "secret")
        .build();
    manager.connect(config).await.unwrap();

    assert!(state.calls().contains(&"create_session:username".to_string()));
}

#[tokio::test]
async fn test_connect_failure_is_classified_and_cleaned_up() {
    let cases = [
        (SessionError::refused("ECONNREFUSED 10.0.0.5:4840"), "refused"),
        (SessionError::timed_out("Connect", "no answer"), "timeout"),
        (
            SessionError::transport("revised keep-alive count exceeds lifetime"),
            "keep_alive_misconfigured",
        ),
        (SessionError::transport("certificate chain incomplete"), "unknown"),
    ];

    for (error, kind) in cases {
        let (manager, state) = manager();
        let raw = error.to_string();
        *state.connect_error.lock().unwrap() = Some(error);

        let result = manager.connect(config()).await;
        let Err(UaError::Connection(classified)) = result else {
            panic!("expected a classified connection error for {kind}");
        };
        assert_eq!(classified.kind(), kind);
        assert_eq!(classified.raw(), raw);
        assert_eq!(classified.endpoint(), ENDPOINT);

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(state.position("close_session").is_some());
        assert!(state.position("disconnect").is_some());

        let report = manager.last_teardown().await.unwrap();
        assert_eq!(report.reason, CleanupReason::ConnectFailed);
        assert_eq!(manager.stats().failed_connects(), 1);

        // A failed connect leaves the manager reusable.
        state.connect_error.lock().unwrap().take();
        manager.connect(config()).await.unwrap();
    }
}

#[tokio::test]
async fn test_refused_classification_matches_error_helper() {
    let raw = UaError::from(SessionError::refused("EHOSTUNREACH"));
    assert!(matches!(
        ConnectionError::classify(ENDPOINT, &raw),
        ConnectionError::Refused { .. }
    ));
}

#[tokio::test]
async fn test_disconnect_twice_succeeds() {
    let (manager, state) = connected().await;

    let first = manager.disconnect().await;
    assert!(first.performed);
    assert!(first.is_clean());
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    let calls_after_first = state.calls().len();
    let second = manager.disconnect().await;
    assert!(!second.performed);
    assert_eq!(state.calls().len(), calls_after_first);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(manager.stats().disconnects(), 1);
}

#[tokio::test]
async fn test_operations_require_connection() {
    let (manager, _state) = manager();
    let handle = SubscriptionHandle::from("sub-0-x-1");
    let registered: plclink_ua::RegisteredHandle = "ns=1;i=5001".parse().unwrap();

    assert!(manager.read(&node("A")).await.unwrap_err().is_not_connected());
    assert!(manager
        .write(&node("A"), Variant::Int32(1), None)
        .await
        .unwrap_err()
        .is_not_connected());
    assert!(manager.browse(&NodeId::OBJECTS_FOLDER).await.unwrap_err().is_not_connected());
    assert!(manager.register_node(&node("A")).await.unwrap_err().is_not_connected());
    assert!(manager.unregister_node(&registered).await.unwrap_err().is_not_connected());
    assert!(manager
        .subscribe(node("A").into(), 1000)
        .await
        .unwrap_err()
        .is_not_connected());
    assert!(manager.unsubscribe(&handle).await.unwrap_err().is_not_connected());

    let status = manager.get_status().await;
    assert!(!status.connected);
    assert_eq!(status.state, ConnectionState::Disconnected);
}

// =============================================================================
// Liveness and fault handling
// =============================================================================

#[tokio::test]
async fn test_failed_probe_faults_and_cleans_up() {
    let (manager, state) = connected().await;
    let speed = node("Speed");
    state.set_value(speed.clone(), Variant::Double(1.0), StatusCode::GOOD);
    manager.register_node(&speed).await.unwrap();
    manager.subscribe(speed.clone().into(), 1000).await.unwrap();

    state.set_value(NodeId::SERVER_STATUS_STATE, Variant::Int32(0), StatusCode::BAD_SESSION_CLOSED);

    let status = manager.get_status().await;
    assert!(!status.connected);
    assert!(!status.session_active);

    assert!(manager.wait_for_state(ConnectionState::Disconnected, SETTLE).await);
    assert!(manager.list_registered_nodes().await.is_empty());
    assert!(manager.list_active_subscriptions().await.is_empty());
    assert!(!manager.get_status().await.connected);
    assert_eq!(manager.stats().faults(), 1);

    let report = manager.last_teardown().await.unwrap();
    assert!(matches!(report.reason, CleanupReason::Fault { .. }));
    assert_eq!(report.subscriptions_cleared, 1);
    assert_eq!(report.nodes_cleared, 1);
}

#[tokio::test]
async fn test_degraded_server_state_counts_as_failure() {
    let (manager, state) = connected().await;

    // ServerState 2 = Failed
    state.set_value(NodeId::SERVER_STATUS_STATE, Variant::Int32(2), StatusCode::GOOD);

    assert!(!manager.get_status().await.connected);
    assert!(manager.wait_for_state(ConnectionState::Disconnected, SETTLE).await);
}

#[tokio::test]
async fn test_keep_alive_failure_faults_connection() {
    let (manager, state) = connected().await;
    let speed = node("Speed");
    state.set_value(speed.clone(), Variant::Double(1.0), StatusCode::GOOD);
    manager.subscribe(speed.into(), 500).await.unwrap();
    assert_eq!(manager.list_active_subscriptions().await.len(), 1);

    state
        .emit(SessionEvent::KeepAliveFailed {
            reason: "no publish response in 30s".into(),
        })
        .await;

    assert!(manager.wait_for_state(ConnectionState::Disconnected, SETTLE).await);

    let read = manager.read(&node("Speed")).await;
    assert!(matches!(read, Err(UaError::State(StateError::NotConnected))));
    assert!(manager.list_active_subscriptions().await.is_empty());
    assert_eq!(state.server_subscriptions(), 0);
}

#[tokio::test]
async fn test_session_closed_and_connection_lost_events_fault() {
    for event in [
        SessionEvent::SessionClosed {
            reason: "BadSessionIdInvalid".into(),
        },
        SessionEvent::ConnectionLost {
            reason: "socket reset".into(),
        },
    ] {
        let (manager, state) = connected().await;
        state.emit(event).await;

        assert!(manager.wait_for_state(ConnectionState::Disconnected, SETTLE).await);
        assert_eq!(manager.stats().faults(), 1);
        assert!(state.position("close_session").is_some());
    }
}

#[tokio::test]
async fn test_connection_loss_during_read_forces_fault() {
    let (manager, state) = connected().await;
    *state.read_error.lock().unwrap() = Some(SessionError::connection_closed("peer reset"));

    let result = manager.read(&node("Speed")).await;
    assert!(matches!(result, Err(UaError::Session(SessionError::ConnectionClosed { .. }))));

    assert!(manager.wait_for_state(ConnectionState::Disconnected, SETTLE).await);
    let again = manager.read(&node("Speed")).await;
    assert!(again.unwrap_err().is_not_connected());
}

#[tokio::test]
async fn test_other_read_errors_do_not_fault() {
    let (manager, state) = connected().await;
    *state.read_error.lock().unwrap() = Some(SessionError::service_fault(
        "Read",
        StatusCode::BAD_TYPE_MISMATCH,
    ));

    assert!(manager.read(&node("Speed")).await.is_err());
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(manager.stats().faults(), 0);
}

#[tokio::test]
async fn test_reconnect_after_fault() {
    let (manager, state) = connected().await;
    state
        .emit(SessionEvent::ConnectionLost {
            reason: "link down".into(),
        })
        .await;
    assert!(manager.wait_for_state(ConnectionState::Disconnected, SETTLE).await);

    manager.connect(config()).await.unwrap();
    assert!(manager.get_status().await.connected);
    assert_eq!(state.count_calls("connect:"), 2);
}

#[tokio::test]
async fn test_status_answers_while_cleanup_runs() {
    let (manager, state) = connected().await;
    state.set_value(node("Speed"), Variant::Double(1.0), StatusCode::GOOD);
    manager.subscribe(node("Speed").into(), 1000).await.unwrap();
    state.delete_delay_ms.store(1_000, Ordering::SeqCst);

    let mut states = manager.subscribe_state();
    state
        .emit(SessionEvent::ConnectionLost {
            reason: "link down".into(),
        })
        .await;
    tokio::time::timeout(SETTLE, states.wait_for(|s| *s != ConnectionState::Connected))
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(state.count_calls("delete_subscription"), 1);

    let status = tokio::time::timeout(Duration::from_millis(200), manager.get_status())
        .await
        .expect("status waited for cleanup");
    assert!(!status.connected);
    assert!(!status.session_active);
    assert_ne!(status.state, ConnectionState::Connected);

    assert!(manager.wait_for_state(ConnectionState::Disconnected, SETTLE).await);
}

#[tokio::test]
async fn test_hung_status_read_faults_connection() {
    let state = FakeState::new();
    let manager = ConnectionManager::with_settings(
        FakeSession::new(state.clone()),
        ManagerSettings::default().with_step_timeout(Duration::from_millis(100)),
    );
    manager.connect(config()).await.unwrap();
    state.read_delay_ms.store(10_000, Ordering::SeqCst);

    let status = tokio::time::timeout(SETTLE, manager.get_status())
        .await
        .expect("status did not time out its read");
    assert!(!status.connected);
    assert_eq!(manager.stats().faults(), 1);
}

// =============================================================================
// Read / Write / Browse
// =============================================================================

#[tokio::test]
async fn test_read_returns_snapshot_and_rejects_bad_status() {
    let (manager, state) = connected().await;
    state.set_value(node("Speed"), Variant::Double(12.5), StatusCode::GOOD);
    state.set_value(node("Stale"), Variant::Double(3.0), StatusCode::UNCERTAIN_LAST_USABLE_VALUE);

    let value = manager.read(&node("Speed")).await.unwrap();
    assert_eq!(value.value, Variant::Double(12.5));
    assert_eq!(value.data_type, DataType::Double);
    assert!(value.status.is_good());
    assert!(value.timestamp.is_some());

    let uncertain = manager.read(&node("Stale")).await.unwrap();
    assert!(uncertain.status.is_uncertain());

    let missing = manager.read(&node("Missing")).await;
    let Err(UaError::Operation(OperationError::ReadRejected { status, .. })) = missing else {
        panic!("expected ReadRejected");
    };
    assert_eq!(status, StatusCode::BAD_NODE_ID_UNKNOWN);
    assert_eq!(manager.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_write_applies_type_hint() {
    let (manager, state) = connected().await;

    let status = manager
        .write(&node("Setpoint"), Variant::Int64(42), Some(DataType::Int16))
        .await
        .unwrap();
    assert!(status.is_good());
    assert_eq!(
        state.written.lock().unwrap().last().cloned(),
        Some((node("Setpoint"), Variant::Int16(42)))
    );

    let overflow = manager
        .write(&node("Setpoint"), Variant::Int64(70_000), Some(DataType::Int16))
        .await;
    assert!(matches!(overflow, Err(UaError::Config(ConfigError::InvalidValue { .. }))));
    assert_eq!(state.count_calls("write:"), 1);
}

#[tokio::test]
async fn test_write_rejected_by_status() {
    let (manager, state) = connected().await;
    state
        .write_status
        .lock()
        .unwrap()
        .insert(node("ReadOnly"), StatusCode::BAD_NOT_WRITABLE);

    let result = manager.write(&node("ReadOnly"), Variant::Boolean(true), None).await;
    let Err(UaError::Operation(OperationError::WriteRejected { status, .. })) = result else {
        panic!("expected WriteRejected");
    };
    assert_eq!(status, StatusCode::BAD_NOT_WRITABLE);
}

#[tokio::test]
async fn test_browse_lists_references() {
    let (manager, _state) = connected().await;

    let references = manager.browse(&NodeId::OBJECTS_FOLDER).await.unwrap();
    assert_eq!(references.len(), 2);
    assert_eq!(references[0].browse_name, "Server");
    assert!(references.iter().all(|r| r.is_forward));
}

// =============================================================================
// Node Registry
// =============================================================================

#[tokio::test]
async fn test_register_and_list_nodes() {
    let (manager, state) = connected().await;
    state.set_value(node("Speed"), Variant::Double(1.0), StatusCode::GOOD);

    let handle = manager.register_node(&node("Speed")).await.unwrap();
    let nodes = manager.list_registered_nodes().await;
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].handle, handle);
    assert_eq!(nodes[0].node_id, node("Speed"));

    // Reads through the alias resolve to the original node.
    let value = manager.read(handle.node_id()).await.unwrap();
    assert_eq!(value.value, Variant::Double(1.0));
}

#[tokio::test]
async fn test_register_inaccessible_node_leaves_registry_unchanged() {
    let (manager, state) = connected().await;
    state.set_value(node("n1"), Variant::Null, StatusCode::BAD_NOT_READABLE);

    let result = manager.register_node(&node("n1")).await;
    let Err(UaError::Resource(ResourceError::NodeNotAccessible { status, .. })) = result else {
        panic!("expected NodeNotAccessible");
    };
    assert_eq!(status, StatusCode::BAD_NOT_READABLE);

    assert!(manager.list_registered_nodes().await.is_empty());
    assert_eq!(state.count_calls("register_nodes"), 0);
}

#[tokio::test]
async fn test_unregister_unknown_handle() {
    let (manager, _state) = connected().await;
    let handle: plclink_ua::RegisteredHandle = "ns=1;i=9999".parse().unwrap();

    let result = manager.unregister_node(&handle).await;
    assert!(matches!(
        result,
        Err(UaError::Resource(ResourceError::RegisteredNodeNotFound { .. }))
    ));
}

#[tokio::test]
async fn test_unregister_cascades_subscriptions() {
    let (manager, state) = connected().await;
    state.set_value(node("Speed"), Variant::Double(1.0), StatusCode::GOOD);

    let handle = manager.register_node(&node("Speed")).await.unwrap();
    for interval in [250, 500, 1000] {
        manager
            .subscribe(SubscriptionTarget::Registered(handle.clone()), interval)
            .await
            .unwrap();
    }
    let direct = manager.subscribe(node("Speed").into(), 1000).await.unwrap();
    assert_eq!(manager.subscriptions_targeting(&handle).await, 3);

    let outcome = manager.unregister_node(&handle).await.unwrap();
    assert_eq!(outcome.cascaded_subscriptions, 3);
    assert!(outcome.cancellation_errors.is_empty());
    assert_eq!(manager.subscriptions_targeting(&handle).await, 0);

    let remaining = manager.list_active_subscriptions().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].handle, direct);
    assert!(manager.list_registered_nodes().await.is_empty());

    // Server-side cancellation precedes deregistration.
    let last_delete = state.last_position("delete_subscription").unwrap();
    let unregister = state.position("unregister_nodes").unwrap();
    assert!(last_delete < unregister);
    assert_eq!(state.server_registrations(), 0);
}

#[tokio::test]
async fn test_unregister_collects_cancellation_errors() {
    let (manager, state) = connected().await;
    state.set_value(node("Speed"), Variant::Double(1.0), StatusCode::GOOD);

    let handle = manager.register_node(&node("Speed")).await.unwrap();
    manager.subscribe(handle.clone().into(), 1000).await.unwrap();
    manager.subscribe(handle.clone().into(), 2000).await.unwrap();
    state.fail_delete_subscription.store(true, Ordering::SeqCst);

    let outcome = manager.unregister_node(&handle).await.unwrap();
    assert_eq!(outcome.cascaded_subscriptions, 2);
    assert_eq!(outcome.cancellation_errors.len(), 2);
    assert_eq!(manager.subscriptions_targeting(&handle).await, 0);
    assert!(manager.list_registered_nodes().await.is_empty());
    assert_eq!(manager.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_failed_deregistration_keeps_mapping() {
    let (manager, state) = connected().await;
    state.set_value(node("Speed"), Variant::Double(1.0), StatusCode::GOOD);
    let handle = manager.register_node(&node("Speed")).await.unwrap();
    state.fail_unregister.store(true, Ordering::SeqCst);

    assert!(manager.unregister_node(&handle).await.is_err());
    assert_eq!(manager.list_registered_nodes().await.len(), 1);
}

// =============================================================================
// Subscription Registry
// =============================================================================

#[tokio::test]
async fn test_subscription_timing_is_derived() {
    let (manager, state) = connected().await;
    state.set_value(node("Speed"), Variant::Double(1.0), StatusCode::GOOD);

    let fast = manager.subscribe(node("Speed").into(), 500).await.unwrap();
    let slow = manager.subscribe(node("Speed").into(), 2000).await.unwrap();

    let infos = manager.list_active_subscriptions().await;
    let timing = |handle: &SubscriptionHandle| {
        infos
            .iter()
            .find(|i| &i.handle == handle)
            .map(|i| (i.timing.keep_alive_count, i.timing.lifetime_count))
            .unwrap()
    };
    assert_eq!(timing(&fast), (20, 60));
    assert_eq!(timing(&slow), (10, 30));

    assert!(state.calls().contains(&"create_subscription:500/20/60".to_string()));
    assert!(state.calls().contains(&"create_monitored_item:ns=2;s=Speed:10:true".to_string()));

    let zero = manager.subscribe(node("Speed").into(), 0).await;
    assert!(matches!(zero, Err(UaError::Config(ConfigError::InvalidInterval))));
}

#[tokio::test]
async fn test_subscription_value_lookup() {
    let (manager, state) = connected().await;
    state.set_value(node("Speed"), Variant::Double(7.5), StatusCode::GOOD);

    let unknown = manager
        .get_subscription_value(&SubscriptionHandle::from("sub-unknown"))
        .await;
    assert!(matches!(
        unknown,
        Err(UaError::Resource(ResourceError::SubscriptionNotFound { .. }))
    ));

    let handle = manager.subscribe(node("Speed").into(), 1000).await.unwrap();
    let reads_before = state.count_calls("read:");
    let value = manager.get_subscription_value(&handle).await.unwrap().unwrap();
    assert_eq!(value.value, Variant::Double(7.5));
    assert_eq!(state.count_calls("read:"), reads_before);

    let infos = manager.list_active_subscriptions().await;
    assert!(infos[0].has_cached_value);
    assert!(!infos[0].is_registered_target);
}

#[tokio::test]
async fn test_value_changes_overwrite_cache_and_broadcast() {
    let state = FakeState::new();
    let manager = ConnectionManager::with_settings(
        FakeSession::new(state.clone()),
        ManagerSettings::default().with_seed_initial_value(false),
    );
    manager.connect(config()).await.unwrap();
    state.set_value(node("Level"), Variant::Float(1.0), StatusCode::GOOD);

    let mut updates = manager.watch_values();
    let handle = manager.subscribe(node("Level").into(), 250).await.unwrap();
    assert_eq!(manager.get_subscription_value(&handle).await.unwrap(), None);

    let subscription_id = state.subscription_for(&node("Level")).unwrap();
    for level in [2.0, 3.0] {
        state
            .emit(SessionEvent::ValueChanged(ValueChange {
                subscription_id,
                value: ReadResult::good(node("Level"), Variant::Float(level)),
            }))
            .await;
    }

    let first = tokio::time::timeout(SETTLE, updates.recv()).await.unwrap().unwrap();
    assert_eq!(first.handle, handle);
    assert_eq!(first.value.value, Variant::Float(2.0));
    let second = tokio::time::timeout(SETTLE, updates.recv()).await.unwrap().unwrap();
    assert_eq!(second.value.value, Variant::Float(3.0));

    let cached = manager.get_subscription_value(&handle).await.unwrap().unwrap();
    assert_eq!(cached.value, Variant::Float(3.0));
    assert_eq!(manager.stats().notifications(), 2);
}

#[tokio::test]
async fn test_unsubscribe_twice_returns_not_found() {
    let (manager, state) = connected().await;
    state.set_value(node("Speed"), Variant::Double(1.0), StatusCode::GOOD);
    let handle = manager.subscribe(node("Speed").into(), 1000).await.unwrap();

    manager.unsubscribe(&handle).await.unwrap();
    let second = manager.unsubscribe(&handle).await;
    assert!(matches!(
        second,
        Err(UaError::Resource(ResourceError::SubscriptionNotFound { .. }))
    ));
    assert_eq!(state.count_calls("delete_subscription"), 1);
    assert!(manager.list_active_subscriptions().await.is_empty());
}

#[tokio::test]
async fn test_failed_unsubscribe_keeps_subscription_for_cleanup() {
    let (manager, state) = connected().await;
    state.set_value(node("Speed"), Variant::Double(1.0), StatusCode::GOOD);
    let handle = manager.subscribe(node("Speed").into(), 1000).await.unwrap();
    state.fail_delete_subscription.store(true, Ordering::SeqCst);

    let result = manager.unsubscribe(&handle).await;
    assert!(matches!(result, Err(UaError::Session(SessionError::ServiceFault { .. }))));
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(manager.list_active_subscriptions().await.len(), 1);
    assert_eq!(state.server_subscriptions(), 1);

    state.fail_delete_subscription.store(false, Ordering::SeqCst);
    let report = manager.disconnect().await;
    assert!(report.is_clean());
    assert_eq!(report.subscriptions_cleared, 1);
    assert_eq!(state.count_calls("delete_subscription"), 2);
    assert_eq!(state.server_subscriptions(), 0);
}

#[tokio::test]
async fn test_unsubscribe_can_be_retried_after_failure() {
    let (manager, state) = connected().await;
    state.set_value(node("Speed"), Variant::Double(1.0), StatusCode::GOOD);
    let handle = manager.subscribe(node("Speed").into(), 1000).await.unwrap();

    state.fail_delete_subscription.store(true, Ordering::SeqCst);
    assert!(manager.unsubscribe(&handle).await.is_err());

    state.fail_delete_subscription.store(false, Ordering::SeqCst);
    manager.unsubscribe(&handle).await.unwrap();
    assert!(manager.list_active_subscriptions().await.is_empty());
    assert_eq!(state.server_subscriptions(), 0);
}

#[tokio::test]
async fn test_subscribe_to_unknown_registered_handle() {
    let (manager, _state) = connected().await;
    let handle: plclink_ua::RegisteredHandle = "ns=1;i=4242".parse().unwrap();

    let result = manager.subscribe(handle.into(), 1000).await;
    assert!(matches!(
        result,
        Err(UaError::Resource(ResourceError::RegisteredNodeNotFound { .. }))
    ));
}

#[tokio::test]
async fn test_failed_monitored_item_removes_publish_cycle() {
    let (manager, state) = connected().await;

    let result = manager.subscribe(node("Missing").into(), 1000).await;
    assert!(matches!(result, Err(UaError::Session(SessionError::ServiceFault { .. }))));
    assert_eq!(state.server_subscriptions(), 0);
    assert!(manager.list_active_subscriptions().await.is_empty());
}

// =============================================================================
// Cleanup Coordinator
// =============================================================================

#[tokio::test]
async fn test_disconnect_releases_everything_in_order() {
    let (manager, state) = connected().await;
    state.set_value(node("A"), Variant::Int32(1), StatusCode::GOOD);
    state.set_value(node("B"), Variant::Int32(2), StatusCode::GOOD);

    let a = manager.register_node(&node("A")).await.unwrap();
    manager.register_node(&node("B")).await.unwrap();
    manager.subscribe(a.into(), 1000).await.unwrap();
    manager.subscribe(node("B").into(), 1000).await.unwrap();

    let report = manager.disconnect().await;
    assert!(report.is_clean());
    assert_eq!(report.subscriptions_cleared, 2);
    assert_eq!(report.nodes_cleared, 2);

    let delete = state.last_position("delete_subscription").unwrap();
    let unregister = state.position("unregister_nodes:2").unwrap();
    let close = state.last_position("close_session").unwrap();
    let disconnect = state.last_position("disconnect").unwrap();
    assert!(delete < unregister && unregister < close && close < disconnect);

    assert_eq!(state.server_subscriptions(), 0);
    assert_eq!(state.server_registrations(), 0);
}

#[tokio::test]
async fn test_cleanup_resets_state_despite_step_failures() {
    let (manager, state) = connected().await;
    state.set_value(node("A"), Variant::Int32(1), StatusCode::GOOD);
    let handle = manager.register_node(&node("A")).await.unwrap();
    manager.subscribe(handle.into(), 1000).await.unwrap();

    state.fail_delete_subscription.store(true, Ordering::SeqCst);
    state.fail_unregister.store(true, Ordering::SeqCst);
    state.fail_close_session.store(true, Ordering::SeqCst);

    let report = manager.disconnect().await;
    assert_eq!(report.failures.len(), 3);
    assert_eq!(report.failures_for(TeardownStep::DeleteSubscriptions).count(), 1);
    assert_eq!(report.failures_for(TeardownStep::UnregisterNodes).count(), 1);
    assert_eq!(report.failures_for(TeardownStep::CloseSession).count(), 1);

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(manager.list_registered_nodes().await.is_empty());
    assert!(manager.list_active_subscriptions().await.is_empty());
    assert!(!manager.get_status().await.connected);
    assert!(state.position("disconnect").is_some());
    assert_eq!(manager.stats().cleanup_step_errors(), 3);
}

#[tokio::test]
async fn test_disconnect_does_not_wait_for_hung_read() {
    let state = FakeState::new();
    let manager = ConnectionManager::with_settings(
        FakeSession::new(state.clone()),
        ManagerSettings::default().with_step_timeout(Duration::from_millis(100)),
    );
    manager.connect(config()).await.unwrap();
    state.read_delay_ms.store(60_000, Ordering::SeqCst);

    let reader = tokio::spawn({
        let manager = manager.clone();
        async move { manager.read(&node("Speed")).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(state.count_calls("read:ns=2;s=Speed"), 1);

    let report = tokio::time::timeout(SETTLE, manager.disconnect())
        .await
        .expect("disconnect waited for the read");
    assert_eq!(report.failures_for(TeardownStep::CloseSession).count(), 1);
    assert_eq!(report.failures_for(TeardownStep::Disconnect).count(), 1);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(state.position("close_session").is_none());

    reader.abort();
}

#[tokio::test]
async fn test_state_watch_observes_transitions() {
    let (manager, _state) = manager();
    let mut states = manager.subscribe_state();

    manager.connect(config()).await.unwrap();
    assert_eq!(*states.borrow_and_update(), ConnectionState::Connected);

    manager.disconnect().await;
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), ConnectionState::Disconnected);
}
