// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! [`ProtocolSession`] backed by the `opcua` client stack.
//!
//! The `opcua` client is synchronous, so every service call runs on the
//! blocking pool. Session-closed and connection-status callbacks, and data
//! change callbacks, are forwarded into the event channel with `try_send`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, trace};

use opcua::client::prelude::*;
use opcua::sync::RwLock as OpcUaRwLock;

use crate::error::{SessionError, UaError, UaResult};
use crate::session::protocol::{
    BrowseReference, EventSink, MonitorParameters, NodeClass, ProtocolSession, PublishParameters,
    ReadResult, SessionEvent, ValueChange, Variant, WriteResult,
};
use crate::types::{
    ConnectionConfig, Identity, NodeId, NodeIdentifier, SecurityMode, SecurityPolicy, StatusCode,
};

/// Default event channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

type SharedSession = Arc<OpcUaRwLock<Session>>;

// =============================================================================
// OpcUaSession
// =============================================================================

/// Protocol session over the `opcua` crate.
pub struct OpcUaSession {
    config: Option<ConnectionConfig>,
    client: Mutex<Option<Client>>,
    endpoint: Option<EndpointDescription>,
    session: Option<SharedSession>,
    runner: Mutex<Option<tokio::sync::oneshot::Sender<SessionCommand>>>,
    events: Option<EventSink>,
    pending_events: Option<mpsc::Receiver<SessionEvent>>,
    event_capacity: usize,
    subscriptions: RwLock<HashMap<u32, u32>>,
    next_subscription_id: AtomicU32,
}

impl OpcUaSession {
    /// Creates an unconnected session.
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Creates an unconnected session with a custom event channel capacity.
    pub fn with_event_capacity(event_capacity: usize) -> Self {
        Self {
            config: None,
            client: Mutex::new(None),
            endpoint: None,
            session: None,
            runner: Mutex::new(None),
            events: None,
            pending_events: None,
            event_capacity: event_capacity.max(1),
            subscriptions: RwLock::new(HashMap::new()),
            next_subscription_id: AtomicU32::new(1),
        }
    }

    fn build_client(config: &ConnectionConfig) -> UaResult<Client> {
        ClientBuilder::new()
            .application_name(&config.application_name)
            .application_uri(format!("urn:{}", config.application_name))
            .session_retry_limit(0)
            .session_timeout(config.session_timeout.as_millis().min(u32::MAX as u128) as u32)
            .trust_server_certs(true)
            .create_sample_keypair(config.security_policy != SecurityPolicy::None)
            .client()
            .ok_or_else(|| SessionError::transport("Failed to build OPC UA client").into())
    }

    fn session(&self) -> UaResult<SharedSession> {
        self.session
            .clone()
            .ok_or_else(|| SessionError::ConnectionClosed { reason: None }.into())
    }

    /// Runs a blocking service call against the session.
    async fn call<T, F>(&self, service: &'static str, f: F) -> UaResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Session) -> Result<T, opcua::types::StatusCode> + Send + 'static,
    {
        let session = self.session()?;
        tokio::task::spawn_blocking(move || {
            let guard = session.read();
            f(&guard)
        })
        .await
        .map_err(|e| UaError::from(SessionError::transport(format!("{service} task failed: {e}"))))?
        .map_err(|status| service_error(service, status))
    }

    async fn server_subscription_id(&self, subscription_id: u32) -> UaResult<u32> {
        self.subscriptions
            .read()
            .await
            .get(&subscription_id)
            .copied()
            .ok_or_else(|| {
                SessionError::service_fault("Subscription", StatusCode::BAD_SUBSCRIPTION_ID_INVALID)
                    .into()
            })
    }

    fn install_callbacks(session: &SharedSession, sink: &EventSink) {
        let mut guard = session.write();

        let closed = sink.clone();
        guard.set_session_closed_callback(SessionClosedCallback::new(move |status| {
            let status = StatusCode(status.bits());
            let event = if status == StatusCode::BAD_TIMEOUT {
                SessionEvent::KeepAliveFailed {
                    reason: status.to_string(),
                }
            } else {
                SessionEvent::SessionClosed {
                    reason: status.to_string(),
                }
            };
            closed.emit(event);
        }));

        let lost = sink.clone();
        guard.set_connection_status_callback(ConnectionStatusCallback::new(move |connected| {
            if !connected {
                lost.emit(SessionEvent::ConnectionLost {
                    reason: "transport disconnected".to_string(),
                });
            }
        }));
    }

    fn stop_runner(&self) {
        let runner = self.runner.lock().take();
        if let Some(runner) = runner {
            let _ = runner.send(SessionCommand::Stop);
        }
    }
}

impl Default for OpcUaSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolSession for OpcUaSession {
    // =========================================================================
    // Connection Management
    // =========================================================================

    async fn connect(&mut self, config: &ConnectionConfig) -> UaResult<()> {
        info!(endpoint = %config.endpoint, "Connecting to OPC UA server");

        let client = Self::build_client(config)?;
        let url = config.endpoint.clone();
        let policy = to_opcua_policy(config.security_policy);
        let mode = to_opcua_mode(config.security_mode);

        let discovery = tokio::task::spawn_blocking(move || {
            let endpoints = client.get_server_endpoints_from_url(url.as_str());
            (client, endpoints)
        });
        let (client, endpoints) = tokio::time::timeout(config.connect_timeout, discovery)
            .await
            .map_err(|_| SessionError::timed_out("Connect", format!("no answer within {:?}", config.connect_timeout)))?
            .map_err(|e| SessionError::transport(format!("Connect task failed: {e}")))?;

        let endpoints = endpoints.map_err(|status| connect_error(status))?;
        let endpoint = endpoints
            .into_iter()
            .find(|e| e.security_policy_uri.as_ref() == policy.to_uri() && e.security_mode == mode)
            .ok_or_else(|| {
                SessionError::transport(format!(
                    "Server offers no endpoint for {}/{}",
                    config.security_policy, config.security_mode
                ))
            })?;

        debug!(
            security_policy = %endpoint.security_policy_uri,
            security_mode = ?endpoint.security_mode,
            "Found matching endpoint"
        );

        *self.client.lock() = Some(client);
        self.endpoint = Some(endpoint);
        self.config = Some(config.clone());
        Ok(())
    }

    async fn create_session(&mut self, identity: &Identity) -> UaResult<()> {
        let endpoint = self
            .endpoint
            .clone()
            .ok_or_else(|| SessionError::ConnectionClosed { reason: None })?;
        let mut client = self
            .client
            .lock()
            .take()
            .ok_or_else(|| SessionError::ConnectionClosed { reason: None })?;

        let token = match identity {
            Identity::Anonymous => IdentityToken::Anonymous,
            Identity::UserName(credentials) => IdentityToken::UserName(
                credentials.username.clone(),
                credentials.password.clone(),
            ),
        };

        let session = tokio::task::spawn_blocking(move || client.connect_to_endpoint(endpoint, token))
            .await
            .map_err(|e| SessionError::transport(format!("Session task failed: {e}")))?
            .map_err(connect_error)?;

        let (sink, receiver) = EventSink::channel(self.event_capacity);
        Self::install_callbacks(&session, &sink);

        let runner = Session::run_async(session.clone());
        *self.runner.lock() = Some(runner);

        self.session = Some(session);
        self.events = Some(sink);
        self.pending_events = Some(receiver);

        info!(
            endpoint = self.config.as_ref().map(|c| c.endpoint.as_str()).unwrap_or_default(),
            "OPC UA session activated"
        );
        Ok(())
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.pending_events.take()
    }

    async fn close_session(&mut self) -> UaResult<()> {
        self.stop_runner();

        if let Some(session) = self.session.take() {
            tokio::task::spawn_blocking(move || session.write().disconnect())
                .await
                .map_err(|e| SessionError::transport(format!("Close task failed: {e}")))?;
        }
        self.subscriptions.write().await.clear();
        Ok(())
    }

    async fn disconnect(&mut self) -> UaResult<()> {
        self.stop_runner();
        self.session = None;
        self.endpoint = None;
        self.events = None;
        self.pending_events = None;
        self.client.lock().take();
        self.subscriptions.write().await.clear();
        info!("Disconnected from OPC UA server");
        Ok(())
    }

    fn is_session_active(&self) -> bool {
        self.session.is_some()
    }

    // =========================================================================
    // Attribute Services
    // =========================================================================

    async fn read_value(&self, node_id: &NodeId) -> UaResult<ReadResult> {
        trace!(node_id = %node_id, "Reading node value");

        let request = value_id(node_id);
        let values = self
            .call("Read", move |s| s.read(&[request], TimestampsToReturn::Both, 0.0))
            .await?;

        Ok(values
            .first()
            .map(|dv| from_data_value(node_id.clone(), dv))
            .unwrap_or_else(|| ReadResult::with_status(node_id.clone(), StatusCode::BAD_UNEXPECTED_ERROR)))
    }

    async fn write_value(&self, node_id: &NodeId, value: Variant) -> UaResult<WriteResult> {
        trace!(node_id = %node_id, "Writing node value");

        let request = WriteValue {
            node_id: to_opcua_node_id(node_id),
            attribute_id: AttributeId::Value as u32,
            index_range: opcua::types::UAString::null(),
            value: opcua::types::DataValue::new_now(to_opcua_variant(&value)),
        };
        let results = self.call("Write", move |s| s.write(&[request])).await?;

        let status = results
            .first()
            .map(|s| StatusCode(s.bits()))
            .unwrap_or(StatusCode::BAD_UNEXPECTED_ERROR);
        Ok(WriteResult {
            node_id: node_id.clone(),
            status,
        })
    }

    async fn browse(&self, node_id: &NodeId) -> UaResult<Vec<BrowseReference>> {
        trace!(node_id = %node_id, "Browsing node");

        let description = BrowseDescription {
            node_id: to_opcua_node_id(node_id),
            browse_direction: BrowseDirection::Forward,
            reference_type_id: ReferenceTypeId::HierarchicalReferences.into(),
            include_subtypes: true,
            node_class_mask: 0,
            result_mask: BrowseDescriptionResultMask::all().bits(),
        };
        let results = self.call("Browse", move |s| s.browse(&[description])).await?;

        let references = results
            .and_then(|r| r.into_iter().next())
            .and_then(|r| r.references)
            .unwrap_or_default();

        Ok(references
            .iter()
            .map(|r| BrowseReference {
                node_id: from_opcua_node_id(&r.node_id.node_id),
                browse_name: r.browse_name.name.as_ref().to_string(),
                display_name: r.display_name.text.as_ref().to_string(),
                node_class: NodeClass::from_value(r.node_class as u32),
                is_forward: r.is_forward,
            })
            .collect())
    }

    // =========================================================================
    // Subscription Services
    // =========================================================================

    async fn create_subscription(&self, parameters: PublishParameters) -> UaResult<u32> {
        let local_id = self.next_subscription_id.fetch_add(1, Ordering::SeqCst);
        let sink = self
            .events
            .clone()
            .ok_or_else(|| SessionError::ConnectionClosed { reason: None })?;

        let callback = DataChangeCallback::new(move |items| {
            for item in items.iter() {
                let node_id = from_opcua_node_id(&item.item_to_monitor().node_id);
                let value = from_data_value(node_id, item.last_value());
                sink.emit(SessionEvent::ValueChanged(ValueChange {
                    subscription_id: local_id,
                    value,
                }));
            }
        });

        let timing = parameters.timing;
        let server_id = self
            .call("CreateSubscription", move |s| {
                s.create_subscription(
                    f64::from(timing.publishing_interval_ms),
                    timing.lifetime_count,
                    timing.keep_alive_count,
                    parameters.max_notifications_per_publish,
                    parameters.priority,
                    true,
                    callback,
                )
            })
            .await?;

        self.subscriptions.write().await.insert(local_id, server_id);
        debug!(local_id, server_id, "Created subscription");
        Ok(local_id)
    }

    async fn create_monitored_item(
        &self,
        subscription_id: u32,
        node_id: &NodeId,
        parameters: MonitorParameters,
    ) -> UaResult<u32> {
        let server_id = self.server_subscription_id(subscription_id).await?;
        let request = MonitoredItemCreateRequest {
            item_to_monitor: value_id(node_id),
            monitoring_mode: MonitoringMode::Reporting,
            requested_parameters: MonitoringParameters {
                client_handle: subscription_id,
                sampling_interval: f64::from(parameters.sampling_interval_ms),
                filter: ExtensionObject::null(),
                queue_size: parameters.queue_size,
                discard_oldest: parameters.discard_oldest,
            },
        };

        let results = self
            .call("CreateMonitoredItems", move |s| {
                s.create_monitored_items(server_id, TimestampsToReturn::Both, &[request])
            })
            .await?;

        let result = results.first().ok_or_else(|| {
            SessionError::service_fault("CreateMonitoredItems", StatusCode::BAD_UNEXPECTED_ERROR)
        })?;
        if !result.status_code.is_good() {
            return Err(SessionError::service_fault(
                "CreateMonitoredItems",
                StatusCode(result.status_code.bits()),
            )
            .into());
        }
        Ok(result.monitored_item_id)
    }

    async fn delete_subscription(&self, subscription_id: u32) -> UaResult<()> {
        let server_id = self.server_subscription_id(subscription_id).await?;
        self.call("DeleteSubscription", move |s| s.delete_subscription(server_id).map(|_| ()))
            .await?;
        self.subscriptions.write().await.remove(&subscription_id);
        Ok(())
    }

    // =========================================================================
    // View Services
    // =========================================================================

    async fn register_nodes(&self, node_ids: &[NodeId]) -> UaResult<Vec<NodeId>> {
        let nodes: Vec<opcua::types::NodeId> = node_ids.iter().map(to_opcua_node_id).collect();
        let registered = self
            .call("RegisterNodes", move |s| s.register_nodes(&nodes))
            .await?;
        Ok(registered.iter().map(from_opcua_node_id).collect())
    }

    async fn unregister_nodes(&self, node_ids: &[NodeId]) -> UaResult<()> {
        let nodes: Vec<opcua::types::NodeId> = node_ids.iter().map(to_opcua_node_id).collect();
        self.call("UnregisterNodes", move |s| s.unregister_nodes(&nodes))
            .await
    }

    fn display_name(&self) -> String {
        match &self.config {
            Some(config) => format!("opcua[{}]", config.endpoint),
            None => "opcua[unconnected]".to_string(),
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

fn service_error(service: &'static str, status: opcua::types::StatusCode) -> UaError {
    let status = StatusCode(status.bits());
    if status == StatusCode::BAD_TIMEOUT {
        SessionError::timed_out(service, status.to_string()).into()
    } else {
        SessionError::service_fault(service, status).into()
    }
}

fn connect_error(status: opcua::types::StatusCode) -> UaError {
    let status = StatusCode(status.bits());
    match status {
        StatusCode::BAD_TIMEOUT => SessionError::timed_out("Connect", status.to_string()).into(),
        StatusCode::BAD_CONNECTION_REJECTED
        | StatusCode::BAD_NOT_CONNECTED
        | StatusCode::BAD_COMMUNICATION_ERROR => SessionError::refused(status.to_string()).into(),
        _ => SessionError::service_fault("Connect", status).into(),
    }
}

fn to_opcua_policy(policy: SecurityPolicy) -> opcua::client::prelude::SecurityPolicy {
    use opcua::client::prelude::SecurityPolicy as Policy;
    match policy {
        SecurityPolicy::None => Policy::None,
        SecurityPolicy::Basic128Rsa15 => Policy::Basic128Rsa15,
        SecurityPolicy::Basic256 => Policy::Basic256,
        SecurityPolicy::Basic256Sha256 => Policy::Basic256Sha256,
        SecurityPolicy::Aes128Sha256RsaOaep => Policy::Aes128Sha256RsaOaep,
        SecurityPolicy::Aes256Sha256RsaPss => Policy::Aes256Sha256RsaPss,
    }
}

fn to_opcua_mode(mode: SecurityMode) -> opcua::types::MessageSecurityMode {
    match mode {
        SecurityMode::None => opcua::types::MessageSecurityMode::None,
        SecurityMode::Sign => opcua::types::MessageSecurityMode::Sign,
        SecurityMode::SignAndEncrypt => opcua::types::MessageSecurityMode::SignAndEncrypt,
    }
}

fn value_id(node_id: &NodeId) -> ReadValueId {
    ReadValueId {
        node_id: to_opcua_node_id(node_id),
        attribute_id: AttributeId::Value as u32,
        index_range: opcua::types::UAString::null(),
        data_encoding: opcua::types::QualifiedName::null(),
    }
}

fn to_opcua_node_id(node_id: &NodeId) -> opcua::types::NodeId {
    let ns = node_id.namespace_index;
    match &node_id.identifier {
        NodeIdentifier::Numeric(v) => opcua::types::NodeId::new(ns, *v),
        NodeIdentifier::String(v) => opcua::types::NodeId::new(ns, v.clone()),
        NodeIdentifier::Guid(v) => opcua::types::NodeId::new(ns, opcua::types::Guid::from(*v)),
        NodeIdentifier::Opaque(v) => {
            opcua::types::NodeId::new(ns, opcua::types::ByteString::from(v.as_slice()))
        }
    }
}

fn from_opcua_node_id(node_id: &opcua::types::NodeId) -> NodeId {
    let ns = node_id.namespace;
    match &node_id.identifier {
        opcua::types::Identifier::Numeric(v) => NodeId::numeric(ns, *v),
        opcua::types::Identifier::String(v) => NodeId::string(ns, v.as_ref()),
        opcua::types::Identifier::Guid(v) => NodeId::guid(ns, uuid::Uuid::from_bytes(*v.as_bytes())),
        opcua::types::Identifier::ByteString(v) => {
            NodeId::opaque(ns, v.value.clone().unwrap_or_default())
        }
    }
}

fn from_opcua_datetime(value: &opcua::types::DateTime) -> DateTime<Utc> {
    let chrono = value.as_chrono();
    DateTime::from_timestamp(chrono.timestamp(), chrono.timestamp_subsec_nanos())
        .unwrap_or_else(Utc::now)
}

fn from_data_value(node_id: NodeId, data_value: &opcua::types::DataValue) -> ReadResult {
    ReadResult {
        node_id,
        value: data_value.value.as_ref().map(from_opcua_variant),
        status: data_value
            .status
            .as_ref()
            .map(|s| StatusCode(s.bits()))
            .unwrap_or(StatusCode::GOOD),
        server_timestamp: data_value.server_timestamp.as_ref().map(from_opcua_datetime),
        source_timestamp: data_value.source_timestamp.as_ref().map(from_opcua_datetime),
    }
}

fn from_opcua_variant(variant: &opcua::types::Variant) -> Variant {
    use opcua::types::Variant as V;

    match variant {
        V::Empty => Variant::Null,
        V::Boolean(v) => Variant::Boolean(*v),
        V::SByte(v) => Variant::SByte(*v),
        V::Byte(v) => Variant::Byte(*v),
        V::Int16(v) => Variant::Int16(*v),
        V::UInt16(v) => Variant::UInt16(*v),
        V::Int32(v) => Variant::Int32(*v),
        V::UInt32(v) => Variant::UInt32(*v),
        V::Int64(v) => Variant::Int64(*v),
        V::UInt64(v) => Variant::UInt64(*v),
        V::Float(v) => Variant::Float(*v),
        V::Double(v) => Variant::Double(*v),
        V::String(v) => Variant::String(v.as_ref().to_string()),
        V::DateTime(v) => Variant::DateTime(from_opcua_datetime(v)),
        V::Guid(v) => Variant::Guid(uuid::Uuid::from_bytes(*v.as_bytes())),
        V::ByteString(v) => Variant::ByteString(v.value.clone().unwrap_or_default()),
        other => Variant::String(format!("{other:?}")),
    }
}

fn to_opcua_variant(value: &Variant) -> opcua::types::Variant {
    use opcua::types::Variant as V;

    match value {
        Variant::Null => V::Empty,
        Variant::Boolean(v) => V::Boolean(*v),
        Variant::SByte(v) => V::SByte(*v),
        Variant::Byte(v) => V::Byte(*v),
        Variant::Int16(v) => V::Int16(*v),
        Variant::UInt16(v) => V::UInt16(*v),
        Variant::Int32(v) => V::Int32(*v),
        Variant::UInt32(v) => V::UInt32(*v),
        Variant::Int64(v) => V::Int64(*v),
        Variant::UInt64(v) => V::UInt64(*v),
        Variant::Float(v) => V::Float(*v),
        Variant::Double(v) => V::Double(*v),
        Variant::String(v) => V::String(opcua::types::UAString::from(v.as_str())),
        Variant::DateTime(v) => V::DateTime(Box::new(opcua::types::DateTime::from(*v))),
        Variant::Guid(v) => V::Guid(Box::new(opcua::types::Guid::from(*v))),
        Variant::ByteString(v) => V::ByteString(opcua::types::ByteString::from(v.as_slice())),
    }
}
