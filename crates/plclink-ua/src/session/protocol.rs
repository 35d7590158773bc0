// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Protocol session abstraction.
//!
//! The manager never talks to the network directly. It drives a
//! [`ProtocolSession`], which owns message framing, the security handshake
//! and the wire encoding, and receives asynchronous [`SessionEvent`]s from
//! it over a channel.

use std::fmt;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ConfigError, UaResult};
use crate::types::{
    ConnectionConfig, DataType, Identity, MONITORED_QUEUE_SIZE, NodeId, StatusCode,
    SubscriptionTiming,
};

// =============================================================================
// ReadResult
// =============================================================================

/// A value attribute as returned by a read or a change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResult {
    /// The node that was read.
    pub node_id: NodeId,

    /// The value, absent when the status is bad.
    pub value: Option<Variant>,

    /// Quality of the value.
    pub status: StatusCode,

    /// Server timestamp.
    pub server_timestamp: Option<DateTime<Utc>>,

    /// Source timestamp.
    pub source_timestamp: Option<DateTime<Utc>>,
}

impl ReadResult {
    /// Creates a good result stamped now.
    pub fn good(node_id: NodeId, value: Variant) -> Self {
        Self {
            node_id,
            value: Some(value),
            status: StatusCode::GOOD,
            server_timestamp: Some(Utc::now()),
            source_timestamp: None,
        }
    }

    /// Creates a result carrying only a status.
    pub fn with_status(node_id: NodeId, status: StatusCode) -> Self {
        Self {
            node_id,
            value: None,
            status,
            server_timestamp: Some(Utc::now()),
            source_timestamp: None,
        }
    }

    /// Returns `true` if the quality is good.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.status.is_good()
    }

    /// Returns `true` if the quality is bad.
    #[inline]
    pub fn is_bad(&self) -> bool {
        self.status.is_bad()
    }

    /// Returns the server timestamp, falling back to the source timestamp.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.server_timestamp.or(self.source_timestamp)
    }
}

// =============================================================================
// WriteResult
// =============================================================================

/// Result of a single write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    /// The node that was written.
    pub node_id: NodeId,

    /// Status returned by the server.
    pub status: StatusCode,
}

impl WriteResult {
    /// Returns `true` if the write was accepted.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.status.is_good()
    }
}

// =============================================================================
// Variant
// =============================================================================

/// Value payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Variant {
    /// Boolean.
    Boolean(bool),
    /// Signed byte.
    SByte(i8),
    /// Unsigned byte.
    Byte(u8),
    /// 16-bit signed integer.
    Int16(i16),
    /// 16-bit unsigned integer.
    UInt16(u16),
    /// 32-bit signed integer.
    Int32(i32),
    /// 32-bit unsigned integer.
    UInt32(u32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit unsigned integer.
    UInt64(u64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// String.
    String(String),
    /// Timestamp.
    DateTime(DateTime<Utc>),
    /// GUID.
    Guid(Uuid),
    /// Byte string.
    ByteString(Vec<u8>),
    /// Empty value.
    Null,
}

impl Variant {
    /// Returns the data type tag of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Boolean(_) => DataType::Boolean,
            Self::SByte(_) => DataType::SByte,
            Self::Byte(_) => DataType::Byte,
            Self::Int16(_) => DataType::Int16,
            Self::UInt16(_) => DataType::UInt16,
            Self::Int32(_) => DataType::Int32,
            Self::UInt32(_) => DataType::UInt32,
            Self::Int64(_) => DataType::Int64,
            Self::UInt64(_) => DataType::UInt64,
            Self::Float(_) => DataType::Float,
            Self::Double(_) => DataType::Double,
            Self::String(_) => DataType::String,
            Self::DateTime(_) => DataType::DateTime,
            Self::Guid(_) => DataType::Guid,
            Self::ByteString(_) => DataType::ByteString,
            Self::Null => DataType::Null,
        }
    }

    /// Returns `true` for [`Variant::Null`].
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the value as an integer, if integral.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Self::Boolean(v) => Some(i128::from(*v)),
            Self::SByte(v) => Some(i128::from(*v)),
            Self::Byte(v) => Some(i128::from(*v)),
            Self::Int16(v) => Some(i128::from(*v)),
            Self::UInt16(v) => Some(i128::from(*v)),
            Self::Int32(v) => Some(i128::from(*v)),
            Self::UInt32(v) => Some(i128::from(*v)),
            Self::Int64(v) => Some(i128::from(*v)),
            Self::UInt64(v) => Some(i128::from(*v)),
            Self::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i128),
            Self::Double(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i128),
            _ => None,
        }
    }

    /// Returns the value as a float, if numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            other => other.as_i128().map(|v| v as f64),
        }
    }

    /// Parses text as the given data type.
    ///
    /// ```
    /// use plclink_ua::session::Variant;
    /// use plclink_ua::types::DataType;
    ///
    /// assert_eq!(Variant::from_text("42", DataType::UInt16).unwrap(), Variant::UInt16(42));
    /// assert!(Variant::from_text("70000", DataType::UInt16).is_err());
    /// ```
    pub fn from_text(text: &str, data_type: DataType) -> Result<Self, ConfigError> {
        let trimmed = text.trim();
        let invalid = |reason: &str| ConfigError::invalid_value(text, data_type.name(), reason);

        macro_rules! number {
            ($variant:ident) => {
                trimmed
                    .parse()
                    .map(Self::$variant)
                    .map_err(|e| invalid(&e.to_string()))
            };
        }

        match data_type {
            DataType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" | "on" | "yes" => Ok(Self::Boolean(true)),
                "false" | "0" | "off" | "no" => Ok(Self::Boolean(false)),
                _ => Err(invalid("expected true/false")),
            },
            DataType::SByte => number!(SByte),
            DataType::Byte => number!(Byte),
            DataType::Int16 => number!(Int16),
            DataType::UInt16 => number!(UInt16),
            DataType::Int32 => number!(Int32),
            DataType::UInt32 => number!(UInt32),
            DataType::Int64 => number!(Int64),
            DataType::UInt64 => number!(UInt64),
            DataType::Float => number!(Float),
            DataType::Double => number!(Double),
            DataType::String => Ok(Self::String(text.to_string())),
            DataType::DateTime => DateTime::parse_from_rfc3339(trimmed)
                .map(|dt| Self::DateTime(dt.with_timezone(&Utc)))
                .map_err(|e| invalid(&e.to_string())),
            DataType::Guid => Uuid::parse_str(trimmed)
                .map(Self::Guid)
                .map_err(|e| invalid(&e.to_string())),
            DataType::ByteString => BASE64
                .decode(trimmed)
                .map(Self::ByteString)
                .map_err(|e| invalid(&e.to_string())),
            DataType::Null if trimmed.is_empty() || trimmed == "null" => Ok(Self::Null),
            DataType::Null => Err(invalid("expected null")),
        }
    }

    /// Converts this value to `data_type`, rejecting lossy conversions.
    pub fn coerce_to(self, data_type: DataType) -> Result<Self, ConfigError> {
        if self.data_type() == data_type {
            return Ok(self);
        }

        if let Self::String(text) = &self {
            return Self::from_text(text, data_type);
        }

        let shown = self.to_string();
        let wide = self.as_i128();
        let float = self.as_f64();
        let invalid = |reason: &str| ConfigError::invalid_value(shown.as_str(), data_type.name(), reason);

        macro_rules! integer {
            ($variant:ident) => {
                match wide {
                    Some(v) => v
                        .try_into()
                        .map(Self::$variant)
                        .map_err(|_| invalid("out of range")),
                    None => Err(invalid("not an integral value")),
                }
            };
        }

        match data_type {
            DataType::Boolean => match wide {
                Some(0) => Ok(Self::Boolean(false)),
                Some(1) => Ok(Self::Boolean(true)),
                _ => Err(invalid("expected 0 or 1")),
            },
            DataType::SByte => integer!(SByte),
            DataType::Byte => integer!(Byte),
            DataType::Int16 => integer!(Int16),
            DataType::UInt16 => integer!(UInt16),
            DataType::Int32 => integer!(Int32),
            DataType::UInt32 => integer!(UInt32),
            DataType::Int64 => integer!(Int64),
            DataType::UInt64 => integer!(UInt64),
            DataType::Float => float
                .map(|v| Self::Float(v as f32))
                .ok_or_else(|| invalid("not numeric")),
            DataType::Double => float.map(Self::Double).ok_or_else(|| invalid("not numeric")),
            DataType::String => Ok(Self::String(shown.clone())),
            DataType::DateTime | DataType::Guid | DataType::ByteString | DataType::Null => {
                Err(invalid("incompatible type"))
            }
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{v}"),
            Self::SByte(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::UInt16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::UInt32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::UInt64(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
            Self::DateTime(v) => f.write_str(&v.to_rfc3339()),
            Self::Guid(v) => write!(f, "{v}"),
            Self::ByteString(v) => f.write_str(&BASE64.encode(v)),
            Self::Null => f.write_str("null"),
        }
    }
}

// =============================================================================
// Browse
// =============================================================================

/// Node class of a browse target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeClass {
    /// Unspecified.
    Unspecified,
    /// Object.
    Object,
    /// Variable.
    Variable,
    /// Method.
    Method,
    /// ObjectType.
    ObjectType,
    /// VariableType.
    VariableType,
    /// ReferenceType.
    ReferenceType,
    /// DataType.
    DataType,
    /// View.
    View,
}

impl NodeClass {
    /// Maps the protocol's node class value.
    pub fn from_value(value: u32) -> Self {
        match value {
            1 => Self::Object,
            2 => Self::Variable,
            4 => Self::Method,
            8 => Self::ObjectType,
            16 => Self::VariableType,
            32 => Self::ReferenceType,
            64 => Self::DataType,
            128 => Self::View,
            _ => Self::Unspecified,
        }
    }
}

impl fmt::Display for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One reference returned by browse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrowseReference {
    /// Target node.
    pub node_id: NodeId,
    /// Browse name.
    pub browse_name: String,
    /// Display name.
    pub display_name: String,
    /// Node class of the target.
    pub node_class: NodeClass,
    /// `true` for forward references.
    pub is_forward: bool,
}

// =============================================================================
// Subscription parameters
// =============================================================================

/// Parameters for creating a publish cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishParameters {
    /// Interval and derived counts.
    pub timing: SubscriptionTiming,
    /// Notifications per publish, 0 for unlimited.
    pub max_notifications_per_publish: u32,
    /// Relative priority.
    pub priority: u8,
}

impl From<SubscriptionTiming> for PublishParameters {
    fn from(timing: SubscriptionTiming) -> Self {
        Self {
            timing,
            max_notifications_per_publish: 0,
            priority: 0,
        }
    }
}

/// Parameters for a monitored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorParameters {
    /// Sampling interval in milliseconds.
    pub sampling_interval_ms: u32,
    /// Queue depth.
    pub queue_size: u32,
    /// Drop the oldest entry when the queue is full.
    pub discard_oldest: bool,
}

impl From<SubscriptionTiming> for MonitorParameters {
    fn from(timing: SubscriptionTiming) -> Self {
        Self {
            sampling_interval_ms: timing.publishing_interval_ms,
            queue_size: MONITORED_QUEUE_SIZE,
            discard_oldest: true,
        }
    }
}

// =============================================================================
// SessionEvent
// =============================================================================

/// A value change pushed by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChange {
    /// Publish cycle id returned by [`ProtocolSession::create_subscription`].
    pub subscription_id: u32,
    /// The new value.
    pub value: ReadResult,
}

/// Asynchronous event emitted by a protocol session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The server closed the session.
    SessionClosed {
        /// Reason given.
        reason: String,
    },
    /// Keep-alive publishes stopped arriving.
    KeepAliveFailed {
        /// Reason given.
        reason: String,
    },
    /// The transport connection dropped.
    ConnectionLost {
        /// Reason given.
        reason: String,
    },
    /// A monitored value changed.
    ValueChanged(ValueChange),
}

impl SessionEvent {
    /// Returns the failure reason for lifecycle events.
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::SessionClosed { reason }
            | Self::KeepAliveFailed { reason }
            | Self::ConnectionLost { reason } => Some(reason),
            Self::ValueChanged(_) => None,
        }
    }

    /// Returns the event name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionClosed { .. } => "session_closed",
            Self::KeepAliveFailed { .. } => "keep_alive_failed",
            Self::ConnectionLost { .. } => "connection_lost",
            Self::ValueChanged(_) => "value_changed",
        }
    }
}

// =============================================================================
// EventSink
// =============================================================================

/// Channel slots held back for lifecycle events.
pub const LIFECYCLE_RESERVE: usize = 4;

/// Sending half of a session event channel.
///
/// Value changes are shed once only [`LIFECYCLE_RESERVE`] slots are left,
/// so a backlog of value changes never crowds out a session failure.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: mpsc::Sender<SessionEvent>,
}

impl EventSink {
    /// Creates a channel holding `capacity` value changes plus the reserve.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1) + LIFECYCLE_RESERVE);
        (Self { sender }, receiver)
    }

    /// Queues an event without blocking. Returns `false` if it was dropped.
    pub fn emit(&self, event: SessionEvent) -> bool {
        let lifecycle = event.failure_reason().is_some();
        if !lifecycle && self.sender.capacity() <= LIFECYCLE_RESERVE {
            debug!("Shedding value change, event channel backlogged");
            return false;
        }

        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(kind = event.kind(), "Dropping session event, channel full");
                false
            }
            Err(TrySendError::Closed(event)) => {
                debug!(kind = event.kind(), "Dropping session event, receiver gone");
                false
            }
        }
    }
}

// =============================================================================
// ProtocolSession Trait
// =============================================================================

/// The operations the manager needs from a protocol session.
///
/// One value serves one connection at a time: `connect` followed by
/// `create_session`, then services, then `close_session` and `disconnect`.
/// After `disconnect` the same value may be connected again.
#[async_trait]
pub trait ProtocolSession: Send + Sync + 'static {
    // =========================================================================
    // Connection Management
    // =========================================================================

    /// Establishes the transport connection.
    async fn connect(&mut self, config: &ConnectionConfig) -> UaResult<()>;

    /// Creates and activates a session with `identity`.
    async fn create_session(&mut self, identity: &Identity) -> UaResult<()>;

    /// Hands out the event channel for the current connection.
    ///
    /// Returns `None` if it was already taken.
    fn take_events(&mut self) -> Option<mpsc::Receiver<SessionEvent>>;

    /// Closes the session.
    async fn close_session(&mut self) -> UaResult<()>;

    /// Closes the transport connection.
    async fn disconnect(&mut self) -> UaResult<()>;

    /// Returns `true` while a session is active.
    fn is_session_active(&self) -> bool;

    // =========================================================================
    // Attribute Services
    // =========================================================================

    /// Reads the value attribute of a node.
    async fn read_value(&self, node_id: &NodeId) -> UaResult<ReadResult>;

    /// Writes the value attribute of a node.
    async fn write_value(&self, node_id: &NodeId, value: Variant) -> UaResult<WriteResult>;

    /// Lists forward hierarchical references of a node.
    async fn browse(&self, node_id: &NodeId) -> UaResult<Vec<BrowseReference>>;

    // =========================================================================
    // Subscription Services
    // =========================================================================

    /// Creates a publish cycle and returns its id.
    async fn create_subscription(&self, parameters: PublishParameters) -> UaResult<u32>;

    /// Attaches a monitored item and returns its id.
    async fn create_monitored_item(
        &self,
        subscription_id: u32,
        node_id: &NodeId,
        parameters: MonitorParameters,
    ) -> UaResult<u32>;

    /// Deletes a publish cycle and its monitored items.
    async fn delete_subscription(&self, subscription_id: u32) -> UaResult<()>;

    // =========================================================================
    // View Services
    // =========================================================================

    /// Registers nodes and returns one server-issued alias per input.
    async fn register_nodes(&self, node_ids: &[NodeId]) -> UaResult<Vec<NodeId>>;

    /// Releases registered aliases.
    async fn unregister_nodes(&self, node_ids: &[NodeId]) -> UaResult<()>;

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Returns a short name for logging.
    fn display_name(&self) -> String;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_result_quality() {
        let good = ReadResult::good(NodeId::numeric(2, 1001), Variant::Double(25.5));
        assert!(good.is_good());
        assert!(good.timestamp().is_some());

        let bad = ReadResult::with_status(NodeId::numeric(2, 1001), StatusCode::BAD_NOT_READABLE);
        assert!(bad.is_bad());
        assert!(bad.value.is_none());
    }

    #[test]
    fn test_variant_from_text() {
        assert_eq!(
            Variant::from_text("on", DataType::Boolean).unwrap(),
            Variant::Boolean(true)
        );
        assert_eq!(
            Variant::from_text(" -12 ", DataType::Int16).unwrap(),
            Variant::Int16(-12)
        );
        assert_eq!(
            Variant::from_text("1.5", DataType::Double).unwrap(),
            Variant::Double(1.5)
        );
        assert_eq!(
            Variant::from_text("SGk=", DataType::ByteString).unwrap(),
            Variant::ByteString(b"Hi".to_vec())
        );
        assert!(Variant::from_text("maybe", DataType::Boolean).is_err());
        assert!(Variant::from_text("-1", DataType::Byte).is_err());
    }

    #[test]
    fn test_variant_coerce_numeric() {
        assert_eq!(
            Variant::Int64(300).coerce_to(DataType::UInt16).unwrap(),
            Variant::UInt16(300)
        );
        assert_eq!(
            Variant::Double(7.0).coerce_to(DataType::Int32).unwrap(),
            Variant::Int32(7)
        );
        assert_eq!(
            Variant::Int32(1).coerce_to(DataType::Boolean).unwrap(),
            Variant::Boolean(true)
        );
        assert!(Variant::Int32(-1).coerce_to(DataType::UInt32).is_err());
        assert!(Variant::Double(7.5).coerce_to(DataType::Int32).is_err());
    }

    #[test]
    fn test_variant_coerce_from_string() {
        assert_eq!(
            Variant::String("12.25".into()).coerce_to(DataType::Float).unwrap(),
            Variant::Float(12.25)
        );
        assert_eq!(
            Variant::Boolean(false).coerce_to(DataType::String).unwrap(),
            Variant::String("false".into())
        );
        assert!(Variant::Int32(5).coerce_to(DataType::Guid).is_err());
    }

    #[test]
    fn test_variant_serializes_plain() {
        assert_eq!(serde_json::to_string(&Variant::Int32(5)).unwrap(), "5");
        assert_eq!(serde_json::to_string(&Variant::Null).unwrap(), "null");
        assert_eq!(
            serde_json::to_string(&Variant::String("a".into())).unwrap(),
            "\"a\""
        );
    }

    #[test]
    fn test_parameters_from_timing() {
        let timing = SubscriptionTiming::derive(250).unwrap();
        let monitor = MonitorParameters::from(timing);
        assert_eq!(monitor.queue_size, 10);
        assert!(monitor.discard_oldest);
        assert_eq!(monitor.sampling_interval_ms, 250);

        let publish = PublishParameters::from(timing);
        assert_eq!(publish.timing.keep_alive_count, 40);
    }

    #[test]
    fn test_node_class_mapping() {
        assert_eq!(NodeClass::from_value(2), NodeClass::Variable);
        assert_eq!(NodeClass::from_value(3), NodeClass::Unspecified);
    }

    #[test]
    fn test_session_event_reason() {
        let event = SessionEvent::KeepAliveFailed {
            reason: "no publish response".into(),
        };
        assert_eq!(event.failure_reason(), Some("no publish response"));
        assert_eq!(event.kind(), "keep_alive_failed");
    }

    fn value_change(subscription_id: u32) -> SessionEvent {
        SessionEvent::ValueChanged(ValueChange {
            subscription_id,
            value: ReadResult::good(NodeId::numeric(2, 1001), Variant::Double(1.0)),
        })
    }

    #[test]
    fn test_event_sink_keeps_room_for_lifecycle_events() {
        let (sink, mut receiver) = EventSink::channel(8);

        let accepted = (0..100).filter(|n| sink.emit(value_change(*n))).count();
        assert_eq!(accepted, 8);

        assert!(sink.emit(SessionEvent::ConnectionLost {
            reason: "transport disconnected".into(),
        }));
        assert!(sink.emit(SessionEvent::SessionClosed {
            reason: "BadSessionClosed".into(),
        }));

        let mut kinds = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            kinds.push(event.kind());
        }
        assert_eq!(kinds.len(), 10);
        assert_eq!(&kinds[8..], ["connection_lost", "session_closed"]);
    }

    #[test]
    fn test_event_sink_resumes_value_changes_after_drain() {
        let (sink, mut receiver) = EventSink::channel(1);

        assert!(sink.emit(value_change(1)));
        assert!(!sink.emit(value_change(2)));

        assert!(receiver.try_recv().is_ok());
        assert!(sink.emit(value_change(3)));

        drop(receiver);
        assert!(!sink.emit(SessionEvent::KeepAliveFailed {
            reason: "BadTimeout".into(),
        }));
    }
}
