// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the connection manager.
//!
//! # Error Categories
//!
//! ```text
//! UaError
//! ├── Config     - Invalid connect parameters or inputs
//! ├── State      - AlreadyConnected / NotConnected
//! ├── Connection - Classified connect failures (raw text preserved)
//! ├── Resource   - Registered nodes and subscriptions
//! ├── Operation  - Read/write rejected by status code
//! └── Session    - Raw protocol session failures
//! ```
//!
//! # Examples
//!
//! ```
//! use plclink_ua::error::{ConnectionError, SessionError, UaError};
//!
//! let raw = UaError::from(SessionError::refused("ECONNREFUSED 127.0.0.1:4840"));
//! let classified = ConnectionError::classify("opc.tcp://127.0.0.1:4840", &raw);
//!
//! assert!(matches!(classified, ConnectionError::Refused { .. }));
//! assert!(classified.raw().contains("ECONNREFUSED"));
//! ```

use std::fmt;

use thiserror::Error;
use tracing::Level;

use crate::types::StatusCode;

// =============================================================================
// UaError - Main Error Type
// =============================================================================

/// The main error type for manager operations.
#[derive(Debug, Error)]
pub enum UaError {
    /// Invalid configuration or input.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The operation is not valid in the current connection state.
    #[error("{0}")]
    State(#[from] StateError),

    /// A classified connect failure.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// Registered node or subscription bookkeeping errors.
    #[error("{0}")]
    Resource(#[from] ResourceError),

    /// The server answered with a non-good status code.
    #[error("{0}")]
    Operation(#[from] OperationError),

    /// A protocol session failure, surfaced verbatim.
    #[error("{0}")]
    Session(#[from] SessionError),
}

impl UaError {
    // =========================================================================
    // Convenience Factory Methods
    // =========================================================================

    /// Creates an already connected error.
    pub fn already_connected(endpoint: impl Into<String>) -> Self {
        Self::State(StateError::AlreadyConnected {
            endpoint: endpoint.into(),
        })
    }

    /// Creates a not connected error.
    pub fn not_connected() -> Self {
        Self::State(StateError::NotConnected)
    }

    /// Creates a node not accessible error.
    pub fn node_not_accessible(node_id: impl Into<String>, status: StatusCode) -> Self {
        Self::Resource(ResourceError::NodeNotAccessible {
            node_id: node_id.into(),
            status,
        })
    }

    /// Creates a registered node not found error.
    pub fn registered_node_not_found(handle: impl Into<String>) -> Self {
        Self::Resource(ResourceError::RegisteredNodeNotFound {
            handle: handle.into(),
        })
    }

    /// Creates a subscription not found error.
    pub fn subscription_not_found(handle: impl Into<String>) -> Self {
        Self::Resource(ResourceError::SubscriptionNotFound {
            handle: handle.into(),
        })
    }

    /// Creates a read rejected error.
    pub fn read_rejected(node_id: impl Into<String>, status: StatusCode) -> Self {
        Self::Operation(OperationError::ReadRejected {
            node_id: node_id.into(),
            status,
        })
    }

    /// Creates a write rejected error.
    pub fn write_rejected(node_id: impl Into<String>, status: StatusCode) -> Self {
        Self::Operation(OperationError::WriteRejected {
            node_id: node_id.into(),
            status,
        })
    }

    // =========================================================================
    // Error Properties
    // =========================================================================

    /// Returns `true` if the underlying cause looks like a lost connection.
    ///
    /// Only raw session failures qualify; classified and bookkeeping errors
    /// never do.
    pub fn is_connection_loss(&self) -> bool {
        match self {
            Self::Session(e) => e.is_connection_loss(),
            _ => false,
        }
    }

    /// Returns `true` if this error is `NotConnected`.
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::State(StateError::NotConnected))
    }

    /// Returns `true` if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_retryable(),
            Self::Session(e) => e.is_retryable(),
            Self::State(StateError::NotConnected) => true,
            Self::Config(_) | Self::State(_) | Self::Resource(_) | Self::Operation(_) => false,
        }
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Config(_) => ErrorSeverity::Critical,
            Self::State(_) => ErrorSeverity::Warning,
            Self::Connection(e) => e.severity(),
            Self::Resource(_) => ErrorSeverity::Warning,
            Self::Operation(_) => ErrorSeverity::Warning,
            Self::Session(e) => e.severity(),
        }
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::State(_) => "state",
            Self::Connection(_) => "connection",
            Self::Resource(_) => "resource",
            Self::Operation(_) => "operation",
            Self::Session(_) => "session",
        }
    }

    /// Returns a unique error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Config(e) => e.error_code(),
            Self::State(e) => e.error_code(),
            Self::Connection(e) => e.error_code(),
            Self::Resource(e) => e.error_code(),
            Self::Operation(e) => e.error_code(),
            Self::Session(e) => e.error_code(),
        }
    }

    /// Returns recovery hints for this error.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::Config(e) => e.recovery_hints(),
            Self::State(e) => e.recovery_hints(),
            Self::Connection(e) => e.recovery_hints(),
            Self::Resource(e) => e.recovery_hints(),
            Self::Operation(e) => e.recovery_hints(),
            Self::Session(e) => e.recovery_hints(),
        }
    }

    /// Returns the tracing level for this error.
    pub fn tracing_level(&self) -> Level {
        self.severity().to_tracing_level()
    }

    /// Logs this error with appropriate level and context.
    pub fn log(&self, context: &str) {
        let code = self.error_code();

        match self.tracing_level() {
            Level::ERROR => tracing::error!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            _ => tracing::debug!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
        }
    }
}

// =============================================================================
// ConfigError
// =============================================================================

/// Invalid connect parameters or caller input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required field is absent or empty.
    #[error("Missing required field: {field}")]
    MissingField {
        /// The field name.
        field: &'static str,
    },

    /// Password authentication without a username or password.
    #[error("Password authentication requires both username and password")]
    MissingCredentials,

    /// A node identifier could not be parsed.
    #[error("Invalid node id '{node_id}': {reason}")]
    InvalidNodeId {
        /// The offending text.
        node_id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A value cannot be represented as the requested data type.
    #[error("Cannot convert '{value}' to {data_type}: {reason}")]
    InvalidValue {
        /// The value as text.
        value: String,
        /// Target data type name.
        data_type: String,
        /// Why conversion failed.
        reason: String,
    },

    /// A data type name was not recognised.
    #[error("Unknown data type: '{name}'")]
    UnknownDataType {
        /// The name given.
        name: String,
    },

    /// Publishing interval must be positive.
    #[error("Publishing interval must be greater than zero")]
    InvalidInterval,
}

impl ConfigError {
    /// Creates a missing field error.
    pub fn missing_field(field: &'static str) -> Self {
        Self::MissingField { field }
    }

    /// Creates an invalid node id error.
    pub fn invalid_node_id(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(
        value: impl Into<String>,
        data_type: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            value: value.into(),
            data_type: data_type.into(),
            reason: reason.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        let code = match self {
            Self::MissingField { .. } => 1,
            Self::MissingCredentials => 2,
            Self::InvalidNodeId { .. } => 3,
            Self::InvalidValue { .. } => 4,
            Self::UnknownDataType { .. } => 5,
            Self::InvalidInterval => 6,
        };
        ErrorCode::new(8, code)
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::MissingField { .. } => vec!["Provide the missing field"],
            Self::MissingCredentials => {
                vec!["Set both username and password, or use anonymous authentication"]
            }
            Self::InvalidNodeId { .. } => {
                vec!["Use the form ns=<index>;s=<name> or ns=<index>;i=<number>"]
            }
            Self::InvalidValue { .. } | Self::UnknownDataType { .. } => {
                vec!["Check the value against the node's data type"]
            }
            Self::InvalidInterval => vec!["Use an interval of at least 1 ms"],
        }
    }
}

// =============================================================================
// StateError
// =============================================================================

/// The operation does not fit the current connection state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    /// `connect` issued while not disconnected.
    #[error("Already connected to '{endpoint}'")]
    AlreadyConnected {
        /// Endpoint of the active (or pending) connection.
        endpoint: String,
    },

    /// Operation issued while not connected.
    #[error("Not connected")]
    NotConnected,
}

impl StateError {
    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::AlreadyConnected { .. } => ErrorCode::new(2, 1),
            Self::NotConnected => ErrorCode::new(2, 2),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::AlreadyConnected { .. } => vec!["Disconnect before connecting again"],
            Self::NotConnected => vec![
                "Connect before issuing operations",
                "If the connection faulted, reconnect",
            ],
        }
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// A connect failure, coarsely classified.
///
/// Every variant keeps the raw text of the underlying failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// The server did not answer in time.
    #[error("Connection to '{endpoint}' timed out: {raw}")]
    Timeout {
        /// Target endpoint.
        endpoint: String,
        /// Underlying error text.
        raw: String,
    },

    /// The server or network refused the connection.
    #[error("Connection to '{endpoint}' refused: {raw}")]
    Refused {
        /// Target endpoint.
        endpoint: String,
        /// Underlying error text.
        raw: String,
    },

    /// The server rejected keep-alive or lifetime parameters.
    #[error("Keep-alive misconfigured for '{endpoint}': {raw}")]
    KeepAliveMisconfigured {
        /// Target endpoint.
        endpoint: String,
        /// Underlying error text.
        raw: String,
    },

    /// Anything else.
    #[error("Connection to '{endpoint}' failed: {raw}")]
    Unknown {
        /// Target endpoint.
        endpoint: String,
        /// Underlying error text.
        raw: String,
    },
}

const TIMEOUT_SIGNATURES: &[&str] = &["timed out", "timeout", "etimedout"];
const REFUSED_SIGNATURES: &[&str] = &[
    "refused",
    "econnrefused",
    "badconnectionrejected",
    "ehostunreach",
    "enotfound",
];
const KEEP_ALIVE_SIGNATURES: &[&str] = &["keepalive", "keep-alive", "keep alive", "lifetime"];

impl ConnectionError {
    /// Classifies a connect failure, preserving its text.
    pub fn classify(endpoint: impl Into<String>, error: &UaError) -> Self {
        let endpoint = endpoint.into();
        let raw = error.to_string();

        match error {
            UaError::Session(SessionError::TimedOut { .. }) => Self::Timeout { endpoint, raw },
            UaError::Session(SessionError::Refused { .. }) => Self::Refused { endpoint, raw },
            _ => Self::classify_text(endpoint, raw),
        }
    }

    /// Classifies from raw text alone.
    pub fn classify_text(endpoint: impl Into<String>, raw: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        let raw = raw.into();
        let lower = raw.to_ascii_lowercase();
        let matches = |signatures: &[&str]| signatures.iter().any(|s| lower.contains(s));

        if matches(KEEP_ALIVE_SIGNATURES) {
            Self::KeepAliveMisconfigured { endpoint, raw }
        } else if matches(TIMEOUT_SIGNATURES) {
            Self::Timeout { endpoint, raw }
        } else if matches(REFUSED_SIGNATURES) {
            Self::Refused { endpoint, raw }
        } else {
            Self::Unknown { endpoint, raw }
        }
    }

    /// Returns the endpoint the connect was aimed at.
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Timeout { endpoint, .. }
            | Self::Refused { endpoint, .. }
            | Self::KeepAliveMisconfigured { endpoint, .. }
            | Self::Unknown { endpoint, .. } => endpoint,
        }
    }

    /// Returns the raw underlying error text.
    pub fn raw(&self) -> &str {
        match self {
            Self::Timeout { raw, .. }
            | Self::Refused { raw, .. }
            | Self::KeepAliveMisconfigured { raw, .. }
            | Self::Unknown { raw, .. } => raw,
        }
    }

    /// Returns the short kind name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Refused { .. } => "refused",
            Self::KeepAliveMisconfigured { .. } => "keep_alive_misconfigured",
            Self::Unknown { .. } => "unknown",
        }
    }

    /// Returns `true` if the connect may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Refused { .. })
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::KeepAliveMisconfigured { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        let code = match self {
            Self::Timeout { .. } => 1,
            Self::Refused { .. } => 2,
            Self::KeepAliveMisconfigured { .. } => 3,
            Self::Unknown { .. } => 4,
        };
        ErrorCode::new(1, code)
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::Timeout { .. } => vec![
                "Check network latency to the server",
                "Increase the connect timeout",
            ],
            Self::Refused { .. } => vec![
                "Verify the endpoint host and port",
                "Check that the server is running",
                "Check firewall rules",
            ],
            Self::KeepAliveMisconfigured { .. } => vec![
                "Check the server's minimum keep-alive and lifetime limits",
                "Increase the session timeout",
            ],
            Self::Unknown { .. } => vec!["Inspect the raw error text", "Check server logs"],
        }
    }
}

// =============================================================================
// ResourceError
// =============================================================================

/// Registered node and subscription bookkeeping errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResourceError {
    /// Verification read returned a non-good status.
    #[error("Node '{node_id}' is not accessible: {status}")]
    NodeNotAccessible {
        /// The node that failed verification.
        node_id: String,
        /// Quality reported by the verification read.
        status: StatusCode,
    },

    /// The registered handle is unknown.
    #[error("Registered node not found: '{handle}'")]
    RegisteredNodeNotFound {
        /// The handle given.
        handle: String,
    },

    /// The subscription handle is unknown.
    #[error("Subscription not found: '{handle}'")]
    SubscriptionNotFound {
        /// The handle given.
        handle: String,
    },
}

impl ResourceError {
    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        let code = match self {
            Self::NodeNotAccessible { .. } => 1,
            Self::RegisteredNodeNotFound { .. } => 2,
            Self::SubscriptionNotFound { .. } => 3,
        };
        ErrorCode::new(4, code)
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::NodeNotAccessible { .. } => vec![
                "Verify the node exists and is readable",
                "Check user access rights on the node",
            ],
            Self::RegisteredNodeNotFound { .. } => {
                vec!["List registered nodes to find valid handles"]
            }
            Self::SubscriptionNotFound { .. } => {
                vec!["List active subscriptions to find valid handles"]
            }
        }
    }
}

// =============================================================================
// OperationError
// =============================================================================

/// The server processed the request but answered with a non-good status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OperationError {
    /// Read returned a bad status.
    #[error("Read of '{node_id}' rejected: {status}")]
    ReadRejected {
        /// Target node.
        node_id: String,
        /// Returned status.
        status: StatusCode,
    },

    /// Write returned a non-good status.
    #[error("Write to '{node_id}' rejected: {status}")]
    WriteRejected {
        /// Target node.
        node_id: String,
        /// Returned status.
        status: StatusCode,
    },
}

impl OperationError {
    /// Returns the status code the server reported.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ReadRejected { status, .. } | Self::WriteRejected { status, .. } => *status,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::ReadRejected { .. } => ErrorCode::new(5, 1),
            Self::WriteRejected { .. } => ErrorCode::new(5, 2),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self.status().name() {
            "BadNodeIdUnknown" | "BadNodeIdInvalid" => vec!["Verify the node id"],
            "BadNotReadable" | "BadNotWritable" | "BadUserAccessDenied" => {
                vec!["Check the node's access level and user rights"]
            }
            "BadTypeMismatch" => vec!["Pass a data type hint matching the node"],
            _ => vec!["Inspect the status code"],
        }
    }
}

// =============================================================================
// SessionError
// =============================================================================

/// A failure reported by the protocol session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The session was closed.
    #[error("Session closed{}", reason_suffix(.reason))]
    Closed {
        /// Reason, if known.
        reason: Option<String>,
    },

    /// The underlying connection was closed.
    #[error("Connection closed{}", reason_suffix(.reason))]
    ConnectionClosed {
        /// Reason, if known.
        reason: Option<String>,
    },

    /// The connection attempt was refused.
    #[error("Connection refused: {message}")]
    Refused {
        /// Detail text.
        message: String,
    },

    /// A request timed out.
    #[error("{service} timed out: {message}")]
    TimedOut {
        /// The service that timed out.
        service: String,
        /// Detail text.
        message: String,
    },

    /// A service call failed with a status code.
    #[error("{service} failed: {status}")]
    ServiceFault {
        /// The failing service.
        service: String,
        /// The returned status.
        status: StatusCode,
    },

    /// Any other transport failure.
    #[error("Transport error: {message}")]
    Transport {
        /// Detail text.
        message: String,
    },
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default()
}

/// Status codes that mean the session or connection is gone.
const CONNECTION_LOSS_STATUSES: &[StatusCode] = &[
    StatusCode::BAD_TIMEOUT,
    StatusCode::BAD_COMMUNICATION_ERROR,
    StatusCode::BAD_SERVER_NOT_CONNECTED,
    StatusCode::BAD_SESSION_ID_INVALID,
    StatusCode::BAD_SESSION_CLOSED,
    StatusCode::BAD_SESSION_NOT_ACTIVATED,
    StatusCode::BAD_SECURE_CHANNEL_CLOSED,
    StatusCode::BAD_NOT_CONNECTED,
    StatusCode::BAD_CONNECTION_REJECTED,
    StatusCode::BAD_CONNECTION_CLOSED,
];

const CONNECTION_LOSS_SIGNATURES: &[&str] = &[
    "session closed",
    "sessionclosed",
    "connection closed",
    "connectionclosed",
    "refused",
    "timed out",
    "timeout",
    "broken pipe",
    "connection reset",
];

impl SessionError {
    /// Creates a session closed error.
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::Closed {
            reason: Some(reason.into()),
        }
    }

    /// Creates a connection closed error.
    pub fn connection_closed(reason: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            reason: Some(reason.into()),
        }
    }

    /// Creates a refused error.
    pub fn refused(message: impl Into<String>) -> Self {
        Self::Refused {
            message: message.into(),
        }
    }

    /// Creates a timed out error.
    pub fn timed_out(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TimedOut {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Creates a service fault.
    pub fn service_fault(service: impl Into<String>, status: StatusCode) -> Self {
        Self::ServiceFault {
            service: service.into(),
            status,
        }
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Returns `true` if this failure means the session can no longer be used.
    pub fn is_connection_loss(&self) -> bool {
        match self {
            Self::Closed { .. }
            | Self::ConnectionClosed { .. }
            | Self::Refused { .. }
            | Self::TimedOut { .. } => true,
            Self::ServiceFault { status, .. } => CONNECTION_LOSS_STATUSES.contains(status),
            Self::Transport { message } => {
                let lower = message.to_ascii_lowercase();
                CONNECTION_LOSS_SIGNATURES.iter().any(|s| lower.contains(s))
            }
        }
    }

    /// Returns `true` if the call may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TimedOut { .. } | Self::Transport { .. })
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        if self.is_connection_loss() {
            ErrorSeverity::Error
        } else {
            ErrorSeverity::Warning
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        let code = match self {
            Self::Closed { .. } => 1,
            Self::ConnectionClosed { .. } => 2,
            Self::Refused { .. } => 3,
            Self::TimedOut { .. } => 4,
            Self::ServiceFault { .. } => 5,
            Self::Transport { .. } => 6,
        };
        ErrorCode::new(3, code)
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        if self.is_connection_loss() {
            vec!["Reconnect to the server"]
        } else {
            vec!["Inspect the status code", "Check server diagnostics"]
        }
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Informational - no action required.
    Info,
    /// Warning - action may be required.
    Warning,
    /// Error - action required, but recoverable.
    Error,
    /// Critical - immediate action required.
    Critical,
}

impl ErrorSeverity {
    /// Converts to tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error | Self::Critical => Level::ERROR,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// ErrorCode
// =============================================================================

/// Structured error code.
///
/// Format: `UA-XXYY` where XX is category and YY is specific error.
///
/// Categories:
/// - 1: Connection
/// - 2: State
/// - 3: Session
/// - 4: Resource
/// - 5: Operation
/// - 8: Config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category.
    pub category: u8,
    /// Specific error within category.
    pub code: u8,
}

impl ErrorCode {
    /// Creates a new error code.
    pub const fn new(category: u8, code: u8) -> Self {
        Self { category, code }
    }

    /// Returns the full error code as a u16.
    pub fn as_u16(&self) -> u16 {
        ((self.category as u16) << 8) | (self.code as u16)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UA-{:02X}{:02X}", self.category, self.code)
    }
}

/// A Result type with UaError.
pub type UaResult<T> = Result<T, UaError>;

// =============================================================================
// Tests
// =============================================================================
