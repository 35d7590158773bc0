// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Single-connection OPC UA resource manager.
//!
//! This crate sits between a request layer and an OPC UA protocol session.
//! One [`ConnectionManager`] owns one connection and the server-side
//! resources created on top of it, and guarantees that teardown, requested
//! or forced by failure, leaves no orphaned registrations or subscriptions.
//!
//! # Features
//!
//! - Connection supervision with liveness probing and asynchronous failure detection
//! - Node registration with accessibility verification
//! - Subscriptions with derived keep-alive and lifetime counts and cached values
//! - Ordered, best-effort cleanup that always resets local state
//! - `opcua-backend`: a [`ProtocolSession`] over the `opcua` client stack
//!
//! # Error Handling
//!
//! ```text
//! UaError
//! ├── Config     - Missing endpoint or credentials, bad input values
//! ├── State      - AlreadyConnected / NotConnected
//! ├── Connection - Timeout, Refused, KeepAliveMisconfigured, Unknown
//! ├── Resource   - NodeNotAccessible, RegisteredNodeNotFound, SubscriptionNotFound
//! ├── Operation  - ReadRejected, WriteRejected
//! └── Session    - Raw protocol session failures
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use plclink_ua::{ConnectionConfig, ConnectionManager, OpcUaSession, SubscriptionTarget};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = ConnectionManager::new(OpcUaSession::new());
//!
//!     let config = ConnectionConfig::builder()
//!         .endpoint("opc.tcp://localhost:4840")
//!         .security(Some("Basic256Sha256"), Some("SignAndEncrypt"))
//!         .username("operator", "secret")
//!         .build();
//!     manager.connect(config).await?;
//!
//!     let handle = manager.register_node(&"ns=2;s=Line1.Speed".parse()?).await?;
//!     let subscription = manager
//!         .subscribe(SubscriptionTarget::Registered(handle), 500)
//!         .await?;
//!
//!     if let Some(value) = manager.get_subscription_value(&subscription).await? {
//!         println!("{} ({})", value.value, value.status);
//!     }
//!
//!     manager.disconnect().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod manager;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use error::{
    ConfigError, ConnectionError, ErrorCode, ErrorSeverity, OperationError, ResourceError,
    SessionError, StateError, UaError, UaResult,
};

pub use types::{
    AuthMode, ConnectionConfig, ConnectionConfigBuilder, Credentials, DataType, Identity, NodeId,
    NodeIdentifier, SecurityMode, SecurityPolicy, StatusCode, SubscriptionTiming,
    resolve_security,
};

pub use session::{
    BrowseReference, EventSink, LIFECYCLE_RESERVE, MonitorParameters, NodeClass, ProtocolSession,
    PublishParameters, ReadResult, SessionEvent, ValueChange, Variant, WriteResult,
};

#[cfg(feature = "opcua-backend")]
pub use session::OpcUaSession;

pub use manager::{
    CleanupReason, ConnectInfo, ConnectionManager, ConnectionState, ConnectionStatus,
    ManagerSettings, ManagerStats, RegisteredHandle, RegisteredNode, StepFailure,
    SubscriptionHandle, SubscriptionInfo, SubscriptionTarget, TeardownReport, TeardownStep,
    UnregisterOutcome, ValueSnapshot, ValueUpdate,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
