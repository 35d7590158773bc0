// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Protocol session seam.
//!
//! - [`ProtocolSession`]: the trait the manager drives
//! - [`OpcUaSession`]: implementation over the `opcua` crate
//!   (feature `opcua-backend`)

mod protocol;

#[cfg(feature = "opcua-backend")]
mod opcua_backend;

pub use protocol::{
    BrowseReference, EventSink, LIFECYCLE_RESERVE, MonitorParameters, NodeClass, ProtocolSession,
    PublishParameters, ReadResult, SessionEvent, ValueChange, Variant, WriteResult,
};

#[cfg(feature = "opcua-backend")]
pub use opcua_backend::{DEFAULT_EVENT_CAPACITY, OpcUaSession};
