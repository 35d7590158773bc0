// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # plclink-config
//!
//! Configuration management for the plclink OPC UA client.
//!
//! ## Features
//!
//! - **Schema Definition**: connection, subscription and logging sections with validation
//! - **Multi-Format Support**: YAML, TOML, and JSON configuration files
//! - **Environment Overrides**: `PLCLINK_*` variables override file values
//! - **Placeholders**: `${VAR}` and `${VAR:default}` in file content
//!
//! ## Quick Start
//!
//! ```no_run
//! use plclink_config::loader::load_config;
//!
//! let config = load_config("plclink.yaml").unwrap();
//! println!("Endpoint: {:?}", config.connection.endpoint);
//! ```
//!
//! ## Example File
//!
//! ```yaml
//! connection:
//!   endpoint: "opc.tcp://${PLC_HOST:localhost}:4840"
//!   security_policy: Basic256Sha256
//!   security_mode: SignAndEncrypt
//!   auth:
//!     mode: username
//!     username: operator
//!     password: "${PLC_PASSWORD}"
//!   connect_timeout: 10s
//!
//! subscriptions:
//!   default_interval_ms: 1000
//!
//! logging:
//!   level: info
//!   format: text
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod error;
pub mod loader;
pub mod schema;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{ConfigError, ConfigResult};
pub use schema::{
    AuthMode, AuthSection, ConnectionSection, LinkConfig, LogFormat, LogLevel, LoggingConfig,
    SecretValue, SubscriptionSection,
};

pub use loader::{
    ConfigFormat, ConfigLoader, ConfigLoaderBuilder, DEFAULT_ENV_PREFIX, load_config,
    load_config_str,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

// =============================================================================
// Tests
// =============================================================================
