// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema definitions for plclink.
//!
//! # Schema Structure
//!
//! ```text
//! LinkConfig
//! ├── connection: ConnectionSection
//! │   └── auth: AuthSection
//! ├── subscriptions: SubscriptionSection
//! └── logging: LoggingConfig
//! ```
//!
//! Security policy and mode are kept as free-form tokens. They are resolved
//! leniently when the connection is opened, so an unknown token falls back
//! to no security instead of failing the load.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// =============================================================================
// Constants
// =============================================================================

/// Default subscription publishing interval in milliseconds.
pub const DEFAULT_INTERVAL_MS: u32 = 1000;

/// Default session timeout.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(60);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default application name announced to servers.
pub const DEFAULT_APPLICATION_NAME: &str = "plclink";

/// Required endpoint URL scheme.
pub const ENDPOINT_SCHEME: &str = "opc.tcp://";

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// The root configuration structure for plclink.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkConfig {
    /// Server connection settings.
    #[serde(default)]
    pub connection: ConnectionSection,

    /// Subscription defaults.
    #[serde(default)]
    pub subscriptions: SubscriptionSection,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LinkConfig {
    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.connection.validate()?;
        self.subscriptions.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

// =============================================================================
// Connection
// =============================================================================

/// Server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionSection {
    /// Endpoint URL (`opc.tcp://host:port[/path]`). May be supplied on the
    /// command line instead.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Security policy token, e.g. `Basic256Sha256`.
    #[serde(default)]
    pub security_policy: Option<String>,

    /// Security mode token, e.g. `SignAndEncrypt`.
    #[serde(default)]
    pub security_mode: Option<String>,

    /// Authentication.
    #[serde(default)]
    pub auth: AuthSection,

    /// Application name announced in the session.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Requested session timeout.
    #[serde(default = "default_session_timeout", with = "duration_text")]
    pub session_timeout: Duration,

    /// Upper bound on the connect handshake.
    #[serde(default = "default_connect_timeout", with = "duration_text")]
    pub connect_timeout: Duration,

    /// Node read by the liveness probe. Defaults to the server state node.
    #[serde(default)]
    pub probe_node: Option<String>,
}

impl ConnectionSection {
    /// Validates the connection section.
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(endpoint) = &self.endpoint {
            if endpoint.trim().is_empty() {
                return Err(ConfigError::validation(
                    "connection.endpoint",
                    "cannot be empty",
                ));
            }
            if !endpoint.starts_with(ENDPOINT_SCHEME) {
                return Err(ConfigError::validation(
                    "connection.endpoint",
                    format!("must start with '{ENDPOINT_SCHEME}'"),
                ));
            }
        }

        if self.connect_timeout.is_zero() {
            return Err(ConfigError::validation(
                "connection.connect_timeout",
                "must be greater than zero",
            ));
        }

        self.auth.validate()
    }
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            security_policy: None,
            security_mode: None,
            auth: AuthSection::default(),
            application_name: default_application_name(),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            probe_node: None,
        }
    }
}

fn default_application_name() -> String {
    DEFAULT_APPLICATION_NAME.to_string()
}

fn default_session_timeout() -> Duration {
    DEFAULT_SESSION_TIMEOUT
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

// =============================================================================
// Authentication
// =============================================================================

/// Session authentication.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthSection {
    /// Authentication mode.
    #[serde(default)]
    pub mode: AuthMode,

    /// Username for password authentication.
    #[serde(default)]
    pub username: Option<String>,

    /// Password for password authentication.
    #[serde(default)]
    pub password: Option<SecretValue>,
}

impl AuthSection {
    /// Validates the auth section.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.mode == AuthMode::Username {
            if self.username.as_deref().is_none_or(str::is_empty) {
                return Err(ConfigError::missing_field("connection.auth.username"));
            }
            if self.password.as_ref().is_none_or(SecretValue::is_empty) {
                return Err(ConfigError::missing_field("connection.auth.password"));
            }
        }
        Ok(())
    }
}

/// Authentication mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Anonymous.
    #[default]
    Anonymous,
    /// Username and password.
    Username,
}

impl AuthMode {
    /// Returns the mode name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::Anonymous => "anonymous",
            AuthMode::Username => "username",
        }
    }
}

impl FromStr for AuthMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anonymous" | "none" => Ok(AuthMode::Anonymous),
            "username" | "password" | "userpass" => Ok(AuthMode::Username),
            other => Err(ConfigError::validation(
                "connection.auth.mode",
                format!("unknown auth mode '{other}'"),
            )),
        }
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Subscription defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionSection {
    /// Publishing interval used when a command does not give one.
    #[serde(default = "default_interval_ms")]
    pub default_interval_ms: u32,

    /// Read each subscribed node once to seed the value cache.
    #[serde(default = "default_enabled")]
    pub seed_initial_value: bool,
}

impl SubscriptionSection {
    /// Validates the subscription section.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_interval_ms == 0 {
            return Err(ConfigError::validation(
                "subscriptions.default_interval_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for SubscriptionSection {
    fn default() -> Self {
        Self {
            default_interval_ms: DEFAULT_INTERVAL_MS,
            seed_initial_value: true,
        }
    }
}

fn default_interval_ms() -> u32 {
    DEFAULT_INTERVAL_MS
}

fn default_enabled() -> bool {
    true
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,
}

impl LoggingConfig {
    /// Validates the logging configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        Ok(())
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Returns the filter directive for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(ConfigError::validation(
                "logging.level",
                format!("unknown log level '{other}'"),
            )),
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Single-line compact text.
    Compact,
    /// JSON lines.
    Json,
}

impl LogFormat {
    /// Returns the format name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Compact => "compact",
            LogFormat::Json => "json",
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::validation(
                "logging.format",
                format!("unknown log format '{other}'"),
            )),
        }
    }
}

// =============================================================================
// Secret Value
// =============================================================================

/// A secret that never prints its content.
///
/// Serializes as `***`, so dumping a loaded configuration is safe.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct SecretValue(String);

impl SecretValue {
    /// Creates a new secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(***)")
    }
}

impl Serialize for SecretValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***")
    }
}

// =============================================================================
// Duration serde
// =============================================================================

/// Durations as humantime text (`"10s"`, `"1m 30s"`).
mod duration_text {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
