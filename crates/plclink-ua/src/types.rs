// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Domain types shared by the session seam and the manager.
//!
//! - **NodeId**: node identifiers with the `ns=<n>;{i|s|g|b}=<id>` text form
//! - **DataType / StatusCode**: value type tags and per-value quality
//! - **SecurityPolicy / SecurityMode**: security pair with lenient token resolution
//! - **ConnectionConfig**: everything `connect` needs, with builder
//! - **SubscriptionTiming**: publish-cycle timing derived from an interval
//!
//! # Examples
//!
//! ```
//! use plclink_ua::types::{ConnectionConfig, NodeId, SecurityMode, SubscriptionTiming};
//!
//! let node: NodeId = "ns=2;s=Line1.Temperature".parse().unwrap();
//! assert_eq!(node.namespace_index, 2);
//!
//! let config = ConnectionConfig::builder()
//!     .endpoint("opc.tcp://plc:4840")
//!     .security(Some("basic256sha256"), Some("bogus"))
//!     .build();
//! assert_eq!(config.security_mode, SecurityMode::None);
//!
//! let timing = SubscriptionTiming::derive(500).unwrap();
//! assert_eq!((timing.keep_alive_count, timing.lifetime_count), (20, 60));
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConfigError, UaError};

// =============================================================================
// NodeId
// =============================================================================

/// Node identifier.
///
/// A namespace index plus a numeric, string, GUID or opaque identifier.
/// Serialized as its text form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId {
    /// Namespace index (0 = standard namespace).
    pub namespace_index: u16,

    /// The identifier within the namespace.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    /// `Objects` folder, the usual browse root.
    pub const OBJECTS_FOLDER: NodeId = NodeId::numeric(0, 85);

    /// `Server` object.
    pub const SERVER: NodeId = NodeId::numeric(0, 2253);

    /// `Server_ServerStatus_State`, present on every server.
    pub const SERVER_STATUS_STATE: NodeId = NodeId::numeric(0, 2259);

    /// `Server_ServerStatus_CurrentTime`.
    pub const SERVER_STATUS_CURRENT_TIME: NodeId = NodeId::numeric(0, 2258);

    /// Creates a numeric node id.
    #[inline]
    pub const fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    /// Creates a string node id.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(value.into()),
        }
    }

    /// Creates a GUID node id.
    #[inline]
    pub fn guid(namespace_index: u16, value: Uuid) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Guid(value),
        }
    }

    /// Creates an opaque node id.
    #[inline]
    pub fn opaque(namespace_index: u16, value: Vec<u8>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Opaque(value),
        }
    }

    /// Returns the numeric identifier, if numeric.
    pub fn as_numeric(&self) -> Option<u32> {
        match self.identifier {
            NodeIdentifier::Numeric(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the string identifier, if a string.
    pub fn as_string(&self) -> Option<&str> {
        match &self.identifier {
            NodeIdentifier::String(v) => Some(v),
            _ => None,
        }
    }

    /// Converts to the text form.
    ///
    /// Namespace 0 is omitted.
    ///
    /// ```
    /// use plclink_ua::types::NodeId;
    ///
    /// assert_eq!(NodeId::numeric(2, 1001).to_opc_string(), "ns=2;i=1001");
    /// assert_eq!(NodeId::OBJECTS_FOLDER.to_opc_string(), "i=85");
    /// ```
    pub fn to_opc_string(&self) -> String {
        if self.namespace_index == 0 {
            self.identifier.to_string()
        } else {
            format!("ns={};{}", self.namespace_index, self.identifier)
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_opc_string())
    }
}

impl FromStr for NodeId {
    type Err = UaError;

    /// Parses `ns=2;i=1001`, `ns=2;s=Name`, `ns=2;g=<uuid>`, `ns=2;b=<base64>`,
    /// or the same forms without `ns=` for namespace 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |reason: String| UaError::from(ConfigError::invalid_node_id(s, reason));

        let (namespace_index, identifier_part) = match s.strip_prefix("ns=") {
            Some(rest) => {
                let (ns, id) = rest
                    .split_once(';')
                    .ok_or_else(|| invalid("Missing identifier after namespace".into()))?;
                let ns: u16 = ns
                    .parse()
                    .map_err(|_| invalid("Invalid namespace index".into()))?;
                (ns, id)
            }
            None => (0, s),
        };

        let identifier = if let Some(id) = identifier_part.strip_prefix("i=") {
            NodeIdentifier::Numeric(
                id.parse()
                    .map_err(|_| invalid("Invalid numeric identifier".into()))?,
            )
        } else if let Some(id) = identifier_part.strip_prefix("s=") {
            if id.is_empty() {
                return Err(invalid("Empty string identifier".into()));
            }
            NodeIdentifier::String(id.to_string())
        } else if let Some(id) = identifier_part.strip_prefix("g=") {
            NodeIdentifier::Guid(
                Uuid::parse_str(id).map_err(|e| invalid(format!("Invalid GUID: {e}")))?,
            )
        } else if let Some(id) = identifier_part.strip_prefix("b=") {
            NodeIdentifier::Opaque(
                BASE64
                    .decode(id)
                    .map_err(|e| invalid(format!("Invalid base64: {e}")))?,
            )
        } else {
            return Err(invalid(
                "Unknown identifier type. Expected i=, s=, g=, or b=".into(),
            ));
        };

        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

impl TryFrom<String> for NodeId {
    type Error = UaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeId> for String {
    fn from(node: NodeId) -> Self {
        node.to_opc_string()
    }
}

/// The identifier part of a [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeIdentifier {
    /// Numeric identifier.
    Numeric(u32),
    /// String identifier.
    String(String),
    /// GUID identifier.
    Guid(Uuid),
    /// Opaque identifier.
    Opaque(Vec<u8>),
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "i={v}"),
            Self::String(v) => write!(f, "s={v}"),
            Self::Guid(v) => write!(f, "g={v}"),
            Self::Opaque(v) => write!(f, "b={}", BASE64.encode(v)),
        }
    }
}

// =============================================================================
// DataType
// =============================================================================

/// Declared data type of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Boolean.
    Boolean,
    /// Signed 8-bit integer.
    SByte,
    /// Unsigned 8-bit integer.
    Byte,
    /// Signed 16-bit integer.
    Int16,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 64-bit integer.
    UInt64,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// UTF-8 string.
    String,
    /// Timestamp.
    DateTime,
    /// GUID.
    Guid,
    /// Byte string.
    ByteString,
    /// No value or a type this crate does not model.
    Null,
}

impl DataType {
    /// Returns the type name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "Boolean",
            Self::SByte => "SByte",
            Self::Byte => "Byte",
            Self::Int16 => "Int16",
            Self::UInt16 => "UInt16",
            Self::Int32 => "Int32",
            Self::UInt32 => "UInt32",
            Self::Int64 => "Int64",
            Self::UInt64 => "UInt64",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::String => "String",
            Self::DateTime => "DateTime",
            Self::Guid => "Guid",
            Self::ByteString => "ByteString",
            Self::Null => "Null",
        }
    }

    /// Returns `true` for integer and floating point types.
    pub const fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::SByte
                | Self::Byte
                | Self::Int16
                | Self::UInt16
                | Self::Int32
                | Self::UInt32
                | Self::Int64
                | Self::UInt64
                | Self::Float
                | Self::Double
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = UaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bool" | "boolean" => Ok(Self::Boolean),
            "sbyte" | "int8" | "i8" => Ok(Self::SByte),
            "byte" | "uint8" | "u8" => Ok(Self::Byte),
            "int16" | "i16" | "short" => Ok(Self::Int16),
            "uint16" | "u16" | "ushort" => Ok(Self::UInt16),
            "int32" | "i32" | "int" => Ok(Self::Int32),
            "uint32" | "u32" | "uint" => Ok(Self::UInt32),
            "int64" | "i64" | "long" => Ok(Self::Int64),
            "uint64" | "u64" | "ulong" => Ok(Self::UInt64),
            "float" | "f32" | "single" | "real" => Ok(Self::Float),
            "double" | "f64" | "lreal" => Ok(Self::Double),
            "string" | "str" => Ok(Self::String),
            "datetime" | "date" | "time" => Ok(Self::DateTime),
            "guid" | "uuid" => Ok(Self::Guid),
            "bytestring" | "bytes" | "binary" => Ok(Self::ByteString),
            _ => Err(ConfigError::UnknownDataType { name: s.to_string() }.into()),
        }
    }
}

// =============================================================================
// StatusCode
// =============================================================================

/// Per-value quality reported by the server.
///
/// The top two bits carry severity: `00` good, `01` uncertain, `10` bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Good.
    pub const GOOD: StatusCode = StatusCode(0);
    /// BadUnexpectedError.
    pub const BAD_UNEXPECTED_ERROR: StatusCode = StatusCode(0x8001_0000);
    /// BadInternalError.
    pub const BAD_INTERNAL_ERROR: StatusCode = StatusCode(0x8002_0000);
    /// BadCommunicationError.
    pub const BAD_COMMUNICATION_ERROR: StatusCode = StatusCode(0x8005_0000);
    /// BadTimeout.
    pub const BAD_TIMEOUT: StatusCode = StatusCode(0x800A_0000);
    /// BadServiceUnsupported.
    pub const BAD_SERVICE_UNSUPPORTED: StatusCode = StatusCode(0x800B_0000);
    /// BadShutdown.
    pub const BAD_SHUTDOWN: StatusCode = StatusCode(0x800C_0000);
    /// BadServerNotConnected.
    pub const BAD_SERVER_NOT_CONNECTED: StatusCode = StatusCode(0x800D_0000);
    /// BadUserAccessDenied.
    pub const BAD_USER_ACCESS_DENIED: StatusCode = StatusCode(0x801F_0000);
    /// BadIdentityTokenRejected.
    pub const BAD_IDENTITY_TOKEN_REJECTED: StatusCode = StatusCode(0x8021_0000);
    /// BadSessionIdInvalid.
    pub const BAD_SESSION_ID_INVALID: StatusCode = StatusCode(0x8025_0000);
    /// BadSessionClosed.
    pub const BAD_SESSION_CLOSED: StatusCode = StatusCode(0x8026_0000);
    /// BadSessionNotActivated.
    pub const BAD_SESSION_NOT_ACTIVATED: StatusCode = StatusCode(0x8027_0000);
    /// BadSubscriptionIdInvalid.
    pub const BAD_SUBSCRIPTION_ID_INVALID: StatusCode = StatusCode(0x8028_0000);
    /// BadWaitingForInitialData.
    pub const BAD_WAITING_FOR_INITIAL_DATA: StatusCode = StatusCode(0x8032_0000);
    /// BadNodeIdInvalid.
    pub const BAD_NODE_ID_INVALID: StatusCode = StatusCode(0x8033_0000);
    /// BadNodeIdUnknown.
    pub const BAD_NODE_ID_UNKNOWN: StatusCode = StatusCode(0x8034_0000);
    /// BadNotReadable.
    pub const BAD_NOT_READABLE: StatusCode = StatusCode(0x803A_0000);
    /// BadNotWritable.
    pub const BAD_NOT_WRITABLE: StatusCode = StatusCode(0x803B_0000);
    /// BadOutOfRange.
    pub const BAD_OUT_OF_RANGE: StatusCode = StatusCode(0x803C_0000);
    /// BadTypeMismatch.
    pub const BAD_TYPE_MISMATCH: StatusCode = StatusCode(0x8074_0000);
    /// BadSecureChannelClosed.
    pub const BAD_SECURE_CHANNEL_CLOSED: StatusCode = StatusCode(0x8086_0000);
    /// BadNotConnected.
    pub const BAD_NOT_CONNECTED: StatusCode = StatusCode(0x808A_0000);
    /// BadOutOfService.
    pub const BAD_OUT_OF_SERVICE: StatusCode = StatusCode(0x808D_0000);
    /// BadConnectionRejected.
    pub const BAD_CONNECTION_REJECTED: StatusCode = StatusCode(0x80AC_0000);
    /// BadConnectionClosed.
    pub const BAD_CONNECTION_CLOSED: StatusCode = StatusCode(0x80AE_0000);
    /// UncertainLastUsableValue.
    pub const UNCERTAIN_LAST_USABLE_VALUE: StatusCode = StatusCode(0x4090_0000);

    const NAMES: &'static [(StatusCode, &'static str)] = &[
        (Self::GOOD, "Good"),
        (Self::BAD_UNEXPECTED_ERROR, "BadUnexpectedError"),
        (Self::BAD_INTERNAL_ERROR, "BadInternalError"),
        (Self::BAD_COMMUNICATION_ERROR, "BadCommunicationError"),
        (Self::BAD_TIMEOUT, "BadTimeout"),
        (Self::BAD_SERVICE_UNSUPPORTED, "BadServiceUnsupported"),
        (Self::BAD_SHUTDOWN, "BadShutdown"),
        (Self::BAD_SERVER_NOT_CONNECTED, "BadServerNotConnected"),
        (Self::BAD_USER_ACCESS_DENIED, "BadUserAccessDenied"),
        (Self::BAD_IDENTITY_TOKEN_REJECTED, "BadIdentityTokenRejected"),
        (Self::BAD_SESSION_ID_INVALID, "BadSessionIdInvalid"),
        (Self::BAD_SESSION_CLOSED, "BadSessionClosed"),
        (Self::BAD_SESSION_NOT_ACTIVATED, "BadSessionNotActivated"),
        (Self::BAD_SUBSCRIPTION_ID_INVALID, "BadSubscriptionIdInvalid"),
        (Self::BAD_WAITING_FOR_INITIAL_DATA, "BadWaitingForInitialData"),
        (Self::BAD_NODE_ID_INVALID, "BadNodeIdInvalid"),
        (Self::BAD_NODE_ID_UNKNOWN, "BadNodeIdUnknown"),
        (Self::BAD_NOT_READABLE, "BadNotReadable"),
        (Self::BAD_NOT_WRITABLE, "BadNotWritable"),
        (Self::BAD_OUT_OF_RANGE, "BadOutOfRange"),
        (Self::BAD_TYPE_MISMATCH, "BadTypeMismatch"),
        (Self::BAD_SECURE_CHANNEL_CLOSED, "BadSecureChannelClosed"),
        (Self::BAD_NOT_CONNECTED, "BadNotConnected"),
        (Self::BAD_OUT_OF_SERVICE, "BadOutOfService"),
        (Self::BAD_CONNECTION_REJECTED, "BadConnectionRejected"),
        (Self::BAD_CONNECTION_CLOSED, "BadConnectionClosed"),
        (Self::UNCERTAIN_LAST_USABLE_VALUE, "UncertainLastUsableValue"),
    ];

    /// Returns the raw code.
    #[inline]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Returns `true` if the severity is good.
    #[inline]
    pub const fn is_good(&self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    /// Returns `true` if the severity is uncertain.
    #[inline]
    pub const fn is_uncertain(&self) -> bool {
        self.0 & 0xC000_0000 == 0x4000_0000
    }

    /// Returns `true` if the severity is bad.
    #[inline]
    pub const fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Returns the symbolic name, ignoring the info bits.
    pub fn name(&self) -> &'static str {
        let code = self.0 & 0xFFFF_0000;
        Self::NAMES
            .iter()
            .find(|(status, _)| status.0 == code)
            .map(|(_, name)| *name)
            .unwrap_or(if self.is_good() {
                "Good"
            } else if self.is_uncertain() {
                "Uncertain"
            } else {
                "Bad"
            })
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.0)
    }
}

impl From<u32> for StatusCode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

// =============================================================================
// SecurityMode
// =============================================================================

/// Message security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Neither signed nor encrypted.
    #[default]
    None,
    /// Signed.
    Sign,
    /// Signed and encrypted.
    SignAndEncrypt,
}

impl SecurityMode {
    /// Resolves a free-form token, falling back to [`SecurityMode::None`].
    pub fn resolve(token: Option<&str>) -> Self {
        match token.map(str::trim).filter(|t| !t.is_empty()) {
            None => Self::None,
            Some(token) => token.parse().unwrap_or_else(|_| {
                tracing::warn!(token, "Unrecognised security mode, using None");
                Self::None
            }),
        }
    }

    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Sign => "Sign",
            Self::SignAndEncrypt => "SignAndEncrypt",
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SecurityMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "none" | "nosecurity" => Ok(Self::None),
            "sign" | "signed" => Ok(Self::Sign),
            "signandencrypt" | "signencrypt" | "encrypted" => Ok(Self::SignAndEncrypt),
            _ => Err(()),
        }
    }
}

// =============================================================================
// SecurityPolicy
// =============================================================================

/// Security policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityPolicy {
    /// No security.
    #[default]
    None,
    /// Basic128Rsa15 (deprecated).
    Basic128Rsa15,
    /// Basic256 (deprecated).
    Basic256,
    /// Basic256Sha256.
    Basic256Sha256,
    /// Aes128_Sha256_RsaOaep.
    Aes128Sha256RsaOaep,
    /// Aes256_Sha256_RsaPss.
    Aes256Sha256RsaPss,
}

impl SecurityPolicy {
    /// Resolves a free-form token or URI, falling back to [`SecurityPolicy::None`].
    pub fn resolve(token: Option<&str>) -> Self {
        match token.map(str::trim).filter(|t| !t.is_empty()) {
            None => Self::None,
            Some(token) => token.parse().unwrap_or_else(|_| {
                tracing::warn!(token, "Unrecognised security policy, using None");
                Self::None
            }),
        }
    }

    /// Returns the policy URI.
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::None => "http://opcfoundation.org/UA/SecurityPolicy#None",
            Self::Basic128Rsa15 => "http://opcfoundation.org/UA/SecurityPolicy#Basic128Rsa15",
            Self::Basic256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256",
            Self::Basic256Sha256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256",
            Self::Aes128Sha256RsaOaep => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes128_Sha256_RsaOaep"
            }
            Self::Aes256Sha256RsaPss => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss"
            }
        }
    }

    /// Returns the short name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Basic128Rsa15 => "Basic128Rsa15",
            Self::Basic256 => "Basic256",
            Self::Basic256Sha256 => "Basic256Sha256",
            Self::Aes128Sha256RsaOaep => "Aes128Sha256RsaOaep",
            Self::Aes256Sha256RsaPss => "Aes256Sha256RsaPss",
        }
    }

    /// Creates from a policy URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        let (_, fragment) = uri.rsplit_once('#')?;
        match fragment {
            "None" => Some(Self::None),
            "Basic128Rsa15" => Some(Self::Basic128Rsa15),
            "Basic256" => Some(Self::Basic256),
            "Basic256Sha256" => Some(Self::Basic256Sha256),
            "Aes128_Sha256_RsaOaep" => Some(Self::Aes128Sha256RsaOaep),
            "Aes256_Sha256_RsaPss" => Some(Self::Aes256Sha256RsaPss),
            _ => None,
        }
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SecurityPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(policy) = Self::from_uri(s) {
            return Ok(policy);
        }

        match s.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "none" => Ok(Self::None),
            "basic128rsa15" | "basic128" => Ok(Self::Basic128Rsa15),
            "basic256" => Ok(Self::Basic256),
            "basic256sha256" => Ok(Self::Basic256Sha256),
            "aes128sha256rsaoaep" | "aes128" => Ok(Self::Aes128Sha256RsaOaep),
            "aes256sha256rsapss" | "aes256" => Ok(Self::Aes256Sha256RsaPss),
            _ => Err(()),
        }
    }
}

/// Resolves a policy/mode token pair into a consistent pair.
///
/// Unknown or absent tokens become `None`. If only one side resolves to
/// `None`, both become `None`.
pub fn resolve_security(
    policy: Option<&str>,
    mode: Option<&str>,
) -> (SecurityPolicy, SecurityMode) {
    let policy = SecurityPolicy::resolve(policy);
    let mode = SecurityMode::resolve(mode);

    match (policy, mode) {
        (SecurityPolicy::None, SecurityMode::None) => (policy, mode),
        (SecurityPolicy::None, _) | (_, SecurityMode::None) => {
            tracing::warn!(
                policy = %policy,
                mode = %mode,
                "Incomplete security pair, connecting without security"
            );
            (SecurityPolicy::None, SecurityMode::None)
        }
        _ => (policy, mode),
    }
}

// =============================================================================
// Authentication
// =============================================================================

/// How the session authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Anonymous identity.
    #[default]
    Anonymous,
    /// Username and password.
    UserName,
}

impl AuthMode {
    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::UserName => "username",
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AuthMode {
    type Err = UaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "anonymous" | "none" | "" => Ok(Self::Anonymous),
            "username" | "password" | "userpassword" | "basic" => Ok(Self::UserName),
            _ => Err(ConfigError::invalid_value(s, "auth mode", "expected anonymous or username").into()),
        }
    }
}

/// Username/password pair. The password never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Identity presented when the session is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Anonymous.
    Anonymous,
    /// Username and password.
    UserName(Credentials),
}

// =============================================================================
// ConnectionConfig
// =============================================================================

/// Parameters for `connect`.
///
/// Built without validation; `connect` validates and reports
/// [`ConfigError`] before touching the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Server endpoint URL, e.g. `opc.tcp://plc:4840`.
    pub endpoint: String,
    /// Security policy.
    pub security_policy: SecurityPolicy,
    /// Security mode.
    pub security_mode: SecurityMode,
    /// Authentication mode.
    pub auth_mode: AuthMode,
    /// Credentials for [`AuthMode::UserName`].
    pub credentials: Option<Credentials>,
    /// Application name presented to the server.
    pub application_name: String,
    /// Requested session timeout.
    pub session_timeout: Duration,
    /// Upper bound for establishing the connection.
    pub connect_timeout: Duration,
}

/// Default application name.
pub const DEFAULT_APPLICATION_NAME: &str = "plclink";
/// Default session timeout.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(60);
/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

impl ConnectionConfig {
    /// Creates a builder.
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    /// Creates an anonymous, unsecured config for `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::builder().endpoint(endpoint).build()
    }

    /// Checks the endpoint and credentials.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::missing_field("endpoint"));
        }

        if self.auth_mode == AuthMode::UserName {
            match &self.credentials {
                Some(c) if !c.username.is_empty() && !c.password.is_empty() => {}
                _ => return Err(ConfigError::MissingCredentials),
            }
        }

        Ok(())
    }

    /// Returns the identity for session creation.
    pub fn identity(&self) -> Identity {
        match (&self.auth_mode, &self.credentials) {
            (AuthMode::UserName, Some(credentials)) => Identity::UserName(credentials.clone()),
            _ => Identity::Anonymous,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfigBuilder::default().build()
    }
}

/// Builder for [`ConnectionConfig`].
#[derive(Debug, Default)]
pub struct ConnectionConfigBuilder {
    endpoint: Option<String>,
    security_policy: Option<SecurityPolicy>,
    security_mode: Option<SecurityMode>,
    auth_mode: Option<AuthMode>,
    credentials: Option<Credentials>,
    application_name: Option<String>,
    session_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
}

impl ConnectionConfigBuilder {
    /// Sets the endpoint URL.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Resolves the security pair from free-form tokens.
    pub fn security(mut self, policy: Option<&str>, mode: Option<&str>) -> Self {
        let (policy, mode) = resolve_security(policy, mode);
        self.security_policy = Some(policy);
        self.security_mode = Some(mode);
        self
    }

    /// Sets the security policy.
    pub fn security_policy(mut self, policy: SecurityPolicy) -> Self {
        self.security_policy = Some(policy);
        self
    }

    /// Sets the security mode.
    pub fn security_mode(mut self, mode: SecurityMode) -> Self {
        self.security_mode = Some(mode);
        self
    }

    /// Uses anonymous authentication.
    pub fn anonymous(mut self) -> Self {
        self.auth_mode = Some(AuthMode::Anonymous);
        self.credentials = None;
        self
    }

    /// Uses username/password authentication.
    pub fn username(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth_mode = Some(AuthMode::UserName);
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Sets the auth mode without touching credentials.
    pub fn auth_mode(mut self, mode: AuthMode) -> Self {
        self.auth_mode = Some(mode);
        self
    }

    /// Sets or clears credentials.
    pub fn credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Sets the application name.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Sets the session timeout.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ConnectionConfig {
        ConnectionConfig {
            endpoint: self.endpoint.unwrap_or_default(),
            security_policy: self.security_policy.unwrap_or_default(),
            security_mode: self.security_mode.unwrap_or_default(),
            auth_mode: self.auth_mode.unwrap_or_default(),
            credentials: self.credentials,
            application_name: self
                .application_name
                .unwrap_or_else(|| DEFAULT_APPLICATION_NAME.to_string()),
            session_timeout: self.session_timeout.unwrap_or(DEFAULT_SESSION_TIMEOUT),
            connect_timeout: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
        }
    }
}

// =============================================================================
// SubscriptionTiming
// =============================================================================

/// Minimum keep-alive count.
pub const MIN_KEEP_ALIVE_COUNT: u32 = 10;
/// Keep-alives must cover at least this window.
pub const KEEP_ALIVE_WINDOW_MS: u32 = 10_000;
/// Lifetime count as a multiple of the keep-alive count.
pub const LIFETIME_MULTIPLIER: u32 = 3;
/// Monitored item queue depth.
pub const MONITORED_QUEUE_SIZE: u32 = 10;

/// Publish-cycle timing derived from a publishing interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionTiming {
    /// Publishing interval in milliseconds.
    pub publishing_interval_ms: u32,
    /// Keep-alive count.
    pub keep_alive_count: u32,
    /// Lifetime count.
    pub lifetime_count: u32,
}

impl SubscriptionTiming {
    /// Derives keep-alive and lifetime counts.
    ///
    /// `keep_alive = max(10, ceil(10000 / interval))`, `lifetime = keep_alive * 3`.
    pub fn derive(interval_ms: u32) -> Result<Self, ConfigError> {
        if interval_ms == 0 {
            return Err(ConfigError::InvalidInterval);
        }

        let keep_alive_count = KEEP_ALIVE_WINDOW_MS
            .div_ceil(interval_ms)
            .max(MIN_KEEP_ALIVE_COUNT);

        Ok(Self {
            publishing_interval_ms: interval_ms,
            keep_alive_count,
            lifetime_count: keep_alive_count * LIFETIME_MULTIPLIER,
        })
    }

    /// Returns the publishing interval.
    pub fn publishing_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.publishing_interval_ms))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // NodeId Tests
    // =========================================================================

    #[test]
    fn test_node_id_parse_forms() {
        let numeric: NodeId = "ns=2;i=1001".parse().unwrap();
        assert_eq!(numeric, NodeId::numeric(2, 1001));

        let string: NodeId = "ns=3;s=Line1.Motor.Speed".parse().unwrap();
        assert_eq!(string.as_string(), Some("Line1.Motor.Speed"));

        let standard: NodeId = "i=2259".parse().unwrap();
        assert_eq!(standard, NodeId::SERVER_STATUS_STATE);

        let guid: NodeId = "ns=1;g=550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
        assert!(matches!(guid.identifier, NodeIdentifier::Guid(_)));

        let opaque: NodeId = "ns=1;b=SGVsbG8=".parse().unwrap();
        assert_eq!(opaque.identifier, NodeIdentifier::Opaque(b"Hello".to_vec()));
    }

    #[test]
    fn test_node_id_parse_errors() {
        for bad in ["ns=2", "ns=x;i=1", "ns=2;i=abc", "ns=2;x=1", "ns=2;s=", ""] {
            let result: Result<NodeId, _> = bad.parse();
            assert!(
                matches!(result, Err(UaError::Config(ConfigError::InvalidNodeId { .. }))),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_node_id_text_roundtrip_and_serde() {
        let node = NodeId::string(2, "Tank.Level");
        assert_eq!(node.to_string(), "ns=2;s=Tank.Level");

        let json = serde_json::to_string(&node).unwrap();
        assert_eq!(json, "\"ns=2;s=Tank.Level\"");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
    }

    // =========================================================================
    // DataType / StatusCode Tests
    // =========================================================================

    #[test]
    fn test_data_type_aliases() {
        assert_eq!("bool".parse::<DataType>().unwrap(), DataType::Boolean);
        assert_eq!("REAL".parse::<DataType>().unwrap(), DataType::Float);
        assert_eq!("u16".parse::<DataType>().unwrap(), DataType::UInt16);
        assert!("matrix".parse::<DataType>().is_err());
    }

    #[test]
    fn test_status_code_severity() {
        assert!(StatusCode::GOOD.is_good());
        assert!(StatusCode::UNCERTAIN_LAST_USABLE_VALUE.is_uncertain());
        assert!(StatusCode::BAD_NODE_ID_UNKNOWN.is_bad());
        assert!(!StatusCode::BAD_NODE_ID_UNKNOWN.is_good());
    }

    #[test]
    fn test_status_code_name() {
        assert_eq!(StatusCode::BAD_NOT_READABLE.name(), "BadNotReadable");
        assert_eq!(StatusCode(0x8034_0400).name(), "BadNodeIdUnknown");
        assert_eq!(StatusCode(0x80FF_0000).name(), "Bad");
        assert_eq!(
            StatusCode::BAD_TIMEOUT.to_string(),
            "BadTimeout (0x800A0000)"
        );
    }

    // =========================================================================
    // Security Tests
    // =========================================================================

    #[test]
    fn test_security_resolve_known_tokens() {
        assert_eq!(
            SecurityPolicy::resolve(Some("Basic256Sha256")),
            SecurityPolicy::Basic256Sha256
        );
        assert_eq!(
            SecurityPolicy::resolve(Some(
                "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss"
            )),
            SecurityPolicy::Aes256Sha256RsaPss
        );
        assert_eq!(
            SecurityMode::resolve(Some("sign-and-encrypt")),
            SecurityMode::SignAndEncrypt
        );
    }

    #[test]
    fn test_security_resolve_defaults_to_none() {
        assert_eq!(SecurityPolicy::resolve(None), SecurityPolicy::None);
        assert_eq!(SecurityPolicy::resolve(Some("rot13")), SecurityPolicy::None);
        assert_eq!(SecurityMode::resolve(Some("  ")), SecurityMode::None);
        assert_eq!(SecurityMode::resolve(Some("paranoid")), SecurityMode::None);
    }

    #[test]
    fn test_resolve_security_keeps_pair_consistent() {
        assert_eq!(
            resolve_security(Some("Basic256Sha256"), Some("Sign")),
            (SecurityPolicy::Basic256Sha256, SecurityMode::Sign)
        );
        assert_eq!(
            resolve_security(Some("Basic256Sha256"), Some("unknown")),
            (SecurityPolicy::None, SecurityMode::None)
        );
        assert_eq!(
            resolve_security(None, Some("SignAndEncrypt")),
            (SecurityPolicy::None, SecurityMode::None)
        );
    }

    // =========================================================================
    // ConnectionConfig Tests
    // =========================================================================

    #[test]
    fn test_config_validate_endpoint() {
        let config = ConnectionConfig::builder().build();
        assert_eq!(config.validate(), Err(ConfigError::missing_field("endpoint")));

        assert!(ConnectionConfig::new("opc.tcp://plc:4840").validate().is_ok());
    }

    #[test]
    fn test_config_validate_credentials() {
        let missing = ConnectionConfig::builder()
            .endpoint("opc.tcp://plc:4840")
            .auth_mode(AuthMode::UserName)
            .build();
        assert_eq!(missing.validate(), Err(ConfigError::MissingCredentials));

        let empty_password = ConnectionConfig::builder()
            .endpoint("opc.tcp://plc:4840")
            .username("operator", "")
            .build();
        assert_eq!(empty_password.validate(), Err(ConfigError::MissingCredentials));

        let complete = ConnectionConfig::builder()
            .endpoint("opc.tcp://plc:4840")
            .username("operator", "secret")
            .build();
        assert!(complete.validate().is_ok());
        assert!(matches!(complete.identity(), Identity::UserName(_)));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let debug = format!("{:?}", Credentials::new("operator", "hunter2"));
        assert!(debug.contains("operator"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_auth_mode_parse() {
        assert_eq!("password".parse::<AuthMode>().unwrap(), AuthMode::UserName);
        assert_eq!("Anonymous".parse::<AuthMode>().unwrap(), AuthMode::Anonymous);
        assert!("kerberos".parse::<AuthMode>().is_err());
    }

    // =========================================================================
    // SubscriptionTiming Tests
    // =========================================================================

    #[test]
    fn test_timing_derivation() {
        let cases = [
            (500, 20, 60),
            (2000, 10, 30),
            (1000, 10, 30),
            (100, 100, 300),
            (333, 31, 93),
            (60_000, 10, 30),
        ];

        for (interval, keep_alive, lifetime) in cases {
            let timing = SubscriptionTiming::derive(interval).unwrap();
            assert_eq!(timing.keep_alive_count, keep_alive, "interval {interval}");
            assert_eq!(timing.lifetime_count, lifetime, "interval {interval}");
        }
    }

    #[test]
    fn test_timing_rejects_zero_interval() {
        assert_eq!(SubscriptionTiming::derive(0), Err(ConfigError::InvalidInterval));
    }
}
