// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Command runtime.
//!
//! Turns the loaded configuration into connect parameters and manager
//! settings, opens one managed connection for the duration of a command
//! and always releases it afterwards.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use plclink_config::{AuthMode as ConfigAuthMode, ConfigError, LinkConfig, load_config};
use plclink_ua::{
    ConnectionConfig, ConnectionManager, ManagerSettings, NodeId, ProtocolSession,
};

use crate::cli::{Commands, OutputFormat};
use crate::commands;
use crate::error::{BinError, BinResult};
use crate::shutdown::ShutdownCoordinator;

// =============================================================================
// LinkRuntime
// =============================================================================

/// Everything a server command needs.
pub struct LinkRuntime {
    config: LinkConfig,
    connection: ConnectionConfig,
    settings: ManagerSettings,
    shutdown: ShutdownCoordinator,
}

impl LinkRuntime {
    /// Creates a runtime from a validated configuration.
    pub fn new(config: LinkConfig) -> BinResult<Self> {
        let connection = connection_config(&config)?;
        let settings = manager_settings(&config)?;

        Ok(Self {
            config,
            connection,
            settings,
            shutdown: ShutdownCoordinator::new(),
        })
    }

    /// Returns the loaded configuration.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Returns the connect parameters.
    pub fn connection(&self) -> &ConnectionConfig {
        &self.connection
    }

    /// Returns the manager settings.
    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Returns the shutdown coordinator.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Runs `command` over the `opcua` client stack.
    #[cfg(feature = "opcua")]
    pub async fn run(&self, command: &Commands, format: OutputFormat) -> BinResult<()> {
        self.run_with(plclink_ua::OpcUaSession::new(), command, format)
            .await
    }

    /// Fails: no protocol backend is compiled in.
    #[cfg(not(feature = "opcua"))]
    pub async fn run(&self, _command: &Commands, _format: OutputFormat) -> BinResult<()> {
        Err(BinError::UnsupportedBackend)
    }

    /// Connects through `session`, runs `command`, then disconnects.
    ///
    /// The connection is released even when the command fails.
    pub async fn run_with<S: ProtocolSession>(
        &self,
        session: S,
        command: &Commands,
        format: OutputFormat,
    ) -> BinResult<()> {
        let manager = ConnectionManager::with_settings(session, self.settings.clone());

        let connected = manager.connect(self.connection.clone()).await?;
        info!(
            endpoint = %connected.endpoint,
            security_policy = %connected.security_policy,
            security_mode = %connected.security_mode,
            "Connected"
        );

        let result = commands::run_session_command(&manager, self, command, format).await;

        let report = manager.disconnect().await;
        if !report.is_clean() {
            for failure in &report.failures {
                warn!(step = %failure.step, error = %failure.error, "Cleanup step failed");
            }
        }

        result
    }
}

/// Builds connect parameters from the configuration.
pub fn connection_config(config: &LinkConfig) -> BinResult<ConnectionConfig> {
    let connection = &config.connection;
    let endpoint = connection.endpoint.as_deref().ok_or_else(|| {
        BinError::config("No endpoint: set connection.endpoint or pass --endpoint")
    })?;

    let mut builder = ConnectionConfig::builder()
        .endpoint(endpoint)
        .security(
            connection.security_policy.as_deref(),
            connection.security_mode.as_deref(),
        )
        .application_name(&connection.application_name)
        .session_timeout(connection.session_timeout)
        .connect_timeout(connection.connect_timeout);

    if connection.auth.mode == ConfigAuthMode::Username {
        let username = connection.auth.username.clone().unwrap_or_default();
        let password = connection
            .auth
            .password
            .as_ref()
            .map(|p| p.expose().to_string())
            .unwrap_or_default();
        builder = builder.username(username, password);
    }

    let built = builder.build();
    built.validate().map_err(plclink_ua::UaError::from)?;
    Ok(built)
}

/// Builds manager settings from the configuration.
pub fn manager_settings(config: &LinkConfig) -> BinResult<ManagerSettings> {
    let mut settings = ManagerSettings::default()
        .with_seed_initial_value(config.subscriptions.seed_initial_value);

    if let Some(probe) = &config.connection.probe_node {
        let probe: NodeId = probe
            .parse()
            .map_err(|e| BinError::from(e).with_context("connection.probe_node"))?;
        settings = settings.with_probe_node(probe);
    }

    Ok(settings)
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for constructing the runtime.
#[derive(Default)]
pub struct RuntimeBuilder {
    config_path: Option<PathBuf>,
    config: Option<LinkConfig>,
    endpoint: Option<String>,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration file path.
    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the configuration directly.
    pub fn config(mut self, config: LinkConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Overrides the configured endpoint.
    pub fn endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Builds the runtime.
    ///
    /// A missing configuration file is tolerated when an endpoint override
    /// is given.
    pub fn build(self) -> BinResult<LinkRuntime> {
        let mut config = match (self.config, self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) if path.exists() => load_config(&path)
                .map_err(|e| BinError::from(e).with_context(format!("loading {}", path.display())))?,
            (None, Some(path)) if self.endpoint.is_some() => {
                info!(path = %path.display(), "No configuration file, using defaults");
                LinkConfig::default()
            }
            (None, Some(path)) => return Err(ConfigError::file_not_found(path).into()),
            (None, None) => return Err(BinError::config("No configuration provided")),
        };

        if let Some(endpoint) = self.endpoint {
            config.connection.endpoint = Some(endpoint);
        }
        config.validate()?;

        LinkRuntime::new(config)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use plclink_config::SecretValue;
    use plclink_ua::{AuthMode, SecurityMode, SecurityPolicy};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn config_with_endpoint() -> LinkConfig {
        let mut config = LinkConfig::default();
        config.connection.endpoint = Some("opc.tcp://plc.local:4840".into());
        config
    }

    #[test]
    fn test_runtime_builder_from_config() {
        let runtime = RuntimeBuilder::new()
            .config(config_with_endpoint())
            .build()
            .unwrap();

        assert_eq!(runtime.connection().endpoint, "opc.tcp://plc.local:4840");
        assert_eq!(runtime.connection().auth_mode, AuthMode::Anonymous);
        assert_eq!(runtime.settings().probe_node, NodeId::SERVER_STATUS_STATE);
    }

    #[test]
    fn test_runtime_builder_requires_config() {
        assert!(RuntimeBuilder::new().build().is_err());

        let result = RuntimeBuilder::new()
            .config_path("/nonexistent/plclink.yaml")
            .build();
        assert!(matches!(
            result,
            Err(BinError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_endpoint_override_without_file() {
        let runtime = RuntimeBuilder::new()
            .config_path("/nonexistent/plclink.yaml")
            .endpoint(Some("opc.tcp://10.0.0.5:4840".into()))
            .build()
            .unwrap();
        assert_eq!(runtime.connection().endpoint, "opc.tcp://10.0.0.5:4840");
    }

    #[test]
    fn test_endpoint_override_is_validated() {
        let result = RuntimeBuilder::new()
            .config(LinkConfig::default())
            .endpoint(Some("http://plc:4840".into()))
            .build();
        assert!(matches!(result, Err(BinError::Config(ConfigError::Validation { .. }))));
    }

    #[test]
    fn test_missing_endpoint() {
        let result = RuntimeBuilder::new().config(LinkConfig::default()).build();
        assert!(matches!(result, Err(BinError::Configuration(_))));
    }

    #[test]
    fn test_runtime_builder_from_file() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        file.write_all(
            br#"
connection:
  endpoint: opc.tcp://plc.local:4840
  security_policy: Basic256Sha256
  security_mode: Sign
  probe_node: i=2258
subscriptions:
  seed_initial_value: false
"#,
        )
        .unwrap();

        let runtime = RuntimeBuilder::new().config_path(file.path()).build().unwrap();
        assert_eq!(runtime.connection().security_policy, SecurityPolicy::Basic256Sha256);
        assert_eq!(runtime.connection().security_mode, SecurityMode::Sign);
        assert_eq!(runtime.settings().probe_node, NodeId::SERVER_STATUS_CURRENT_TIME);
        assert!(!runtime.settings().seed_initial_value);
    }

    #[test]
    fn test_username_auth_mapping() {
        let mut config = config_with_endpoint();
        config.connection.auth.mode = ConfigAuthMode::Username;
        config.connection.auth.username = Some("operator".into());
        config.connection.auth.password = Some(SecretValue::new("secret"));

        let connection = connection_config(&config).unwrap();
        assert_eq!(connection.auth_mode, AuthMode::UserName);
        let credentials = connection.credentials.unwrap();
        assert_eq!(credentials.username, "operator");
        assert_eq!(credentials.password, "secret");
    }

    #[test]
    fn test_invalid_probe_node() {
        let mut config = config_with_endpoint();
        config.connection.probe_node = Some("ns=x;i=1".into());
        assert!(manager_settings(&config).is_err());
    }
}
