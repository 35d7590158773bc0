// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading and processing for plclink.
//!
//! # Loading Pipeline
//!
//! 1. Read the file and pick a format from its extension
//! 2. Resolve `${VAR}` / `${VAR:default}` placeholders in the raw text
//! 3. Parse into [`LinkConfig`]
//! 4. Apply `PLCLINK_*` environment overrides
//! 5. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! PLCLINK_ENDPOINT=opc.tcp://10.0.0.5:4840
//! PLCLINK_SECURITY_POLICY=Basic256Sha256
//! PLCLINK_SECURITY_MODE=SignAndEncrypt
//! PLCLINK_AUTH_MODE=username
//! PLCLINK_USERNAME=operator
//! PLCLINK_PASSWORD=secret
//! PLCLINK_LOG_LEVEL=debug
//! PLCLINK_LOG_FORMAT=json
//! ```

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{LinkConfig, SecretValue};
use serde::de::DeserializeOwned;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "PLCLINK";

// =============================================================================
// ConfigLoader
// =============================================================================

/// Configuration loader for plclink.
///
/// # Examples
///
/// ```no_run
/// use plclink_config::loader::ConfigLoader;
///
/// let loader = ConfigLoader::new();
/// let config = loader.load("plclink.yaml").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Base directory for resolving relative config paths.
    base_path: Option<PathBuf>,

    /// Environment variable prefix.
    env_prefix: String,

    /// Whether to resolve placeholders and apply overrides.
    resolve_env_vars: bool,
}

impl ConfigLoader {
    /// Creates a new configuration loader with default settings.
    pub fn new() -> Self {
        Self {
            base_path: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            resolve_env_vars: true,
        }
    }

    /// Creates a builder for configuring the loader.
    pub fn builder() -> ConfigLoaderBuilder {
        ConfigLoaderBuilder::new()
    }

    /// Sets the base path for resolving relative paths.
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables environment variable resolution.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Loads configuration from a file.
    ///
    /// The file format is determined by the file extension:
    /// - `.yaml` or `.yml` - YAML format
    /// - `.toml` - TOML format
    /// - `.json` - JSON format
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<LinkConfig> {
        self.load_with(path, |name| env::var(name).ok())
    }

    /// Loads configuration from a file, looking variables up through `lookup`.
    pub fn load_with<F>(&self, path: impl AsRef<Path>, lookup: F) -> ConfigResult<LinkConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = self.resolve_path(path.as_ref());
        info!("Loading configuration from: {}", path.display());

        let content = self.read_file(&path)?;
        let format = ConfigFormat::from_path(&path)?;

        let content = if self.resolve_env_vars {
            resolve_placeholders(&content, &lookup)
        } else {
            content
        };

        let mut config: LinkConfig = parse_str(&content, format).map_err(|e| match e {
            ConfigError::Serialization { message } => ConfigError::parse(&path, message),
            ConfigError::Parse { message, line, .. } => ConfigError::Parse {
                path: path.clone(),
                message,
                line,
            },
            other => other,
        })?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config, &lookup)?;
        }

        config.validate()?;

        info!("Configuration loaded successfully");
        debug!(
            endpoint = config.connection.endpoint.as_deref().unwrap_or("<unset>"),
            auth = config.connection.auth.mode.as_str(),
            "Loaded connection settings"
        );

        Ok(config)
    }

    /// Loads configuration from a string.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<LinkConfig> {
        self.load_from_str_with(content, format, |name| env::var(name).ok())
    }

    /// Loads configuration from a string, looking variables up through `lookup`.
    pub fn load_from_str_with<F>(
        &self,
        content: &str,
        format: ConfigFormat,
        lookup: F,
    ) -> ConfigResult<LinkConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: LinkConfig = if self.resolve_env_vars {
            parse_str(&resolve_placeholders(content, &lookup), format)?
        } else {
            parse_str(content, format)?
        };

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config, &lookup)?;
        }

        config.validate()?;

        Ok(config)
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.base_path {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Reads file content.
    fn read_file(&self, path: &Path) -> ConfigResult<String> {
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides<F>(&self, config: &mut LinkConfig, lookup: &F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            let name = format!("{}_{}", self.env_prefix, suffix);
            lookup(&name).map(|value| (name, value))
        };

        let connection = &mut config.connection;
        if let Some((_, value)) = var("ENDPOINT") {
            connection.endpoint = Some(value);
        }
        if let Some((_, value)) = var("SECURITY_POLICY") {
            connection.security_policy = Some(value);
        }
        if let Some((_, value)) = var("SECURITY_MODE") {
            connection.security_mode = Some(value);
        }
        if let Some((name, value)) = var("AUTH_MODE") {
            connection.auth.mode = value
                .parse()
                .map_err(|_| ConfigError::invalid_env_var(name, "expected 'anonymous' or 'username'"))?;
        }
        if let Some((_, value)) = var("USERNAME") {
            connection.auth.username = Some(value);
        }
        if let Some((_, value)) = var("PASSWORD") {
            connection.auth.password = Some(SecretValue::new(value));
        }

        if let Some((name, value)) = var("LOG_LEVEL") {
            config.logging.level = value
                .parse()
                .map_err(|_| ConfigError::invalid_env_var(name, "expected trace, debug, info, warn or error"))?;
        }
        if let Some((name, value)) = var("LOG_FORMAT") {
            config.logging.format = value
                .parse()
                .map_err(|_| ConfigError::invalid_env_var(name, "expected text, compact or json"))?;
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ConfigLoaderBuilder
// =============================================================================

/// Builder for ConfigLoader.
#[derive(Debug, Default)]
pub struct ConfigLoaderBuilder {
    base_path: Option<PathBuf>,
    env_prefix: Option<String>,
    resolve_env_vars: Option<bool>,
}

impl ConfigLoaderBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base path.
    pub fn base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Sets the environment prefix.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Enables or disables environment variable resolution.
    pub fn resolve_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = Some(enabled);
        self
    }

    /// Builds the ConfigLoader.
    pub fn build(self) -> ConfigLoader {
        let mut loader = ConfigLoader::new();

        if let Some(base_path) = self.base_path {
            loader.base_path = Some(base_path);
        }
        if let Some(prefix) = self.env_prefix {
            loader.env_prefix = prefix;
        }
        if let Some(resolve_env_vars) = self.resolve_env_vars {
            loader.resolve_env_vars = resolve_env_vars;
        }

        loader
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(ConfigError::unsupported_format(other)),
            None => Err(ConfigError::unsupported_format("(no extension)")),
        }
    }

    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parses a string based on format.
fn parse_str<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> ConfigResult<T> {
    match format {
        ConfigFormat::Yaml => parse_yaml(content),
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| {
            let message = e.message().to_string();
            match e.span() {
                Some(span) => ConfigError::parse_at_line("<toml>", message, line_of(content, span.start)),
                None => ConfigError::serialization(message),
            }
        }),
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| {
            if e.line() > 0 {
                ConfigError::parse_at_line("<json>", e.to_string(), e.line())
            } else {
                ConfigError::serialization(e.to_string())
            }
        }),
    }
}

/// YAML parsing through the config crate.
fn parse_yaml<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(content, config::FileFormat::Yaml))
        .build()
        .map_err(|e| ConfigError::serialization(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::serialization(e.to_string()))
}

fn line_of(content: &str, offset: usize) -> usize {
    content[..offset.min(content.len())].matches('\n').count() + 1
}

/// Resolves `${VAR_NAME}` and `${VAR_NAME:default}` placeholders.
///
/// A placeholder without a value or default is kept verbatim.
fn resolve_placeholders<F>(content: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' || chars.peek() != Some(&'{') {
            result.push(c);
            continue;
        }
        chars.next();

        let mut var_content = String::new();
        let mut found_close = false;
        for c in chars.by_ref() {
            if c == '}' {
                found_close = true;
                break;
            }
            var_content.push(c);
        }

        if !found_close {
            result.push_str("${");
            result.push_str(&var_content);
            continue;
        }

        let (var_name, default_value) = match var_content.split_once(':') {
            Some((name, default)) => (name, Some(default)),
            None => (var_content.as_str(), None),
        };

        match (lookup(var_name), default_value) {
            (Some(value), _) => result.push_str(&value),
            (None, Some(default)) => result.push_str(default),
            (None, None) => {
                warn!("Environment variable '{}' not found", var_name);
                result.push_str(&format!("${{{var_name}}}"));
            }
        }
    }

    result
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
///
/// ```no_run
/// use plclink_config::loader::load_config;
///
/// let config = load_config("plclink.yaml").unwrap();
/// ```
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<LinkConfig> {
    ConfigLoader::new().load(path)
}

/// Loads configuration from a string with the specified format.
pub fn load_config_str(content: &str, format: ConfigFormat) -> ConfigResult<LinkConfig> {
    ConfigLoader::new().load_from_str(content, format)
}

// =============================================================================
// Tests
// =============================================================================
