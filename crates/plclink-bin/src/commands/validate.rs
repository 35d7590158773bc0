// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use plclink_config::{AuthMode, LinkConfig};
use plclink_ua::{SecurityMode, SecurityPolicy, SubscriptionTiming, resolve_security};

use super::print_json;
use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};
use crate::runtime::manager_settings;

/// Executes the `validate` command to validate configuration.
pub fn validate(cli: &Cli, args: &ValidateArgs) -> BinResult<()> {
    let config_path = &cli.config;

    if !config_path.exists() {
        return Err(BinError::Configuration(format!(
            "Configuration file not found: {}",
            config_path.display()
        )));
    }

    let config = plclink_config::load_config(config_path)?;
    let settings = manager_settings(&config)?;
    let timing = SubscriptionTiming::derive(config.subscriptions.default_interval_ms)
        .map_err(plclink_ua::UaError::from)?;
    let (policy, mode) = resolve_security(
        config.connection.security_policy.as_deref(),
        config.connection.security_mode.as_deref(),
    );
    let warnings = collect_warnings(&config, policy, mode);

    match cli.format {
        OutputFormat::Text => {
            println!("✓ Configuration is valid: {}", config_path.display());
            println!();
            println!("Summary:");
            println!(
                "  Endpoint:     {}",
                config.connection.endpoint.as_deref().unwrap_or("(not set)")
            );
            println!("  Security:     {} / {}", policy, mode);
            println!("  Auth:         {}", config.connection.auth.mode.as_str());
            println!("  Probe node:   {}", settings.probe_node);
            println!(
                "  Interval:     {}ms (keep-alive {}, lifetime {})",
                timing.publishing_interval_ms, timing.keep_alive_count, timing.lifetime_count
            );

            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &warnings {
                    println!("  ⚠ {}", warning);
                }
            }

            if args.show_config {
                println!();
                println!("Parsed configuration:");
                print_json(&config)?;
            }
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "valid": true,
            "config_path": config_path.display().to_string(),
            "summary": {
                "endpoint": config.connection.endpoint,
                "security_policy": policy,
                "security_mode": mode,
                "auth_mode": config.connection.auth.mode.as_str(),
                "probe_node": settings.probe_node,
                "subscription_timing": timing,
            },
            "warnings": warnings,
            "config": if args.show_config { Some(&config) } else { None },
        }))?,
    }

    Ok(())
}

fn collect_warnings(config: &LinkConfig, policy: SecurityPolicy, mode: SecurityMode) -> Vec<String> {
    let connection = &config.connection;
    let mut warnings = Vec::new();

    if connection.endpoint.is_none() {
        warnings.push("No endpoint configured; pass --endpoint to server commands".to_string());
    }

    let requested = connection.security_policy.is_some() || connection.security_mode.is_some();
    if requested && (policy == SecurityPolicy::None || mode == SecurityMode::None) {
        warnings.push(format!(
            "Security pair {:?} / {:?} resolves to None; the connection will be unsecured",
            connection.security_policy.as_deref().unwrap_or(""),
            connection.security_mode.as_deref().unwrap_or("")
        ));
    }

    if connection.auth.mode == AuthMode::Username && mode != SecurityMode::SignAndEncrypt {
        warnings.push("Username credentials are sent without message encryption".to_string());
    }

    warnings
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_for_unsecured_username() {
        let mut config = LinkConfig::default();
        config.connection.auth.mode = AuthMode::Username;
        config.connection.security_policy = Some("Basic256Sha256".into());

        let (policy, mode) = resolve_security(
            config.connection.security_policy.as_deref(),
            config.connection.security_mode.as_deref(),
        );
        let warnings = collect_warnings(&config, policy, mode);

        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].contains("No endpoint"));
        assert!(warnings[1].contains("resolves to None"));
        assert!(warnings[2].contains("without message encryption"));
    }

    #[test]
    fn test_no_warnings_for_complete_config() {
        let mut config = LinkConfig::default();
        config.connection.endpoint = Some("opc.tcp://plc:4840".into());
        config.connection.security_policy = Some("Basic256Sha256".into());
        config.connection.security_mode = Some("SignAndEncrypt".into());

        let (policy, mode) = resolve_security(
            config.connection.security_policy.as_deref(),
            config.connection.security_mode.as_deref(),
        );
        assert!(collect_warnings(&config, policy, mode).is_empty());
    }
}
