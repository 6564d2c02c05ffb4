// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use serde_json::json;
use uabridge_config::BridgeConfig;

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::BinResult;

/// Executes the `validate` command.
///
/// Loading already validates; this reports what the file configures and
/// warns about routes that can never carry data.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let config = super::load_and_init_logging(cli)?;
    let summary = ValidationSummary::from_config(&config);

    match args.format {
        OutputFormat::Text => {
            println!("✓ Configuration is valid: {}", cli.config.display());
            println!();
            print!("{}", summary);

            if args.show_config {
                println!();
                println!("Parsed configuration:");
                println!(
                    "{}",
                    serde_json::to_string_pretty(&redacted(&config))
                        .unwrap_or_else(|_| "(serialization error)".to_string())
                );
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "valid": true,
                "config_path": cli.config.display().to_string(),
                "summary": summary.to_json(),
                "warnings": summary.warnings,
                "config": if args.show_config { Some(redacted(&config)) } else { None },
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
            );
        }
    }

    Ok(())
}

/// Counts and warnings for a loaded configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationSummary {
    /// Server endpoint.
    pub endpoint_url: String,
    /// Configured data sources.
    pub data_sources: usize,
    /// Data sources with `monitor: true`.
    pub monitored: usize,
    /// Call mappings.
    pub calls: usize,
    /// Source forwarding routes.
    pub sources: usize,
    /// Actor write routes.
    pub actors: usize,
    /// Non-fatal findings.
    pub warnings: Vec<String>,
}

impl ValidationSummary {
    /// Summarizes `config`.
    pub fn from_config(config: &BridgeConfig) -> Self {
        let data_sources = &config.connector.data_sources;
        let mut warnings = Vec::new();

        if data_sources.is_empty() {
            warnings.push("No data sources configured".to_string());
        }
        for (identifier, channel) in &config.sources {
            if data_sources.get(identifier).is_some_and(|spec| !spec.monitor) {
                warnings.push(format!(
                    "Source '{}' is not monitored; channel '{}' will stay silent",
                    identifier, channel
                ));
            }
        }
        for (identifier, spec) in data_sources {
            if spec.monitor && !config.sources.contains_key(identifier) {
                warnings.push(format!(
                    "Data source '{}' is monitored but not forwarded to any channel",
                    identifier
                ));
            }
        }

        Self {
            endpoint_url: config.connector.endpoint_url.clone(),
            data_sources: data_sources.len(),
            monitored: data_sources.values().filter(|spec| spec.monitor).count(),
            calls: config.call_count(),
            sources: config.sources.len(),
            actors: config.actors.len(),
            warnings,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "endpoint_url": self.endpoint_url,
            "data_sources": self.data_sources,
            "monitored": self.monitored,
            "calls": self.calls,
            "sources": self.sources,
            "actors": self.actors,
        })
    }
}

impl std::fmt::Display for ValidationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Summary:")?;
        writeln!(f, "  Endpoint:     {}", self.endpoint_url)?;
        writeln!(f, "  Data sources: {} ({} monitored)", self.data_sources, self.monitored)?;
        writeln!(f, "  Calls:        {}", self.calls)?;
        writeln!(f, "  Sources:      {}", self.sources)?;
        writeln!(f, "  Actors:       {}", self.actors)?;

        if !self.warnings.is_empty() {
            writeln!(f)?;
            writeln!(f, "Warnings:")?;
            for warning in &self.warnings {
                writeln!(f, "  ⚠ {}", warning)?;
            }
        }
        Ok(())
    }
}

/// Serializes `config` with the identity password masked.
fn redacted(config: &BridgeConfig) -> serde_json::Value {
    let mut value = serde_json::to_value(config).unwrap_or(serde_json::Value::Null);
    if let Some(password) = value.pointer_mut("/connector/identity/password") {
        *password = json!("********");
    }
    value
}
