// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `run`: Start the bridge (default)
//! - `validate`: Validate the configuration file
//! - `version`: Show version information

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// uabridge - OPC UA connector and remote-operation call mapper
///
/// Connects to one OPC UA server, publishes monitored values, writes
/// commanded values and answers remote operations with method calls.
#[derive(Parser, Debug)]
#[command(
    name = "uabridge",
    author = "Sylvex <contact@sylvex.io>",
    version = uabridge_opcua::VERSION,
    about = "OPC UA connector and remote-operation call mapper",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "uabridge.yaml",
        env = "UABRIDGE_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, env = "UABRIDGE_LOG_FORMAT", global = true)]
    pub log_format: Option<LogFormat>,

    /// Enable quiet mode (warnings and errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands for the uabridge CLI.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the bridge
    ///
    /// This is the default command when no subcommand is specified.
    /// It connects to the configured server and runs until Ctrl-C or SIGTERM.
    Run(RunArgs),

    /// Validate the configuration file
    ///
    /// Parses and validates the configuration file without connecting.
    Validate(ValidateArgs),

    /// Show version information
    Version,
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the `run` command.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Serve the configured data sources from an in-process simulated server
    #[arg(long)]
    pub simulate: bool,
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    /// Show parsed configuration after validation
    #[arg(short, long)]
    pub show_config: bool,

    /// Output format for validation results
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact format for minimal output
    Compact,
}

impl From<uabridge_config::LogFormat> for LogFormat {
    fn from(format: uabridge_config::LogFormat) -> Self {
        match format {
            uabridge_config::LogFormat::Text => LogFormat::Text,
            uabridge_config::LogFormat::Json => LogFormat::Json,
            uabridge_config::LogFormat::Compact => LogFormat::Compact,
        }
    }
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for programmatic parsing
    Json,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective command, defaulting to `Run` if none specified.
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Run(RunArgs::default()))
    }

    /// Get the effective log level; flags win over `-l`, which wins over `configured`.
    pub fn effective_log_level(&self, configured: uabridge_config::LogLevel) -> String {
        if self.quiet {
            "warn".to_string()
        } else if self.verbose {
            "debug".to_string()
        } else {
            self.log_level
                .clone()
                .unwrap_or_else(|| configured.as_str().to_string())
        }
    }

    /// Get the effective log format; `--log-format` wins over `configured`.
    pub fn effective_log_format(&self, configured: uabridge_config::LogFormat) -> LogFormat {
        self.log_format.unwrap_or_else(|| configured.into())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uabridge_config::LogLevel;

    #[test]
    fn test_default_command() {
        let cli = Cli::parse_from(["uabridge"]);
        assert!(cli.command.is_none());
        assert!(matches!(cli.effective_command(), Commands::Run(RunArgs { simulate: false })));
    }

    #[test]
    fn test_run_simulate() {
        let cli = Cli::parse_from(["uabridge", "run", "--simulate"]);
        match cli.command {
            Some(Commands::Run(args)) => assert!(args.simulate),
            other => panic!("Expected Run command, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_command() {
        let cli = Cli::parse_from(["uabridge", "validate", "--show-config", "-f", "json"]);
        if let Some(Commands::Validate(args)) = cli.command {
            assert!(args.show_config);
            assert_eq!(args.format, OutputFormat::Json);
        } else {
            panic!("Expected Validate command");
        }
    }

    #[test]
    fn test_version_command() {
        let cli = Cli::parse_from(["uabridge", "version"]);
        assert!(matches!(cli.command, Some(Commands::Version)));
    }

    #[test]
    fn test_config_path() {
        let cli = Cli::parse_from(["uabridge", "-c", "/etc/uabridge/plant.yaml"]);
        assert_eq!(cli.config, PathBuf::from("/etc/uabridge/plant.yaml"));

        let cli = Cli::parse_from(["uabridge", "validate", "--config", "plant.toml"]);
        assert_eq!(cli.config, PathBuf::from("plant.toml"));
    }

    #[test]
    fn test_log_level_overrides_config() {
        let cli = Cli::parse_from(["uabridge", "-l", "trace"]);
        assert_eq!(cli.effective_log_level(LogLevel::Error), "trace");

        let cli = Cli::parse_from(["uabridge"]);
        assert_eq!(cli.effective_log_level(LogLevel::Error), "error");
    }

    #[test]
    fn test_log_format() {
        let cli = Cli::parse_from(["uabridge", "--log-format", "json"]);
        assert_eq!(
            cli.effective_log_format(uabridge_config::LogFormat::Text),
            LogFormat::Json
        );

        let cli = Cli::parse_from(["uabridge"]);
        assert_eq!(
            cli.effective_log_format(uabridge_config::LogFormat::Compact),
            LogFormat::Compact
        );
    }

    #[test]
    fn test_quiet_mode() {
        let cli = Cli::parse_from(["uabridge", "-q", "-l", "trace"]);
        assert!(cli.quiet);
        assert_eq!(cli.effective_log_level(LogLevel::Info), "warn");
    }

    #[test]
    fn test_verbose_mode() {
        let cli = Cli::parse_from(["uabridge", "run", "-v"]);
        assert!(cli.verbose);
        assert_eq!(cli.effective_log_level(LogLevel::Info), "debug");
    }
}
