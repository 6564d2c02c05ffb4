// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI command implementations.
//!
//! - `run`: Start the bridge
//! - `validate`: Validate the configuration file
//! - `version`: Show version information

mod run;
mod validate;
mod version;

pub use run::run;
pub use validate::{validate, ValidationSummary};
pub use version::version;

use std::path::Path;

use uabridge_config::{load_config, BridgeConfig};

use crate::cli::{Cli, Commands};
use crate::error::{BinError, BinResult};
use crate::logging::init_logging;

/// Executes the appropriate command based on CLI arguments.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match cli.effective_command() {
        Commands::Run(args) => run::run(&cli, args).await,
        Commands::Validate(args) => validate::validate(&cli, args),
        Commands::Version => version::version(&cli),
    }
}

/// Loads the configuration file and initializes logging from it.
///
/// Command line flags override the file's logging section.
fn load_and_init_logging(cli: &Cli) -> BinResult<BridgeConfig> {
    let config = load(&cli.config)?;
    init_logging(
        &cli.effective_log_level(config.logging.level),
        cli.effective_log_format(config.logging.format),
    );
    Ok(config)
}

fn load(path: &Path) -> BinResult<BridgeConfig> {
    load_config(path)
        .map_err(|e| BinError::from(e).with_context(format!("Failed to load {}", path.display())))
}
