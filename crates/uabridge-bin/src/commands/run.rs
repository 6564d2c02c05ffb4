// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `run` command.

use tracing::info;

use crate::cli::{Cli, RunArgs};
use crate::error::BinResult;
use crate::runtime::RuntimeBuilder;

/// Executes the `run` command; returns once the bridge has shut down.
pub async fn run(cli: &Cli, args: RunArgs) -> BinResult<()> {
    let config = super::load_and_init_logging(cli)?;
    info!(config = %cli.config.display(), "Configuration loaded");

    let runtime = RuntimeBuilder::new()
        .config(config)
        .simulate(args.simulate)
        .build()?;

    runtime.run().await
}
