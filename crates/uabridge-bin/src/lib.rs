// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uabridge-bin
//!
//! Command line runner for the uabridge OPC UA connector.
//!
//! - CLI argument parsing with clap
//! - Bridge runtime wiring connector, call mapper and forwarders
//! - Simulated plant for running without a server
//! - Graceful shutdown handling
//! - Logging initialization
//!
//! ## Architecture
//!
//! ```text
//!                     main.rs
//!                        │
//!                     cli.rs
//!                        │
//!        ┌───────────────┼───────────────┐
//!        ▼               ▼               ▼
//!    commands         runtime         logging
//!                        │
//!              ┌─────────┼─────────┐
//!              ▼         ▼         ▼
//!          shutdown  simulation  uabridge-opcua
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the bridge (default command)
//! uabridge -c /etc/uabridge/plant.yaml
//!
//! # Serve the configured data sources from an in-process plant
//! uabridge run --simulate
//!
//! # Validate configuration
//! uabridge validate --show-config -f json
//!
//! # Show version
//! uabridge version
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;
pub mod simulation;

// =============================================================================
// Re-exports
// =============================================================================

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;
pub use runtime::{BridgeRuntime, RuntimeBuilder};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
pub use simulation::SimulatedPlant;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
