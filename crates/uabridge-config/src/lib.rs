// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uabridge-config
//!
//! Configuration management for the uabridge OPC UA connector.
//!
//! ## Features
//!
//! - **Schema Definition**: connector, data sources, call mappings, forwarding routes, logging
//! - **Multi-Format Support**: YAML, TOML, and JSON configuration files
//! - **Environment Overrides**: `UABRIDGE_ENDPOINT_URL`, `UABRIDGE_LOG_LEVEL`
//! - **Validation**: addresses, data types and references are checked before any connection
//!
//! ## Quick Start
//!
//! ```no_run
//! use uabridge_config::loader::load_config;
//!
//! let config = load_config("bridge.yaml").unwrap();
//!
//! println!("Endpoint: {}", config.connector.endpoint_url);
//! println!("Data sources: {}", config.connector.data_sources.len());
//! ```
//!
//! ## Configuration Schema
//!
//! ```yaml
//! connector:
//!   endpoint_url: "${PLANT_ENDPOINT:opc.tcp://localhost:4840}"
//!   data_sources:
//!     PLC2:
//!       node_id: { namespace_uri: "urn:plant", identifier: "s=PLC2" }
//!     Memory:
//!       node_id: { namespace_uri: "urn:plant", identifier: "s=Memory" }
//!       monitor: true
//!       data_type: UInt64
//!       coerce: { linear: { factor: 1048576 } }
//!     Alert:
//!       browse_path: { root_node: ObjectsFolder, relative_path: "/[urn:plant]:PLC2/[urn:plant]:Alert" }
//! calls:
//!   PLC2:
//!     Alert:
//!       operation: plant.alert
//!       input_arguments:
//!         - { parameter: level, data_type: Int32, validate: { min: 0, max: 3 } }
//! sources:
//!   Memory: plant/memory
//! source_payload: value   # or `json` for JSON text
//! logging:
//!   level: info
//!   format: text
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod error;
pub mod loader;
pub mod schema;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_config_str, ConfigFormat, ConfigLoader, ConfigLoaderBuilder};
pub use schema::{
    BridgeConfig, BrowsePathSpec, CallMappingSpec, CoerceSpec, ConnectorSection, DataSourceSpec,
    InputArgumentSpec, LinearCoerceSpec, LogFormat, LogLevel, LoggingConfig, NodeIdSpec,
    OutputSpec, ValidateSpec,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
