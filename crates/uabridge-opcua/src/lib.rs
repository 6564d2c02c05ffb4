// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA connector and remote-operation call mapper.
//!
//! This crate connects an application to one OPC UA server and lets it work
//! with named data sources instead of raw node ids:
//!
//! - Session management with a per-session namespace table
//! - Node resolution from namespace URIs or browse paths
//! - Monitored items on one shared subscription, fanned out as events
//! - Read, write, browse, call and analog item metadata
//! - Optional value coercion between wire and application representation
//! - A call mapper that answers call bus requests with method calls
//! - Forwarders between data sources and channel bus channels
//!
//! # Error Handling
//!
//! All connector operations return [`OpcUaResult`]:
//!
//! ```text
//! OpcUaError
//! ├── Connection    - Transport and session failures
//! ├── NotConnected  - No active session
//! ├── Address       - UnknownNamespace, PathNotFound, malformed addresses
//! ├── BadStatus     - Non-good server status for an operation
//! ├── Coercion      - Coercion or wire typing failed
//! ├── Monitor       - A monitored item reported a problem
//! └── Configuration - Invalid options or data sources
//! ```
//!
//! Remote calls answer with [`CallMappingError`] kinds instead.
//!
//! # Transports
//!
//! The connector is generic over [`OpcUaTransport`]. [`client::MemoryTransport`]
//! is an in-process server for tests and simulation; `client::RealTransport`
//! (feature `real-transport`) talks to real servers through the `opcua` crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use uabridge_opcua::{ConnectorEvent, ConnectorOptions, OpcUaConnector};
//! use uabridge_opcua::client::RealTransport;
//! use uabridge_opcua::data_source::DataSource;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connector = OpcUaConnector::new(
//!         ConnectorOptions::new("opc.tcp://localhost:4840"),
//!         RealTransport::new(),
//!     );
//!     connector
//!         .register_data_sources([("time", DataSource::node(None, "i=2258").monitored(None))])
//!         .await;
//!
//!     let mut events = connector.subscribe();
//!     connector.connect().await?;
//!     while let Ok(event) = events.recv().await {
//!         if let ConnectorEvent::DataValueChange { identifier, value, .. } = event {
//!             println!("{identifier} = {value}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod analog;
pub mod bridge;
pub mod client;
pub mod coercion;
pub mod connector;
pub mod data_source;
pub mod error;
pub mod events;
mod monitor;
pub mod registry;
pub mod relative_path;
pub mod remote;
pub mod resolver;
pub mod types;

pub use error::{
    AddressError, CoercionError, ConfigurationError, ConnectionError, ErrorSeverity, OpcUaError,
    OpcUaResult,
};

pub use types::{
    AttributeId, ConnectionOptions, DataType, NodeClass, NodeId, NodeIdentifier, QualifiedName,
    SecurityMode, SecurityPolicy, StatusCode, UserIdentity,
};

pub use analog::{AnalogDataItem, EuInformation, Range};
pub use bridge::{ActorWriter, SourceForwarder, SourcePayload};
pub use client::{
    NamespaceTable, OpcUaTransport, ReferenceDescription, SessionInfo, SessionState,
    SubscriptionParameters, TransportState,
};
pub use coercion::Coercion;
pub use connector::{ConnectorOptions, OpcUaConnector};
pub use data_source::{DataSource, NodeAddress};
pub use events::{ConnectorEvent, ConnectorStats};
pub use registry::DataSourceRegistry;
pub use relative_path::{RelativePath, RelativePathElement};
pub use remote::{
    default_output_coercion, CallMappingError, CallReturnMapping, InputArgumentMapping,
    OutputCoercion, RemoteOperationMapper, Validator,
};

#[cfg(feature = "real-transport")]
pub use client::RealTransport;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
