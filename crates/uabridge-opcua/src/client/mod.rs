// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA client plumbing.
//!
//! - **Transport Layer**: [`OpcUaTransport`], the services the connector needs
//! - **Session State**: the connector's view of a live session
//! - **Memory Transport**: an in-process server for tests and simulation
//! - **Real Transport**: the `opcua` crate client (feature `real-transport`)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              OpcUaConnector / RemoteOperationMapper             │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │          Session (namespaces, generation, subscription)         │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │       OpcUaTransport (MemoryTransport | RealTransport)          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod memory;
mod session;
mod transport;

#[cfg(feature = "real-transport")]
mod real_transport;

pub use memory::{MemoryService, MemoryTransport, MethodHandler, RecordedCall, RecordedItem};
pub use session::{NamespaceTable, Session, SessionInfo, SessionState};
pub use transport::{
    BrowsePathResult, BrowseResult, CallResult, DataValue, ItemEvent, ItemHandler,
    MonitoringParameters, OpcUaTransport, ReferenceDescription, SubscriptionErrorHandler,
    SubscriptionParameters, TransportState,
};

#[cfg(feature = "real-transport")]
pub use real_transport::RealTransport;
