// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uabridge-core
//!
//! Shared types for the uabridge OPC UA connector.
//!
//! This crate provides what the connector and its adapters exchange with the
//! outside world:
//!
//! - **Types**: the protocol-neutral [`Value`] variant
//! - **Bus**: the pub/sub boundary, a broadcast [`ChannelBus`] for value
//!   channels and a request/response [`CallBus`] for remote operations
//! - **Error**: bus errors
//!
//! ## Example
//!
//! ```rust,ignore
//! use uabridge_core::{CallBus, ChannelBus, Value};
//!
//! let channels = ChannelBus::new(1024);
//! channels.publish_value("plant/line1/temp", Value::Double(25.5), None)?;
//!
//! let calls = CallBus::new(64);
//! let mut observation = calls.observe_call("alertTemperature", None);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod bus;
pub mod error;
pub mod types;

pub use bus::{
    context_accepts, BusStats, CallBus, CallBusStats, CallObservation, CallParameters,
    CallRequest, CallResponse, ChannelBus, ChannelFilteredSubscriber, ChannelMessage,
    ChannelSubscriber, ContextFilter, FilterCondition, ParameterRef, RemoteCallError,
};
pub use error::{BusError, BusResult};
pub use types::Value;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
