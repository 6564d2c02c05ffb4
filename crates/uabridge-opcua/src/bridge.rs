// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Forwarding between the connector and the channel bus.
//!
//! - [`SourceForwarder`] publishes value changes of monitored data sources,
//!   either as typed values or as JSON text ([`SourcePayload`]).
//! - [`ActorWriter`] writes values published on channels to data sources.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uabridge_core::{BusError, ChannelBus, ChannelMessage, Value};

use crate::client::OpcUaTransport;
use crate::connector::OpcUaConnector;
use crate::events::ConnectorEvent;

// =============================================================================
// SourceForwarder
// =============================================================================

/// How a forwarded value is put on its channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePayload {
    /// The coerced value as is.
    #[default]
    Value,
    /// The coerced value serialized to JSON text, for consumers that only
    /// understand raw payloads.
    Json,
}

impl SourcePayload {
    /// Shapes `value` for publishing.
    pub fn encode(self, value: Value) -> Value {
        match self {
            Self::Value => value,
            Self::Json => Value::String(value.to_json().to_string()),
        }
    }
}

/// Publishes data value changes on the channel bus.
///
/// Only data sources listed in the routing table are forwarded; the data
/// source must also be monitored to produce changes.
pub struct SourceForwarder<T: OpcUaTransport> {
    connector: OpcUaConnector<T>,
    bus: ChannelBus,
    routes: Arc<HashMap<String, String>>,
    payload: SourcePayload,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<T: OpcUaTransport> SourceForwarder<T> {
    /// Creates a forwarder; `routes` maps data source ids to channel names.
    pub fn new(connector: OpcUaConnector<T>, bus: ChannelBus, routes: HashMap<String, String>) -> Self {
        Self {
            connector,
            bus,
            routes: Arc::new(routes),
            payload: SourcePayload::default(),
            task: Mutex::new(None),
        }
    }

    /// Sets the payload shape. Takes effect on the next `start`.
    pub fn with_payload(mut self, payload: SourcePayload) -> Self {
        self.payload = payload;
        self
    }

    /// Returns the payload shape.
    pub fn payload(&self) -> SourcePayload {
        self.payload
    }

    /// Starts forwarding. Must be called within a Tokio runtime.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        for id in self.routes.keys() {
            if self.connector.data_source(id).is_none() {
                warn!(data_source = %id, "Forwarding route for unknown data source");
            }
        }

        let mut events = self.connector.subscribe();
        let bus = self.bus.clone();
        let routes = Arc::clone(&self.routes);
        let payload = self.payload;
        *task = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ConnectorEvent::DataValueChange {
                        identifier,
                        value,
                        source_timestamp,
                        ..
                    }) => {
                        let Some(channel) = routes.get(&identifier) else {
                            continue;
                        };
                        trace!(data_source = %identifier, channel = %channel, "Forwarding value");
                        let message = ChannelMessage::new(channel.clone(), payload.encode(value))
                            .with_source_timestamp(source_timestamp);
                        if let Err(e) = bus.publish(message) {
                            warn!(channel = %channel, error = %e, "Publishing value failed");
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Source forwarder lagged, values dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));
        info!(routes = self.routes.len(), payload = ?self.payload, "Source forwarder started");
    }

    /// Stops forwarding.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            debug!("Source forwarder stopped");
        }
    }

    /// Returns `true` while forwarding.
    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl<T: OpcUaTransport> fmt::Debug for SourceForwarder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceForwarder")
            .field("routes", &self.routes)
            .field("payload", &self.payload)
            .finish()
    }
}

impl<T: OpcUaTransport> Drop for SourceForwarder<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// ActorWriter
// =============================================================================

/// Writes values published on the channel bus to data sources.
///
/// Null values are skipped. Failed writes are reported as connector error
/// events. Messages are written in the order they arrive.
pub struct ActorWriter<T: OpcUaTransport> {
    connector: OpcUaConnector<T>,
    bus: ChannelBus,
    routes: Arc<HashMap<String, String>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<T: OpcUaTransport> ActorWriter<T> {
    /// Creates a writer; `routes` maps data source ids to channel names.
    pub fn new(connector: OpcUaConnector<T>, bus: ChannelBus, routes: HashMap<String, String>) -> Self {
        // Keyed by channel for dispatch.
        let by_channel = routes
            .into_iter()
            .map(|(id, channel)| (channel, id))
            .collect();
        Self {
            connector,
            bus,
            routes: Arc::new(by_channel),
            task: Mutex::new(None),
        }
    }

    /// Starts writing. Must be called within a Tokio runtime.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }

        let mut subscriber = self.bus.subscribe();
        let connector = self.connector.clone();
        let routes = Arc::clone(&self.routes);
        *task = Some(tokio::spawn(async move {
            loop {
                let message = match subscriber.recv().await {
                    Ok(message) => message,
                    Err(BusError::Closed) => break,
                    Err(e) => {
                        warn!(error = %e, "Actor writer receive failed");
                        continue;
                    }
                };
                let Some(identifier) = routes.get(&message.channel) else {
                    continue;
                };
                if message.value.is_null() {
                    continue;
                }
                trace!(channel = %message.channel, data_source = %identifier, "Writing value");
                if let Err(e) = connector.write_by_id(identifier, message.value).await {
                    connector.report_error(e);
                }
            }
        }));
        info!(routes = self.routes.len(), "Actor writer started");
    }

    /// Stops writing.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            debug!("Actor writer stopped");
        }
    }

    /// Returns `true` while writing.
    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl<T: OpcUaTransport> fmt::Debug for ActorWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorWriter")
            .field("routes", &self.routes)
            .finish()
    }
}

impl<T: OpcUaTransport> Drop for ActorWriter<T> {
    fn drop(&mut self) {
        self.stop();
    }
}
