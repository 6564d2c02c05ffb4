// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connector events and statistics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uabridge_core::Value;

use crate::data_source::DataSource;
use crate::error::OpcUaError;

// =============================================================================
// ConnectorEvent
// =============================================================================

/// Events emitted by a connector.
///
/// Delivered to every receiver obtained from `OpcUaConnector::subscribe`.
/// Events of one monitored item arrive in the order the server reported them.
#[derive(Debug, Clone)]
pub enum ConnectorEvent {
    /// A session was created and the namespace table read.
    SessionCreated,

    /// `disconnect()` started tearing the session down.
    ///
    /// Operations issued from here on fail with `NotConnected`.
    SessionClosing,

    /// The session was closed by `disconnect()`.
    SessionClosed,

    /// Something failed outside of a direct operation call.
    Error(Arc<OpcUaError>),

    /// A monitored data source changed.
    DataValueChange {
        /// Data source identifier.
        identifier: String,
        /// The data source descriptor.
        data_source: Arc<DataSource>,
        /// The coerced value.
        value: Value,
        /// Source timestamp reported by the server.
        source_timestamp: Option<DateTime<Utc>>,
    },
}

impl ConnectorEvent {
    /// Returns a short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionCreated => "session_created",
            Self::SessionClosing => "session_closing",
            Self::SessionClosed => "session_closed",
            Self::Error(_) => "error",
            Self::DataValueChange { .. } => "data_value_change",
        }
    }
}

impl fmt::Display for ConnectorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionCreated => write!(f, "session created"),
            Self::SessionClosing => write!(f, "session closing"),
            Self::SessionClosed => write!(f, "session closed"),
            Self::Error(e) => write!(f, "error: {}", e),
            Self::DataValueChange {
                identifier, value, ..
            } => write!(f, "{} = {}", identifier, value),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Statistics snapshot of a connector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectorStats {
    /// Sessions created.
    pub sessions_created: u64,
    /// Read operations issued.
    pub reads: u64,
    /// Write operations issued.
    pub writes: u64,
    /// Browse operations issued.
    pub browses: u64,
    /// Method calls issued.
    pub calls: u64,
    /// Data value change events emitted.
    pub notifications: u64,
    /// Failed operations and error events.
    pub errors: u64,
}

#[derive(Debug, Default)]
pub(crate) struct AtomicConnectorStats {
    pub sessions_created: AtomicU64,
    pub reads: AtomicU64,
    pub writes: AtomicU64,
    pub browses: AtomicU64,
    pub calls: AtomicU64,
    pub notifications: AtomicU64,
    pub errors: AtomicU64,
}

impl AtomicConnectorStats {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConnectorStats {
        ConnectorStats {
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            browses: self.browses.load(Ordering::Relaxed),
            calls: self.calls.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// EventHub
// =============================================================================

/// Event fan-out shared by the connector and its notification handlers.
///
/// The generation identifies the current session; handlers created for an
/// older generation drop their notifications.
pub(crate) struct EventHub {
    sender: broadcast::Sender<ConnectorEvent>,
    generation: AtomicU64,
    pub stats: AtomicConnectorStats,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            generation: AtomicU64::new(0),
            stats: AtomicConnectorStats::default(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectorEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ConnectorEvent) {
        // No receivers is fine.
        let _ = self.sender.send(event);
    }

    pub fn emit_error(&self, error: OpcUaError) {
        AtomicConnectorStats::bump(&self.stats.errors);
        error.log("connector");
        self.emit(ConnectorEvent::Error(Arc::new(error)));
    }

    pub fn emit_change(
        &self,
        identifier: &str,
        data_source: &Arc<DataSource>,
        value: Value,
        source_timestamp: Option<DateTime<Utc>>,
    ) {
        AtomicConnectorStats::bump(&self.stats.notifications);
        tracing::trace!(data_source = %identifier, value = %value, "Data value changed");
        self.emit(ConnectorEvent::DataValueChange {
            identifier: identifier.to_string(),
            data_source: Arc::clone(data_source),
            value,
            source_timestamp,
        });
    }

    /// Starts a new generation and returns it.
    pub fn advance_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
