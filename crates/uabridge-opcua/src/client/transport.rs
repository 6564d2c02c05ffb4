// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA transport abstraction layer.
//!
//! The connector talks to a server exclusively through [`OpcUaTransport`].
//! Every service returns the server's status code next to its payload, so the
//! connector can decide what counts as a failure.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uabridge_core::Value;

use crate::error::{ConnectionError, OpcUaResult};
use crate::relative_path::RelativePath;
use crate::types::{
    AttributeId, ConnectionOptions, NodeClass, NodeId, QualifiedName, StatusCode, UserIdentity,
};

// =============================================================================
// TransportState
// =============================================================================

/// Connection state of the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    /// Transport is not connected.
    #[default]
    Disconnected,

    /// Transport is connected; no session yet.
    Connected,

    /// A session is active.
    SessionActive,
}

impl TransportState {
    /// Returns `true` if a session is active.
    #[inline]
    pub fn has_session(&self) -> bool {
        matches!(self, Self::SessionActive)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connected => write!(f, "Connected"),
            Self::SessionActive => write!(f, "SessionActive"),
        }
    }
}

// =============================================================================
// Service payloads
// =============================================================================

/// A value with status and timestamps, as reported by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct DataValue {
    /// The value; `Null` if the server returned none.
    pub value: Value,
    /// Status of the value.
    pub status: StatusCode,
    /// Timestamp assigned by the data source, if reported.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Timestamp assigned by the server, if reported.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    /// A good value without timestamps.
    pub fn good(value: Value) -> Self {
        Self {
            value,
            status: StatusCode::GOOD,
            source_timestamp: None,
            server_timestamp: None,
        }
    }

    /// A value-less result with the given status.
    pub fn bad(status: StatusCode) -> Self {
        Self {
            value: Value::Null,
            status,
            source_timestamp: None,
            server_timestamp: None,
        }
    }

    /// Sets the source timestamp.
    pub fn with_source_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.source_timestamp = Some(timestamp);
        self
    }
}

/// Result of translating one browse path.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowsePathResult {
    /// Status of the translation.
    pub status: StatusCode,
    /// Matching target nodes.
    pub targets: Vec<NodeId>,
}

/// A reference returned by browsing a node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceDescription {
    /// Type of the reference.
    pub reference_type: NodeId,
    /// `true` for forward references.
    pub is_forward: bool,
    /// Target node.
    pub node_id: NodeId,
    /// Browse name of the target.
    pub browse_name: QualifiedName,
    /// Display name of the target.
    pub display_name: String,
    /// Node class of the target.
    pub node_class: NodeClass,
    /// Type definition of the target, if any.
    pub type_definition: Option<NodeId>,
}

/// Result of browsing one node.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowseResult {
    /// Status of the browse.
    pub status: StatusCode,
    /// References found.
    pub references: Vec<ReferenceDescription>,
}

/// Result of one method call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    /// Status of the call.
    pub status: StatusCode,
    /// Per-argument status of the inputs.
    pub input_argument_results: Vec<StatusCode>,
    /// Output argument values.
    pub output_arguments: Vec<Value>,
}

// =============================================================================
// Subscription parameters
// =============================================================================

/// Parameters of the connector's subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionParameters {
    /// Requested publishing interval in milliseconds.
    pub publishing_interval: f64,
    /// Requested lifetime count.
    pub lifetime_count: u32,
    /// Requested max keep-alive count.
    pub max_keep_alive_count: u32,
    /// Max notifications per publish; 0 means unlimited.
    pub max_notifications_per_publish: u32,
    /// Relative priority.
    pub priority: u8,
    /// Publishing enabled.
    pub publishing_enabled: bool,
}

impl Default for SubscriptionParameters {
    fn default() -> Self {
        Self {
            publishing_interval: 100.0,
            lifetime_count: 60,
            max_keep_alive_count: 10,
            max_notifications_per_publish: 0,
            priority: 1,
            publishing_enabled: true,
        }
    }
}

/// Parameters of a monitored item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringParameters {
    /// Sampling interval in milliseconds; negative selects the publishing interval.
    pub sampling_interval: f64,
    /// Server-side queue size.
    pub queue_size: u32,
    /// Discard the oldest entry when the queue is full.
    pub discard_oldest: bool,
}

impl MonitoringParameters {
    /// Latest-value-only monitoring with the given sampling interval.
    pub fn latest(sampling_interval: Option<f64>) -> Self {
        Self {
            sampling_interval: sampling_interval.unwrap_or(-1.0),
            queue_size: 1,
            discard_oldest: true,
        }
    }
}

/// Notification delivered for one monitored item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemEvent {
    /// The value changed.
    Changed(DataValue),
    /// The server reported a problem with the item.
    Error(String),
}

/// Callback receiving the notifications of one monitored item.
///
/// Called on the transport's notification path; it must not block.
pub type ItemHandler = Arc<dyn Fn(ItemEvent) + Send + Sync>;

/// Callback receiving internal errors of a subscription.
pub type SubscriptionErrorHandler = Arc<dyn Fn(String) + Send + Sync>;

// =============================================================================
// OpcUaTransport Trait
// =============================================================================

/// Abstract transport trait for OPC UA communication.
///
/// Methods take `&self`; implementations keep their state behind interior
/// mutability so that independent services may be in flight concurrently.
#[async_trait]
pub trait OpcUaTransport: Send + Sync + 'static {
    // =========================================================================
    // Connection Management
    // =========================================================================

    /// Opens the transport connection to `endpoint_url`.
    async fn connect(&self, endpoint_url: &str, options: &ConnectionOptions) -> OpcUaResult<()>;

    /// Creates and activates a session.
    async fn create_session(&self, identity: &UserIdentity) -> OpcUaResult<()>;

    /// Closes the session. Drops its subscriptions.
    async fn close_session(&self) -> OpcUaResult<()>;

    /// Closes the transport connection.
    async fn disconnect(&self) -> OpcUaResult<()>;

    /// Returns the current transport state.
    fn state(&self) -> TransportState;

    /// Reads the server's namespace array (`i=2255`).
    async fn read_namespace_array(&self) -> OpcUaResult<Vec<String>> {
        let data_value = self.read(&NodeId::NAMESPACE_ARRAY, AttributeId::Value).await?;
        if !data_value.status.is_good() {
            return Err(ConnectionError::NamespaceArray {
                message: data_value.status.to_string(),
            }
            .into());
        }
        match data_value.value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(uri) => Ok(uri),
                    other => Err(ConnectionError::NamespaceArray {
                        message: format!("unexpected entry of type {}", other.type_name()),
                    }
                    .into()),
                })
                .collect(),
            other => Err(ConnectionError::NamespaceArray {
                message: format!("unexpected value of type {}", other.type_name()),
            }
            .into()),
        }
    }

    // =========================================================================
    // Services
    // =========================================================================

    /// Translates a browse path into node ids.
    async fn translate_browse_path(
        &self,
        root: &NodeId,
        path: &RelativePath,
    ) -> OpcUaResult<BrowsePathResult>;

    /// Reads one attribute of a node.
    async fn read(&self, node_id: &NodeId, attribute: AttributeId) -> OpcUaResult<DataValue>;

    /// Writes the value attribute of a node.
    async fn write(&self, node_id: &NodeId, value: Value) -> OpcUaResult<StatusCode>;

    /// Lists forward references of `reference_type` (and subtypes) from a node.
    async fn browse(&self, node_id: &NodeId, reference_type: &NodeId) -> OpcUaResult<BrowseResult>;

    /// Calls a method on an object.
    async fn call(
        &self,
        object_id: &NodeId,
        method_id: &NodeId,
        input_arguments: Vec<Value>,
    ) -> OpcUaResult<CallResult>;

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    /// Creates a subscription and returns its id.
    async fn create_subscription(
        &self,
        parameters: &SubscriptionParameters,
        on_error: SubscriptionErrorHandler,
    ) -> OpcUaResult<u32>;

    /// Creates a monitored item on the value attribute of a node.
    ///
    /// Notifications carry source timestamps only.
    async fn create_monitored_item(
        &self,
        subscription_id: u32,
        node_id: &NodeId,
        parameters: &MonitoringParameters,
        handler: ItemHandler,
    ) -> OpcUaResult<u32>;

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Returns the transport display name for logging.
    fn display_name(&self) -> String;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_subscription_parameters() {
        let parameters = SubscriptionParameters::default();
        assert_eq!(parameters.publishing_interval, 100.0);
        assert_eq!(parameters.lifetime_count, 60);
        assert_eq!(parameters.max_keep_alive_count, 10);
        assert_eq!(parameters.max_notifications_per_publish, 0);
        assert_eq!(parameters.priority, 1);
        assert!(parameters.publishing_enabled);
    }

    #[test]
    fn test_latest_monitoring_parameters() {
        let parameters = MonitoringParameters::latest(None);
        assert_eq!(parameters.sampling_interval, -1.0);
        assert_eq!(parameters.queue_size, 1);
        assert!(parameters.discard_oldest);

        assert_eq!(MonitoringParameters::latest(Some(250.0)).sampling_interval, 250.0);
    }

    #[test]
    fn test_data_value_constructors() {
        let good = DataValue::good(Value::Double(1.5));
        assert!(good.status.is_good());
        assert!(good.source_timestamp.is_none());

        let bad = DataValue::bad(StatusCode::BAD_NOT_READABLE);
        assert!(bad.status.is_bad());
        assert!(bad.value.is_null());
    }

    #[test]
    fn test_transport_state() {
        assert!(TransportState::SessionActive.has_session());
        assert!(!TransportState::Connected.has_session());
        assert_eq!(TransportState::default(), TransportState::Disconnected);
    }
}
