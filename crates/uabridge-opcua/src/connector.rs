// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The OPC UA connector.
//!
//! [`OpcUaConnector`] owns one transport and at most one session. It resolves
//! data sources against that session, monitors the ones that ask for it and
//! offers read, write, browse and call operations on them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       OpcUaConnector<T>                         │
//! │   connect / disconnect / read / write / browse / call / events  │
//! └─────────────────────────────────────────────────────────────────┘
//!         │                 │                   │
//!         ▼                 ▼                   ▼
//!  DataSourceRegistry   NodeResolver     Monitor (EventHub fan-out)
//!                            │                   │
//!                            ▼                   ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    OpcUaTransport (trait)                       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use uabridge_core::Value;
//! use uabridge_opcua::client::MemoryTransport;
//! use uabridge_opcua::data_source::DataSource;
//! use uabridge_opcua::types::NodeId;
//! use uabridge_opcua::{ConnectorOptions, OpcUaConnector};
//!
//! # tokio_test_block_on(async {
//! let server = MemoryTransport::new();
//! let ns = server.add_namespace("urn:plant");
//! server.add_variable(&NodeId::OBJECTS_FOLDER, NodeId::string(ns, "Speed"), "Speed", Value::Double(12.5));
//!
//! let connector = OpcUaConnector::new(ConnectorOptions::new("opc.tcp://plant:4840"), server);
//! connector.register_data_sources([("speed", DataSource::node(Some("urn:plant".into()), "s=Speed"))]).await;
//! connector.connect().await.unwrap();
//!
//! assert_eq!(connector.read_by_id("speed").await.unwrap(), Value::Double(12.5));
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use uabridge_core::Value;

use crate::analog::{AnalogDataItem, ANALOG_PROPERTIES};
use crate::client::{
    BrowseResult, NamespaceTable, OpcUaTransport, ReferenceDescription, Session, SessionInfo,
    SessionState, SubscriptionParameters,
};
use crate::coercion::coerce_value;
use crate::data_source::DataSource;
use crate::error::{ConfigurationError, OpcUaError, OpcUaResult};
use crate::events::{AtomicConnectorStats, ConnectorEvent, ConnectorStats, EventHub};
use crate::monitor;
use crate::registry::DataSourceRegistry;
use crate::resolver;
use crate::types::{AttributeId, ConnectionOptions, DataType, NodeId, StatusCode, UserIdentity};

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

// =============================================================================
// ConnectorOptions
// =============================================================================

/// Options of a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorOptions {
    /// Server endpoint, e.g. `opc.tcp://localhost:4840`.
    pub endpoint_url: String,

    /// Client connection options.
    #[serde(default)]
    pub connection: ConnectionOptions,

    /// Session identity.
    #[serde(default)]
    pub identity: UserIdentity,

    /// Parameters of the shared subscription.
    #[serde(default)]
    pub subscription: SubscriptionParameters,

    /// Capacity of the event channel; slow receivers lose the oldest events.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl ConnectorOptions {
    /// Creates options for `endpoint_url` with defaults.
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            connection: ConnectionOptions::default(),
            identity: UserIdentity::Anonymous,
            subscription: SubscriptionParameters::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Sets the session identity.
    pub fn with_identity(mut self, identity: UserIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Sets the connection options.
    pub fn with_connection(mut self, connection: ConnectionOptions) -> Self {
        self.connection = connection;
        self
    }

    /// Sets the subscription parameters.
    pub fn with_subscription(mut self, subscription: SubscriptionParameters) -> Self {
        self.subscription = subscription;
        self
    }

    /// Checks the endpoint URL.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.endpoint_url.starts_with("opc.tcp://") {
            Ok(())
        } else {
            Err(ConfigurationError::InvalidEndpoint {
                endpoint: self.endpoint_url.clone(),
            })
        }
    }
}

// =============================================================================
// OpcUaConnector
// =============================================================================

struct Inner<T: OpcUaTransport> {
    options: ConnectorOptions,
    transport: T,
    registry: DataSourceRegistry,
    session: RwLock<Option<Arc<Session>>>,
    state: RwLock<SessionState>,
    hub: Arc<EventHub>,
    /// Serializes connect and disconnect.
    lifecycle: Mutex<()>,
}

/// OPC UA connector over a transport.
///
/// Cloning yields another handle to the same connector. Independent
/// connectors share nothing.
pub struct OpcUaConnector<T: OpcUaTransport> {
    inner: Arc<Inner<T>>,
}

impl<T: OpcUaTransport> Clone for OpcUaConnector<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: OpcUaTransport> OpcUaConnector<T> {
    /// Creates a disconnected connector.
    pub fn new(options: ConnectorOptions, transport: T) -> Self {
        let hub = Arc::new(EventHub::new(options.event_capacity));
        Self {
            inner: Arc::new(Inner {
                options,
                transport,
                registry: DataSourceRegistry::new(),
                session: RwLock::new(None),
                state: RwLock::new(SessionState::Disconnected),
                hub,
                lifecycle: Mutex::new(()),
            }),
        }
    }

    /// Creates a connector with an initial set of data sources.
    pub fn with_data_sources<I, K>(options: ConnectorOptions, transport: T, data_sources: I) -> Self
    where
        I: IntoIterator<Item = (K, DataSource)>,
        K: Into<String>,
    {
        let connector = Self::new(options, transport);
        connector.inner.registry.register_all(data_sources);
        connector
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns the connector options.
    pub fn options(&self) -> &ConnectorOptions {
        &self.inner.options
    }

    /// Returns the endpoint URL.
    pub fn endpoint_url(&self) -> &str {
        &self.inner.options.endpoint_url
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Returns a receiver for connector events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectorEvent> {
        self.inner.hub.subscribe()
    }

    /// Returns `true` if a session is active.
    pub fn is_connected(&self) -> bool {
        self.inner.session.read().is_some()
    }

    /// Returns the session state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }

    /// Looks up a registered data source.
    pub fn data_source(&self, identifier: &str) -> Option<Arc<DataSource>> {
        self.inner.registry.get(identifier)
    }

    /// Returns the identifiers of all registered data sources.
    pub fn data_source_ids(&self) -> Vec<String> {
        self.inner.registry.ids()
    }

    /// Returns the namespace table of the current session.
    pub fn namespace_table(&self) -> Option<NamespaceTable> {
        self.current_session().map(|s| s.namespaces().clone())
    }

    /// Returns diagnostics of the current session.
    pub fn session_info(&self) -> Option<SessionInfo> {
        self.current_session().map(|s| s.info())
    }

    /// Returns a statistics snapshot.
    pub fn stats(&self) -> ConnectorStats {
        self.inner.hub.stats.snapshot()
    }

    fn current_session(&self) -> Option<Arc<Session>> {
        self.inner.session.read().clone()
    }

    fn set_state(&self, state: SessionState) {
        *self.inner.state.write() = state;
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    /// Connects, creates the session and starts monitoring.
    ///
    /// On failure an `Error` event is emitted, the partially opened transport
    /// is closed and the error is returned. Connecting while a session exists
    /// is a no-op.
    pub async fn connect(&self) -> OpcUaResult<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if self.is_connected() {
            debug!(endpoint = %self.endpoint_url(), "Already connected");
            return Ok(());
        }

        self.set_state(SessionState::Connecting);
        info!(
            endpoint = %self.endpoint_url(),
            transport = %self.inner.transport.display_name(),
            "Connecting to OPC UA server"
        );

        let session = match self.open_session().await {
            Ok(session) => session,
            Err(e) => {
                self.abandon_transport().await;
                self.set_state(SessionState::Disconnected);
                self.inner.hub.emit_error(clone_error(&e));
                return Err(e);
            }
        };

        *self.inner.session.write() = Some(Arc::clone(&session));
        self.set_state(SessionState::Active);
        AtomicConnectorStats::bump(&self.inner.hub.stats.sessions_created);
        info!(
            endpoint = %self.endpoint_url(),
            generation = session.generation(),
            namespaces = session.namespaces().len(),
            "OPC UA session created"
        );
        self.inner.hub.emit(ConnectorEvent::SessionCreated);

        for (identifier, data_source) in self.inner.registry.snapshot() {
            self.monitor_if_requested(&session, &identifier, &data_source).await;
        }
        Ok(())
    }

    async fn open_session(&self) -> OpcUaResult<Arc<Session>> {
        let transport = &self.inner.transport;
        transport
            .connect(&self.inner.options.endpoint_url, &self.inner.options.connection)
            .await?;
        transport.create_session(&self.inner.options.identity).await?;
        let namespaces = NamespaceTable::new(transport.read_namespace_array().await?);
        let generation = self.inner.hub.advance_generation();
        Ok(Arc::new(Session::new(generation, namespaces)))
    }

    async fn abandon_transport(&self) {
        let transport = &self.inner.transport;
        if transport.state().has_session() {
            if let Err(e) = transport.close_session().await {
                debug!(error = %e, "Closing partial session failed");
            }
        }
        if let Err(e) = transport.disconnect().await {
            debug!(error = %e, "Closing transport failed");
        }
    }

    /// Closes the session and the transport.
    ///
    /// Emits `SessionClosing` and `SessionClosed` only if a session existed. Safe to call at any
    /// time; session and subscription state is always cleared. Close failures
    /// are emitted as `Error` events and returned.
    pub async fn disconnect(&self) -> OpcUaResult<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let session = self.inner.session.write().take();
        // Late notifications of the old session are dropped from here on.
        self.inner.hub.advance_generation();

        let mut result = Ok(());
        if session.is_some() {
            self.set_state(SessionState::Closing);
            info!(endpoint = %self.endpoint_url(), "Closing OPC UA session");
            self.inner.hub.emit(ConnectorEvent::SessionClosing);
            if let Err(e) = self.inner.transport.close_session().await {
                self.inner.hub.emit_error(clone_error(&e));
                result = Err(e);
            }
        }

        if self.inner.transport.state() != crate::client::TransportState::Disconnected {
            if let Err(e) = self.inner.transport.disconnect().await {
                self.inner.hub.emit_error(clone_error(&e));
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        self.set_state(SessionState::Disconnected);
        if session.is_some() {
            info!(endpoint = %self.endpoint_url(), "OPC UA session closed");
            self.inner.hub.emit(ConnectorEvent::SessionClosed);
        }
        result
    }

    // =========================================================================
    // Data sources
    // =========================================================================

    /// Registers additional data sources.
    ///
    /// Already known identifiers are ignored. If a session is active, newly
    /// added monitored sources are attached right away. Returns the
    /// identifiers that were added.
    pub async fn register_data_sources<I, K>(&self, data_sources: I) -> Vec<String>
    where
        I: IntoIterator<Item = (K, DataSource)>,
        K: Into<String>,
    {
        let added = self.inner.registry.register_all(data_sources);
        if let Some(session) = self.current_session() {
            for (identifier, data_source) in &added {
                self.monitor_if_requested(&session, identifier, data_source).await;
            }
        }
        added.into_iter().map(|(id, _)| id).collect()
    }

    async fn monitor_if_requested(&self, session: &Session, identifier: &str, data_source: &Arc<DataSource>) {
        if !data_source.should_monitor {
            return;
        }
        let result = monitor::monitor_data_source(
            &self.inner.transport,
            &self.inner.hub,
            session,
            &self.inner.options.subscription,
            identifier,
            data_source,
        )
        .await;
        if let Err(e) = result {
            warn!(data_source = %identifier, error = %e, "Monitoring data source failed");
            self.inner.hub.emit_error(e);
        }
    }

    fn registered(&self, identifier: &str) -> OpcUaResult<Arc<DataSource>> {
        self.data_source(identifier)
            .ok_or_else(|| ConfigurationError::unknown_data_source(identifier).into())
    }

    // =========================================================================
    // Operations
    // =========================================================================

    fn active_session(&self, operation: &'static str) -> OpcUaResult<Arc<Session>> {
        self.current_session()
            .ok_or_else(|| OpcUaError::not_connected(operation))
    }

    async fn resolve(&self, session: &Session, data_source: &DataSource) -> OpcUaResult<NodeId> {
        resolver::resolve(&self.inner.transport, session.namespaces(), &data_source.address).await
    }

    fn track<R>(&self, result: OpcUaResult<R>) -> OpcUaResult<R> {
        if let Err(e) = &result {
            AtomicConnectorStats::bump(&self.inner.hub.stats.errors);
            debug!(category = e.category(), error = %e, "Operation failed");
        }
        result
    }

    /// Reads the value of a variable, coerced for reading.
    pub async fn read_variable_value(&self, data_source: &DataSource) -> OpcUaResult<Value> {
        let result = self
            .read_coerced("readVariableValue", data_source, AttributeId::Value)
            .await;
        self.track(result)
    }

    /// Reads an attribute of a node, coerced for reading.
    pub async fn read_attribute_value(&self, data_source: &DataSource, attribute: AttributeId) -> OpcUaResult<Value> {
        let result = self
            .read_coerced("readAttributeValue", data_source, attribute)
            .await;
        self.track(result)
    }

    async fn read_coerced(
        &self,
        operation: &'static str,
        data_source: &DataSource,
        attribute: AttributeId,
    ) -> OpcUaResult<Value> {
        let session = self.active_session(operation)?;
        let node_id = self.resolve(&session, data_source).await?;
        AtomicConnectorStats::bump(&self.inner.hub.stats.reads);

        let data_value = self.inner.transport.read(&node_id, attribute).await?;
        if !data_value.status.is_good() {
            return Err(OpcUaError::bad_status(operation, data_value.status, data_source.to_string()));
        }
        Ok(coerce_value(
            data_source.coercion.as_ref(),
            data_value.value,
            data_value.source_timestamp,
            true,
        )?)
    }

    /// Writes the value of a variable.
    ///
    /// The value is coerced for writing and typed as the data source's data
    /// type before anything is sent.
    pub async fn write_variable_value(&self, data_source: &DataSource, value: Value) -> OpcUaResult<()> {
        let result = self.write_typed(data_source, value).await;
        self.track(result)
    }

    async fn write_typed(&self, data_source: &DataSource, value: Value) -> OpcUaResult<()> {
        const OPERATION: &str = "writeVariableValue";

        let wire = coerce_value(data_source.coercion.as_ref(), value, None, false)?;
        let data_type = data_source
            .data_type
            .ok_or_else(|| ConfigurationError::MissingDataType {
                identifier: data_source.to_string(),
            })?;
        let typed = data_type.coerce(wire)?;

        let session = self.active_session(OPERATION)?;
        let node_id = self.resolve(&session, data_source).await?;
        AtomicConnectorStats::bump(&self.inner.hub.stats.writes);

        let status = self.inner.transport.write(&node_id, typed).await?;
        if !status.is_good() {
            return Err(OpcUaError::bad_status(OPERATION, status, data_source.to_string()));
        }
        Ok(())
    }

    /// Lists the hierarchical children of a node.
    pub async fn browse(&self, data_source: &DataSource) -> OpcUaResult<Vec<ReferenceDescription>> {
        let result = self.browse_children(data_source).await;
        self.track(result)
    }

    async fn browse_children(&self, data_source: &DataSource) -> OpcUaResult<Vec<ReferenceDescription>> {
        let session = self.active_session("browse")?;
        let node_id = self.resolve(&session, data_source).await?;
        let result = self
            .browse_node("browse", &node_id, &NodeId::HIERARCHICAL_REFERENCES, data_source)
            .await?;
        Ok(result.references)
    }

    async fn browse_node(
        &self,
        operation: &'static str,
        node_id: &NodeId,
        reference_type: &NodeId,
        data_source: &DataSource,
    ) -> OpcUaResult<BrowseResult> {
        AtomicConnectorStats::bump(&self.inner.hub.stats.browses);
        let result = self.inner.transport.browse(node_id, reference_type).await?;
        if !result.status.is_good() {
            return Err(OpcUaError::bad_status(operation, result.status, data_source.to_string()));
        }
        Ok(result)
    }

    /// Reads the metadata of an analog item.
    ///
    /// The value itself is not read and no coercion is applied.
    pub async fn read_analog_data_item(&self, data_source: &DataSource) -> OpcUaResult<AnalogDataItem> {
        let result = self.read_analog(data_source).await;
        self.track(result)
    }

    async fn read_analog(&self, data_source: &DataSource) -> OpcUaResult<AnalogDataItem> {
        const OPERATION: &str = "readAnalogDataItem";

        let session = self.active_session(OPERATION)?;
        let node_id = self.resolve(&session, data_source).await?;
        let properties = self
            .browse_node(OPERATION, &node_id, &NodeId::HAS_PROPERTY, data_source)
            .await?;

        let mut values = Vec::new();
        for reference in &properties.references {
            let name = reference.browse_name.name.as_str();
            if reference.browse_name.namespace_index != 0 || !ANALOG_PROPERTIES.contains(&name) {
                continue;
            }
            AtomicConnectorStats::bump(&self.inner.hub.stats.reads);
            let data_value = self
                .inner
                .transport
                .read(&reference.node_id, AttributeId::Value)
                .await?;
            if !data_value.status.is_good() {
                return Err(OpcUaError::bad_status(
                    OPERATION,
                    data_value.status,
                    format!("{} {}", data_source, name),
                ));
            }
            values.push((name.to_string(), data_value.value));
        }

        AnalogDataItem::from_properties(values.iter().map(|(n, v)| (n.as_str(), v)))?
            .ok_or_else(|| {
                OpcUaError::bad_status(OPERATION, StatusCode::BAD_NOT_FOUND, format!("{} EURange", data_source))
            })
    }

    /// Calls a method with typed input arguments.
    ///
    /// Output arguments are returned as reported, without coercion.
    pub async fn call(
        &self,
        object: &DataSource,
        method: &DataSource,
        input_arguments: Vec<(DataType, Value)>,
    ) -> OpcUaResult<Vec<Value>> {
        let result = self.call_typed(object, method, input_arguments).await;
        self.track(result)
    }

    async fn call_typed(
        &self,
        object: &DataSource,
        method: &DataSource,
        input_arguments: Vec<(DataType, Value)>,
    ) -> OpcUaResult<Vec<Value>> {
        const OPERATION: &str = "call";

        let arguments = input_arguments
            .into_iter()
            .map(|(data_type, value)| data_type.coerce(value))
            .collect::<Result<Vec<_>, _>>()?;

        let session = self.active_session(OPERATION)?;
        let object_id = self.resolve(&session, object).await?;
        let method_id = self.resolve(&session, method).await?;
        AtomicConnectorStats::bump(&self.inner.hub.stats.calls);

        let result = self
            .inner
            .transport
            .call(&object_id, &method_id, arguments)
            .await?;
        if !result.status.is_good() {
            return Err(OpcUaError::bad_status(OPERATION, result.status, format!("{} {}", object, method)));
        }
        Ok(result.output_arguments)
    }

    // =========================================================================
    // Identifier-based wrappers
    // =========================================================================

    /// Reads a registered data source.
    pub async fn read_by_id(&self, identifier: &str) -> OpcUaResult<Value> {
        let data_source = self.registered(identifier)?;
        self.read_variable_value(&data_source).await
    }

    /// Writes a registered data source.
    pub async fn write_by_id(&self, identifier: &str, value: Value) -> OpcUaResult<()> {
        let data_source = self.registered(identifier)?;
        self.write_variable_value(&data_source, value).await
    }

    /// Calls a method given by registered object and method data sources.
    pub async fn call_by_id(
        &self,
        object: &str,
        method: &str,
        input_arguments: Vec<(DataType, Value)>,
    ) -> OpcUaResult<Vec<Value>> {
        let object = self.registered(object)?;
        let method = self.registered(method)?;
        self.call(&object, &method, input_arguments).await
    }

    /// Emits an error event on behalf of a collaborator.
    pub(crate) fn report_error(&self, error: OpcUaError) {
        self.inner.hub.emit_error(error);
    }
}

impl<T: OpcUaTransport> fmt::Debug for OpcUaConnector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpcUaConnector")
            .field("endpoint_url", &self.inner.options.endpoint_url)
            .field("state", &self.state())
            .field("data_sources", &self.inner.registry.len())
            .field("event_receivers", &self.inner.hub.receiver_count())
            .finish()
    }
}

/// Rebuilds an error that is also kept elsewhere.
fn clone_error(error: &OpcUaError) -> OpcUaError {
    match error {
        OpcUaError::Connection(e) => OpcUaError::Connection(e.clone()),
        OpcUaError::NotConnected { operation } => OpcUaError::not_connected(operation),
        OpcUaError::Address(e) => OpcUaError::Address(e.clone()),
        OpcUaError::BadStatus {
            operation,
            status,
            target,
        } => OpcUaError::bad_status(operation, *status, target.clone()),
        OpcUaError::Coercion(e) => OpcUaError::Coercion(e.clone()),
        OpcUaError::Monitor { node, message } => OpcUaError::monitor(node, message.clone()),
        OpcUaError::Configuration(e) => OpcUaError::Configuration(e.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MemoryService, MemoryTransport};
    use crate::coercion::Coercion;

    fn plant() -> (MemoryTransport, NodeId) {
        let server = MemoryTransport::new();
        let ns = server.add_namespace("urn:plant");
        let node = server.add_variable(&NodeId::OBJECTS_FOLDER, NodeId::string(ns, "Level"), "Level", Value::Double(3.0));
        (server, node)
    }

    fn level() -> DataSource {
        DataSource::node(Some("urn:plant".into()), "s=Level").with_data_type(DataType::Double)
    }

    #[tokio::test]
    async fn test_operations_require_session() {
        let (server, _) = plant();
        let connector = OpcUaConnector::new(ConnectorOptions::new("opc.tcp://plant"), server);
        let err = connector.read_variable_value(&level()).await.unwrap_err();
        assert_eq!(err.to_string(), "readVariableValue: no active OPC UA session");
        assert_eq!(connector.stats().errors, 1);
    }

    #[tokio::test]
    async fn test_connect_emits_session_created() {
        let (server, _) = plant();
        let connector = OpcUaConnector::new(ConnectorOptions::new("opc.tcp://plant"), server);
        let mut events = connector.subscribe();

        connector.connect().await.unwrap();
        assert!(matches!(events.recv().await.unwrap(), ConnectorEvent::SessionCreated));
        assert!(connector.is_connected());
        assert_eq!(connector.state(), SessionState::Active);
        assert_eq!(connector.namespace_table().unwrap().index_of("urn:plant"), Some(1));

        // Second connect keeps the session.
        connector.connect().await.unwrap();
        assert_eq!(connector.stats().sessions_created, 1);
    }

    #[tokio::test]
    async fn test_connect_failure_emits_error() {
        let (server, _) = plant();
        server.fail_session(Some("BadIdentityTokenRejected"));
        let connector = OpcUaConnector::new(ConnectorOptions::new("opc.tcp://plant"), server.clone());
        let mut events = connector.subscribe();

        assert!(connector.connect().await.is_err());
        assert!(matches!(events.recv().await.unwrap(), ConnectorEvent::Error(_)));
        assert!(!connector.is_connected());
        assert_eq!(server.state(), crate::client::TransportState::Disconnected);
    }

    #[tokio::test]
    async fn test_read_write_with_status() {
        let (server, node) = plant();
        let connector = OpcUaConnector::new(ConnectorOptions::new("opc.tcp://plant"), server.clone());
        connector.connect().await.unwrap();

        connector.write_variable_value(&level(), Value::Int32(7)).await.unwrap();
        assert_eq!(server.value(&node), Some(Value::Double(7.0)));
        assert_eq!(connector.read_variable_value(&level()).await.unwrap(), Value::Double(7.0));

        server.inject_status(MemoryService::Read, &node, StatusCode::BAD_NOT_READABLE);
        let err = connector.read_variable_value(&level()).await.unwrap_err();
        assert_eq!(err.to_string(), "readVariableValue: BadNotReadable [urn:plant]s=Level");
    }

    #[tokio::test]
    async fn test_write_requires_data_type() {
        let (server, node) = plant();
        let connector = OpcUaConnector::new(ConnectorOptions::new("opc.tcp://plant"), server.clone());
        connector.connect().await.unwrap();

        let untyped = DataSource::node(Some("urn:plant".into()), "s=Level");
        let err = connector.write_variable_value(&untyped, Value::Double(1.0)).await.unwrap_err();
        assert!(matches!(err, OpcUaError::Configuration(ConfigurationError::MissingDataType { .. })));
        assert_eq!(server.value(&node), Some(Value::Double(3.0)));
    }

    #[tokio::test]
    async fn test_write_coercion_failure_skips_wire() {
        let (server, node) = plant();
        let connector = OpcUaConnector::new(ConnectorOptions::new("opc.tcp://plant"), server.clone());
        connector.connect().await.unwrap();

        let broken = level().with_coercion(Coercion::new("reject", |_, _, _| {
            Err(crate::error::CoercionError::failed("rejected"))
        }));
        assert!(matches!(
            connector.write_variable_value(&broken, Value::Double(1.0)).await,
            Err(OpcUaError::Coercion(_))
        ));
        assert_eq!(connector.stats().writes, 0);
        assert_eq!(server.value(&node), Some(Value::Double(3.0)));
    }

    #[tokio::test]
    async fn test_disconnect_without_session() {
        let (server, _) = plant();
        let connector = OpcUaConnector::new(ConnectorOptions::new("opc.tcp://plant"), server);
        let mut events = connector.subscribe();

        connector.disconnect().await.unwrap();
        connector.disconnect().await.unwrap();
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_options_validate() {
        assert!(ConnectorOptions::new("opc.tcp://localhost:4840").validate().is_ok());
        assert!(ConnectorOptions::new("http://localhost").validate().is_err());
    }
}
