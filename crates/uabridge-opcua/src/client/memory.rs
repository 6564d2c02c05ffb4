// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-memory OPC UA transport.
//!
//! [`MemoryTransport`] holds a small address space (nodes, references, method
//! handlers) and serves the transport services against it. It drives the test
//! suite and the `--simulate` mode of the binary.
//!
//! Besides serving requests, the handle lets the owner act as the server:
//! change values (which notifies monitored items), inject status codes for a
//! service on a node, push item or subscription errors, and make connection or
//! session establishment fail.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uabridge_core::Value;

use super::transport::{
    BrowsePathResult, BrowseResult, CallResult, DataValue, ItemEvent, ItemHandler,
    MonitoringParameters, OpcUaTransport, ReferenceDescription, SubscriptionErrorHandler,
    SubscriptionParameters, TransportState,
};
use crate::error::{ConnectionError, OpcUaError, OpcUaResult};
use crate::relative_path::{is_reference_subtype, RelativePath};
use crate::types::{
    AttributeId, ConnectionOptions, NodeClass, NodeId, QualifiedName, StatusCode, UserIdentity,
};

const STANDARD_NAMESPACE: &str = "http://opcfoundation.org/UA/";
const ORGANIZES: NodeId = NodeId::numeric(0, 35);
const HAS_COMPONENT: NodeId = NodeId::numeric(0, 47);
const HAS_TYPE_DEFINITION: NodeId = NodeId::numeric(0, 40);

/// Handler run for a method call; returns output arguments or a bad status.
pub type MethodHandler = Arc<dyn Fn(&[Value]) -> Result<Vec<Value>, StatusCode> + Send + Sync>;

/// Service selector for injected status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryService {
    /// Read service.
    Read,
    /// Write service.
    Write,
    /// Browse service.
    Browse,
    /// Call service (keyed by method node).
    Call,
    /// Monitored item creation.
    Monitor,
}

/// A recorded method call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Object node.
    pub object_id: NodeId,
    /// Method node.
    pub method_id: NodeId,
    /// Input arguments as received.
    pub input_arguments: Vec<Value>,
}

/// A monitored item as seen by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedItem {
    /// Subscription the item belongs to.
    pub subscription_id: u32,
    /// Monitored node.
    pub node_id: NodeId,
    /// Requested parameters.
    pub parameters: MonitoringParameters,
}

struct MemoryNode {
    browse_name: QualifiedName,
    display_name: String,
    node_class: NodeClass,
    value: Option<DataValue>,
    writable: bool,
}

struct MemoryReference {
    source: NodeId,
    reference_type: NodeId,
    target: NodeId,
}

struct MemoryItem {
    id: u32,
    subscription_id: u32,
    node_id: NodeId,
    parameters: MonitoringParameters,
    handler: ItemHandler,
}

struct MemorySubscription {
    id: u32,
    parameters: SubscriptionParameters,
    on_error: SubscriptionErrorHandler,
}

#[derive(Default)]
struct MemoryState {
    namespaces: Vec<String>,
    nodes: HashMap<NodeId, MemoryNode>,
    references: Vec<MemoryReference>,
    methods: HashMap<NodeId, MethodHandler>,
    state: TransportState,
    endpoint_url: Option<String>,
    identity: Option<UserIdentity>,
    subscriptions: Vec<MemorySubscription>,
    items: Vec<MemoryItem>,
    next_id: u32,
    injected: HashMap<(MemoryService, NodeId), StatusCode>,
    connect_failure: Option<String>,
    session_failure: Option<String>,
    close_failure: Option<String>,
    calls: Vec<RecordedCall>,
    sessions_created: u32,
}

impl MemoryState {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn require_session(&self, service: &'static str) -> OpcUaResult<()> {
        if self.state.has_session() {
            Ok(())
        } else {
            Err(ConnectionError::transport(format!("{}: session is not active", service)).into())
        }
    }

    fn injected(&self, service: MemoryService, node_id: &NodeId) -> Option<StatusCode> {
        self.injected.get(&(service, node_id.clone())).copied()
    }

    fn handlers_for(&self, node_id: &NodeId) -> Vec<ItemHandler> {
        self.items
            .iter()
            .filter(|item| &item.node_id == node_id)
            .map(|item| Arc::clone(&item.handler))
            .collect()
    }

    fn browse_name_matches(&self, node_id: &NodeId, name: &QualifiedName) -> bool {
        self.nodes
            .get(node_id)
            .map_or(false, |node| &node.browse_name == name)
    }

    fn sync_namespace_array(&mut self) {
        let uris = Value::Array(self.namespaces.iter().cloned().map(Value::String).collect());
        if let Some(node) = self.nodes.get_mut(&NodeId::NAMESPACE_ARRAY) {
            node.value = Some(DataValue::good(uris));
        }
    }
}

/// An in-memory OPC UA server behind the transport trait.
///
/// Cloning yields another handle to the same address space.
///
/// # Examples
///
/// ```
/// use uabridge_core::Value;
/// use uabridge_opcua::client::MemoryTransport;
/// use uabridge_opcua::types::NodeId;
///
/// let server = MemoryTransport::new();
/// let ns = server.add_namespace("urn:plant");
/// let plc = server.add_object(&NodeId::OBJECTS_FOLDER, NodeId::string(ns, "PLC2"), "PLC2");
/// let temperature = server.add_variable(&plc, NodeId::string(ns, "PLC2.Temperature"), "Temperature", Value::Double(21.0));
///
/// assert_eq!(server.value(&temperature), Some(Value::Double(21.0)));
/// ```
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    /// Creates a server with the standard folders and the namespace array.
    pub fn new() -> Self {
        let transport = Self {
            inner: Arc::new(Mutex::new(MemoryState {
                namespaces: vec![STANDARD_NAMESPACE.to_string()],
                ..MemoryState::default()
            })),
        };

        transport.insert_node(NodeId::ROOT_FOLDER, QualifiedName::standard("Root"), NodeClass::Object, None);
        for (folder, name) in [
            (NodeId::OBJECTS_FOLDER, "Objects"),
            (NodeId::TYPES_FOLDER, "Types"),
            (NodeId::VIEWS_FOLDER, "Views"),
        ] {
            transport.insert_node(folder.clone(), QualifiedName::standard(name), NodeClass::Object, None);
            transport.add_reference(&NodeId::ROOT_FOLDER, ORGANIZES, &folder);
        }
        transport.insert_node(NodeId::SERVER, QualifiedName::standard("Server"), NodeClass::Object, None);
        transport.add_reference(&NodeId::OBJECTS_FOLDER, ORGANIZES, &NodeId::SERVER);
        transport.insert_node(
            NodeId::NAMESPACE_ARRAY,
            QualifiedName::standard("NamespaceArray"),
            NodeClass::Variable,
            None,
        );
        transport.add_reference(&NodeId::SERVER, NodeId::HAS_PROPERTY, &NodeId::NAMESPACE_ARRAY);
        transport.inner.lock().sync_namespace_array();

        transport
    }

    fn insert_node(
        &self,
        node_id: NodeId,
        browse_name: QualifiedName,
        node_class: NodeClass,
        value: Option<Value>,
    ) -> NodeId {
        let display_name = browse_name.name.clone();
        self.inner.lock().nodes.insert(
            node_id.clone(),
            MemoryNode {
                browse_name,
                display_name,
                node_class,
                value: value.map(|v| DataValue::good(v).with_source_timestamp(Utc::now())),
                writable: node_class == NodeClass::Variable,
            },
        );
        node_id
    }

    // =========================================================================
    // Address space construction
    // =========================================================================

    /// Registers a namespace URI and returns its index.
    pub fn add_namespace(&self, uri: impl Into<String>) -> u16 {
        let uri = uri.into();
        let mut state = self.inner.lock();
        let index = match state.namespaces.iter().position(|u| *u == uri) {
            Some(index) => index,
            None => {
                state.namespaces.push(uri);
                state.namespaces.len() - 1
            }
        };
        state.sync_namespace_array();
        u16::try_from(index).unwrap_or(u16::MAX)
    }

    /// Inserts a namespace URI at `index`, as a restarted server might.
    ///
    /// Namespaces at or after `index` move up by one and every node id and
    /// browse name in them is renumbered. Index 0 stays the standard
    /// namespace, so lower indices are clamped to 1. Returns the index used.
    pub fn insert_namespace(&self, index: u16, uri: impl Into<String>) -> u16 {
        let mut state = self.inner.lock();
        let index = index.max(1).min(u16::try_from(state.namespaces.len()).unwrap_or(u16::MAX));
        state.namespaces.insert(usize::from(index), uri.into());

        let shift = |node_id: &NodeId| {
            let mut node_id = node_id.clone();
            if node_id.namespace_index >= index {
                node_id.namespace_index += 1;
            }
            node_id
        };

        let nodes = std::mem::take(&mut state.nodes);
        state.nodes = nodes
            .into_iter()
            .map(|(node_id, mut node)| {
                if node.browse_name.namespace_index >= index {
                    node.browse_name.namespace_index += 1;
                }
                (shift(&node_id), node)
            })
            .collect();
        for reference in &mut state.references {
            reference.source = shift(&reference.source);
            reference.reference_type = shift(&reference.reference_type);
            reference.target = shift(&reference.target);
        }
        let methods = std::mem::take(&mut state.methods);
        state.methods = methods.into_iter().map(|(id, handler)| (shift(&id), handler)).collect();
        let injected = std::mem::take(&mut state.injected);
        state.injected = injected
            .into_iter()
            .map(|((service, id), status)| ((service, shift(&id)), status))
            .collect();
        for item in &mut state.items {
            item.node_id = shift(&item.node_id);
        }

        state.sync_namespace_array();
        index
    }

    /// Adds an object organized below `parent`.
    ///
    /// The browse name takes the namespace of `node_id`.
    pub fn add_object(&self, parent: &NodeId, node_id: NodeId, browse_name: &str) -> NodeId {
        let name = QualifiedName::new(node_id.namespace_index, browse_name);
        let node_id = self.insert_node(node_id, name, NodeClass::Object, None);
        let reference = if parent.is_standard() { ORGANIZES } else { HAS_COMPONENT };
        self.add_reference(parent, reference, &node_id);
        node_id
    }

    /// Adds a variable as a component of `parent`.
    pub fn add_variable(&self, parent: &NodeId, node_id: NodeId, browse_name: &str, value: Value) -> NodeId {
        let name = QualifiedName::new(node_id.namespace_index, browse_name);
        let node_id = self.insert_node(node_id, name, NodeClass::Variable, Some(value));
        self.add_reference(parent, HAS_COMPONENT, &node_id);
        node_id
    }

    /// Adds a property of `parent`; its browse name is in namespace 0.
    pub fn add_property(&self, parent: &NodeId, node_id: NodeId, browse_name: &str, value: Value) -> NodeId {
        let node_id = self.insert_node(
            node_id,
            QualifiedName::standard(browse_name),
            NodeClass::Variable,
            Some(value),
        );
        self.add_reference(parent, NodeId::HAS_PROPERTY, &node_id);
        node_id
    }

    /// Adds a method component of `object` served by `handler`.
    pub fn add_method<F>(&self, object: &NodeId, node_id: NodeId, browse_name: &str, handler: F) -> NodeId
    where
        F: Fn(&[Value]) -> Result<Vec<Value>, StatusCode> + Send + Sync + 'static,
    {
        let name = QualifiedName::new(node_id.namespace_index, browse_name);
        let node_id = self.insert_node(node_id, name, NodeClass::Method, None);
        self.add_reference(object, HAS_COMPONENT, &node_id);
        self.inner.lock().methods.insert(node_id.clone(), Arc::new(handler));
        node_id
    }

    /// Adds a reference.
    pub fn add_reference(&self, source: &NodeId, reference_type: NodeId, target: &NodeId) {
        self.inner.lock().references.push(MemoryReference {
            source: source.clone(),
            reference_type,
            target: target.clone(),
        });
    }

    /// Makes a variable reject writes with `BadNotWritable`.
    pub fn set_read_only(&self, node_id: &NodeId) {
        if let Some(node) = self.inner.lock().nodes.get_mut(node_id) {
            node.writable = false;
        }
    }

    // =========================================================================
    // Server-side behavior
    // =========================================================================

    /// Changes a variable value and notifies its monitored items.
    pub fn set_value(&self, node_id: &NodeId, value: Value) {
        self.publish(node_id, DataValue::good(value).with_source_timestamp(Utc::now()));
    }

    /// Stores `data_value` as the node's value and notifies its monitored items.
    pub fn publish(&self, node_id: &NodeId, data_value: DataValue) {
        let handlers = {
            let mut state = self.inner.lock();
            if let Some(node) = state.nodes.get_mut(node_id) {
                node.value = Some(data_value.clone());
            }
            state.handlers_for(node_id)
        };
        for handler in handlers {
            handler(ItemEvent::Changed(data_value.clone()));
        }
    }

    /// Reports an error on every monitored item of `node_id`.
    pub fn push_item_error(&self, node_id: &NodeId, message: &str) {
        let handlers = self.inner.lock().handlers_for(node_id);
        for handler in handlers {
            handler(ItemEvent::Error(message.to_string()));
        }
    }

    /// Reports an internal error on every subscription.
    pub fn push_subscription_error(&self, message: &str) {
        let handlers: Vec<_> = self
            .inner
            .lock()
            .subscriptions
            .iter()
            .map(|s| Arc::clone(&s.on_error))
            .collect();
        for handler in handlers {
            handler(message.to_string());
        }
    }

    /// Makes `service` on `node_id` answer with `status`.
    pub fn inject_status(&self, service: MemoryService, node_id: &NodeId, status: StatusCode) {
        self.inner.lock().injected.insert((service, node_id.clone()), status);
    }

    /// Removes all injected status codes.
    pub fn clear_injected(&self) {
        self.inner.lock().injected.clear();
    }

    /// Makes `connect` fail with `message`, or succeed again with `None`.
    pub fn fail_connect(&self, message: Option<&str>) {
        self.inner.lock().connect_failure = message.map(str::to_string);
    }

    /// Makes `create_session` fail with `message`, or succeed again with `None`.
    pub fn fail_session(&self, message: Option<&str>) {
        self.inner.lock().session_failure = message.map(str::to_string);
    }

    /// Makes `close_session` fail with `message`, or succeed again with `None`.
    pub fn fail_close(&self, message: Option<&str>) {
        self.inner.lock().close_failure = message.map(str::to_string);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Returns the current value of a node.
    pub fn value(&self, node_id: &NodeId) -> Option<Value> {
        self.inner
            .lock()
            .nodes
            .get(node_id)
            .and_then(|node| node.value.as_ref().map(|dv| dv.value.clone()))
    }

    /// Returns all method calls served so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().calls.clone()
    }

    /// Returns the monitored items of the current session.
    pub fn monitored_items(&self) -> Vec<RecordedItem> {
        self.inner
            .lock()
            .items
            .iter()
            .map(|item| RecordedItem {
                subscription_id: item.subscription_id,
                node_id: item.node_id.clone(),
                parameters: item.parameters.clone(),
            })
            .collect()
    }

    /// Returns the parameters of the current session's subscriptions.
    pub fn subscriptions(&self) -> Vec<SubscriptionParameters> {
        self.inner
            .lock()
            .subscriptions
            .iter()
            .map(|s| s.parameters.clone())
            .collect()
    }

    /// Returns the number of sessions created so far.
    pub fn sessions_created(&self) -> u32 {
        self.inner.lock().sessions_created
    }

    /// Returns the identity of the current session.
    pub fn session_identity(&self) -> Option<UserIdentity> {
        self.inner.lock().identity.clone()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("MemoryTransport")
            .field("state", &state.state)
            .field("nodes", &state.nodes.len())
            .field("monitored_items", &state.items.len())
            .finish()
    }
}

#[async_trait]
impl OpcUaTransport for MemoryTransport {
    async fn connect(&self, endpoint_url: &str, _options: &ConnectionOptions) -> OpcUaResult<()> {
        let mut state = self.inner.lock();
        if let Some(message) = &state.connect_failure {
            return Err(ConnectionError::connect_failed(endpoint_url, message.clone()).into());
        }
        state.endpoint_url = Some(endpoint_url.to_string());
        state.state = TransportState::Connected;
        Ok(())
    }

    async fn create_session(&self, identity: &UserIdentity) -> OpcUaResult<()> {
        let mut state = self.inner.lock();
        let endpoint = state.endpoint_url.clone().unwrap_or_default();
        if state.state == TransportState::Disconnected {
            return Err(ConnectionError::session_failed(endpoint, "transport is not connected").into());
        }
        if let Some(message) = &state.session_failure {
            return Err(ConnectionError::session_failed(endpoint, message.clone()).into());
        }
        state.identity = Some(identity.clone());
        state.state = TransportState::SessionActive;
        state.sessions_created += 1;
        Ok(())
    }

    async fn close_session(&self) -> OpcUaResult<()> {
        let mut state = self.inner.lock();
        state.subscriptions.clear();
        state.items.clear();
        state.identity = None;
        if state.state.has_session() {
            state.state = TransportState::Connected;
        }
        match &state.close_failure {
            Some(message) => Err(ConnectionError::CloseFailed {
                message: message.clone(),
            }
            .into()),
            None => Ok(()),
        }
    }

    async fn disconnect(&self) -> OpcUaResult<()> {
        let mut state = self.inner.lock();
        state.state = TransportState::Disconnected;
        state.endpoint_url = None;
        Ok(())
    }

    fn state(&self) -> TransportState {
        self.inner.lock().state
    }

    async fn translate_browse_path(
        &self,
        root: &NodeId,
        path: &RelativePath,
    ) -> OpcUaResult<BrowsePathResult> {
        let state = self.inner.lock();
        state.require_session("translateBrowsePath")?;

        if !state.nodes.contains_key(root) {
            return Ok(BrowsePathResult {
                status: StatusCode::BAD_NODE_ID_UNKNOWN,
                targets: Vec::new(),
            });
        }

        let mut current = root.clone();
        for element in &path.elements {
            let type_matches = |reference_type: &NodeId| {
                if element.include_subtypes {
                    is_reference_subtype(reference_type, &element.reference_type)
                } else {
                    *reference_type == element.reference_type
                }
            };
            let next = state.references.iter().find_map(|reference| {
                if !type_matches(&reference.reference_type) {
                    return None;
                }
                let (from, to) = if element.is_inverse {
                    (&reference.target, &reference.source)
                } else {
                    (&reference.source, &reference.target)
                };
                (*from == current && state.browse_name_matches(to, &element.target_name))
                    .then(|| to.clone())
            });
            match next {
                Some(node) => current = node,
                None => {
                    return Ok(BrowsePathResult {
                        status: StatusCode::BAD_NO_MATCH,
                        targets: Vec::new(),
                    })
                }
            }
        }

        Ok(BrowsePathResult {
            status: StatusCode::GOOD,
            targets: vec![current],
        })
    }

    async fn read(&self, node_id: &NodeId, attribute: AttributeId) -> OpcUaResult<DataValue> {
        let state = self.inner.lock();
        state.require_session("read")?;

        if let Some(status) = state.injected(MemoryService::Read, node_id) {
            return Ok(DataValue::bad(status));
        }
        let Some(node) = state.nodes.get(node_id) else {
            return Ok(DataValue::bad(StatusCode::BAD_NODE_ID_UNKNOWN));
        };

        let data_value = match attribute {
            AttributeId::Value => node
                .value
                .clone()
                .unwrap_or_else(|| DataValue::bad(StatusCode::BAD_ATTRIBUTE_ID_INVALID)),
            AttributeId::NodeId => DataValue::good(Value::String(node_id.to_string())),
            AttributeId::BrowseName => DataValue::good(Value::String(node.browse_name.to_string())),
            AttributeId::DisplayName => DataValue::good(Value::String(node.display_name.clone())),
            AttributeId::NodeClass => DataValue::good(Value::Int32(node.node_class.value() as i32)),
            AttributeId::DataType => match &node.value {
                Some(dv) => DataValue::good(Value::String(dv.value.type_name().to_string())),
                None => DataValue::bad(StatusCode::BAD_ATTRIBUTE_ID_INVALID),
            },
            AttributeId::Executable | AttributeId::UserExecutable
                if node.node_class == NodeClass::Method =>
            {
                DataValue::good(Value::Boolean(true))
            }
            _ => DataValue::bad(StatusCode::BAD_ATTRIBUTE_ID_INVALID),
        };
        Ok(data_value)
    }

    async fn write(&self, node_id: &NodeId, value: Value) -> OpcUaResult<StatusCode> {
        let handlers;
        let data_value;
        {
            let mut state = self.inner.lock();
            state.require_session("write")?;

            if let Some(status) = state.injected(MemoryService::Write, node_id) {
                return Ok(status);
            }
            let Some(node) = state.nodes.get_mut(node_id) else {
                return Ok(StatusCode::BAD_NODE_ID_UNKNOWN);
            };
            if !node.writable {
                return Ok(StatusCode::BAD_NOT_WRITABLE);
            }
            if let Some(current) = &node.value {
                if !current.value.is_null() && current.value.type_name() != value.type_name() {
                    return Ok(StatusCode::BAD_TYPE_MISMATCH);
                }
            }
            data_value = DataValue::good(value).with_source_timestamp(Utc::now());
            node.value = Some(data_value.clone());
            handlers = state.handlers_for(node_id);
        }
        for handler in handlers {
            handler(ItemEvent::Changed(data_value.clone()));
        }
        Ok(StatusCode::GOOD)
    }

    async fn browse(&self, node_id: &NodeId, reference_type: &NodeId) -> OpcUaResult<BrowseResult> {
        let state = self.inner.lock();
        state.require_session("browse")?;

        if let Some(status) = state.injected(MemoryService::Browse, node_id) {
            return Ok(BrowseResult {
                status,
                references: Vec::new(),
            });
        }
        if !state.nodes.contains_key(node_id) {
            return Ok(BrowseResult {
                status: StatusCode::BAD_NODE_ID_UNKNOWN,
                references: Vec::new(),
            });
        }

        let references = state
            .references
            .iter()
            .filter(|r| r.source == *node_id && is_reference_subtype(&r.reference_type, reference_type))
            .filter_map(|r| {
                let target = state.nodes.get(&r.target)?;
                let type_definition = state
                    .references
                    .iter()
                    .find(|t| t.source == r.target && t.reference_type == HAS_TYPE_DEFINITION)
                    .map(|t| t.target.clone());
                Some(ReferenceDescription {
                    reference_type: r.reference_type.clone(),
                    is_forward: true,
                    node_id: r.target.clone(),
                    browse_name: target.browse_name.clone(),
                    display_name: target.display_name.clone(),
                    node_class: target.node_class,
                    type_definition,
                })
            })
            .collect();

        Ok(BrowseResult {
            status: StatusCode::GOOD,
            references,
        })
    }

    async fn call(
        &self,
        object_id: &NodeId,
        method_id: &NodeId,
        input_arguments: Vec<Value>,
    ) -> OpcUaResult<CallResult> {
        let handler = {
            let mut state = self.inner.lock();
            state.require_session("call")?;

            state.calls.push(RecordedCall {
                object_id: object_id.clone(),
                method_id: method_id.clone(),
                input_arguments: input_arguments.clone(),
            });

            let failure = |status| CallResult {
                status,
                input_argument_results: Vec::new(),
                output_arguments: Vec::new(),
            };
            if let Some(status) = state.injected(MemoryService::Call, method_id) {
                return Ok(failure(status));
            }
            if !state.nodes.contains_key(object_id) {
                return Ok(failure(StatusCode::BAD_NODE_ID_UNKNOWN));
            }
            let is_component = state.references.iter().any(|r| {
                r.source == *object_id && r.target == *method_id && r.reference_type == HAS_COMPONENT
            });
            match state.methods.get(method_id) {
                Some(handler) if is_component => Arc::clone(handler),
                _ => return Ok(failure(StatusCode::BAD_METHOD_INVALID)),
            }
        };

        let result = match handler(&input_arguments) {
            Ok(outputs) => CallResult {
                status: StatusCode::GOOD,
                input_argument_results: vec![StatusCode::GOOD; input_arguments.len()],
                output_arguments: outputs,
            },
            Err(status) => CallResult {
                status,
                input_argument_results: Vec::new(),
                output_arguments: Vec::new(),
            },
        };
        Ok(result)
    }

    async fn create_subscription(
        &self,
        parameters: &SubscriptionParameters,
        on_error: SubscriptionErrorHandler,
    ) -> OpcUaResult<u32> {
        let mut state = self.inner.lock();
        state.require_session("createSubscription")?;
        let id = state.next_id();
        state.subscriptions.push(MemorySubscription {
            id,
            parameters: parameters.clone(),
            on_error,
        });
        Ok(id)
    }

    async fn create_monitored_item(
        &self,
        subscription_id: u32,
        node_id: &NodeId,
        parameters: &MonitoringParameters,
        handler: ItemHandler,
    ) -> OpcUaResult<u32> {
        let initial = {
            let mut state = self.inner.lock();
            state.require_session("createMonitoredItem")?;

            if !state.subscriptions.iter().any(|s| s.id == subscription_id) {
                return Err(ConnectionError::Subscription {
                    message: format!("unknown subscription {}", subscription_id),
                }
                .into());
            }
            let status = state
                .injected(MemoryService::Monitor, node_id)
                .or_else(|| (!state.nodes.contains_key(node_id)).then_some(StatusCode::BAD_NODE_ID_UNKNOWN));
            if let Some(status) = status {
                return Err(OpcUaError::bad_status("monitor", status, node_id.to_string()));
            }

            let id = state.next_id();
            state.items.push(MemoryItem {
                id,
                subscription_id,
                node_id: node_id.clone(),
                parameters: parameters.clone(),
                handler: Arc::clone(&handler),
            });
            let initial = state
                .nodes
                .get(node_id)
                .and_then(|node| node.value.clone());
            (id, initial)
        };

        let (id, initial) = initial;
        if let Some(data_value) = initial {
            handler(ItemEvent::Changed(data_value));
        }
        Ok(id)
    }

    fn display_name(&self) -> String {
        "MemoryTransport".to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================
