// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Real OPC UA transport implementation using the `opcua` crate.
//!
//! The `opcua` client is synchronous; every service call runs on the blocking
//! thread pool. Data change notifications of the single subscription are
//! routed to item handlers by node id.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opcua::client::prelude as ua;
use opcua::sync::RwLock as UaRwLock;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};
use uabridge_core::Value;
use uuid::Uuid;

use super::transport::{
    BrowsePathResult, BrowseResult, CallResult, DataValue, ItemEvent, ItemHandler,
    MonitoringParameters, OpcUaTransport, ReferenceDescription, SubscriptionErrorHandler,
    SubscriptionParameters, TransportState,
};
use crate::error::{CoercionError, ConnectionError, OpcUaError, OpcUaResult};
use crate::relative_path::RelativePath;
use crate::types::{
    AttributeId, ConnectionOptions, NodeClass, NodeId, NodeIdentifier, QualifiedName,
    SecurityMode, SecurityPolicy, StatusCode, UserIdentity,
};

type UaSession = Arc<UaRwLock<ua::Session>>;
type HandlerMap = Arc<RwLock<HashMap<ua::NodeId, Vec<ItemHandler>>>>;

struct Endpoint {
    client: ua::Client,
    description: ua::EndpointDescription,
    url: String,
}

// =============================================================================
// RealTransport
// =============================================================================

/// Transport backed by the `opcua` crate client.
pub struct RealTransport {
    endpoint: Mutex<Option<Endpoint>>,
    session: RwLock<Option<UaSession>>,
    handlers: HandlerMap,
    state: RwLock<TransportState>,
}

impl RealTransport {
    /// Creates a disconnected transport.
    pub fn new() -> Self {
        Self {
            endpoint: Mutex::new(None),
            session: RwLock::new(None),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            state: RwLock::new(TransportState::Disconnected),
        }
    }

    fn build_client(endpoint_url: &str, options: &ConnectionOptions) -> OpcUaResult<ua::Client> {
        let timeout_ms = u32::try_from(options.session_timeout.as_millis()).unwrap_or(u32::MAX);
        ua::ClientBuilder::new()
            .application_name(options.application_name.as_str())
            .application_uri(options.application_uri.as_str())
            .session_name(options.session_name.as_str())
            .session_timeout(timeout_ms)
            .session_retry_limit(0)
            .create_sample_keypair(options.security_mode != SecurityMode::None)
            .trust_server_certs(true)
            .client()
            .ok_or_else(|| {
                ConnectionError::connect_failed(endpoint_url, "failed to build OPC UA client").into()
            })
    }

    fn security_policy(policy: SecurityPolicy) -> ua::SecurityPolicy {
        match policy {
            SecurityPolicy::None => ua::SecurityPolicy::None,
            SecurityPolicy::Basic256Sha256 => ua::SecurityPolicy::Basic256Sha256,
            SecurityPolicy::Aes128Sha256RsaOaep => ua::SecurityPolicy::Aes128Sha256RsaOaep,
            SecurityPolicy::Aes256Sha256RsaPss => ua::SecurityPolicy::Aes256Sha256RsaPss,
        }
    }

    fn security_mode(mode: SecurityMode) -> ua::MessageSecurityMode {
        match mode {
            SecurityMode::None => ua::MessageSecurityMode::None,
            SecurityMode::Sign => ua::MessageSecurityMode::Sign,
            SecurityMode::SignAndEncrypt => ua::MessageSecurityMode::SignAndEncrypt,
        }
    }

    fn identity_token(identity: &UserIdentity) -> ua::IdentityToken {
        match identity {
            UserIdentity::Anonymous => ua::IdentityToken::Anonymous,
            UserIdentity::UserName { user, password } => {
                ua::IdentityToken::UserName(user.clone(), password.clone())
            }
        }
    }

    fn session(&self, service: &str) -> OpcUaResult<UaSession> {
        self.session
            .read()
            .clone()
            .ok_or_else(|| ConnectionError::transport(format!("{}: session is not active", service)).into())
    }

    /// Runs a blocking session call on the blocking pool.
    async fn with_session<R, F>(&self, service: &'static str, call: F) -> OpcUaResult<R>
    where
        F: FnOnce(&ua::Session) -> Result<R, ua::StatusCode> + Send + 'static,
        R: Send + 'static,
    {
        let session = self.session(service)?;
        let result = tokio::task::spawn_blocking(move || {
            let session = session.read();
            call(&session)
        })
        .await
        .map_err(|e| ConnectionError::transport(format!("{}: {}", service, e)))?;

        result.map_err(|status| {
            ConnectionError::transport(format!("{}: {}", service, StatusCode(status.bits()))).into()
        })
    }
}

impl Default for RealTransport {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Conversions
// =============================================================================

fn to_ua_node_id(node_id: &NodeId) -> ua::NodeId {
    let ns = node_id.namespace_index;
    match &node_id.identifier {
        NodeIdentifier::Numeric(v) => ua::NodeId::new(ns, *v),
        NodeIdentifier::String(v) => ua::NodeId::new(ns, ua::UAString::from(v.as_str())),
        NodeIdentifier::Guid(v) => ua::NodeId::new(ns, ua::Guid::from(*v)),
        NodeIdentifier::Opaque(v) => ua::NodeId::new(ns, ua::ByteString::from(v.as_slice())),
    }
}

fn from_ua_node_id(node_id: &ua::NodeId) -> NodeId {
    let ns = node_id.namespace;
    match &node_id.identifier {
        ua::Identifier::Numeric(v) => NodeId::numeric(ns, *v),
        ua::Identifier::String(v) => NodeId::string(ns, v.as_ref()),
        ua::Identifier::Guid(v) => NodeId::guid(ns, Uuid::from_bytes(*v.as_bytes())),
        ua::Identifier::ByteString(v) => NodeId::opaque(ns, v.value.clone().unwrap_or_default()),
    }
}

fn from_ua_datetime(value: &ua::DateTime) -> DateTime<Utc> {
    value.as_chrono()
}

fn from_ua_variant(variant: &ua::Variant) -> Value {
    use ua::Variant;

    match variant {
        Variant::Empty => Value::Null,
        Variant::Boolean(v) => Value::Boolean(*v),
        Variant::SByte(v) => Value::SByte(*v),
        Variant::Byte(v) => Value::Byte(*v),
        Variant::Int16(v) => Value::Int16(*v),
        Variant::UInt16(v) => Value::UInt16(*v),
        Variant::Int32(v) => Value::Int32(*v),
        Variant::UInt32(v) => Value::UInt32(*v),
        Variant::Int64(v) => Value::Int64(*v),
        Variant::UInt64(v) => Value::UInt64(*v),
        Variant::Float(v) => Value::Float(*v),
        Variant::Double(v) => Value::Double(*v),
        Variant::String(v) => Value::String(v.as_ref().to_string()),
        Variant::DateTime(v) => Value::DateTime(from_ua_datetime(v)),
        Variant::Guid(v) => Value::Guid(Uuid::from_bytes(*v.as_bytes())),
        Variant::ByteString(v) => Value::ByteString(v.value.clone().unwrap_or_default()),
        Variant::StatusCode(v) => Value::UInt32(v.bits()),
        Variant::NodeId(v) => Value::String(v.to_string()),
        Variant::QualifiedName(v) => Value::String(format!("{}:{}", v.namespace_index, v.name.as_ref())),
        Variant::LocalizedText(v) => Value::String(v.text.as_ref().to_string()),
        Variant::ExtensionObject(v) => from_extension_object(v),
        Variant::Array(array) => Value::Array(array.values.iter().map(from_ua_variant).collect()),
        other => Value::String(format!("{:?}", other)),
    }
}

/// Decodes the structures used by analog items; anything else is rendered
/// as its debug form.
fn from_extension_object(object: &ua::ExtensionObject) -> Value {
    let options = ua::DecodingOptions::default();
    match object.object_id() {
        Ok(ua::ObjectId::Range_Encoding_DefaultBinary) => match object.decode_inner::<ua::Range>(&options) {
            Ok(range) => Value::Struct(vec![
                ("low".to_string(), Value::Double(range.low)),
                ("high".to_string(), Value::Double(range.high)),
            ]),
            Err(_) => Value::Null,
        },
        Ok(ua::ObjectId::EUInformation_Encoding_DefaultBinary) => {
            match object.decode_inner::<ua::EUInformation>(&options) {
                Ok(eu) => Value::Struct(vec![
                    ("namespace_uri".to_string(), Value::String(eu.namespace_uri.as_ref().to_string())),
                    ("unit_id".to_string(), Value::Int32(eu.unit_id)),
                    ("display_name".to_string(), Value::String(eu.display_name.text.as_ref().to_string())),
                    ("description".to_string(), Value::String(eu.description.text.as_ref().to_string())),
                ]),
                Err(_) => Value::Null,
            }
        }
        _ => Value::String(format!("{:?}", object)),
    }
}

fn to_ua_variant(value: &Value) -> Result<ua::Variant, CoercionError> {
    use ua::Variant;

    let variant = match value {
        Value::Null => Variant::Empty,
        Value::Boolean(v) => Variant::Boolean(*v),
        Value::SByte(v) => Variant::SByte(*v),
        Value::Byte(v) => Variant::Byte(*v),
        Value::Int16(v) => Variant::Int16(*v),
        Value::UInt16(v) => Variant::UInt16(*v),
        Value::Int32(v) => Variant::Int32(*v),
        Value::UInt32(v) => Variant::UInt32(*v),
        Value::Int64(v) => Variant::Int64(*v),
        Value::UInt64(v) => Variant::UInt64(*v),
        Value::Float(v) => Variant::Float(*v),
        Value::Double(v) => Variant::Double(*v),
        Value::String(v) => Variant::String(ua::UAString::from(v.as_str())),
        Value::DateTime(v) => Variant::DateTime(Box::new(ua::DateTime::from(*v))),
        Value::Guid(v) => Variant::Guid(Box::new(ua::Guid::from(*v))),
        Value::ByteString(v) => Variant::ByteString(ua::ByteString::from(v.as_slice())),
        Value::Array(items) => {
            let variants = items.iter().map(to_ua_variant).collect::<Result<Vec<_>, _>>()?;
            let element_type = variants
                .first()
                .map(|v| v.type_id())
                .unwrap_or(ua::VariantTypeId::Variant);
            let array = ua::Array::new(element_type, variants)
                .map_err(|_| CoercionError::failed("array elements must share one type"))?;
            Variant::Array(Box::new(array))
        }
        Value::Struct(_) => {
            return Err(CoercionError::type_mismatch("OPC UA built-in type", "Struct"));
        }
    };
    Ok(variant)
}

fn from_ua_data_value(data_value: &ua::DataValue) -> DataValue {
    DataValue {
        value: data_value.value.as_ref().map(from_ua_variant).unwrap_or(Value::Null),
        status: StatusCode(data_value.status.map(|s| s.bits()).unwrap_or(0)),
        source_timestamp: data_value.source_timestamp.as_ref().map(from_ua_datetime),
        server_timestamp: data_value.server_timestamp.as_ref().map(from_ua_datetime),
    }
}

fn read_value_id(node_id: &NodeId, attribute: AttributeId) -> ua::ReadValueId {
    ua::ReadValueId {
        node_id: to_ua_node_id(node_id),
        attribute_id: attribute.value(),
        index_range: ua::UAString::null(),
        data_encoding: ua::QualifiedName::null(),
    }
}

fn to_ua_relative_path(path: &RelativePath) -> ua::RelativePath {
    let elements = path
        .elements
        .iter()
        .map(|element| ua::RelativePathElement {
            reference_type_id: to_ua_node_id(&element.reference_type),
            is_inverse: element.is_inverse,
            include_subtypes: element.include_subtypes,
            target_name: ua::QualifiedName::new(
                element.target_name.namespace_index,
                element.target_name.name.as_str(),
            ),
        })
        .collect();
    ua::RelativePath {
        elements: Some(elements),
    }
}

// =============================================================================
// OpcUaTransport implementation
// =============================================================================

#[async_trait]
impl OpcUaTransport for RealTransport {
    async fn connect(&self, endpoint_url: &str, options: &ConnectionOptions) -> OpcUaResult<()> {
        info!(endpoint = %endpoint_url, "Connecting to OPC UA server");

        let client = Self::build_client(endpoint_url, options)?;
        let url = endpoint_url.to_string();
        let policy = Self::security_policy(options.security_policy);
        let mode = Self::security_mode(options.security_mode);

        let (client, description) = tokio::task::spawn_blocking(move || {
            let endpoints = client
                .get_server_endpoints_from_url(url.as_str())
                .map_err(|status| ConnectionError::connect_failed(&url, StatusCode(status.bits()).to_string()))?;
            let description = endpoints
                .iter()
                .find(|e| e.security_policy_uri.as_ref() == policy.to_uri() && e.security_mode == mode)
                .cloned()
                .ok_or_else(|| {
                    ConnectionError::connect_failed(
                        &url,
                        format!("no endpoint offers {:?}/{:?}", policy, mode),
                    )
                })?;
            Ok::<_, ConnectionError>((client, description))
        })
        .await
        .map_err(|e| ConnectionError::connect_failed(endpoint_url, e.to_string()))??;

        debug!(
            security_policy = %description.security_policy_uri,
            security_mode = ?description.security_mode,
            "Found matching endpoint"
        );

        *self.endpoint.lock() = Some(Endpoint {
            client,
            description,
            url: endpoint_url.to_string(),
        });
        *self.state.write() = TransportState::Connected;
        Ok(())
    }

    async fn create_session(&self, identity: &UserIdentity) -> OpcUaResult<()> {
        let Some(mut endpoint) = self.endpoint.lock().take() else {
            return Err(ConnectionError::session_failed("", "transport is not connected").into());
        };
        let token = Self::identity_token(identity);

        let (endpoint, session) = tokio::task::spawn_blocking(move || {
            let result = endpoint
                .client
                .connect_to_endpoint(endpoint.description.clone(), token);
            (endpoint, result)
        })
        .await
        .map_err(|e| ConnectionError::session_failed("", e.to_string()))?;

        let url = endpoint.url.clone();
        *self.endpoint.lock() = Some(endpoint);
        let session = session
            .map_err(|status| ConnectionError::session_failed(url.as_str(), StatusCode(status.bits()).to_string()))?;

        *self.session.write() = Some(session);
        *self.state.write() = TransportState::SessionActive;
        info!(endpoint = %url, "OPC UA session created");
        Ok(())
    }

    async fn close_session(&self) -> OpcUaResult<()> {
        self.handlers.write().clear();
        let Some(session) = self.session.write().take() else {
            return Ok(());
        };
        {
            let mut state = self.state.write();
            if state.has_session() {
                *state = TransportState::Connected;
            }
        }
        tokio::task::spawn_blocking(move || session.read().disconnect())
            .await
            .map_err(|e| ConnectionError::CloseFailed { message: e.to_string() })?;
        Ok(())
    }

    async fn disconnect(&self) -> OpcUaResult<()> {
        self.close_session().await?;
        self.endpoint.lock().take();
        *self.state.write() = TransportState::Disconnected;
        Ok(())
    }

    fn state(&self) -> TransportState {
        *self.state.read()
    }

    async fn translate_browse_path(
        &self,
        root: &NodeId,
        path: &RelativePath,
    ) -> OpcUaResult<BrowsePathResult> {
        let browse_path = ua::BrowsePath {
            starting_node: to_ua_node_id(root),
            relative_path: to_ua_relative_path(path),
        };
        trace!(root = %root, path = %path, "Translating browse path");

        let results = self
            .with_session("translateBrowsePath", move |session| {
                session.translate_browse_paths_to_node_ids(&[browse_path])
            })
            .await?;

        Ok(match results.into_iter().next() {
            Some(result) => BrowsePathResult {
                status: StatusCode(result.status_code.bits()),
                targets: result
                    .targets
                    .unwrap_or_default()
                    .iter()
                    .map(|t| from_ua_node_id(&t.target_id.node_id))
                    .collect(),
            },
            None => BrowsePathResult {
                status: StatusCode::BAD_UNEXPECTED_ERROR,
                targets: Vec::new(),
            },
        })
    }

    async fn read(&self, node_id: &NodeId, attribute: AttributeId) -> OpcUaResult<DataValue> {
        let request = read_value_id(node_id, attribute);
        trace!(node_id = %node_id, attribute = ?attribute, "Reading attribute");

        let results = self
            .with_session("read", move |session| {
                session.read(&[request], ua::TimestampsToReturn::Both, 0.0)
            })
            .await?;

        Ok(results
            .first()
            .map(from_ua_data_value)
            .unwrap_or_else(|| DataValue::bad(StatusCode::BAD_UNEXPECTED_ERROR)))
    }

    async fn write(&self, node_id: &NodeId, value: Value) -> OpcUaResult<StatusCode> {
        let request = ua::WriteValue {
            node_id: to_ua_node_id(node_id),
            attribute_id: AttributeId::Value.value(),
            index_range: ua::UAString::null(),
            value: ua::DataValue::new_now(to_ua_variant(&value)?),
        };
        trace!(node_id = %node_id, "Writing value");

        let results = self
            .with_session("write", move |session| session.write(&[request]))
            .await?;

        Ok(results
            .first()
            .map(|s| StatusCode(s.bits()))
            .unwrap_or(StatusCode::BAD_UNEXPECTED_ERROR))
    }

    async fn browse(&self, node_id: &NodeId, reference_type: &NodeId) -> OpcUaResult<BrowseResult> {
        let description = ua::BrowseDescription {
            node_id: to_ua_node_id(node_id),
            browse_direction: ua::BrowseDirection::Forward,
            reference_type_id: to_ua_node_id(reference_type),
            include_subtypes: true,
            node_class_mask: 0,
            result_mask: ua::BrowseDescriptionResultMask::all().bits(),
        };
        trace!(node_id = %node_id, "Browsing node");

        let results = self
            .with_session("browse", move |session| session.browse(&[description]))
            .await?;

        let Some(result) = results.and_then(|r| r.into_iter().next()) else {
            return Ok(BrowseResult {
                status: StatusCode::BAD_UNEXPECTED_ERROR,
                references: Vec::new(),
            });
        };

        let references = result
            .references
            .unwrap_or_default()
            .iter()
            .filter_map(|r| {
                let node_class = NodeClass::from_value(r.node_class as u32)?;
                Some(ReferenceDescription {
                    reference_type: from_ua_node_id(&r.reference_type_id),
                    is_forward: r.is_forward,
                    node_id: from_ua_node_id(&r.node_id.node_id),
                    browse_name: QualifiedName::new(r.browse_name.namespace_index, r.browse_name.name.as_ref()),
                    display_name: r.display_name.text.as_ref().to_string(),
                    node_class,
                    type_definition: (!r.type_definition.node_id.is_null())
                        .then(|| from_ua_node_id(&r.type_definition.node_id)),
                })
            })
            .collect();

        Ok(BrowseResult {
            status: StatusCode(result.status_code.bits()),
            references,
        })
    }

    async fn call(
        &self,
        object_id: &NodeId,
        method_id: &NodeId,
        input_arguments: Vec<Value>,
    ) -> OpcUaResult<CallResult> {
        let arguments = input_arguments
            .iter()
            .map(to_ua_variant)
            .collect::<Result<Vec<_>, _>>()?;
        let request = ua::CallMethodRequest {
            object_id: to_ua_node_id(object_id),
            method_id: to_ua_node_id(method_id),
            input_arguments: Some(arguments),
        };
        trace!(object = %object_id, method = %method_id, "Calling method");

        let result = self
            .with_session("call", move |session| session.call(request))
            .await?;

        Ok(CallResult {
            status: StatusCode(result.status_code.bits()),
            input_argument_results: result
                .input_argument_results
                .unwrap_or_default()
                .iter()
                .map(|s| StatusCode(s.bits()))
                .collect(),
            output_arguments: result
                .output_arguments
                .unwrap_or_default()
                .iter()
                .map(from_ua_variant)
                .collect(),
        })
    }

    async fn create_subscription(
        &self,
        parameters: &SubscriptionParameters,
        on_error: SubscriptionErrorHandler,
    ) -> OpcUaResult<u32> {
        let handlers = Arc::clone(&self.handlers);
        let callback = ua::DataChangeCallback::new(move |changed| {
            for item in changed.iter() {
                let node_id = &item.item_to_monitor().node_id;
                let targets = handlers.read().get(node_id).cloned().unwrap_or_default();
                if targets.is_empty() {
                    continue;
                }
                let data_value = from_ua_data_value(item.last_value());
                let event = if data_value.status.is_bad() {
                    ItemEvent::Error(data_value.status.to_string())
                } else {
                    ItemEvent::Changed(data_value)
                };
                for handler in &targets {
                    handler(event.clone());
                }
            }
        });

        let session = self.session("createSubscription")?;
        session
            .write()
            .set_connection_status_callback(ua::ConnectionStatusCallback::new(move |connected| {
                if !connected {
                    warn!("OPC UA connection lost");
                    on_error("connection to server lost".to_string());
                }
            }));

        let p = parameters.clone();
        let id = self
            .with_session("createSubscription", move |session| {
                session.create_subscription(
                    p.publishing_interval,
                    p.lifetime_count,
                    p.max_keep_alive_count,
                    p.max_notifications_per_publish,
                    p.priority,
                    p.publishing_enabled,
                    callback,
                )
            })
            .await?;

        info!(subscription_id = id, "Created subscription");
        Ok(id)
    }

    async fn create_monitored_item(
        &self,
        subscription_id: u32,
        node_id: &NodeId,
        parameters: &MonitoringParameters,
        handler: ItemHandler,
    ) -> OpcUaResult<u32> {
        let ua_node_id = to_ua_node_id(node_id);
        let request = ua::MonitoredItemCreateRequest {
            item_to_monitor: read_value_id(node_id, AttributeId::Value),
            monitoring_mode: ua::MonitoringMode::Reporting,
            requested_parameters: ua::MonitoringParameters {
                client_handle: 0,
                sampling_interval: parameters.sampling_interval,
                filter: ua::ExtensionObject::null(),
                queue_size: parameters.queue_size,
                discard_oldest: parameters.discard_oldest,
            },
        };

        // Registered first so the initial notification is not lost.
        self.handlers
            .write()
            .entry(ua_node_id.clone())
            .or_default()
            .push(Arc::clone(&handler));

        let results = self
            .with_session("createMonitoredItem", move |session| {
                session.create_monitored_items(subscription_id, ua::TimestampsToReturn::Source, &[request])
            })
            .await;

        let status = match &results {
            Ok(results) => results
                .first()
                .map(|r| StatusCode(r.status_code.bits()))
                .unwrap_or(StatusCode::BAD_UNEXPECTED_ERROR),
            Err(_) => StatusCode::BAD_COMMUNICATION_ERROR,
        };
        if !status.is_good() {
            if let Some(list) = self.handlers.write().get_mut(&ua_node_id) {
                list.retain(|h| !Arc::ptr_eq(h, &handler));
            }
            return Err(match results {
                Err(e) => e,
                Ok(_) => OpcUaError::bad_status("monitor", status, node_id.to_string()),
            });
        }

        let id = results
            .ok()
            .and_then(|r| r.first().map(|r| r.monitored_item_id))
            .unwrap_or_default();
        debug!(node_id = %node_id, monitored_item_id = id, "Created monitored item");
        Ok(id)
    }

    fn display_name(&self) -> String {
        match self.endpoint.lock().as_ref() {
            Some(endpoint) => format!("RealTransport({})", endpoint.url),
            None => "RealTransport".to_string(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
