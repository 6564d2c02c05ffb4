// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Remote-operation call mapping.
//!
//! A [`CallReturnMapping`] binds an operation observed on the [`CallBus`] to
//! an OPC UA method call. For every request the mapper builds the input
//! arguments from the request parameters, calls the method through the
//! connector and answers with the coerced output arguments.
//!
//! ```text
//! Received ──► ValidatingParameters ──► Invoking ──► AwaitingResult ──► Responding
//!                     │                     │
//!                     ▼                     ▼
//!         RespondInvalidParameters   RespondMethodCallFailed
//! ```
//!
//! Observations only exist while the connector has a session. They are
//! created on `SessionCreated` and cancelled on `SessionClosing` (or
//! `SessionClosed`), together with any request still being processed. A
//! request that reaches an observer after teardown began is dropped without
//! an answer, so the caller sees its response channel close.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use uabridge_core::{CallBus, CallObservation, CallParameters, CallRequest, ParameterRef, RemoteCallError, Value};

use crate::client::OpcUaTransport;
use crate::coercion::Coercion;
use crate::connector::OpcUaConnector;
use crate::data_source::DataSource;
use crate::error::{CoercionError, OpcUaError};
use crate::events::ConnectorEvent;
use crate::types::DataType;

/// Error code of a failed method call.
pub const METHOD_CALL_FAILED_CODE: i64 = 1;

/// Error message of a failed method call.
pub const METHOD_CALL_FAILED_MESSAGE: &str = "Bad OPC UA method call";

// =============================================================================
// CallMappingError
// =============================================================================

/// Failure of one mapped remote call.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CallMappingError {
    /// A parameter is missing, failed validation or could not be coerced.
    #[error("Invalid params: {reason}")]
    InvalidParameters {
        /// What was wrong.
        reason: String,
    },

    /// The method call or the output coercion failed.
    #[error("{}: {reason}", METHOD_CALL_FAILED_MESSAGE)]
    MethodCallFailed {
        /// What went wrong.
        reason: String,
    },
}

impl CallMappingError {
    /// Creates an invalid parameters error.
    pub fn invalid_parameters(reason: impl Into<String>) -> Self {
        Self::InvalidParameters {
            reason: reason.into(),
        }
    }

    /// Creates a method call failure.
    pub fn method_call_failed(reason: impl Into<String>) -> Self {
        Self::MethodCallFailed {
            reason: reason.into(),
        }
    }

    /// Converts to the error sent to the caller.
    ///
    /// The reason stays on this side; the caller only learns the kind.
    pub fn to_remote_error(&self) -> RemoteCallError {
        match self {
            Self::InvalidParameters { .. } => RemoteCallError::invalid_parameters(),
            Self::MethodCallFailed { .. } => {
                RemoteCallError::new(METHOD_CALL_FAILED_CODE, METHOD_CALL_FAILED_MESSAGE)
            }
        }
    }
}

// =============================================================================
// Validators and output coercions
// =============================================================================

type ValidateFn = dyn Fn(&Value) -> bool + Send + Sync;
type OutputFn = dyn Fn(Vec<Value>) -> Result<Option<Value>, CoercionError> + Send + Sync;

/// A predicate a call parameter must satisfy.
#[derive(Clone)]
pub struct Validator {
    label: String,
    func: Arc<ValidateFn>,
}

impl Validator {
    /// Wraps a predicate.
    pub fn new<F>(label: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            func: Arc::new(func),
        }
    }

    /// Accepts numbers within the inclusive bounds.
    pub fn range(min: Option<f64>, max: Option<f64>) -> Self {
        Self::new(format!("range(min={:?}, max={:?})", min, max), move |value| {
            match value.as_f64().filter(|_| value.is_numeric()) {
                Some(x) => min.map_or(true, |m| x >= m) && max.map_or(true, |m| x <= m),
                None => false,
            }
        })
    }

    /// Accepts only the listed values.
    pub fn one_of(allowed: Vec<Value>) -> Self {
        Self::new(format!("one_of({} values)", allowed.len()), move |value| {
            allowed.contains(value)
        })
    }

    /// Runs the predicate.
    pub fn check(&self, value: &Value) -> bool {
        (self.func)(value)
    }

    /// Returns the descriptive label.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Validator").field(&self.label).finish()
    }
}

/// Turns method output arguments into the call result.
#[derive(Clone)]
pub struct OutputCoercion {
    label: String,
    func: Arc<OutputFn>,
}

impl OutputCoercion {
    /// Wraps a coercion function.
    pub fn new<F>(label: impl Into<String>, func: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Option<Value>, CoercionError> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            func: Arc::new(func),
        }
    }

    /// The first output argument, or no result.
    pub fn first() -> Self {
        Self::new("first", |outputs| Ok(outputs.into_iter().next()))
    }

    /// All output arguments as an array, even when there are none or one.
    pub fn array() -> Self {
        Self::new("array", |outputs| Ok(Some(Value::Array(outputs))))
    }

    /// Runs the coercion.
    pub fn apply(&self, outputs: Vec<Value>) -> Result<Option<Value>, CoercionError> {
        (self.func)(outputs)
    }

    /// Returns the descriptive label.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for OutputCoercion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OutputCoercion").field(&self.label).finish()
    }
}

/// Result of a call without an output coercion.
///
/// No outputs give no result, a single output is returned as is and several
/// outputs are returned as an array.
pub fn default_output_coercion(outputs: Vec<Value>) -> Option<Value> {
    match outputs.len() {
        0 => None,
        1 => outputs.into_iter().next(),
        _ => Some(Value::Array(outputs)),
    }
}

// =============================================================================
// Mappings
// =============================================================================

/// How one method input argument is taken from a request.
#[derive(Debug, Clone)]
pub struct InputArgumentMapping {
    /// Request parameter, by name or position.
    pub parameter: ParameterRef,
    /// Wire type of the argument.
    pub data_type: DataType,
    /// Optional check of the raw parameter.
    pub validate: Option<Validator>,
    /// Optional transform applied after validation, as for a write.
    pub coerce: Option<Coercion>,
}

impl InputArgumentMapping {
    /// Creates a mapping without validation or coercion.
    pub fn new(parameter: impl Into<ParameterRef>, data_type: DataType) -> Self {
        Self {
            parameter: parameter.into(),
            data_type,
            validate: None,
            coerce: None,
        }
    }

    /// Adds a validator.
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validate = Some(validator);
        self
    }

    /// Adds a coercion.
    pub fn with_coercion(mut self, coercion: Coercion) -> Self {
        self.coerce = Some(coercion);
        self
    }

    fn bind(&self, parameters: &CallParameters) -> Result<(DataType, Value), CallMappingError> {
        let value = parameters
            .get(&self.parameter)
            .cloned()
            .ok_or_else(|| CallMappingError::invalid_parameters(format!("missing parameter {}", self.parameter)))?;

        if let Some(validator) = &self.validate {
            if !validator.check(&value) {
                return Err(CallMappingError::invalid_parameters(format!(
                    "parameter {} rejected by {}",
                    self.parameter,
                    validator.label()
                )));
            }
        }

        let value = match &self.coerce {
            Some(coercion) => coercion
                .apply(value, None, false)
                .map_err(|e| CallMappingError::invalid_parameters(format!("parameter {}: {}", self.parameter, e)))?,
            None => value,
        };
        Ok((self.data_type, value))
    }
}

/// Builds the ordered input arguments of a call.
///
/// Fails on the first unusable parameter. Request parameters that no mapping
/// refers to are ignored.
pub fn build_input_arguments(
    mappings: &[InputArgumentMapping],
    parameters: &CallParameters,
) -> Result<Vec<(DataType, Value)>, CallMappingError> {
    mappings.iter().map(|m| m.bind(parameters)).collect()
}

/// Binding of an observed operation to a method call.
#[derive(Debug, Clone)]
pub struct CallReturnMapping {
    /// Operation name observed on the call bus.
    pub operation: String,
    /// Context announced with the observation.
    pub context: Option<serde_json::Value>,
    /// Data source id of the object node.
    pub object: String,
    /// Data source id of the method node.
    pub method: String,
    /// Input arguments in method order.
    pub input_arguments: Vec<InputArgumentMapping>,
    /// Output coercion; [`default_output_coercion`] when absent.
    pub output_coercion: Option<OutputCoercion>,
}

impl CallReturnMapping {
    /// Creates a mapping without arguments.
    pub fn new(operation: impl Into<String>, object: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            context: None,
            object: object.into(),
            method: method.into(),
            input_arguments: Vec::new(),
            output_coercion: None,
        }
    }

    /// Sets the observation context.
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Appends an input argument.
    pub fn with_input(mut self, input: InputArgumentMapping) -> Self {
        self.input_arguments.push(input);
        self
    }

    /// Sets the output coercion.
    pub fn with_output(mut self, output: OutputCoercion) -> Self {
        self.output_coercion = Some(output);
        self
    }

    /// Turns method outputs into the call result.
    pub fn coerce_outputs(&self, outputs: Vec<Value>) -> Result<Option<Value>, CallMappingError> {
        match &self.output_coercion {
            Some(coercion) => coercion
                .apply(outputs)
                .map_err(|e| CallMappingError::method_call_failed(e.to_string())),
            None => Ok(default_output_coercion(outputs)),
        }
    }
}

// =============================================================================
// RemoteOperationMapper
// =============================================================================

struct Bound {
    mapping: CallReturnMapping,
    object: Arc<DataSource>,
    method: Arc<DataSource>,
}

struct MapperInner<T: OpcUaTransport> {
    connector: OpcUaConnector<T>,
    call_bus: CallBus,
    mappings: Vec<CallReturnMapping>,
    observers: Mutex<Vec<JoinHandle<()>>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

/// Answers call bus requests with OPC UA method calls.
///
/// # Example
///
/// ```no_run
/// use uabridge_core::CallBus;
/// use uabridge_opcua::client::MemoryTransport;
/// use uabridge_opcua::remote::{CallReturnMapping, InputArgumentMapping, RemoteOperationMapper};
/// use uabridge_opcua::types::DataType;
/// use uabridge_opcua::{ConnectorOptions, OpcUaConnector};
///
/// # async fn example() {
/// let connector = OpcUaConnector::new(ConnectorOptions::new("opc.tcp://plant:4840"), MemoryTransport::new());
/// let mapping = CallReturnMapping::new("alertTemperature", "plc", "alert")
///     .with_input(InputArgumentMapping::new("temp", DataType::Double))
///     .with_input(InputArgumentMapping::new("isTooLow", DataType::Boolean));
///
/// let mapper = RemoteOperationMapper::new(connector.clone(), CallBus::default(), vec![mapping]);
/// mapper.start();
/// connector.connect().await.unwrap();
/// # }
/// ```
pub struct RemoteOperationMapper<T: OpcUaTransport> {
    inner: Arc<MapperInner<T>>,
}

impl<T: OpcUaTransport> Clone for RemoteOperationMapper<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: OpcUaTransport> RemoteOperationMapper<T> {
    /// Creates a stopped mapper.
    pub fn new(connector: OpcUaConnector<T>, call_bus: CallBus, mappings: Vec<CallReturnMapping>) -> Self {
        Self {
            inner: Arc::new(MapperInner {
                connector,
                call_bus,
                mappings,
                observers: Mutex::new(Vec::new()),
                supervisor: Mutex::new(None),
            }),
        }
    }

    /// Returns the connector.
    pub fn connector(&self) -> &OpcUaConnector<T> {
        &self.inner.connector
    }

    /// Returns the configured mappings.
    pub fn mappings(&self) -> &[CallReturnMapping] {
        &self.inner.mappings
    }

    /// Returns the number of active observations.
    pub fn active_observers(&self) -> usize {
        self.inner.observers.lock().iter().filter(|h| !h.is_finished()).count()
    }

    /// Starts following the connector's sessions.
    ///
    /// If a session already exists, observations are created before this
    /// returns. Must be called within a Tokio runtime.
    pub fn start(&self) {
        let mut supervisor = self.inner.supervisor.lock();
        if supervisor.is_some() {
            return;
        }

        let events = self.inner.connector.subscribe();
        if self.inner.connector.is_connected() {
            self.start_observers();
        }

        let mapper = self.clone();
        *supervisor = Some(tokio::spawn(async move { mapper.supervise(events).await }));
        info!(mappings = self.inner.mappings.len(), "Remote operation mapper started");
    }

    /// Cancels all observations and disconnects the connector.
    pub async fn stop(&self) -> crate::error::OpcUaResult<()> {
        if let Some(handle) = self.inner.supervisor.lock().take() {
            handle.abort();
        }
        self.stop_observers();
        info!("Remote operation mapper stopped");
        self.inner.connector.disconnect().await
    }

    async fn supervise(self, mut events: tokio::sync::broadcast::Receiver<ConnectorEvent>) {
        loop {
            match events.recv().await {
                Ok(ConnectorEvent::SessionCreated) => self.start_observers(),
                Ok(ConnectorEvent::SessionClosing | ConnectorEvent::SessionClosed) => self.stop_observers(),
                Ok(ConnectorEvent::Error(e)) => warn!(category = e.category(), "[OPC UA Error] {}", e),
                Ok(ConnectorEvent::DataValueChange { .. }) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Mapper lagged behind connector events");
                    // Session events may have been among the skipped ones.
                    if self.inner.connector.is_connected() {
                        if self.active_observers() == 0 {
                            self.start_observers();
                        }
                    } else {
                        self.stop_observers();
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    fn start_observers(&self) {
        let mut observers = self.inner.observers.lock();
        for handle in observers.drain(..) {
            handle.abort();
        }

        for mapping in &self.inner.mappings {
            let Some(bound) = self.bind(mapping) else {
                continue;
            };
            let observation = self
                .inner
                .call_bus
                .observe_call(mapping.operation.clone(), mapping.context.clone());
            let connector = self.inner.connector.clone();
            observers.push(tokio::spawn(observe(connector, Arc::new(bound), observation)));
        }
        debug!(observers = observers.len(), "Observing remote operations");
    }

    fn stop_observers(&self) {
        let mut observers = self.inner.observers.lock();
        if observers.is_empty() {
            return;
        }
        for handle in observers.drain(..) {
            handle.abort();
        }
        debug!("Remote operation observers cancelled");
    }

    fn bind(&self, mapping: &CallReturnMapping) -> Option<Bound> {
        let connector = &self.inner.connector;
        match (connector.data_source(&mapping.object), connector.data_source(&mapping.method)) {
            (Some(object), Some(method)) => Some(Bound {
                mapping: mapping.clone(),
                object,
                method,
            }),
            (object, _) => {
                let missing = if object.is_none() { &mapping.object } else { &mapping.method };
                warn!(
                    operation = %mapping.operation,
                    data_source = %missing,
                    "Skipping call mapping with unknown data source"
                );
                None
            }
        }
    }
}

impl<T: OpcUaTransport> fmt::Debug for RemoteOperationMapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteOperationMapper")
            .field("mappings", &self.inner.mappings.len())
            .field("active_observers", &self.active_observers())
            .finish()
    }
}

/// Serves one observation until it ends or is aborted.
///
/// Requests run concurrently; aborting this task drops the set and with it
/// every request still in progress.
async fn observe<T: OpcUaTransport>(connector: OpcUaConnector<T>, bound: Arc<Bound>, mut observation: CallObservation) {
    let mut in_flight = JoinSet::new();
    loop {
        tokio::select! {
            request = observation.recv() => match request {
                Some(request) => {
                    in_flight.spawn(handle_request(connector.clone(), Arc::clone(&bound), request));
                }
                None => break,
            },
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
        }
    }
    while in_flight.join_next().await.is_some() {}
}

async fn handle_request<T: OpcUaTransport>(connector: OpcUaConnector<T>, bound: Arc<Bound>, request: CallRequest) {
    let operation = bound.mapping.operation.as_str();
    if !connector.is_connected() {
        debug!(operation, request = %request.id, "No session, remote operation dropped");
        return;
    }
    match invoke(&connector, &bound, &request.parameters).await {
        Some(Ok(result)) => {
            debug!(operation, request = %request.id, "Remote operation answered");
            request.respond_result(result);
        }
        Some(Err(e)) => {
            debug!(operation, request = %request.id, error = %e, "Remote operation failed");
            request.respond_error(e.to_remote_error());
        }
        None => debug!(operation, request = %request.id, "Session closed during call, remote operation dropped"),
    }
}

/// Runs one request; `None` if the session went away before the call returned.
async fn invoke<T: OpcUaTransport>(
    connector: &OpcUaConnector<T>,
    bound: &Bound,
    parameters: &CallParameters,
) -> Option<Result<Option<Value>, CallMappingError>> {
    let arguments = match build_input_arguments(&bound.mapping.input_arguments, parameters) {
        Ok(arguments) => arguments,
        Err(e) => return Some(Err(e)),
    };
    let outputs = match connector.call(&bound.object, &bound.method, arguments).await {
        Ok(outputs) => outputs,
        Err(e) if matches!(e, OpcUaError::NotConnected { .. }) || !connector.is_connected() => return None,
        Err(e) => {
            let reason = e.to_string();
            connector.report_error(e);
            return Some(Err(CallMappingError::method_call_failed(reason)));
        }
    };
    Some(bound.mapping.coerce_outputs(outputs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uabridge_core::{BusError, CallResponse};

    use crate::client::MemoryTransport;
    use crate::connector::ConnectorOptions;
    use crate::types::NodeId;

    fn alert_inputs() -> Vec<InputArgumentMapping> {
        vec![
            InputArgumentMapping::new("temp", DataType::Double),
            InputArgumentMapping::new("isTooLow", DataType::Boolean),
        ]
    }

    #[test]
    fn test_build_input_arguments_in_mapping_order() {
        let parameters = CallParameters::named([
            ("isTooLow", Value::Boolean(true)),
            ("temp", Value::Double(4.5)),
            ("extra", Value::Int32(1)),
        ]);
        let arguments = build_input_arguments(&alert_inputs(), &parameters).unwrap();
        assert_eq!(
            arguments,
            vec![
                (DataType::Double, Value::Double(4.5)),
                (DataType::Boolean, Value::Boolean(true)),
            ]
        );
    }

    #[test]
    fn test_missing_parameter() {
        let parameters = CallParameters::named([("temp", Value::Double(4.5))]);
        let err = build_input_arguments(&alert_inputs(), &parameters).unwrap_err();
        assert!(matches!(err, CallMappingError::InvalidParameters { .. }));
        assert_eq!(err.to_remote_error(), RemoteCallError::new(-32602, "Invalid params"));
    }

    #[test]
    fn test_positional_parameters() {
        let inputs = vec![InputArgumentMapping::new(1usize, DataType::Int32)];
        let parameters = CallParameters::positional([Value::String("x".into()), Value::Int32(9)]);
        assert_eq!(
            build_input_arguments(&inputs, &parameters).unwrap(),
            vec![(DataType::Int32, Value::Int32(9))]
        );
    }

    #[test]
    fn test_validator_and_coercion() {
        let inputs = vec![InputArgumentMapping::new("temp", DataType::Double)
            .with_validator(Validator::range(Some(-50.0), Some(150.0)))
            .with_coercion(Coercion::linear(10.0, 0.0))];

        let ok = CallParameters::named([("temp", Value::Double(2.0))]);
        assert_eq!(
            build_input_arguments(&inputs, &ok).unwrap(),
            vec![(DataType::Double, Value::Double(20.0))]
        );

        let too_hot = CallParameters::named([("temp", Value::Double(200.0))]);
        assert!(build_input_arguments(&inputs, &too_hot).is_err());

        let failing = vec![InputArgumentMapping::new("temp", DataType::Double)
            .with_coercion(Coercion::new("reject", |_, _, _| Err(CoercionError::failed("no"))))];
        assert!(matches!(
            build_input_arguments(&failing, &ok),
            Err(CallMappingError::InvalidParameters { .. })
        ));
    }

    #[test]
    fn test_one_of_validator() {
        let validator = Validator::one_of(vec![Value::String("on".into()), Value::String("off".into())]);
        assert!(validator.check(&Value::String("on".into())));
        assert!(!validator.check(&Value::String("auto".into())));
    }

    #[test]
    fn test_default_output_coercion() {
        assert_eq!(default_output_coercion(vec![]), None);
        assert_eq!(
            default_output_coercion(vec![Value::String("ok".into())]),
            Some(Value::String("ok".into()))
        );
        assert_eq!(
            default_output_coercion(vec![Value::Int32(1), Value::Int32(2)]),
            Some(Value::Array(vec![Value::Int32(1), Value::Int32(2)]))
        );
    }

    #[test]
    fn test_mapping_output_coercion() {
        let mapping = CallReturnMapping::new("op", "obj", "m").with_output(OutputCoercion::array());
        assert_eq!(
            mapping.coerce_outputs(vec![Value::Int32(1)]).unwrap(),
            Some(Value::Array(vec![Value::Int32(1)]))
        );

        let failing = CallReturnMapping::new("op", "obj", "m")
            .with_output(OutputCoercion::new("fail", |_| Err(CoercionError::failed("bad output"))));
        let err = failing.coerce_outputs(vec![]).unwrap_err();
        assert_eq!(err.to_remote_error(), RemoteCallError::new(1, "Bad OPC UA method call"));
    }

    fn reset_connector() -> (MemoryTransport, OpcUaConnector<MemoryTransport>) {
        let server = MemoryTransport::new();
        let ns = server.add_namespace("urn:plant");
        let plc = server.add_object(&NodeId::OBJECTS_FOLDER, NodeId::string(ns, "PLC"), "PLC");
        server.add_method(&plc, NodeId::string(ns, "PLC.Reset"), "Reset", |_| Ok(vec![]));
        let connector = OpcUaConnector::with_data_sources(
            ConnectorOptions::new("opc.tcp://plant"),
            server.clone(),
            [
                ("plc", DataSource::node(Some("urn:plant".into()), "s=PLC")),
                ("reset", DataSource::node(Some("urn:plant".into()), "s=PLC.Reset")),
            ],
        );
        (server, connector)
    }

    #[tokio::test]
    async fn test_request_after_teardown_is_dropped() {
        let (server, connector) = reset_connector();
        connector.connect().await.unwrap();
        let bus = CallBus::default();
        let mapper = RemoteOperationMapper::new(
            connector.clone(),
            bus.clone(),
            vec![CallReturnMapping::new("reset", "plc", "reset")],
        );
        // No supervisor: the observation outlives the session.
        mapper.start_observers();

        let timeout = Duration::from_secs(1);
        let response = bus.call("reset", CallParameters::default(), None, timeout).await.unwrap();
        assert_eq!(response, CallResponse::Result(None));

        let mut events = connector.subscribe();
        connector.disconnect().await.unwrap();
        let err = bus
            .call("reset", CallParameters::default(), None, timeout)
            .await
            .unwrap_err();
        assert_eq!(err, BusError::ResponseChannelClosed);
        assert_eq!(server.calls().len(), 1);

        assert!(matches!(events.try_recv(), Ok(ConnectorEvent::SessionClosing)));
        assert!(matches!(events.try_recv(), Ok(ConnectorEvent::SessionClosed)));
        assert!(events.try_recv().is_err());
        assert_eq!(connector.stats().errors, 0);
        mapper.stop_observers();
    }

    #[tokio::test]
    async fn test_session_closing_cancels_observers() {
        let (_, connector) = reset_connector();
        connector.connect().await.unwrap();
        let bus = CallBus::default();
        let mapper = RemoteOperationMapper::new(
            connector.clone(),
            bus.clone(),
            vec![CallReturnMapping::new("reset", "plc", "reset")],
        );
        mapper.start();
        assert_eq!(bus.observer_count(), 1);

        connector.disconnect().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while bus.observer_count() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(mapper.active_observers(), 0);
    }
}
