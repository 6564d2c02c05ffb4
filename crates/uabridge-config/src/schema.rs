// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema definitions for uabridge.
//!
//! # Schema Structure
//!
//! ```text
//! BridgeConfig
//! ├── connector: ConnectorSection
//! │   ├── endpoint_url, connection, identity, subscription
//! │   └── data_sources: id -> DataSourceSpec
//! ├── calls: object id -> method id -> CallMappingSpec
//! ├── sources: data source id -> channel
//! ├── actors: data source id -> channel
//! └── logging: LoggingConfig
//! ```
//!
//! The schema only describes; [`BridgeConfig::validate`] checks it and the
//! `*_options` / `data_sources` / `call_mappings` methods turn it into the
//! programmatic types of `uabridge-opcua`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uabridge_core::{ParameterRef, Value};
use uabridge_opcua::connector::DEFAULT_EVENT_CAPACITY;
use uabridge_opcua::{
    CallReturnMapping, Coercion, ConnectionOptions, ConnectorOptions, DataSource, DataType,
    InputArgumentMapping, NodeAddress, OutputCoercion, SourcePayload, SubscriptionParameters,
    UserIdentity, Validator,
};

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// The root configuration structure for uabridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Connector configuration.
    pub connector: ConnectorSection,

    /// Remote-operation call mappings, keyed by object id and method id.
    #[serde(default)]
    pub calls: BTreeMap<String, BTreeMap<String, CallMappingSpec>>,

    /// Data sources whose value changes are published, keyed to channels.
    #[serde(default)]
    pub sources: BTreeMap<String, String>,

    /// Shape of published source values: `value` or `json` text.
    #[serde(default)]
    pub source_payload: SourcePayload,

    /// Data sources written from channel values, keyed to channels.
    #[serde(default)]
    pub actors: BTreeMap<String, String>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// Validates the entire configuration.
    ///
    /// Checks the endpoint, every data source address and data type, and
    /// that calls, sources and actors only name declared data sources.
    pub fn validate(&self) -> ConfigResult<()> {
        self.connector.validate()?;

        for (object, methods) in &self.calls {
            for (method, spec) in methods {
                let field = format!("calls.{}.{}", object, method);
                self.require_data_source(&field, object)?;
                self.require_data_source(&field, method)?;
                spec.validate(&field)?;
            }
        }

        for id in self.sources.keys() {
            self.require_data_source(&format!("sources.{}", id), id)?;
        }

        for (id, channel) in &self.actors {
            let field = format!("actors.{}", id);
            let spec = self.require_data_source(&field, id)?;
            if spec.data_type.is_none() {
                return Err(ConfigError::validation(
                    field,
                    "written data sources must declare a data_type",
                ));
            }
            if channel.is_empty() {
                return Err(ConfigError::validation(field, "channel cannot be empty"));
            }
        }

        Ok(())
    }

    fn require_data_source(&self, field: &str, id: &str) -> ConfigResult<&DataSourceSpec> {
        self.connector
            .data_sources
            .get(id)
            .ok_or_else(|| ConfigError::validation(field, format!("unknown data source '{}'", id)))
    }

    /// Returns the connector options.
    pub fn connector_options(&self) -> ConnectorOptions {
        let mut options = ConnectorOptions::new(self.connector.endpoint_url.clone())
            .with_connection(self.connector.connection.clone())
            .with_identity(self.connector.identity.clone())
            .with_subscription(self.connector.subscription.clone());
        options.event_capacity = self.connector.event_capacity;
        options
    }

    /// Builds the configured data sources.
    pub fn data_sources(&self) -> ConfigResult<Vec<(String, DataSource)>> {
        self.connector
            .data_sources
            .iter()
            .map(|(id, spec)| Ok((id.clone(), spec.to_data_source(id)?)))
            .collect()
    }

    /// Builds the configured call mappings.
    pub fn call_mappings(&self) -> ConfigResult<Vec<CallReturnMapping>> {
        let mut mappings = Vec::new();
        for (object, methods) in &self.calls {
            for (method, spec) in methods {
                mappings.push(spec.to_mapping(object, method)?);
            }
        }
        Ok(mappings)
    }

    /// Returns the forwarding routes, data source id to channel.
    pub fn source_routes(&self) -> HashMap<String, String> {
        self.sources.clone().into_iter().collect()
    }

    /// Returns the writing routes, data source id to channel.
    pub fn actor_routes(&self) -> HashMap<String, String> {
        self.actors.clone().into_iter().collect()
    }

    /// Number of call mappings over all objects.
    pub fn call_count(&self) -> usize {
        self.calls.values().map(BTreeMap::len).sum()
    }
}

// =============================================================================
// Connector Section
// =============================================================================

/// Connection to the OPC UA server and its data sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectorSection {
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

    /// Capacity of the connector event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Data sources by id.
    #[serde(default)]
    pub data_sources: BTreeMap<String, DataSourceSpec>,
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl ConnectorSection {
    /// Validates the endpoint and the data sources.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.endpoint_url.is_empty() {
            return Err(ConfigError::validation("connector.endpoint_url", "cannot be empty"));
        }
        ConnectorOptions::new(self.endpoint_url.clone()).validate()?;

        if self.event_capacity == 0 {
            return Err(ConfigError::validation(
                "connector.event_capacity",
                "must be greater than 0",
            ));
        }
        if self.subscription.publishing_interval <= 0.0 {
            return Err(ConfigError::validation(
                "connector.subscription.publishing_interval",
                "must be greater than 0",
            ));
        }

        for (id, spec) in &self.data_sources {
            spec.validate(id)?;
        }
        Ok(())
    }
}

// =============================================================================
// Data Sources
// =============================================================================

/// Explicit node of a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeIdSpec {
    /// Namespace URI; the standard namespace when absent.
    #[serde(default)]
    pub namespace_uri: Option<String>,
    /// Identifier with type prefix, e.g. `s=Device001.Tag4711`.
    pub identifier: String,
}

/// Browse path of a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrowsePathSpec {
    /// Well-known root name or node id.
    pub root_node: String,
    /// Relative path, may contain `[namespace-uri]:` placeholders.
    pub relative_path: String,
}

/// A configured data source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataSourceSpec {
    /// Explicit node; exclusive with `browse_path`.
    #[serde(default)]
    pub node_id: Option<NodeIdSpec>,

    /// Browse path; exclusive with `node_id`.
    #[serde(default)]
    pub browse_path: Option<BrowsePathSpec>,

    /// Whether value changes are monitored.
    #[serde(default)]
    pub monitor: bool,

    /// Sampling interval in milliseconds.
    #[serde(default)]
    pub sampling_interval: Option<f64>,

    /// Wire data type name.
    #[serde(default)]
    pub data_type: Option<String>,

    /// Declarative value coercion.
    #[serde(default)]
    pub coerce: Option<CoerceSpec>,
}

impl DataSourceSpec {
    fn address(&self, id: &str) -> ConfigResult<NodeAddress> {
        let address = NodeAddress::from_parts(
            id,
            self.node_id
                .as_ref()
                .map(|n| (n.namespace_uri.clone(), n.identifier.clone())),
            self.browse_path
                .as_ref()
                .map(|p| (p.root_node.clone(), p.relative_path.clone())),
        )?;
        address.validate(id)?;
        Ok(address)
    }

    /// Validates address, data type, sampling interval and coercion.
    pub fn validate(&self, id: &str) -> ConfigResult<()> {
        let field = format!("connector.data_sources.{}", id);
        self.address(id)?;
        if let Some(name) = &self.data_type {
            DataType::from_str(name)?;
        }
        if let Some(interval) = self.sampling_interval {
            if !interval.is_finite() || interval < 0.0 {
                return Err(ConfigError::validation(
                    format!("{}.sampling_interval", field),
                    "must be a non-negative number",
                ));
            }
        }
        if let Some(coerce) = &self.coerce {
            coerce.validate(&format!("{}.coerce", field))?;
        }
        Ok(())
    }

    /// Builds the data source.
    pub fn to_data_source(&self, id: &str) -> ConfigResult<DataSource> {
        let mut source = DataSource::new(self.address(id)?);
        if self.monitor {
            source = source.monitored(self.sampling_interval);
        }
        if let Some(name) = &self.data_type {
            source = source.with_data_type(DataType::from_str(name)?);
        }
        if let Some(coerce) = &self.coerce {
            source = source.with_coercion(coerce.to_coercion());
        }
        Ok(source)
    }
}

/// Declarative coercion, written `coerce: { linear: { factor, offset } }`.
///
/// A plain map in every format, so YAML needs no `!linear` tag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoerceSpec {
    /// Linear scaling between application and wire value.
    pub linear: LinearCoerceSpec,
}

/// `wire = app * factor + offset`; reads apply the inverse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinearCoerceSpec {
    /// Multiplier.
    pub factor: f64,
    /// Added after multiplying.
    #[serde(default)]
    pub offset: f64,
}

impl CoerceSpec {
    /// Creates a linear coercion spec.
    pub fn linear(factor: f64, offset: f64) -> Self {
        Self {
            linear: LinearCoerceSpec { factor, offset },
        }
    }

    fn validate(&self, field: &str) -> ConfigResult<()> {
        let LinearCoerceSpec { factor, offset } = self.linear;
        if !factor.is_finite() || factor == 0.0 {
            return Err(ConfigError::validation(
                format!("{}.linear.factor", field),
                "must be a non-zero number",
            ));
        }
        if !offset.is_finite() {
            return Err(ConfigError::validation(
                format!("{}.linear.offset", field),
                "must be a number",
            ));
        }
        Ok(())
    }

    /// Builds the coercion.
    pub fn to_coercion(&self) -> Coercion {
        Coercion::linear(self.linear.factor, self.linear.offset)
    }
}

// =============================================================================
// Call Mappings
// =============================================================================

/// A remote operation answered by one method call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallMappingSpec {
    /// Operation name observed on the call bus.
    pub operation: String,

    /// Observation context; must be a JSON object.
    #[serde(default)]
    pub context: Option<serde_json::Value>,

    /// Input arguments in method order.
    #[serde(default)]
    pub input_arguments: Vec<InputArgumentSpec>,

    /// Output coercion.
    #[serde(default)]
    pub output: OutputSpec,
}

impl CallMappingSpec {
    fn validate(&self, field: &str) -> ConfigResult<()> {
        if self.operation.is_empty() {
            return Err(ConfigError::validation(
                format!("{}.operation", field),
                "cannot be empty",
            ));
        }
        if let Some(context) = &self.context {
            if !context.is_object() {
                return Err(ConfigError::validation(
                    format!("{}.context", field),
                    "must be an object",
                ));
            }
        }
        for (i, input) in self.input_arguments.iter().enumerate() {
            input.validate(&format!("{}.input_arguments[{}]", field, i))?;
        }
        Ok(())
    }

    /// Builds the mapping for `object` and `method`.
    pub fn to_mapping(&self, object: &str, method: &str) -> ConfigResult<CallReturnMapping> {
        let mut mapping = CallReturnMapping::new(self.operation.clone(), object, method);
        if let Some(context) = &self.context {
            mapping = mapping.with_context(context.clone());
        }
        for input in &self.input_arguments {
            mapping = mapping.with_input(input.to_mapping()?);
        }
        if let Some(output) = self.output.to_output_coercion() {
            mapping = mapping.with_output(output);
        }
        Ok(mapping)
    }
}

/// One method input argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputArgumentSpec {
    /// Request parameter name or position.
    pub parameter: ParameterRef,
    /// Wire data type name.
    pub data_type: String,
    /// Optional check of the raw parameter.
    #[serde(default)]
    pub validate: Option<ValidateSpec>,
    /// Optional coercion, applied as for a write.
    #[serde(default)]
    pub coerce: Option<CoerceSpec>,
}

impl InputArgumentSpec {
    fn validate(&self, field: &str) -> ConfigResult<()> {
        DataType::from_str(&self.data_type)?;
        if let Some(validate) = &self.validate {
            validate.validate(&format!("{}.validate", field))?;
        }
        if let Some(coerce) = &self.coerce {
            coerce.validate(&format!("{}.coerce", field))?;
        }
        Ok(())
    }

    fn to_mapping(&self) -> ConfigResult<InputArgumentMapping> {
        let mut mapping =
            InputArgumentMapping::new(self.parameter.clone(), DataType::from_str(&self.data_type)?);
        if let Some(validate) = &self.validate {
            mapping = mapping.with_validator(validate.to_validator());
        }
        if let Some(coerce) = &self.coerce {
            mapping = mapping.with_coercion(coerce.to_coercion());
        }
        Ok(mapping)
    }
}

/// Declarative parameter validation.
///
/// All given conditions must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidateSpec {
    /// Inclusive lower bound.
    #[serde(default)]
    pub min: Option<f64>,
    /// Inclusive upper bound.
    #[serde(default)]
    pub max: Option<f64>,
    /// Allowed values.
    #[serde(default)]
    pub one_of: Option<Vec<serde_json::Value>>,
}

impl ValidateSpec {
    fn validate(&self, field: &str) -> ConfigResult<()> {
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(ConfigError::validation(field, "min cannot exceed max"));
            }
        }
        if matches!(&self.one_of, Some(values) if values.is_empty()) {
            return Err(ConfigError::validation(field, "one_of cannot be empty"));
        }
        Ok(())
    }

    /// Builds the validator.
    pub fn to_validator(&self) -> Validator {
        let range = (self.min.is_some() || self.max.is_some())
            .then(|| Validator::range(self.min, self.max));
        let one_of = self
            .one_of
            .as_ref()
            .map(|values| Validator::one_of(values.iter().map(Value::from_json).collect()));

        match (range, one_of) {
            (Some(range), Some(one_of)) => {
                let label = format!("{} and {}", range.label(), one_of.label());
                Validator::new(label, move |value| range.check(value) && one_of.check(value))
            }
            (Some(validator), None) | (None, Some(validator)) => validator,
            (None, None) => Validator::new("any", |_| true),
        }
    }
}

/// How method outputs become the call result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputSpec {
    /// No outputs give no result, one output the scalar, more an array.
    #[default]
    Default,
    /// The first output.
    First,
    /// All outputs as an array.
    Array,
}

impl OutputSpec {
    /// Returns the output coercion; `None` keeps the default behavior.
    pub fn to_output_coercion(&self) -> Option<OutputCoercion> {
        match self {
            OutputSpec::Default => None,
            OutputSpec::First => Some(OutputCoercion::first()),
            OutputSpec::Array => Some(OutputCoercion::array()),
        }
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Returns the filter directive name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(ConfigError::validation(
                "logging.level",
                format!("unknown log level '{}'", other),
            )),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable text.
    #[default]
    Text,
    /// Compact text.
    Compact,
    /// JSON lines.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uabridge_opcua::SecurityMode;

    fn config() -> BridgeConfig {
        serde_json::from_value(serde_json::json!({
            "connector": {
                "endpoint_url": "opc.tcp://plant:4840",
                "connection": { "security_mode": "sign" },
                "identity": { "type": "username", "user": "op", "password": "pw" },
                "data_sources": {
                    "PLC2": { "node_id": { "namespace_uri": "urn:plant", "identifier": "s=PLC2" } },
                    "Alert": {
                        "browse_path": { "root_node": "ObjectsFolder", "relative_path": "/[urn:plant]:PLC2/[urn:plant]:Alert" }
                    },
                    "Memory": {
                        "node_id": { "namespace_uri": "urn:plant", "identifier": "s=Memory" },
                        "monitor": true,
                        "sampling_interval": 250.0,
                        "data_type": "UInt64",
                        "coerce": { "linear": { "factor": 1048576.0 } }
                    }
                }
            },
            "calls": {
                "PLC2": {
                    "Alert": {
                        "operation": "plant.alert",
                        "context": { "site": "north" },
                        "input_arguments": [
                            { "parameter": "level", "data_type": "Int32", "validate": { "min": 0, "max": 3 } },
                            { "parameter": 1, "data_type": "String", "validate": { "one_of": ["on", "off"] } }
                        ],
                        "output": "first"
                    }
                }
            },
            "sources": { "Memory": "plant/memory" },
            "actors": { "Memory": "cmd/memory" }
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_config() {
        let config = config();
        config.validate().unwrap();
        assert_eq!(config.call_count(), 1);
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert_eq!(config.source_payload, SourcePayload::Value);
    }

    #[test]
    fn test_connector_options() {
        let options = config().connector_options();
        assert_eq!(options.endpoint_url, "opc.tcp://plant:4840");
        assert_eq!(options.connection.security_mode, SecurityMode::Sign);
        assert_eq!(options.identity, UserIdentity::user_name("op", "pw"));
        assert_eq!(options.event_capacity, DEFAULT_EVENT_CAPACITY);
    }

    #[test]
    fn test_data_sources() {
        let sources: HashMap<_, _> = config().data_sources().unwrap().into_iter().collect();
        assert_eq!(sources.len(), 3);

        let memory = &sources["Memory"];
        assert!(memory.should_monitor);
        assert_eq!(memory.sampling_interval, Some(250.0));
        assert_eq!(memory.data_type, Some(DataType::UInt64));
        assert!(memory.coercion.is_some());
        assert_eq!(
            memory.address,
            NodeAddress::node(Some("urn:plant".into()), "s=Memory")
        );

        assert!(!sources["PLC2"].should_monitor);
        assert!(matches!(sources["Alert"].address, NodeAddress::BrowsePath { .. }));
    }

    #[test]
    fn test_call_mappings() {
        let mappings = config().call_mappings().unwrap();
        assert_eq!(mappings.len(), 1);
        let mapping = &mappings[0];
        assert_eq!(mapping.operation, "plant.alert");
        assert_eq!(mapping.object, "PLC2");
        assert_eq!(mapping.method, "Alert");
        assert_eq!(mapping.context, Some(serde_json::json!({ "site": "north" })));
        assert_eq!(mapping.input_arguments.len(), 2);
        assert_eq!(mapping.input_arguments[0].parameter, ParameterRef::Name("level".into()));
        assert_eq!(mapping.input_arguments[1].parameter, ParameterRef::Index(1));
        assert_eq!(mapping.input_arguments[0].data_type, DataType::Int32);

        let range = mapping.input_arguments[0].validate.as_ref().unwrap();
        assert!(range.check(&Value::Int64(2)));
        assert!(!range.check(&Value::Int64(4)));
        let one_of = mapping.input_arguments[1].validate.as_ref().unwrap();
        assert!(one_of.check(&Value::String("on".into())));
        assert!(!one_of.check(&Value::String("maybe".into())));

        assert_eq!(
            mapping.coerce_outputs(vec![Value::Int32(1), Value::Int32(2)]).unwrap(),
            Some(Value::Int32(1))
        );
    }

    #[test]
    fn test_default_output_keeps_arrays() {
        let mut config = config();
        let spec = config.calls.get_mut("PLC2").unwrap().get_mut("Alert").unwrap();
        spec.output = OutputSpec::Default;
        let mapping = &config.call_mappings().unwrap()[0];
        assert!(mapping.output_coercion.is_none());
    }

    #[test]
    fn test_combined_validator() {
        let spec = ValidateSpec {
            min: Some(0.0),
            max: None,
            one_of: Some(vec![serde_json::json!(-1), serde_json::json!(5)]),
        };
        let validator = spec.to_validator();
        assert!(validator.check(&Value::Int64(5)));
        assert!(!validator.check(&Value::Int64(-1)));
    }

    #[test]
    fn test_invalid_endpoint() {
        let mut config = config();
        config.connector.endpoint_url = "http://plant".into();
        assert!(matches!(config.validate(), Err(ConfigError::Connector(_))));
    }

    #[test]
    fn test_address_forms_are_exclusive() {
        let mut config = config();
        let spec = config.connector.data_sources.get_mut("PLC2").unwrap();
        spec.browse_path = Some(BrowsePathSpec {
            root_node: "ObjectsFolder".into(),
            relative_path: "/PLC2".into(),
        });
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("mutually exclusive"));

        let spec = config.connector.data_sources.get_mut("PLC2").unwrap();
        spec.node_id = None;
        spec.browse_path = None;
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("PLC2"));
    }

    #[test]
    fn test_malformed_node_id() {
        let mut config = config();
        config.connector.data_sources.get_mut("PLC2").unwrap().node_id = Some(NodeIdSpec {
            namespace_uri: None,
            identifier: "PLC2".into(),
        });
        assert!(matches!(config.validate(), Err(ConfigError::Connector(_))));
    }

    #[test]
    fn test_unknown_data_type() {
        let mut config = config();
        config.connector.data_sources.get_mut("Memory").unwrap().data_type = Some("Decimal".into());
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("Decimal"));
    }

    #[test]
    fn test_call_with_unknown_data_source() {
        let mut config = config();
        let methods = config.calls.remove("PLC2").unwrap();
        config.calls.insert("PLC9".into(), methods);
        let error = config.validate().unwrap_err();
        assert_eq!(
            error.to_string(),
            "Validation failed for 'calls.PLC9.Alert': unknown data source 'PLC9'"
        );
    }

    #[test]
    fn test_call_context_must_be_object() {
        let mut config = config();
        config.calls.get_mut("PLC2").unwrap().get_mut("Alert").unwrap().context =
            Some(serde_json::json!("north"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_actor_requires_data_type() {
        let mut config = config();
        config.connector.data_sources.get_mut("Memory").unwrap().data_type = None;
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("actors.Memory"));
    }

    #[test]
    fn test_zero_linear_factor() {
        let mut config = config();
        config.connector.data_sources.get_mut("Memory").unwrap().coerce =
            Some(CoerceSpec::linear(0.0, 0.0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
