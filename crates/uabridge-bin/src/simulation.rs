// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Simulated plant for `run --simulate`.
//!
//! Builds an in-process address space from the configured data sources so the
//! whole bridge (subscriptions, writes, remote calls) can run without a real
//! server:
//!
//! - data sources used as call objects become objects,
//! - data sources used as call methods become methods that echo their inputs,
//! - every other data source becomes a variable with a typed zero value.
//!
//! Browse paths are materialized element by element, so they resolve exactly
//! as configured. Monitored numeric variables count up on every tick and
//! booleans toggle.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use uabridge_config::BridgeConfig;
use uabridge_core::Value;
use uabridge_opcua::client::MemoryTransport;
use uabridge_opcua::relative_path::{is_reference_subtype, substitute_namespace_uris};
use uabridge_opcua::{
    DataSource, DataType, NamespaceTable, NodeAddress, NodeId, NodeIdentifier, QualifiedName,
    RelativePath,
};

use crate::error::{BinError, BinResult};
use crate::shutdown::ShutdownSignal;

const STANDARD_NAMESPACE: &str = "http://opcfoundation.org/UA/";
const ORGANIZES: NodeId = NodeId::numeric(0, 35);
const HAS_COMPONENT: NodeId = NodeId::numeric(0, 47);

/// Default period between simulated value changes.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(1);

// =============================================================================
// SimulatedPlant
// =============================================================================

/// In-process address space generated from a [`BridgeConfig`].
pub struct SimulatedPlant {
    transport: MemoryTransport,
    namespaces: Vec<String>,
    children: HashMap<(NodeId, QualifiedName), NodeId>,
    variables: Vec<SimulatedVariable>,
    objects: BTreeMap<String, NodeId>,
    methods: usize,
}

#[derive(Debug, Clone)]
struct SimulatedVariable {
    identifier: String,
    node_id: NodeId,
    data_type: Option<DataType>,
    monitored: bool,
}

enum Role {
    Object,
    Variable(Value),
    Method(String),
}

impl SimulatedPlant {
    fn new() -> Self {
        let mut children = HashMap::new();
        for (parent, name, child) in [
            (NodeId::ROOT_FOLDER, "Objects", NodeId::OBJECTS_FOLDER),
            (NodeId::ROOT_FOLDER, "Types", NodeId::TYPES_FOLDER),
            (NodeId::ROOT_FOLDER, "Views", NodeId::VIEWS_FOLDER),
            (NodeId::OBJECTS_FOLDER, "Server", NodeId::SERVER),
            (NodeId::SERVER, "NamespaceArray", NodeId::NAMESPACE_ARRAY),
        ] {
            children.insert((parent, QualifiedName::standard(name)), child);
        }

        Self {
            transport: MemoryTransport::new(),
            namespaces: vec![STANDARD_NAMESPACE.to_string()],
            children,
            variables: Vec::new(),
            objects: BTreeMap::new(),
            methods: 0,
        }
    }

    /// Builds the address space for every configured data source.
    pub fn from_config(config: &BridgeConfig) -> BinResult<Self> {
        let data_sources = config.data_sources()?;

        let call_objects: BTreeSet<&str> = config.calls.keys().map(String::as_str).collect();
        let mut call_methods: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (object, methods) in &config.calls {
            for method in methods.keys() {
                call_methods.entry(method.as_str()).or_default().push(object.as_str());
            }
        }

        let mut plant = Self::new();

        for (identifier, data_source) in &data_sources {
            if call_objects.contains(identifier.as_str()) {
                if call_methods.contains_key(identifier.as_str()) {
                    warn!(data_source = %identifier, "Data source is both a call object and a method; simulating an object");
                }
                let node = plant.place(identifier, &data_source.address, Role::Object, &NodeId::OBJECTS_FOLDER)?;
                plant.objects.insert(identifier.clone(), node);
            }
        }

        for (identifier, data_source) in &data_sources {
            if call_objects.contains(identifier.as_str()) || call_methods.contains_key(identifier.as_str()) {
                continue;
            }
            plant.add_variable(identifier, data_source)?;
        }

        for (identifier, data_source) in &data_sources {
            let Some(objects) = call_methods.get(identifier.as_str()) else {
                continue;
            };
            if call_objects.contains(identifier.as_str()) {
                continue;
            }

            let object_nodes: Vec<NodeId> = objects
                .iter()
                .filter_map(|object| plant.objects.get(*object).cloned())
                .collect();
            let parent = object_nodes.first().cloned().unwrap_or(NodeId::OBJECTS_FOLDER);
            let method = plant.place(
                identifier,
                &data_source.address,
                Role::Method(identifier.clone()),
                &parent,
            )?;

            // Calls require the method to be a component of each object.
            for object in &object_nodes {
                if !plant.is_child(object, &method) {
                    plant.transport.add_reference(object, HAS_COMPONENT, &method);
                }
            }
            plant.methods += 1;
        }

        info!(
            objects = plant.objects.len(),
            variables = plant.variables.len(),
            methods = plant.methods,
            namespaces = plant.namespaces.len(),
            "Simulated address space ready"
        );

        Ok(plant)
    }

    /// Returns a handle to the simulated server.
    pub fn transport(&self) -> MemoryTransport {
        self.transport.clone()
    }

    /// Returns the namespace URIs in index order.
    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// Returns the node a data source was materialized as.
    pub fn node_of(&self, identifier: &str) -> Option<NodeId> {
        self.objects.get(identifier).cloned().or_else(|| {
            self.variables
                .iter()
                .find(|v| v.identifier == identifier)
                .map(|v| v.node_id.clone())
        })
    }

    /// Number of simulated variables.
    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// Number of simulated objects.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Number of simulated methods.
    pub fn method_count(&self) -> usize {
        self.methods
    }

    // =========================================================================
    // Value changes
    // =========================================================================

    /// Advances every monitored variable once; returns how many changed.
    pub fn tick(&self) -> usize {
        let mut changed = 0;
        for variable in self.variables.iter().filter(|v| v.monitored) {
            let Some(current) = self.transport.value(&variable.node_id) else {
                continue;
            };
            if let Some(next) = advance(&current, variable.data_type) {
                self.transport.set_value(&variable.node_id, next);
                changed += 1;
            }
        }
        changed
    }

    /// Ticks every `period` until `shutdown` resolves.
    pub fn spawn_ticker(self, period: Duration, shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let shutdown = shutdown.wait();
            tokio::pin!(shutdown);

            loop {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = interval.tick() => {
                        let changed = self.tick();
                        debug!(changed, "Simulation tick");
                    }
                }
            }
            debug!("Simulation ticker stopped");
        })
    }

    // =========================================================================
    // Address space construction
    // =========================================================================

    fn add_variable(&mut self, identifier: &str, data_source: &DataSource) -> BinResult<()> {
        let initial = initial_value(data_source.data_type);
        let node_id = self.place(
            identifier,
            &data_source.address,
            Role::Variable(initial),
            &NodeId::OBJECTS_FOLDER,
        )?;

        self.variables.push(SimulatedVariable {
            identifier: identifier.to_string(),
            node_id,
            data_type: data_source.data_type,
            monitored: data_source.should_monitor,
        });
        Ok(())
    }

    fn namespace(&mut self, uri: &str) -> u16 {
        let index = self.transport.add_namespace(uri);
        if usize::from(index) == self.namespaces.len() {
            self.namespaces.push(uri.to_string());
        }
        index
    }

    fn is_child(&self, parent: &NodeId, child: &NodeId) -> bool {
        self.children
            .iter()
            .any(|((p, _), c)| p == parent && c == child)
    }

    fn place(&mut self, identifier: &str, address: &NodeAddress, role: Role, parent: &NodeId) -> BinResult<NodeId> {
        match address {
            NodeAddress::Node {
                namespace_uri,
                identifier_with_type,
            } => {
                let namespace_index = match namespace_uri {
                    Some(uri) => self.namespace(uri),
                    None => 0,
                };
                let node_identifier: NodeIdentifier = identifier_with_type
                    .parse()
                    .map_err(|e| address_error(identifier, e))?;
                let browse_name = match &node_identifier {
                    NodeIdentifier::String(name) => name.clone(),
                    _ => identifier.to_string(),
                };

                let node_id = NodeId::new(namespace_index, node_identifier);
                let (node_id, _) = self.create(role, parent, node_id, &browse_name);
                self.children.insert(
                    (parent.clone(), QualifiedName::new(namespace_index, browse_name)),
                    node_id.clone(),
                );
                Ok(node_id)
            }
            NodeAddress::BrowsePath {
                root_node,
                relative_path,
            } => self.place_path(identifier, root_node, relative_path, role),
        }
    }

    fn place_path(&mut self, identifier: &str, root_node: &str, relative_path: &str, role: Role) -> BinResult<NodeId> {
        for uri in namespace_placeholders(relative_path) {
            self.namespace(uri);
        }

        let table = NamespaceTable::new(self.namespaces.clone());
        let substituted = substitute_namespace_uris(relative_path, &table, identifier)
            .map_err(|e| address_error(identifier, e))?;
        let path: RelativePath = substituted.parse().map_err(|e| address_error(identifier, e))?;
        let mut current = NodeId::parse_root(root_node).map_err(|e| address_error(identifier, e))?;

        if path.elements.is_empty() {
            return Err(BinError::config(format!(
                "Data source '{}': an empty browse path cannot be simulated",
                identifier
            )));
        }

        let mut label = root_node.to_string();
        let mut role = Some(role);
        let last = path.elements.len() - 1;

        for (position, element) in path.elements.iter().enumerate() {
            if element.is_inverse {
                return Err(BinError::config(format!(
                    "Data source '{}': inverse references cannot be simulated",
                    identifier
                )));
            }

            let name = &element.target_name;
            label = format!("{}/{}", label, name.name);
            let key = (current.clone(), name.clone());

            if let Some(existing) = self.children.get(&key) {
                if position == last {
                    warn!(data_source = %identifier, path = %label, "Browse path already simulated; reusing node");
                }
                current = existing.clone();
                continue;
            }

            let element_role = if position == last {
                role.take().unwrap_or(Role::Object)
            } else {
                Role::Object
            };
            let node_id = NodeId::string(name.namespace_index, label.clone());
            let (node_id, reference) = self.create(element_role, &current, node_id, &name.name);

            if !is_reference_subtype(&reference, &element.reference_type) {
                self.transport
                    .add_reference(&current, element.reference_type.clone(), &node_id);
            }

            self.children.insert(key, node_id.clone());
            current = node_id;
        }

        Ok(current)
    }

    /// Adds the node and returns it with the reference type linking it to `parent`.
    fn create(&self, role: Role, parent: &NodeId, node_id: NodeId, browse_name: &str) -> (NodeId, NodeId) {
        match role {
            Role::Object => {
                let reference = if parent.is_standard() { ORGANIZES } else { HAS_COMPONENT };
                (self.transport.add_object(parent, node_id, browse_name), reference)
            }
            Role::Variable(initial) => (
                self.transport.add_variable(parent, node_id, browse_name, initial),
                HAS_COMPONENT,
            ),
            Role::Method(identifier) => {
                let node = self.transport.add_method(parent, node_id, browse_name, move |inputs| {
                    debug!(method = %identifier, inputs = inputs.len(), "Simulated method called");
                    Ok(inputs.to_vec())
                });
                (node, HAS_COMPONENT)
            }
        }
    }
}

impl std::fmt::Debug for SimulatedPlant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedPlant")
            .field("namespaces", &self.namespaces)
            .field("objects", &self.objects.len())
            .field("variables", &self.variables.len())
            .field("methods", &self.methods)
            .finish()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn address_error(identifier: &str, error: impl std::fmt::Display) -> BinError {
    BinError::config(format!("Data source '{}': {}", identifier, error))
}

/// Returns the `[uri]` placeholders of a relative path.
fn namespace_placeholders(path: &str) -> Vec<&str> {
    let mut uris = Vec::new();
    let mut rest = path;
    while let Some(start) = rest.find('[') {
        let Some(len) = rest[start + 1..].find(']') else {
            break;
        };
        uris.push(&rest[start + 1..start + 1 + len]);
        rest = &rest[start + len + 2..];
    }
    uris
}

fn initial_value(data_type: Option<DataType>) -> Value {
    match data_type {
        None | Some(DataType::Variant) | Some(DataType::Double) => Value::Double(0.0),
        Some(DataType::Boolean) => Value::Boolean(false),
        Some(DataType::String) => Value::String(String::new()),
        Some(DataType::ByteString) => Value::ByteString(Vec::new()),
        Some(DataType::DateTime) => DataType::DateTime
            .coerce(Value::String("1970-01-01T00:00:00Z".to_string()))
            .unwrap_or(Value::Null),
        Some(DataType::Guid) => DataType::Guid
            .coerce(Value::String("00000000-0000-0000-0000-000000000000".to_string()))
            .unwrap_or(Value::Null),
        Some(numeric) => numeric.coerce(Value::Int64(0)).unwrap_or(Value::Double(0.0)),
    }
}

/// Next simulated value, or `None` when the value does not change.
fn advance(current: &Value, data_type: Option<DataType>) -> Option<Value> {
    match current {
        Value::Boolean(b) => Some(Value::Boolean(!b)),
        value if value.is_numeric() => {
            let data_type = data_type.unwrap_or(DataType::Double);
            let next = value.as_f64()? + 1.0;
            let typed = data_type
                .coerce(Value::Double(next))
                .or_else(|_| data_type.coerce(Value::Int64(0)))
                .ok()?;
            Some(typed)
        }
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uabridge_config::load_config_str;
    use uabridge_config::ConfigFormat;

    const PLANT: &str = r#"
connector:
  endpoint_url: opc.tcp://plant:4840
  data_sources:
    PLC2:
      node_id: { namespace_uri: "urn:plant", identifier: "s=PLC2" }
    Temperature:
      node_id: { namespace_uri: "urn:plant", identifier: "s=PLC2.Temperature" }
      monitor: true
      data_type: Double
    Running:
      browse_path: { root_node: ObjectsFolder, relative_path: "/[urn:line]:Line1/[urn:line]:Running" }
      monitor: true
      data_type: Boolean
    Setpoint:
      node_id: { namespace_uri: "urn:plant", identifier: "s=PLC2.Setpoint" }
      data_type: Int16
    Reset:
      node_id: { namespace_uri: "urn:plant", identifier: "s=PLC2.Reset" }
calls:
  PLC2:
    Reset:
      operation: reset
      input_arguments:
        - parameter: 0
          data_type: Int32
"#;

    fn plant() -> SimulatedPlant {
        let config = load_config_str(PLANT, ConfigFormat::Yaml).unwrap();
        SimulatedPlant::from_config(&config).unwrap()
    }

    #[test]
    fn test_address_space_counts() {
        let plant = plant();
        assert_eq!(plant.object_count(), 1);
        assert_eq!(plant.variable_count(), 3);
        assert_eq!(plant.method_count(), 1);
        assert_eq!(
            plant.namespaces(),
            &[STANDARD_NAMESPACE.to_string(), "urn:plant".to_string(), "urn:line".to_string()]
        );
    }

    #[test]
    fn test_initial_values_are_typed() {
        let plant = plant();
        let transport = plant.transport();

        let setpoint = plant.node_of("Setpoint").unwrap();
        assert_eq!(setpoint, NodeId::string(1, "PLC2.Setpoint"));
        assert_eq!(transport.value(&setpoint), Some(Value::Int16(0)));

        let running = plant.node_of("Running").unwrap();
        assert_eq!(running.namespace_index, 2);
        assert_eq!(transport.value(&running), Some(Value::Boolean(false)));
    }

    #[test]
    fn test_tick_advances_monitored_variables_only() {
        let plant = plant();
        let transport = plant.transport();

        assert_eq!(plant.tick(), 2);
        assert_eq!(
            transport.value(&plant.node_of("Temperature").unwrap()),
            Some(Value::Double(1.0))
        );
        assert_eq!(
            transport.value(&plant.node_of("Running").unwrap()),
            Some(Value::Boolean(true))
        );
        assert_eq!(
            transport.value(&plant.node_of("Setpoint").unwrap()),
            Some(Value::Int16(0))
        );
    }

    #[test]
    fn test_advance_wraps_on_overflow() {
        assert_eq!(advance(&Value::Byte(255), Some(DataType::Byte)), Some(Value::Byte(0)));
        assert_eq!(advance(&Value::Int32(4), Some(DataType::Int32)), Some(Value::Int32(5)));
        assert_eq!(advance(&Value::String("x".into()), Some(DataType::String)), None);
    }

    #[test]
    fn test_namespace_placeholders() {
        assert_eq!(
            namespace_placeholders("/[urn:a]:Line1.[urn:b]:Motor"),
            vec!["urn:a", "urn:b"]
        );
        assert!(namespace_placeholders("/2:Line1").is_empty());
    }

    #[test]
    fn test_inverse_path_rejected() {
        let yaml = r#"
connector:
  endpoint_url: opc.tcp://plant:4840
  data_sources:
    Parent:
      browse_path: { root_node: ObjectsFolder, relative_path: "<!Organizes>0:Root" }
"#;
        let config = load_config_str(yaml, ConfigFormat::Yaml).unwrap();
        let err = SimulatedPlant::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("inverse"));
    }
}
