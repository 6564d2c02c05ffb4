// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connector and call mapper integration tests.
//!
//! Most tests run against the in-memory transport. The tests at the end talk
//! to a real server and are ignored by default.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory tests
//! cargo test -p uabridge-opcua --test connector_integration
//!
//! # Against a server (e.g. the Prosys simulation server)
//! OPCUA_TEST_ENDPOINT=opc.tcp://localhost:53530/OPCUA/SimulationServer \
//!     cargo test -p uabridge-opcua --features real-transport --test connector_integration -- --ignored
//! ```

use std::time::Duration;

use tokio::sync::broadcast;
use uabridge_core::{CallBus, CallParameters, CallResponse, ContextFilter, RemoteCallError, Value};
use uabridge_opcua::analog::{eu_information_value, range_value, Range};
use uabridge_opcua::client::{MemoryService, MemoryTransport};
use uabridge_opcua::error::CoercionError;
use uabridge_opcua::remote::OutputCoercion;
use uabridge_opcua::{
    AddressError, AttributeId, CallReturnMapping, Coercion, ConnectorEvent, ConnectorOptions,
    DataSource, DataType, InputArgumentMapping, NodeId, OpcUaConnector, OpcUaError,
    RemoteOperationMapper, SessionState, StatusCode, UserIdentity,
};

// =============================================================================
// Test Fixtures
// =============================================================================

const PLANT: &str = "urn:plant";
const TIMEOUT: Duration = Duration::from_secs(2);

struct Plant {
    server: MemoryTransport,
    temp: NodeId,
    level: NodeId,
    memory: NodeId,
    alert: NodeId,
}

/// A small plant: PLC2 with a temperature analog item, a level, a memory
/// size in bytes and an `Alert` method.
fn plant() -> Plant {
    let server = MemoryTransport::new();
    server.add_namespace("urn:unused");
    let ns = server.add_namespace(PLANT);

    let plc = server.add_object(&NodeId::OBJECTS_FOLDER, NodeId::string(ns, "PLC2"), "PLC2");
    let temp = server.add_variable(&plc, NodeId::string(ns, "PLC2.Temp"), "Temp", Value::Double(21.5));
    server.add_property(&temp, NodeId::string(ns, "PLC2.Temp.EURange"), "EURange", range_value(-20.0, 120.0));
    server.add_property(
        &temp,
        NodeId::string(ns, "PLC2.Temp.EngineeringUnits"),
        "EngineeringUnits",
        eu_information_value("http://www.opcfoundation.org/UA/units/un/cefact", 4408652, "°C", "degree Celsius"),
    );
    let level = server.add_variable(&plc, NodeId::string(ns, "PLC2.Level"), "Level", Value::Double(3.0));
    let memory = server.add_variable(&plc, NodeId::string(ns, "PLC2.Memory"), "Memory", Value::Double(0.0));
    let alert = server.add_method(&plc, NodeId::string(ns, "PLC2.Alert"), "Alert", |_| Ok(vec![]));

    Plant {
        server,
        temp,
        level,
        memory,
        alert,
    }
}

fn options() -> ConnectorOptions {
    ConnectorOptions::new("opc.tcp://plant:4840")
}

fn plant_node(identifier: &str) -> DataSource {
    DataSource::node(Some(PLANT.into()), identifier)
}

async fn next_event(events: &mut broadcast::Receiver<ConnectorEvent>) -> ConnectorEvent {
    tokio::time::timeout(TIMEOUT, events.recv())
        .await
        .expect("event timeout")
        .expect("event channel closed")
}

async fn next_error(events: &mut broadcast::Receiver<ConnectorEvent>) -> String {
    loop {
        if let ConnectorEvent::Error(e) = next_event(events).await {
            return e.to_string();
        }
    }
}

// =============================================================================
// Session Tests
// =============================================================================

#[tokio::test]
async fn test_connect_disconnect_lifecycle() {
    let plant = plant();
    let connector = OpcUaConnector::new(
        options().with_identity(UserIdentity::user_name("operator", "secret")),
        plant.server.clone(),
    );
    let mut events = connector.subscribe();

    connector.connect().await.unwrap();
    assert!(matches!(next_event(&mut events).await, ConnectorEvent::SessionCreated));
    assert_eq!(connector.state(), SessionState::Active);
    assert_eq!(plant.server.session_identity(), Some(UserIdentity::user_name("operator", "secret")));

    let namespaces = connector.namespace_table().unwrap();
    assert_eq!(namespaces.index_of(PLANT), Some(2));
    assert_eq!(connector.session_info().unwrap().namespace_uris.len(), namespaces.len());

    connector.disconnect().await.unwrap();
    assert!(matches!(next_event(&mut events).await, ConnectorEvent::SessionClosing));
    assert!(matches!(next_event(&mut events).await, ConnectorEvent::SessionClosed));
    assert!(!connector.is_connected());
    assert!(connector.namespace_table().is_none());
}

#[tokio::test]
async fn test_disconnect_without_session_is_silent() {
    let plant = plant();
    let connector = OpcUaConnector::new(options(), plant.server);
    let mut events = connector.subscribe();

    connector.disconnect().await.unwrap();
    assert!(events.try_recv().is_err());
    assert_eq!(connector.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_connect_failure_reports_error() {
    let plant = plant();
    plant.server.fail_connect(Some("connection refused"));
    let connector = OpcUaConnector::new(options(), plant.server.clone());
    let mut events = connector.subscribe();

    let err = connector.connect().await.unwrap_err();
    assert!(err.is_connection_error());
    assert!(next_error(&mut events).await.contains("connection refused"));
    assert!(!connector.is_connected());

    // The caller decides to retry.
    plant.server.fail_connect(None);
    connector.connect().await.unwrap();
    assert!(connector.is_connected());
}

#[tokio::test]
async fn test_operations_after_disconnect_fail() {
    let plant = plant();
    let connector = OpcUaConnector::new(options(), plant.server);
    connector.connect().await.unwrap();
    connector.disconnect().await.unwrap();

    let err = connector.read_variable_value(&plant_node("s=PLC2.Level")).await.unwrap_err();
    assert!(matches!(err, OpcUaError::NotConnected { operation: "readVariableValue" }));
}

// =============================================================================
// Registry Tests
// =============================================================================

#[tokio::test]
async fn test_register_is_idempotent() {
    let plant = plant();
    let connector = OpcUaConnector::new(options(), plant.server.clone());

    let added = connector
        .register_data_sources([("level", plant_node("s=PLC2.Level"))])
        .await;
    assert_eq!(added, ["level"]);

    let added = connector
        .register_data_sources([("level", plant_node("s=PLC2.Temp").monitored(None))])
        .await;
    assert!(added.is_empty());
    assert_eq!(connector.data_source_ids(), ["level"]);
    assert_eq!(connector.data_source("level").unwrap().to_string(), "[urn:plant]s=PLC2.Level");

    connector.connect().await.unwrap();
    assert!(plant.server.monitored_items().is_empty());
}

#[tokio::test]
async fn test_register_while_connected_monitors_new_sources() {
    let plant = plant();
    let connector = OpcUaConnector::new(options(), plant.server.clone());
    connector.connect().await.unwrap();

    connector
        .register_data_sources([("level", plant_node("s=PLC2.Level").monitored(Some(250.0)))])
        .await;

    let items = plant.server.monitored_items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].node_id, plant.level);
    assert_eq!(items[0].parameters.sampling_interval, 250.0);
}

// =============================================================================
// Monitoring Tests
// =============================================================================

#[tokio::test]
async fn test_monitored_items_share_one_subscription() {
    let plant = plant();
    let connector = OpcUaConnector::with_data_sources(
        options(),
        plant.server.clone(),
        [
            ("temp", plant_node("s=PLC2.Temp").monitored(None)),
            ("level", plant_node("s=PLC2.Level").monitored(Some(500.0))),
            ("memory", plant_node("s=PLC2.Memory")),
        ],
    );
    connector.connect().await.unwrap();

    let subscriptions = plant.server.subscriptions();
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].publishing_interval, 100.0);

    let items = plant.server.monitored_items();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| i.subscription_id == items[0].subscription_id));
    assert_eq!(items[0].parameters.sampling_interval, -1.0);
    assert_eq!(items[0].parameters.queue_size, 1);
    assert!(items[0].parameters.discard_oldest);
    assert_eq!(items[1].parameters.sampling_interval, 500.0);
}

#[tokio::test]
async fn test_data_value_change_events() {
    let plant = plant();
    let connector = OpcUaConnector::with_data_sources(
        options(),
        plant.server.clone(),
        [("level", plant_node("s=PLC2.Level").monitored(None))],
    );
    let mut events = connector.subscribe();
    connector.connect().await.unwrap();

    assert!(matches!(next_event(&mut events).await, ConnectorEvent::SessionCreated));
    match next_event(&mut events).await {
        ConnectorEvent::DataValueChange { identifier, value, .. } => {
            assert_eq!(identifier, "level");
            assert_eq!(value, Value::Double(3.0));
        }
        other => panic!("unexpected event {other:?}"),
    }

    for level in [4.0, 5.0, 6.0] {
        plant.server.set_value(&plant.level, Value::Double(level));
    }
    for expected in [4.0, 5.0, 6.0] {
        match next_event(&mut events).await {
            ConnectorEvent::DataValueChange {
                value,
                source_timestamp,
                ..
            } => {
                assert_eq!(value, Value::Double(expected));
                assert!(source_timestamp.is_some());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(connector.stats().notifications, 4);
}

#[tokio::test]
async fn test_failing_coercion_is_isolated() {
    let plant = plant();
    let broken = plant_node("s=PLC2.Temp")
        .monitored(None)
        .with_coercion(Coercion::new("broken", |_, _, _| Err(CoercionError::failed("always"))));
    let connector = OpcUaConnector::with_data_sources(
        options(),
        plant.server.clone(),
        [
            ("temp", broken),
            ("level", plant_node("s=PLC2.Level").monitored(None)),
        ],
    );
    let mut events = connector.subscribe();
    connector.connect().await.unwrap();

    plant.server.set_value(&plant.temp, Value::Double(30.0));
    plant.server.set_value(&plant.level, Value::Double(7.0));
    plant.server.set_value(&plant.temp, Value::Double(31.0));
    plant.server.set_value(&plant.level, Value::Double(8.0));

    let mut levels = Vec::new();
    let mut errors = Vec::new();
    while levels.len() < 3 {
        match next_event(&mut events).await {
            ConnectorEvent::DataValueChange { identifier, value, .. } => {
                assert_eq!(identifier, "level");
                levels.push(value);
            }
            ConnectorEvent::Error(e) => errors.push(e.to_string()),
            ConnectorEvent::SessionCreated | ConnectorEvent::SessionClosing | ConnectorEvent::SessionClosed => {}
        }
    }

    assert_eq!(levels, [Value::Double(3.0), Value::Double(7.0), Value::Double(8.0)]);
    assert!(errors.len() >= 2);
    assert_eq!(
        errors[0],
        "Monitored item ns=2;s=PLC2.Temp: Coercing OPC UA data value failed: Coercion failed: always"
    );
}

#[tokio::test]
async fn test_item_and_subscription_errors_become_events() {
    let plant = plant();
    let connector = OpcUaConnector::with_data_sources(
        options(),
        plant.server.clone(),
        [("level", plant_node("s=PLC2.Level").monitored(None))],
    );
    connector.connect().await.unwrap();
    let mut events = connector.subscribe();

    plant.server.push_item_error(&plant.level, "BadOutOfService");
    assert_eq!(
        next_error(&mut events).await,
        "Monitored item ns=2;s=PLC2.Level: BadOutOfService"
    );

    plant.server.push_subscription_error("publish request failed");
    assert_eq!(
        next_error(&mut events).await,
        "Subscription error: publish request failed"
    );
}

#[tokio::test]
async fn test_unresolvable_items_do_not_stop_others() {
    let plant = plant();
    let connector = OpcUaConnector::with_data_sources(
        options(),
        plant.server.clone(),
        [
            ("ghost", DataSource::node(Some("urn:nowhere".into()), "s=X").monitored(None)),
            (
                "lost",
                DataSource::browse_path("ObjectsFolder", "/[urn:plant]:PLC9").monitored(None),
            ),
            ("level", plant_node("s=PLC2.Level").monitored(None)),
        ],
    );
    let mut events = connector.subscribe();
    connector.connect().await.unwrap();

    assert_eq!(
        next_error(&mut events).await,
        "Ignoring item s=X with undefined OPC UA namespace URI urn:nowhere"
    );
    assert_eq!(
        next_error(&mut events).await,
        "BrowsePath invalid: BadNoMatch ObjectsFolder /[urn:plant]:PLC9"
    );
    assert_eq!(plant.server.monitored_items().len(), 1);
}

#[tokio::test]
async fn test_no_notifications_after_disconnect() {
    let plant = plant();
    let connector = OpcUaConnector::with_data_sources(
        options(),
        plant.server.clone(),
        [("level", plant_node("s=PLC2.Level").monitored(None))],
    );
    connector.connect().await.unwrap();
    connector.disconnect().await.unwrap();
    let mut events = connector.subscribe();

    plant.server.set_value(&plant.level, Value::Double(99.0));
    tokio::task::yield_now().await;
    assert!(events.try_recv().is_err());
}

// =============================================================================
// Read / Write Tests
// =============================================================================

#[tokio::test]
async fn test_read_by_browse_path() {
    let plant = plant();
    let connector = OpcUaConnector::new(options(), plant.server);
    connector.connect().await.unwrap();

    let temp = DataSource::browse_path("ObjectsFolder", "/[urn:plant]:PLC2.[urn:plant]:Temp");
    assert_eq!(connector.read_variable_value(&temp).await.unwrap(), Value::Double(21.5));

    let missing = DataSource::browse_path("ObjectsFolder", "/[urn:plant]:PLC2.[urn:plant]:Pressure");
    let err = connector.read_variable_value(&missing).await.unwrap_err();
    assert!(matches!(err, OpcUaError::Address(AddressError::PathNotFound { .. })));
}

#[tokio::test]
async fn test_namespace_indices_reread_per_session() {
    let plant = plant();
    let connector = OpcUaConnector::with_data_sources(
        options(),
        plant.server.clone(),
        [
            ("temp", plant_node("s=PLC2.Temp")),
            ("level", plant_node("s=PLC2.Level").monitored(None)),
        ],
    );

    connector.connect().await.unwrap();
    assert_eq!(connector.namespace_table().unwrap().index_of(PLANT), Some(2));
    assert_eq!(connector.read_by_id("temp").await.unwrap(), Value::Double(21.5));
    let items = plant.server.monitored_items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].node_id, NodeId::string(2, "PLC2.Level"));
    connector.disconnect().await.unwrap();

    // The server comes back with another namespace in front of the plant.
    assert_eq!(plant.server.insert_namespace(1, "urn:vendor"), 1);

    connector.connect().await.unwrap();
    assert_eq!(connector.namespace_table().unwrap().index_of(PLANT), Some(3));
    assert_eq!(connector.read_by_id("temp").await.unwrap(), Value::Double(21.5));
    let items = plant.server.monitored_items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].node_id, NodeId::string(3, "PLC2.Level"));

    assert_eq!(plant.server.value(&NodeId::string(2, "PLC2.Temp")), None);
}

#[tokio::test]
async fn test_megabyte_round_trip() {
    let plant = plant();
    let memory = plant_node("s=PLC2.Memory")
        .with_data_type(DataType::Double)
        .with_coercion(Coercion::linear(1024.0 * 1024.0, 0.0));
    let connector = OpcUaConnector::with_data_sources(options(), plant.server.clone(), [("memory", memory)]);
    connector.connect().await.unwrap();

    connector.write_by_id("memory", Value::Int32(10)).await.unwrap();
    assert_eq!(plant.server.value(&plant.memory), Some(Value::Double(10_485_760.0)));
    assert_eq!(connector.read_by_id("memory").await.unwrap(), Value::Double(10.0));
}

#[tokio::test]
async fn test_bad_status_names_operation_and_source() {
    let plant = plant();
    let connector = OpcUaConnector::new(options(), plant.server.clone());
    connector.connect().await.unwrap();
    let level = plant_node("s=PLC2.Level").with_data_type(DataType::Double);

    plant.server.inject_status(MemoryService::Write, &plant.level, StatusCode::BAD_USER_ACCESS_DENIED);
    let err = connector.write_variable_value(&level, Value::Double(1.0)).await.unwrap_err();
    assert_eq!(err.to_string(), "writeVariableValue: BadUserAccessDenied [urn:plant]s=PLC2.Level");
    assert_eq!(err.status_code(), Some(StatusCode::BAD_USER_ACCESS_DENIED));

    plant.server.clear_injected();
    let unknown = plant_node("s=PLC2.Nothing");
    let err = connector.read_variable_value(&unknown).await.unwrap_err();
    assert_eq!(err.status_code(), Some(StatusCode::BAD_NODE_ID_UNKNOWN));
}

#[tokio::test]
async fn test_read_attribute_value() {
    let plant = plant();
    let connector = OpcUaConnector::new(options(), plant.server);
    connector.connect().await.unwrap();

    let value = connector
        .read_attribute_value(&plant_node("s=PLC2.Temp"), AttributeId::BrowseName)
        .await
        .unwrap();
    assert_eq!(value.to_string(), "2:Temp");
}

#[tokio::test]
async fn test_unknown_data_source_id() {
    let plant = plant();
    let connector = OpcUaConnector::new(options(), plant.server);
    connector.connect().await.unwrap();

    let err = connector.read_by_id("nope").await.unwrap_err();
    assert_eq!(err.to_string(), "Unknown data source 'nope'");
}

// =============================================================================
// Browse / Analog Tests
// =============================================================================

#[tokio::test]
async fn test_browse_children() {
    let plant = plant();
    let connector = OpcUaConnector::new(options(), plant.server);
    connector.connect().await.unwrap();

    let children = connector.browse(&plant_node("s=PLC2")).await.unwrap();
    let names: Vec<_> = children.iter().map(|r| r.browse_name.name.as_str()).collect();
    assert_eq!(names, ["Temp", "Level", "Memory", "Alert"]);
}

#[tokio::test]
async fn test_read_analog_data_item() {
    let plant = plant();
    let connector = OpcUaConnector::new(options(), plant.server);
    connector.connect().await.unwrap();

    let item = connector.read_analog_data_item(&plant_node("s=PLC2.Temp")).await.unwrap();
    assert_eq!(item.engineering_units_range, Range { low: -20.0, high: 120.0 });
    assert_eq!(item.engineering_units.unwrap().description, "degree Celsius");
    assert!(item.instrument_range.is_none());

    let err = connector
        .read_analog_data_item(&plant_node("s=PLC2.Level"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(StatusCode::BAD_NOT_FOUND));
    assert!(err.to_string().starts_with("readAnalogDataItem: BadNotFound"));
}

// =============================================================================
// Call Mapper Tests
// =============================================================================

fn call_connector(plant: &Plant) -> OpcUaConnector<MemoryTransport> {
    OpcUaConnector::with_data_sources(
        options(),
        plant.server.clone(),
        [("plc", plant_node("s=PLC2")), ("alert", plant_node("s=PLC2.Alert"))],
    )
}

fn alert_mapping() -> CallReturnMapping {
    CallReturnMapping::new("alertTemperature", "plc", "alert")
        .with_input(InputArgumentMapping::new("temp", DataType::Double))
        .with_input(InputArgumentMapping::new("isTooLow", DataType::Boolean))
}

async fn call(bus: &CallBus, operation: &str, parameters: CallParameters) -> CallResponse {
    bus.call(operation, parameters, None, TIMEOUT).await.unwrap()
}

#[tokio::test]
async fn test_call_binds_parameters_in_order() {
    let plant = plant();
    let connector = call_connector(&plant);
    connector.connect().await.unwrap();
    let bus = CallBus::default();
    let mapper = RemoteOperationMapper::new(connector, bus.clone(), vec![alert_mapping()]);
    mapper.start();

    let response = call(
        &bus,
        "alertTemperature",
        CallParameters::named([
            ("isTooLow", Value::Boolean(true)),
            ("temp", Value::Int32(4)),
            ("unused", Value::String("ignored".into())),
        ]),
    )
    .await;
    assert_eq!(response, CallResponse::Result(None));

    let calls = plant.server.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method_id, plant.alert);
    assert_eq!(calls[0].input_arguments, [Value::Double(4.0), Value::Boolean(true)]);
}

#[tokio::test]
async fn test_call_with_missing_parameter_is_rejected() {
    let plant = plant();
    let connector = call_connector(&plant);
    connector.connect().await.unwrap();
    let bus = CallBus::default();
    let mapper = RemoteOperationMapper::new(connector, bus.clone(), vec![alert_mapping()]);
    mapper.start();

    let response = call(&bus, "alertTemperature", CallParameters::named([("temp", Value::Double(4.0))])).await;
    assert_eq!(response, CallResponse::Error(RemoteCallError::new(-32602, "Invalid params")));
    assert!(plant.server.calls().is_empty());
}

#[tokio::test]
async fn test_call_output_coercion() {
    let plant = plant();
    let ns = 2;
    plant.server.add_method(
        &NodeId::string(ns, "PLC2"),
        NodeId::string(ns, "PLC2.Status"),
        "Status",
        |_| Ok(vec![Value::String("ok".into())]),
    );
    plant.server.add_method(
        &NodeId::string(ns, "PLC2"),
        NodeId::string(ns, "PLC2.Pair"),
        "Pair",
        |_| Ok(vec![Value::Int32(1), Value::Int32(2)]),
    );

    let connector = call_connector(&plant);
    connector
        .register_data_sources([
            ("status", plant_node("s=PLC2.Status")),
            ("pair", plant_node("s=PLC2.Pair")),
        ])
        .await;
    connector.connect().await.unwrap();

    let bus = CallBus::default();
    let mapper = RemoteOperationMapper::new(
        connector,
        bus.clone(),
        vec![
            CallReturnMapping::new("status", "plc", "status"),
            CallReturnMapping::new("pair", "plc", "pair"),
            CallReturnMapping::new("pairFirst", "plc", "pair").with_output(OutputCoercion::first()),
        ],
    );
    mapper.start();

    assert_eq!(
        call(&bus, "status", CallParameters::default()).await,
        CallResponse::Result(Some(Value::String("ok".into())))
    );
    assert_eq!(
        call(&bus, "pair", CallParameters::default()).await,
        CallResponse::Result(Some(Value::Array(vec![Value::Int32(1), Value::Int32(2)])))
    );
    assert_eq!(
        call(&bus, "pairFirst", CallParameters::default()).await,
        CallResponse::Result(Some(Value::Int32(1)))
    );
}

#[tokio::test]
async fn test_failed_method_call_hides_cause() {
    let plant = plant();
    let connector = call_connector(&plant);
    connector.connect().await.unwrap();
    let mut events = connector.subscribe();
    let bus = CallBus::default();
    let mapper = RemoteOperationMapper::new(connector, bus.clone(), vec![alert_mapping()]);
    mapper.start();

    plant.server.inject_status(MemoryService::Call, &plant.alert, StatusCode::BAD_INVALID_ARGUMENT);
    let response = call(
        &bus,
        "alertTemperature",
        CallParameters::named([("temp", Value::Double(1.0)), ("isTooLow", Value::Boolean(false))]),
    )
    .await;
    assert_eq!(response, CallResponse::Error(RemoteCallError::new(1, "Bad OPC UA method call")));
    assert_eq!(
        next_error(&mut events).await,
        "call: BadInvalidArgument [urn:plant]s=PLC2 [urn:plant]s=PLC2.Alert"
    );
}

#[tokio::test]
async fn test_context_filter_routing() {
    let plant = plant();
    let connector = call_connector(&plant);
    connector.connect().await.unwrap();
    let bus = CallBus::default();
    let mapping = CallReturnMapping::new("reset", "plc", "alert").with_context(serde_json::json!({ "line": "A" }));
    let mapper = RemoteOperationMapper::new(connector, bus.clone(), vec![mapping]);
    mapper.start();

    let line_a = ContextFilter::new().with_condition("line", "A");
    let response = bus
        .call("reset", CallParameters::default(), Some(line_a), TIMEOUT)
        .await
        .unwrap();
    assert!(response.is_success());

    let line_b = ContextFilter::new().with_condition("line", "B");
    assert!(bus
        .call("reset", CallParameters::default(), Some(line_b), TIMEOUT)
        .await
        .is_err());
}

#[tokio::test]
async fn test_mapper_follows_sessions() {
    let plant = plant();
    let connector = call_connector(&plant);
    let bus = CallBus::default();
    let mapper = RemoteOperationMapper::new(
        connector.clone(),
        bus.clone(),
        vec![alert_mapping(), CallReturnMapping::new("ghost", "plc", "missing")],
    );
    mapper.start();
    assert_eq!(bus.observer_count(), 0);

    connector.connect().await.unwrap();
    wait_for(|| bus.observer_count() == 1).await;

    connector.disconnect().await.unwrap();
    wait_for(|| bus.observer_count() == 0).await;

    connector.connect().await.unwrap();
    wait_for(|| bus.observer_count() == 1).await;

    mapper.stop().await.unwrap();
    wait_for(|| bus.observer_count() == 0).await;
    assert!(!connector.is_connected());
}

async fn wait_for(condition: impl Fn() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

// =============================================================================
// Real Server Tests (require a running OPC UA server)
// =============================================================================

#[cfg(feature = "real-transport")]
mod real_server {
    use super::*;
    use uabridge_opcua::client::RealTransport;

    fn endpoint() -> String {
        std::env::var("OPCUA_TEST_ENDPOINT").unwrap_or_else(|_| "opc.tcp://localhost:4840".to_string())
    }

    #[tokio::test]
    #[ignore = "requires OPC UA server"]
    async fn test_real_server_current_time() {
        let connector = OpcUaConnector::with_data_sources(
            ConnectorOptions::new(endpoint()),
            RealTransport::new(),
            [("time", DataSource::node(None, "i=2258").monitored(None))],
        );
        let mut events = connector.subscribe();
        connector.connect().await.expect("connect");

        let value = connector.read_by_id("time").await.expect("read");
        assert_eq!(value.type_name(), "DateTime");

        loop {
            if let ConnectorEvent::DataValueChange { identifier, .. } = next_event(&mut events).await {
                assert_eq!(identifier, "time");
                break;
            }
        }
        connector.disconnect().await.expect("disconnect");
    }

    #[tokio::test]
    #[ignore = "requires OPC UA server"]
    async fn test_real_server_browse_objects() {
        let connector = OpcUaConnector::new(ConnectorOptions::new(endpoint()), RealTransport::new());
        connector.connect().await.expect("connect");

        let children = connector
            .browse(&DataSource::node(None, "i=85"))
            .await
            .expect("browse");
        assert!(children.iter().any(|r| r.node_id == NodeId::SERVER));
        connector.disconnect().await.expect("disconnect");
    }
}
