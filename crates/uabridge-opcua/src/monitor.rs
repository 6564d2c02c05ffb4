// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Monitored item setup and notification handling.
//!
//! Each monitored data source goes through
//! `Unmonitored -> Resolving -> Monitoring -> (on disconnect) Unmonitored`.
//! All items of a session share one subscription, created on first use.
//! Failures are reported per item and never stop the setup of other items.

use std::sync::Arc;

use crate::client::{
    ItemEvent, ItemHandler, MonitoringParameters, OpcUaTransport, Session, SubscriptionErrorHandler,
    SubscriptionParameters,
};
use crate::coercion::coerce_value;
use crate::data_source::DataSource;
use crate::error::{ConnectionError, OpcUaError, OpcUaResult};
use crate::events::EventHub;
use crate::resolver;
use crate::types::NodeId;

/// Attaches a monitored item for one data source.
///
/// Returns `Ok(None)` if the session went away while the item was being set
/// up; nothing is attached in that case.
pub(crate) async fn monitor_data_source<T>(
    transport: &T,
    hub: &Arc<EventHub>,
    session: &Session,
    subscription: &SubscriptionParameters,
    identifier: &str,
    data_source: &Arc<DataSource>,
) -> OpcUaResult<Option<u32>>
where
    T: OpcUaTransport,
{
    let generation = session.generation();
    let node_id = resolver::resolve(transport, session.namespaces(), &data_source.address).await?;

    let subscription_id = session
        .ensure_subscription(|| {
            transport.create_subscription(subscription, subscription_error_handler(hub, generation))
        })
        .await?;

    if !hub.is_current(generation) {
        tracing::debug!(data_source = %identifier, "Session closed during monitor setup");
        return Ok(None);
    }

    let parameters = MonitoringParameters::latest(data_source.sampling_interval);
    let handler = item_handler(hub, generation, identifier, data_source, &node_id);
    let item_id = transport
        .create_monitored_item(subscription_id, &node_id, &parameters, handler)
        .await?;

    tracing::debug!(
        data_source = %identifier,
        node = %node_id,
        sampling_interval = parameters.sampling_interval,
        "Monitoring data source"
    );
    Ok(Some(item_id))
}

/// Builds the notification handler of one monitored item.
pub(crate) fn item_handler(
    hub: &Arc<EventHub>,
    generation: u64,
    identifier: &str,
    data_source: &Arc<DataSource>,
    node_id: &NodeId,
) -> ItemHandler {
    let hub = Arc::clone(hub);
    let identifier = identifier.to_string();
    let data_source = Arc::clone(data_source);
    let node = node_id.to_string();

    Arc::new(move |event| {
        if !hub.is_current(generation) {
            return;
        }
        match event {
            ItemEvent::Changed(data_value) => {
                let source_timestamp = data_value.source_timestamp;
                match coerce_value(data_source.coercion.as_ref(), data_value.value, source_timestamp, true) {
                    Ok(value) => hub.emit_change(&identifier, &data_source, value, source_timestamp),
                    Err(e) => hub.emit_error(OpcUaError::monitor(
                        &node,
                        format!("Coercing OPC UA data value failed: {}", e),
                    )),
                }
            }
            ItemEvent::Error(message) => hub.emit_error(OpcUaError::monitor(&node, message)),
        }
    })
}

fn subscription_error_handler(hub: &Arc<EventHub>, generation: u64) -> SubscriptionErrorHandler {
    let hub = Arc::clone(hub);
    Arc::new(move |message| {
        if hub.is_current(generation) {
            hub.emit_error(ConnectionError::Subscription { message }.into());
        }
    })
}
