// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Pub/sub boundary used by the connector adapters and the call mapper.
//!
//! This module provides two buses:
//!
//! - **ChannelBus**: Broadcast channel for named value channels (1:N)
//! - **CallBus**: Request/response routing for remote operation calls (N:1)
//!
//! # Design Principles
//!
//! - ChannelBus uses `tokio::sync::broadcast` for fan-out; slow subscribers lag
//!   instead of blocking the publisher
//! - CallBus routes each request to one matching observer over `tokio::sync::mpsc`
//!   and carries a `oneshot` responder for the single answer
//! - Both buses keep lock-free statistics
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      Pub/Sub Boundary                      │
//! │                                                            │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │               ChannelBus (broadcast)                 │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! │        ▲ publish                         │ subscribe       │
//! │  ┌─────────────┐                   ┌─────────────┐         │
//! │  │  Forwarder  │                   │ ActorWriter │         │
//! │  └─────────────┘                   └─────────────┘         │
//! │                                                            │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │             CallBus (mpsc + oneshot)                 │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! │        │ observe_call(operation, context)                  │
//! │        ▼                                                   │
//! │  ┌──────────────────┐                                      │
//! │  │ Call mapper task │ ── respond(CallResponse) ──▶ caller  │
//! │  └──────────────────┘                                      │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use uabridge_core::bus::{CallBus, CallParameters, CallResponse};
//!
//! let bus = CallBus::new(64);
//! let mut observation = bus.observe_call("alertTemperature", None);
//!
//! tokio::spawn(async move {
//!     while let Some(request) = observation.recv().await {
//!         request.respond(CallResponse::result(None));
//!     }
//! });
//!
//! let response = bus
//!     .call("alertTemperature", CallParameters::default(), None, Duration::from_secs(5))
//!     .await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use crate::error::{BusError, BusResult};
use crate::types::Value;

// =============================================================================
// Channel Messages
// =============================================================================

/// A value published on a named channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Channel name.
    pub channel: String,
    /// Published value.
    pub value: Value,
    /// When the message was published.
    pub timestamp: DateTime<Utc>,
    /// When the value was sampled at its origin, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_timestamp: Option<DateTime<Utc>>,
}

impl ChannelMessage {
    /// Creates a message stamped with the current time.
    pub fn new(channel: impl Into<String>, value: Value) -> Self {
        Self {
            channel: channel.into(),
            value,
            timestamp: Utc::now(),
            source_timestamp: None,
        }
    }

    /// Sets the source timestamp.
    pub fn with_source_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.source_timestamp = timestamp;
        self
    }
}

// =============================================================================
// Bus Statistics
// =============================================================================

/// Statistics snapshot for the channel bus.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BusStats {
    /// Messages published.
    pub messages_published: u64,
    /// Messages lost by lagging subscribers.
    pub messages_dropped: u64,
    /// Current subscriber count.
    pub subscriber_count: u64,
    /// Publishes that found no subscriber.
    pub unobserved: u64,
}

#[derive(Debug, Default)]
struct AtomicBusStats {
    messages_published: AtomicU64,
    messages_dropped: AtomicU64,
    unobserved: AtomicU64,
}

// =============================================================================
// Channel Bus
// =============================================================================

/// A broadcast bus for named value channels.
///
/// Every subscriber receives every message; use
/// [`ChannelSubscriber::filter_channel`] to narrow the stream.
#[derive(Clone)]
pub struct ChannelBus {
    sender: broadcast::Sender<ChannelMessage>,
    capacity: usize,
    stats: Arc<AtomicBusStats>,
}

impl ChannelBus {
    /// Creates a new channel bus with the specified capacity.
    ///
    /// The capacity determines how many messages can be buffered before slow
    /// subscribers start losing messages.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            capacity,
            stats: Arc::new(AtomicBusStats::default()),
        }
    }

    /// Publishes a message to all subscribers.
    ///
    /// Returns the number of subscribers reached; `Ok(0)` when nobody listens.
    pub fn publish(&self, message: ChannelMessage) -> BusResult<usize> {
        self.stats.messages_published.fetch_add(1, Ordering::Relaxed);
        match self.sender.send(message) {
            Ok(count) => Ok(count),
            Err(_) => {
                self.stats.unobserved.fetch_add(1, Ordering::Relaxed);
                Ok(0)
            }
        }
    }

    /// Publishes a raw value on `channel`.
    pub fn publish_value(
        &self,
        channel: impl Into<String>,
        value: Value,
        source_timestamp: Option<DateTime<Utc>>,
    ) -> BusResult<usize> {
        self.publish(ChannelMessage::new(channel, value).with_source_timestamp(source_timestamp))
    }

    /// Creates a new subscriber.
    pub fn subscribe(&self) -> ChannelSubscriber {
        ChannelSubscriber {
            receiver: self.sender.subscribe(),
            stats: self.stats.clone(),
        }
    }

    /// Returns the current number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Returns the channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns current statistics.
    pub fn stats(&self) -> BusStats {
        BusStats {
            messages_published: self.stats.messages_published.load(Ordering::Relaxed),
            messages_dropped: self.stats.messages_dropped.load(Ordering::Relaxed),
            subscriber_count: self.subscriber_count() as u64,
            unobserved: self.stats.unobserved.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for ChannelBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelBus")
            .field("capacity", &self.capacity)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// A subscriber to the channel bus.
pub struct ChannelSubscriber {
    receiver: broadcast::Receiver<ChannelMessage>,
    stats: Arc<AtomicBusStats>,
}

impl ChannelSubscriber {
    /// Receives the next message.
    ///
    /// Lagging is logged and skipped; only a closed bus ends the stream.
    pub async fn recv(&mut self) -> BusResult<ChannelMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(msg) => return Ok(msg),
                Err(broadcast::error::RecvError::Closed) => return Err(BusError::Closed),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    self.stats.messages_dropped.fetch_add(count, Ordering::Relaxed);
                    tracing::warn!(count, "ChannelBus subscriber lagged, messages dropped");
                }
            }
        }
    }

    /// Tries to receive a message without waiting.
    pub fn try_recv(&mut self) -> BusResult<Option<ChannelMessage>> {
        match self.receiver.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(BusError::Closed),
            Err(broadcast::error::TryRecvError::Lagged(count)) => {
                self.stats.messages_dropped.fetch_add(count, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Restricts this subscriber to a single channel.
    pub fn filter_channel(self, channel: impl Into<String>) -> ChannelFilteredSubscriber {
        ChannelFilteredSubscriber {
            subscriber: self,
            channel: channel.into(),
        }
    }
}

/// A subscriber filtered by channel name.
pub struct ChannelFilteredSubscriber {
    subscriber: ChannelSubscriber,
    channel: String,
}

impl ChannelFilteredSubscriber {
    /// Receives the next message published on the filtered channel.
    pub async fn recv(&mut self) -> BusResult<ChannelMessage> {
        loop {
            let msg = self.subscriber.recv().await?;
            if msg.channel == self.channel {
                return Ok(msg);
            }
        }
    }

    /// Returns the channel this subscriber listens on.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

// =============================================================================
// Call Parameters
// =============================================================================

/// Reference to a call parameter, by name or by position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterRef {
    /// Position in a positional parameter list.
    Index(usize),
    /// Key in a named parameter map.
    Name(String),
}

impl fmt::Display for ParameterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterRef::Index(i) => write!(f, "#{}", i),
            ParameterRef::Name(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for ParameterRef {
    fn from(name: &str) -> Self {
        ParameterRef::Name(name.to_string())
    }
}

impl From<usize> for ParameterRef {
    fn from(index: usize) -> Self {
        ParameterRef::Index(index)
    }
}

/// Parameters carried by a call request.
#[derive(Debug, Clone, PartialEq)]
pub enum CallParameters {
    /// Named parameters.
    ByName(HashMap<String, Value>),
    /// Positional parameters.
    ByPosition(Vec<Value>),
}

impl Default for CallParameters {
    fn default() -> Self {
        CallParameters::ByName(HashMap::new())
    }
}

impl CallParameters {
    /// Builds named parameters from `(name, value)` pairs.
    pub fn named<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        CallParameters::ByName(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Builds positional parameters.
    pub fn positional<V: Into<Value>, I: IntoIterator<Item = V>>(values: I) -> Self {
        CallParameters::ByPosition(values.into_iter().map(Into::into).collect())
    }

    /// Converts a JSON object or array into parameters.
    ///
    /// Any other JSON value is treated as a single positional parameter.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Object(map) => CallParameters::ByName(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
            serde_json::Value::Array(items) => {
                CallParameters::ByPosition(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Null => CallParameters::default(),
            other => CallParameters::ByPosition(vec![Value::from_json(other)]),
        }
    }

    /// Looks up a parameter.
    ///
    /// Names only resolve against named parameters and indices only against
    /// positional ones.
    pub fn get(&self, parameter: &ParameterRef) -> Option<&Value> {
        match (self, parameter) {
            (CallParameters::ByName(map), ParameterRef::Name(name)) => map.get(name),
            (CallParameters::ByPosition(list), ParameterRef::Index(index)) => list.get(*index),
            _ => None,
        }
    }

    /// Returns the number of parameters.
    pub fn len(&self) -> usize {
        match self {
            CallParameters::ByName(map) => map.len(),
            CallParameters::ByPosition(list) => list.len(),
        }
    }

    /// Returns `true` if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Context Filter
// =============================================================================

/// A single condition of a [`ContextFilter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    /// Dot-separated property path into the observer context.
    pub property: String,
    /// Value the property must equal.
    pub expected: serde_json::Value,
}

/// Restricts which observers receive a call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextFilter {
    /// All conditions must hold.
    pub conditions: Vec<FilterCondition>,
}

impl ContextFilter {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality condition.
    pub fn with_condition(
        mut self,
        property: impl Into<String>,
        expected: impl Into<serde_json::Value>,
    ) -> Self {
        self.conditions.push(FilterCondition {
            property: property.into(),
            expected: expected.into(),
        });
        self
    }

    /// Checks the filter against an observer context object.
    pub fn matches(&self, context: &serde_json::Value) -> bool {
        self.conditions.iter().all(|condition| {
            condition
                .property
                .split('.')
                .try_fold(context, |node, key| node.get(key))
                .map_or(false, |actual| *actual == condition.expected)
        })
    }
}

/// Decides whether an observer with `context` receives a call with `filter`.
///
/// Unfiltered calls reach every observer; filtered calls only reach observers
/// that declared a context satisfying the filter.
pub fn context_accepts(context: Option<&serde_json::Value>, filter: Option<&ContextFilter>) -> bool {
    match (filter, context) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(filter), Some(context)) => filter.matches(context),
    }
}

// =============================================================================
// Call Response
// =============================================================================

/// Error payload of a failed remote call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCallError {
    /// Numeric error code.
    pub code: i64,
    /// Human readable message.
    pub message: String,
}

impl RemoteCallError {
    /// Code reported when call parameters are missing or invalid.
    pub const INVALID_PARAMETERS: i64 = -32602;

    /// Creates an error with an arbitrary code.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The standard invalid-parameters error.
    pub fn invalid_parameters() -> Self {
        Self::new(Self::INVALID_PARAMETERS, "Invalid params")
    }
}

impl fmt::Display for RemoteCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// The single answer to a call request.
#[derive(Debug, Clone, PartialEq)]
pub enum CallResponse {
    /// Successful execution with an optional result value.
    Result(Option<Value>),
    /// Failed execution.
    Error(RemoteCallError),
}

impl CallResponse {
    /// Creates a success response.
    pub fn result(value: Option<Value>) -> Self {
        CallResponse::Result(value)
    }

    /// Creates an error response.
    pub fn error(code: i64, message: impl Into<String>) -> Self {
        CallResponse::Error(RemoteCallError::new(code, message))
    }

    /// Returns `true` for success responses.
    pub fn is_success(&self) -> bool {
        matches!(self, CallResponse::Result(_))
    }

    /// Returns the error payload, if any.
    pub fn as_error(&self) -> Option<&RemoteCallError> {
        match self {
            CallResponse::Error(e) => Some(e),
            CallResponse::Result(_) => None,
        }
    }
}

// =============================================================================
// Call Request
// =============================================================================

/// An inbound call routed to an observer.
///
/// Dropping a request without calling [`CallRequest::respond`] closes the
/// caller's response channel.
pub struct CallRequest {
    /// Request id.
    pub id: Uuid,
    /// Operation name.
    pub operation: String,
    /// Call parameters.
    pub parameters: CallParameters,
    /// Context filter the caller attached, if any.
    pub context_filter: Option<ContextFilter>,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
    responder: oneshot::Sender<CallResponse>,
}

impl CallRequest {
    /// Creates a request and the receiver for its response.
    pub fn new(
        operation: impl Into<String>,
        parameters: CallParameters,
        context_filter: Option<ContextFilter>,
    ) -> (Self, oneshot::Receiver<CallResponse>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                id: Uuid::new_v4(),
                operation: operation.into(),
                parameters,
                context_filter,
                created_at: Utc::now(),
                responder: tx,
            },
            rx,
        )
    }

    /// Sends the response. A caller that already gave up is ignored.
    pub fn respond(self, response: CallResponse) {
        let _ = self.responder.send(response);
    }

    /// Responds with a result value.
    pub fn respond_result(self, value: Option<Value>) {
        self.respond(CallResponse::Result(value));
    }

    /// Responds with an error.
    pub fn respond_error(self, error: RemoteCallError) {
        self.respond(CallResponse::Error(error));
    }
}

impl fmt::Debug for CallRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallRequest")
            .field("id", &self.id)
            .field("operation", &self.operation)
            .field("parameters", &self.parameters)
            .field("context_filter", &self.context_filter)
            .finish()
    }
}

// =============================================================================
// Call Bus
// =============================================================================

/// Statistics snapshot for the call bus.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CallBusStats {
    /// Calls issued.
    pub calls_sent: u64,
    /// Calls answered by an observer.
    pub calls_answered: u64,
    /// Calls no observer accepted.
    pub calls_unrouted: u64,
    /// Calls that timed out.
    pub calls_timed_out: u64,
    /// Active observers.
    pub observer_count: u64,
}

#[derive(Debug, Default)]
struct AtomicCallBusStats {
    calls_sent: AtomicU64,
    calls_answered: AtomicU64,
    calls_unrouted: AtomicU64,
    calls_timed_out: AtomicU64,
}

struct ObserverSlot {
    id: u64,
    operation: String,
    context: Option<serde_json::Value>,
    sender: mpsc::Sender<CallRequest>,
}

struct CallBusInner {
    observers: RwLock<Vec<ObserverSlot>>,
    next_observer: AtomicU64,
    capacity: usize,
    stats: AtomicCallBusStats,
}

/// Routes call requests to observers of an operation.
///
/// A request goes to the first live observer whose operation matches and whose
/// context is accepted by the request's filter.
#[derive(Clone)]
pub struct CallBus {
    inner: Arc<CallBusInner>,
}

impl CallBus {
    /// Creates a call bus; `capacity` bounds each observer's request queue.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(CallBusInner {
                observers: RwLock::new(Vec::new()),
                next_observer: AtomicU64::new(1),
                capacity: capacity.max(1),
                stats: AtomicCallBusStats::default(),
            }),
        }
    }

    /// Starts observing calls of `operation`.
    ///
    /// The observation ends when the returned handle is dropped.
    pub fn observe_call(
        &self,
        operation: impl Into<String>,
        context: Option<serde_json::Value>,
    ) -> CallObservation {
        let operation = operation.into();
        let (sender, receiver) = mpsc::channel(self.inner.capacity);
        let id = self.inner.next_observer.fetch_add(1, Ordering::Relaxed);

        self.inner.observers.write().push(ObserverSlot {
            id,
            operation: operation.clone(),
            context,
            sender,
        });
        tracing::debug!(operation = %operation, observer = id, "Observing calls");

        CallObservation {
            id,
            operation,
            receiver,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Routes a request without waiting for its response.
    pub async fn dispatch(&self, request: CallRequest) -> BusResult<()> {
        self.inner.stats.calls_sent.fetch_add(1, Ordering::Relaxed);

        let candidates: Vec<mpsc::Sender<CallRequest>> = self
            .inner
            .observers
            .read()
            .iter()
            .filter(|slot| slot.operation == request.operation)
            .filter(|slot| context_accepts(slot.context.as_ref(), request.context_filter.as_ref()))
            .map(|slot| slot.sender.clone())
            .collect();

        let operation = request.operation.clone();
        let mut request = request;
        for sender in candidates {
            match sender.send(request).await {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(returned)) => request = returned,
            }
        }

        self.inner.stats.calls_unrouted.fetch_add(1, Ordering::Relaxed);
        Err(BusError::no_observer(operation))
    }

    /// Issues a call and waits up to `timeout` for its response.
    pub async fn call(
        &self,
        operation: impl Into<String>,
        parameters: CallParameters,
        context_filter: Option<ContextFilter>,
        timeout: Duration,
    ) -> BusResult<CallResponse> {
        let (request, rx) = CallRequest::new(operation, parameters, context_filter);
        let operation = request.operation.clone();

        self.dispatch(request).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => {
                self.inner.stats.calls_answered.fetch_add(1, Ordering::Relaxed);
                Ok(response)
            }
            Ok(Err(_)) => Err(BusError::ResponseChannelClosed),
            Err(_) => {
                self.inner.stats.calls_timed_out.fetch_add(1, Ordering::Relaxed);
                Err(BusError::call_timeout(operation, timeout))
            }
        }
    }

    /// Returns the number of active observers.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.read().len()
    }

    /// Returns current statistics.
    pub fn stats(&self) -> CallBusStats {
        let stats = &self.inner.stats;
        CallBusStats {
            calls_sent: stats.calls_sent.load(Ordering::Relaxed),
            calls_answered: stats.calls_answered.load(Ordering::Relaxed),
            calls_unrouted: stats.calls_unrouted.load(Ordering::Relaxed),
            calls_timed_out: stats.calls_timed_out.load(Ordering::Relaxed),
            observer_count: self.observer_count() as u64,
        }
    }
}

impl Default for CallBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl fmt::Debug for CallBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallBus")
            .field("capacity", &self.inner.capacity)
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

/// A stream of call requests for one operation.
pub struct CallObservation {
    id: u64,
    operation: String,
    receiver: mpsc::Receiver<CallRequest>,
    bus: std::sync::Weak<CallBusInner>,
}

impl CallObservation {
    /// Receives the next request, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<CallRequest> {
        self.receiver.recv().await
    }

    /// Returns the observed operation.
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl Drop for CallObservation {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.observers.write().retain(|slot| slot.id != self.id);
        }
    }
}

impl fmt::Debug for CallObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallObservation")
            .field("id", &self.id)
            .field("operation", &self.operation)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_bus_publish_subscribe() {
        let bus = ChannelBus::new(16);
        let mut subscriber = bus.subscribe();

        let count = bus.publish_value("plant/temp", Value::Double(21.5), None).unwrap();
        assert_eq!(count, 1);

        let received = subscriber.recv().await.unwrap();
        assert_eq!(received.channel, "plant/temp");
        assert_eq!(received.value, Value::Double(21.5));
    }

    #[tokio::test]
    async fn test_channel_bus_without_subscribers() {
        let bus = ChannelBus::new(4);
        assert_eq!(bus.publish_value("x", Value::Null, None).unwrap(), 0);
        assert_eq!(bus.stats().unobserved, 1);
    }

    #[tokio::test]
    async fn test_channel_filter() {
        let bus = ChannelBus::new(16);
        let mut filtered = bus.subscribe().filter_channel("b");

        bus.publish_value("a", Value::Int32(1), None).unwrap();
        bus.publish_value("b", Value::Int32(2), None).unwrap();

        let msg = filtered.recv().await.unwrap();
        assert_eq!(msg.value, Value::Int32(2));
    }

    #[test]
    fn test_parameter_lookup() {
        let named = CallParameters::named([("temp", Value::Double(40.0))]);
        assert_eq!(named.get(&"temp".into()), Some(&Value::Double(40.0)));
        assert_eq!(named.get(&0usize.into()), None);

        let positional = CallParameters::positional([1i32, 2i32]);
        assert_eq!(positional.get(&1usize.into()), Some(&Value::Int32(2)));
        assert_eq!(positional.get(&"temp".into()), None);
        assert_eq!(positional.len(), 2);
    }

    #[test]
    fn test_parameter_ref_deserialize() {
        let by_name: ParameterRef = serde_json::from_str(r#""temp""#).unwrap();
        let by_index: ParameterRef = serde_json::from_str("2").unwrap();
        assert_eq!(by_name, ParameterRef::Name("temp".into()));
        assert_eq!(by_index, ParameterRef::Index(2));
    }

    #[test]
    fn test_context_filter() {
        let context = serde_json::json!({"site": {"line": "L1"}, "shift": 2});
        let matching = ContextFilter::new()
            .with_condition("site.line", "L1")
            .with_condition("shift", 2);
        let other = ContextFilter::new().with_condition("site.line", "L2");

        assert!(matching.matches(&context));
        assert!(!other.matches(&context));
        assert!(context_accepts(None, None));
        assert!(context_accepts(Some(&context), None));
        assert!(!context_accepts(None, Some(&matching)));
        assert!(context_accepts(Some(&context), Some(&matching)));
    }

    #[tokio::test]
    async fn test_call_roundtrip() {
        let bus = CallBus::new(8);
        let mut observation = bus.observe_call("double", None);

        tokio::spawn(async move {
            while let Some(request) = observation.recv().await {
                let value = request
                    .parameters
                    .get(&"x".into())
                    .and_then(Value::as_f64)
                    .map(|x| Value::Double(x * 2.0));
                request.respond_result(value);
            }
        });

        let response = bus
            .call(
                "double",
                CallParameters::named([("x", 4.0f64)]),
                None,
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(response, CallResponse::Result(Some(Value::Double(8.0))));
        assert_eq!(bus.stats().calls_answered, 1);
    }

    #[tokio::test]
    async fn test_call_without_observer() {
        let bus = CallBus::new(8);
        let err = bus
            .call("nobody", CallParameters::default(), None, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(err, BusError::no_observer("nobody"));
    }

    #[tokio::test]
    async fn test_observation_drop_unregisters() {
        let bus = CallBus::new(8);
        let observation = bus.observe_call("op", None);
        assert_eq!(bus.observer_count(), 1);
        drop(observation);
        assert_eq!(bus.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_filtered_call_skips_contextless_observer() {
        let bus = CallBus::new(8);
        let _plain = bus.observe_call("op", None);
        let filter = ContextFilter::new().with_condition("line", "L1");

        let err = bus
            .call("op", CallParameters::default(), Some(filter), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::NoObserver { .. }));
    }

    #[tokio::test]
    async fn test_dropped_request_closes_response() {
        let bus = CallBus::new(8);
        let mut observation = bus.observe_call("op", None);
        tokio::spawn(async move {
            let request = observation.recv().await;
            drop(request);
        });

        let err = bus
            .call("op", CallParameters::default(), None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, BusError::ResponseChannelClosed);
    }
}
