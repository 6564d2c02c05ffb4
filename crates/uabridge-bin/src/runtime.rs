// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Bridge runtime orchestration.
//!
//! Wires one connector to the buses:
//!
//! - Connector with the configured data sources
//! - Remote operation mapper on the call bus
//! - Source forwarders and actor writers on the channel bus
//! - Graceful shutdown coordination
//!
//! The connection is attempted once. A failed connect stops everything and
//! is returned to the caller; there is no reconnect loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use uabridge_config::{load_config, BridgeConfig};
use uabridge_core::{CallBus, ChannelBus};
use uabridge_opcua::{
    ActorWriter, ConnectorEvent, OpcUaConnector, OpcUaTransport, RemoteOperationMapper,
    SourceForwarder,
};

use crate::error::{BinError, BinResult};
use crate::shutdown::ShutdownCoordinator;
use crate::simulation::{SimulatedPlant, DEFAULT_TICK_PERIOD};

// =============================================================================
// BridgeRuntime
// =============================================================================

/// Runs one bridge until shutdown is signaled.
///
/// The buses are created with the runtime so an embedding application can
/// publish and call through them before and while the bridge runs.
pub struct BridgeRuntime {
    config: Arc<BridgeConfig>,
    shutdown: ShutdownCoordinator,
    channel_bus: ChannelBus,
    call_bus: CallBus,
    simulate: bool,
}

impl BridgeRuntime {
    /// Creates a runtime for `config`.
    pub fn new(config: BridgeConfig) -> Self {
        let capacity = config.connector.event_capacity;
        Self {
            config: Arc::new(config),
            shutdown: ShutdownCoordinator::new(),
            channel_bus: ChannelBus::new(capacity),
            call_bus: CallBus::new(capacity),
            simulate: false,
        }
    }

    /// Serves the data sources from a simulated plant instead of a server.
    pub fn with_simulation(mut self, enabled: bool) -> Self {
        self.simulate = enabled;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Returns true in simulation mode.
    pub fn is_simulated(&self) -> bool {
        self.simulate
    }

    /// Returns the channel bus used by source forwarders and actor writers.
    pub fn channel_bus(&self) -> &ChannelBus {
        &self.channel_bus
    }

    /// Returns the call bus answered by the mapper.
    pub fn call_bus(&self) -> &CallBus {
        &self.call_bus
    }

    /// Returns a handle that can stop the runtime.
    pub fn shutdown_handle(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    /// Runs the bridge until shutdown is signaled.
    pub async fn run(self) -> BinResult<()> {
        info!(
            version = uabridge_opcua::VERSION,
            endpoint = %self.config.connector.endpoint_url,
            simulate = self.simulate,
            "Starting uabridge"
        );

        let result = if self.simulate {
            self.run_simulated().await
        } else {
            self.run_connected().await
        };

        info!("uabridge shutdown complete");
        result
    }

    async fn run_simulated(&self) -> BinResult<()> {
        let plant = SimulatedPlant::from_config(&self.config)?;
        let transport = plant.transport();
        let ticker = plant.spawn_ticker(DEFAULT_TICK_PERIOD, self.shutdown.shutdown_signal());

        let result = self.run_with(transport).await;

        // Also stops the ticker when the bridge failed on its own.
        self.shutdown.initiate_shutdown();
        if let Err(e) = ticker.await {
            warn!(error = %e, "Simulation ticker ended abnormally");
        }
        result
    }

    #[cfg(feature = "real-transport")]
    async fn run_connected(&self) -> BinResult<()> {
        self.run_with(uabridge_opcua::client::RealTransport::new()).await
    }

    #[cfg(not(feature = "real-transport"))]
    async fn run_connected(&self) -> BinResult<()> {
        Err(BinError::init(
            "this build cannot connect to OPC UA servers; rebuild with the `real-transport` feature or use `run --simulate`",
        ))
    }

    /// Runs the bridge over `transport` until shutdown is signaled.
    pub async fn run_with<T: OpcUaTransport>(&self, transport: T) -> BinResult<()> {
        let components = self.initialize_components(transport)?;
        components.start();

        let endpoint = self.config.connector.endpoint_url.clone();
        if let Err(e) = components.connector.connect().await {
            error!(endpoint = %endpoint, error = %e, "Connecting failed");
            if let Err(stop_error) = components.stop().await {
                debug!(error = %stop_error, "Cleanup after failed connect reported an error");
            }
            return Err(BinError::from(e).with_context(format!("Failed to connect to {}", endpoint)));
        }

        info!(
            endpoint = %endpoint,
            data_sources = self.config.connector.data_sources.len(),
            calls = self.config.call_count(),
            sources = self.config.sources.len(),
            actors = self.config.actors.len(),
            "uabridge is ready"
        );

        self.shutdown.wait_for_shutdown().await;
        info!("Shutdown initiated, cleaning up...");

        components.stop().await
    }

    fn initialize_components<T: OpcUaTransport>(&self, transport: T) -> BinResult<BridgeComponents<T>> {
        debug!("Initializing bridge components");

        let connector = OpcUaConnector::with_data_sources(
            self.config.connector_options(),
            transport,
            self.config.data_sources()?,
        );
        let mapper = RemoteOperationMapper::new(
            connector.clone(),
            self.call_bus.clone(),
            self.config.call_mappings()?,
        );
        let forwarder = SourceForwarder::new(
            connector.clone(),
            self.channel_bus.clone(),
            self.config.source_routes(),
        )
        .with_payload(self.config.source_payload);
        let writer = ActorWriter::new(
            connector.clone(),
            self.channel_bus.clone(),
            self.config.actor_routes(),
        );

        // Subscribed before `connect()` so the first session is logged.
        let event_log = Some(spawn_event_log(&connector));

        Ok(BridgeComponents {
            connector,
            mapper,
            forwarder,
            writer,
            event_log,
        })
    }
}

// =============================================================================
// BridgeComponents
// =============================================================================

struct BridgeComponents<T: OpcUaTransport> {
    connector: OpcUaConnector<T>,
    mapper: RemoteOperationMapper<T>,
    forwarder: SourceForwarder<T>,
    writer: ActorWriter<T>,
    event_log: Option<JoinHandle<()>>,
}

impl<T: OpcUaTransport> BridgeComponents<T> {
    fn start(&self) {
        self.mapper.start();
        self.forwarder.start();
        self.writer.start();
    }

    async fn stop(mut self) -> BinResult<()> {
        self.forwarder.stop();
        self.writer.stop();
        let result = self.mapper.stop().await;

        if let Some(handle) = self.event_log.take() {
            handle.abort();
        }

        let stats = self.connector.stats();
        info!(
            sessions = stats.sessions_created,
            reads = stats.reads,
            writes = stats.writes,
            calls = stats.calls,
            notifications = stats.notifications,
            errors = stats.errors,
            "Connector statistics"
        );

        result.map_err(BinError::from)
    }
}

/// Logs connector lifecycle events; errors are reported by the mapper.
fn spawn_event_log<T: OpcUaTransport>(connector: &OpcUaConnector<T>) -> JoinHandle<()> {
    let mut events = connector.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ConnectorEvent::SessionCreated) => info!("OPC UA session created"),
                Ok(ConnectorEvent::SessionClosing) => debug!("OPC UA session closing"),
                Ok(ConnectorEvent::SessionClosed) => info!("OPC UA session closed"),
                Ok(ConnectorEvent::DataValueChange {
                    identifier, value, ..
                }) => debug!(data_source = %identifier, value = %value, "Data value changed"),
                Ok(ConnectorEvent::Error(_)) => {}
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Event log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`BridgeRuntime`].
#[derive(Default)]
pub struct RuntimeBuilder {
    config_path: Option<PathBuf>,
    config: Option<BridgeConfig>,
    simulate: bool,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration file path.
    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the configuration directly; wins over `config_path`.
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Enables simulation mode.
    pub fn simulate(mut self, enabled: bool) -> Self {
        self.simulate = enabled;
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> BinResult<BridgeRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => {
                let path = self
                    .config_path
                    .ok_or_else(|| BinError::config("No configuration provided"))?;
                load_config(&path)
                    .map_err(|e| BinError::from(e).with_context(format!("Failed to load {}", path.display())))?
            }
        };

        Ok(BridgeRuntime::new(config).with_simulation(self.simulate))
    }
}

// =============================================================================
// Tests
// =============================================================================
