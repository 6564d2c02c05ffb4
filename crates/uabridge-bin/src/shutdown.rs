// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Graceful shutdown coordination.
//!
//! Handles OS signals (SIGTERM, SIGINT, SIGQUIT on Unix, Ctrl-C elsewhere)
//! and manual shutdown requests, and lets tasks wait for either.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

// =============================================================================
// ShutdownCoordinator
// =============================================================================

/// Coordinates graceful shutdown across the bridge's tasks.
///
/// ```ignore
/// use uabridge_bin::shutdown::ShutdownCoordinator;
///
/// let coordinator = ShutdownCoordinator::new();
/// let signal = coordinator.shutdown_signal();
///
/// tokio::spawn(async move {
///     signal.wait().await;
///     println!("Shutdown received!");
/// });
///
/// coordinator.wait_for_shutdown().await;
/// ```
#[derive(Clone)]
pub struct ShutdownCoordinator {
    sender: broadcast::Sender<()>,
    shutdown_initiated: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    /// Creates a new shutdown coordinator.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a handle that resolves once shutdown is initiated.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
            shutdown_initiated: self.shutdown_initiated.clone(),
        }
    }

    /// Initiates shutdown and notifies all signals. Idempotent.
    pub fn initiate_shutdown(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Shutdown initiated");
            let _ = self.sender.send(());
        }
    }

    /// Returns true if shutdown has been initiated.
    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Waits for an OS signal or a manual [`initiate_shutdown`](Self::initiate_shutdown).
    pub async fn wait_for_shutdown(&self) {
        let signal = self.shutdown_signal();
        tokio::select! {
            _ = signal.wait() => {}
            _ = os_signal() => self.initiate_shutdown(),
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn os_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
        signal(SignalKind::quit()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint), Ok(mut sigquit)) => {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = sigint.recv() => info!("Received SIGINT"),
                _ = sigquit.recv() => info!("Received SIGQUIT"),
            }
        }
        _ => {
            warn!("Registering signal handlers failed, falling back to Ctrl-C");
            ctrl_c().await
        }
    }
}

#[cfg(not(unix))]
async fn os_signal() {
    ctrl_c().await
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C"),
        Err(e) => {
            warn!(error = %e, "Waiting for Ctrl-C failed");
            std::future::pending::<()>().await
        }
    }
}

// =============================================================================
// ShutdownSignal
// =============================================================================

/// Resolves when shutdown is initiated.
pub struct ShutdownSignal {
    receiver: broadcast::Receiver<()>,
    shutdown_initiated: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Waits for the shutdown signal.
    pub async fn wait(mut self) {
        if self.shutdown_initiated.load(Ordering::SeqCst) {
            return;
        }

        let _ = self.receiver.recv().await;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_coordinator() {
        let coordinator = ShutdownCoordinator::new();
        let signal = coordinator.shutdown_signal();

        assert!(!coordinator.is_shutdown_initiated());
        coordinator.initiate_shutdown();
        assert!(coordinator.is_shutdown_initiated());

        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .expect("Shutdown signal should resolve");
    }

    #[tokio::test]
    async fn test_signal_after_shutdown_resolves() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.initiate_shutdown();
        coordinator.initiate_shutdown();

        tokio::time::timeout(Duration::from_secs(1), coordinator.shutdown_signal().wait())
            .await
            .expect("Late signal should resolve");
    }

    #[tokio::test]
    async fn test_wait_for_manual_shutdown() {
        let coordinator = ShutdownCoordinator::new();

        let trigger = coordinator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.initiate_shutdown();
        });

        tokio::time::timeout(Duration::from_secs(1), coordinator.wait_for_shutdown())
            .await
            .expect("Manual shutdown should end the wait");
    }
}
