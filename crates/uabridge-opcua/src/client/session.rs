// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA session state.
//!
//! A [`Session`] lives from session creation until `disconnect()`. It carries
//! the namespace table read at creation, a generation number that tells late
//! callbacks whether they belong to the current session, and the lazily
//! created subscription shared by all monitored items.

use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::error::OpcUaResult;

// =============================================================================
// SessionState
// =============================================================================

/// State of the connector's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session.
    #[default]
    Disconnected,

    /// `connect()` is in progress.
    Connecting,

    /// Session is active and ready for use.
    Active,

    /// `disconnect()` is in progress.
    Closing,
}

impl SessionState {
    /// Returns `true` if the session is active.
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns `true` if the session is in a transitional state.
    #[inline]
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Closing)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Active => write!(f, "Active"),
            Self::Closing => write!(f, "Closing"),
        }
    }
}

// =============================================================================
// NamespaceTable
// =============================================================================

/// Namespace URIs of one session, indexed by namespace index.
///
/// Indices are assigned by the server and are only valid for the session
/// they were read in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceTable {
    uris: Vec<String>,
}

impl NamespaceTable {
    /// Creates a table from the server's namespace array.
    pub fn new(uris: Vec<String>) -> Self {
        Self { uris }
    }

    /// Returns the index of `uri`.
    pub fn index_of(&self, uri: &str) -> Option<u16> {
        self.uris
            .iter()
            .position(|u| u == uri)
            .and_then(|i| u16::try_from(i).ok())
    }

    /// Returns the URI at `index`.
    pub fn uri(&self, index: u16) -> Option<&str> {
        self.uris.get(usize::from(index)).map(String::as_str)
    }

    /// Returns the number of namespaces.
    pub fn len(&self) -> usize {
        self.uris.len()
    }

    /// Returns `true` if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }

    /// Iterates over `(index, uri)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.uris.iter().map(String::as_str).enumerate()
    }
}

// =============================================================================
// Session
// =============================================================================

/// The connector's view of one live session.
#[derive(Debug)]
pub struct Session {
    generation: u64,
    namespaces: NamespaceTable,
    created_at: DateTime<Utc>,
    subscription: OnceCell<u32>,
}

impl Session {
    pub(crate) fn new(generation: u64, namespaces: NamespaceTable) -> Self {
        Self {
            generation,
            namespaces,
            created_at: Utc::now(),
            subscription: OnceCell::new(),
        }
    }

    /// Returns the session generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the namespace table of this session.
    pub fn namespaces(&self) -> &NamespaceTable {
        &self.namespaces
    }

    /// Returns when the session was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the subscription id, if the subscription exists.
    pub fn subscription_id(&self) -> Option<u32> {
        self.subscription.get().copied()
    }

    /// Returns the subscription id, creating the subscription on first use.
    ///
    /// Concurrent callers share one creation; a failed creation is retried by
    /// the next caller.
    pub(crate) async fn ensure_subscription<F, Fut>(&self, create: F) -> OpcUaResult<u32>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = OpcUaResult<u32>>,
    {
        self.subscription.get_or_try_init(create).await.copied()
    }

    /// Returns a snapshot for diagnostics.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            generation: self.generation,
            namespace_uris: self.namespaces.iter().map(|(_, uri)| uri.to_string()).collect(),
            created_at: self.created_at,
            subscription_id: self.subscription_id(),
        }
    }
}

/// Diagnostic snapshot of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    /// Session generation.
    pub generation: u64,
    /// Namespace array.
    pub namespace_uris: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Subscription id, once created.
    pub subscription_id: Option<u32>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::ConnectionError;

    fn table() -> NamespaceTable {
        NamespaceTable::new(vec![
            "http://opcfoundation.org/UA/".into(),
            "urn:server".into(),
            "urn:plant".into(),
        ])
    }

    #[test]
    fn test_namespace_table_lookup() {
        let namespaces = table();
        assert_eq!(namespaces.index_of("urn:plant"), Some(2));
        assert_eq!(namespaces.index_of("urn:unknown"), None);
        assert_eq!(namespaces.uri(1), Some("urn:server"));
        assert_eq!(namespaces.uri(3), None);
        assert_eq!(namespaces.len(), 3);
    }

    #[test]
    fn test_session_state() {
        assert!(SessionState::Active.is_active());
        assert!(SessionState::Connecting.is_transitioning());
        assert!(!SessionState::Disconnected.is_transitioning());
        assert_eq!(SessionState::Closing.to_string(), "Closing");
    }

    #[tokio::test]
    async fn test_subscription_created_once() {
        let session = Session::new(1, table());
        let created = AtomicU32::new(0);

        for _ in 0..3 {
            let id = session
                .ensure_subscription(|| async {
                    created.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await
                .unwrap();
            assert_eq!(id, 7);
        }

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(session.subscription_id(), Some(7));
    }

    #[tokio::test]
    async fn test_failed_subscription_is_retried() {
        let session = Session::new(1, table());

        let first = session
            .ensure_subscription(|| async {
                Err(ConnectionError::Subscription {
                    message: "too many subscriptions".into(),
                }
                .into())
            })
            .await;
        assert!(first.is_err());
        assert_eq!(session.subscription_id(), None);

        let second = session.ensure_subscription(|| async { Ok(3) }).await.unwrap();
        assert_eq!(second, 3);
        assert_eq!(session.info().subscription_id, Some(3));
    }
}
