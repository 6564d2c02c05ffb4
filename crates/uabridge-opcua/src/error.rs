// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA connector error types.
//!
//! # Error Categories
//!
//! ```text
//! OpcUaError
//! ├── Connection    - Transport and session failures
//! ├── NotConnected  - Operation issued without a live session
//! ├── Address       - UnknownNamespace, PathNotFound, malformed addresses
//! ├── BadStatus     - Server answered with a non-good status code
//! ├── Coercion      - Application transform or wire typing failed
//! └── Configuration - Invalid options or data source descriptors
//! ```
//!
//! Remote-operation failures (`InvalidParameters`, `MethodCallFailed`) live in
//! [`crate::remote`] because they are answers to a caller, not connector
//! failures.
//!
//! # Examples
//!
//! ```
//! use uabridge_opcua::error::{AddressError, OpcUaError};
//!
//! let error: OpcUaError = AddressError::unknown_namespace("urn:plant", "s=Boiler").into();
//! assert_eq!(error.category(), "address");
//! assert!(error.to_string().contains("urn:plant"));
//! ```

use std::fmt;

use thiserror::Error;
use tracing::Level;

use crate::types::StatusCode;

// =============================================================================
// OpcUaError - Main Error Type
// =============================================================================

/// The main error type for connector operations.
#[derive(Debug, Error)]
pub enum OpcUaError {
    /// Transport or session failure.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// The operation needs a session but none exists.
    #[error("{operation}: no active OPC UA session")]
    NotConnected {
        /// Operation that was attempted.
        operation: &'static str,
    },

    /// Address resolution failure.
    #[error("{0}")]
    Address(#[from] AddressError),

    /// The server reported a non-good status for an operation.
    #[error("{operation}: {status} {target}")]
    BadStatus {
        /// Operation that failed.
        operation: &'static str,
        /// Status returned by the server.
        status: StatusCode,
        /// Description of the affected data source(s).
        target: String,
    },

    /// Value coercion failure.
    #[error("{0}")]
    Coercion(#[from] CoercionError),

    /// A monitored item reported a problem or its value could not be coerced.
    #[error("Monitored item {node}: {message}")]
    Monitor {
        /// The monitored node.
        node: String,
        /// What went wrong.
        message: String,
    },

    /// Configuration failure.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),
}

impl OpcUaError {
    /// Creates a not-connected error.
    #[inline]
    pub fn not_connected(operation: &'static str) -> Self {
        Self::NotConnected { operation }
    }

    /// Creates a bad-status error.
    pub fn bad_status(operation: &'static str, status: StatusCode, target: impl Into<String>) -> Self {
        Self::BadStatus {
            operation,
            status,
            target: target.into(),
        }
    }

    /// Creates a monitored item error.
    pub fn monitor(node: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::Monitor {
            node: node.to_string(),
            message: message.into(),
        }
    }

    /// Returns the status code for bad-status errors.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::BadStatus { status, .. } => Some(*status),
            Self::Address(AddressError::PathNotFound { status, .. }) => *status,
            _ => None,
        }
    }

    /// Returns the error category as a string.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) | Self::NotConnected { .. } => "connection",
            Self::Address(_) => "address",
            Self::BadStatus { .. } => "status",
            Self::Coercion(_) => "coercion",
            Self::Monitor { .. } => "monitor",
            Self::Configuration(_) => "configuration",
        }
    }

    /// Returns the severity of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Connection(_) => ErrorSeverity::Error,
            Self::Configuration(_) => ErrorSeverity::Critical,
            Self::NotConnected { .. }
            | Self::Address(_)
            | Self::BadStatus { .. }
            | Self::Coercion(_)
            | Self::Monitor { .. } => ErrorSeverity::Warning,
        }
    }

    /// Returns `true` for connection level failures.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::NotConnected { .. })
    }

    /// Logs this error with structured context at its severity level.
    pub fn log(&self, context: &str) {
        match self.severity().to_tracing_level() {
            Level::ERROR => tracing::error!(
                category = self.category(),
                context = context,
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                category = self.category(),
                context = context,
                "{self}"
            ),
            _ => tracing::debug!(
                category = self.category(),
                context = context,
                "{self}"
            ),
        }
    }
}

/// Result type alias for connector operations.
pub type OpcUaResult<T> = Result<T, OpcUaError>;

// =============================================================================
// ConnectionError
// =============================================================================

/// Transport and session errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConnectionError {
    /// The transport connection could not be opened.
    #[error("Failed to connect to '{endpoint}': {message}")]
    ConnectFailed {
        /// Target endpoint.
        endpoint: String,
        /// Error message.
        message: String,
    },

    /// The session could not be created or activated.
    #[error("Failed to create session on '{endpoint}': {message}")]
    SessionFailed {
        /// Target endpoint.
        endpoint: String,
        /// Error message.
        message: String,
    },

    /// The namespace array could not be read.
    #[error("Failed to read namespace array: {message}")]
    NamespaceArray {
        /// Error message.
        message: String,
    },

    /// Closing the session or transport failed.
    #[error("Failed to close session: {message}")]
    CloseFailed {
        /// Error message.
        message: String,
    },

    /// The transport broke while serving a request.
    #[error("Transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
    },

    /// The subscription reported an internal error.
    #[error("Subscription error: {message}")]
    Subscription {
        /// Error message.
        message: String,
    },
}

impl ConnectionError {
    /// Creates a connect failure.
    pub fn connect_failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectFailed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates a session failure.
    pub fn session_failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SessionFailed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates a transport failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

// =============================================================================
// AddressError
// =============================================================================

/// Errors raised while turning a data source address into a node id.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AddressError {
    /// The namespace URI is not registered in the current session.
    #[error("Ignoring item {item} with undefined OPC UA namespace URI {uri}")]
    UnknownNamespace {
        /// The unresolved URI.
        uri: String,
        /// The address being resolved.
        item: String,
    },

    /// The server could not translate a browse path.
    #[error("BrowsePath invalid: {} {root} {path}", .status.map(|s| s.name()).unwrap_or("NoTarget"))]
    PathNotFound {
        /// Root node of the browse path.
        root: String,
        /// Relative path as configured.
        path: String,
        /// Status reported by the server; `None` if it returned no target.
        status: Option<StatusCode>,
    },

    /// The relative path text is malformed.
    #[error("Invalid relative path '{path}': {reason}")]
    InvalidPath {
        /// The offending path.
        path: String,
        /// Why parsing failed.
        reason: String,
    },

    /// The node identifier text is malformed.
    #[error("Invalid node id '{input}': {reason}")]
    InvalidNodeId {
        /// The offending text.
        input: String,
        /// Why parsing failed.
        reason: String,
    },
}

impl AddressError {
    /// Creates an unknown namespace error.
    pub fn unknown_namespace(uri: impl Into<String>, item: impl Into<String>) -> Self {
        Self::UnknownNamespace {
            uri: uri.into(),
            item: item.into(),
        }
    }

    /// Creates a path-not-found error.
    pub fn path_not_found(
        root: impl Into<String>,
        path: impl Into<String>,
        status: Option<StatusCode>,
    ) -> Self {
        Self::PathNotFound {
            root: root.into(),
            path: path.into(),
            status,
        }
    }

    /// Creates an invalid path error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid node id error.
    pub fn invalid_node_id(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// CoercionError
// =============================================================================

/// Value coercion errors.
///
/// Raised both by application coercion functions and by typing a value for
/// the wire.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoercionError {
    /// An application coercion function rejected the value.
    #[error("Coercion failed: {message}")]
    Failed {
        /// Error message.
        message: String,
    },

    /// The value cannot represent the requested type.
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type.
        expected: String,
        /// Actual type.
        actual: String,
    },

    /// The value does not fit the requested type.
    #[error("Value overflow: {value} exceeds range for {target_type}")]
    Overflow {
        /// The value that overflowed.
        value: String,
        /// Target type.
        target_type: String,
    },
}

impl CoercionError {
    /// Creates a failure raised by an application coercion function.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates an overflow error.
    pub fn overflow(value: impl fmt::Display, target_type: impl Into<String>) -> Self {
        Self::Overflow {
            value: value.to_string(),
            target_type: target_type.into(),
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    /// Endpoint URL is not an `opc.tcp://` URL.
    #[error("Invalid endpoint URL '{endpoint}': must start with opc.tcp://")]
    InvalidEndpoint {
        /// The configured endpoint.
        endpoint: String,
    },

    /// A data source address is missing or ambiguous.
    #[error("Invalid address for data source '{identifier}': {reason}")]
    InvalidAddress {
        /// Data source identifier.
        identifier: String,
        /// Why the address was rejected.
        reason: String,
    },

    /// Unknown wire data type name.
    #[error("Unknown OPC UA data type '{name}'")]
    UnknownDataType {
        /// The unknown name.
        name: String,
    },

    /// A write or call path needs a data type that was not declared.
    #[error("Data source {identifier} declares no data type")]
    MissingDataType {
        /// Data source description.
        identifier: String,
    },

    /// A referenced data source is not registered.
    #[error("Unknown data source '{identifier}'")]
    UnknownDataSource {
        /// The unknown identifier.
        identifier: String,
    },
}

impl ConfigurationError {
    /// Creates an invalid address error.
    pub fn invalid_address(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    /// Creates an unknown data source error.
    pub fn unknown_data_source(identifier: impl Into<String>) -> Self {
        Self::UnknownDataSource {
            identifier: identifier.into(),
        }
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Informational - no action required.
    Info,
    /// Warning - the affected item or request failed.
    Warning,
    /// Error - the connector lost its session.
    Error,
    /// Critical - the connector cannot work with this configuration.
    Critical,
}

impl ErrorSeverity {
    /// Converts to tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error | Self::Critical => Level::ERROR,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Tests
// =============================================================================
