// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Errors raised by the pub/sub boundary.

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// BusError
// =============================================================================

/// Message bus errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Channel is closed.
    #[error("Channel is closed")]
    Closed,

    /// Receiver lagged behind.
    #[error("Receiver lagged by {count} messages")]
    Lagged {
        /// Number of missed messages.
        count: u64,
    },

    /// No live observer accepted the call.
    #[error("No observer for operation '{operation}'")]
    NoObserver {
        /// The operation name.
        operation: String,
    },

    /// The call was not answered in time.
    #[error("Call '{operation}' timed out after {duration:?}")]
    CallTimeout {
        /// The operation name.
        operation: String,
        /// Timeout duration.
        duration: Duration,
    },

    /// The observer dropped the request without responding.
    #[error("Response channel closed")]
    ResponseChannelClosed,
}

impl BusError {
    /// Creates a lagged error.
    pub fn lagged(count: u64) -> Self {
        Self::Lagged { count }
    }

    /// Creates a no-observer error.
    pub fn no_observer(operation: impl Into<String>) -> Self {
        Self::NoObserver {
            operation: operation.into(),
        }
    }

    /// Creates a call timeout error.
    pub fn call_timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::CallTimeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Returns `true` if a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BusError::Lagged { .. } | BusError::CallTimeout { .. } | BusError::NoObserver { .. }
        )
    }
}

/// Result alias for bus operations.
pub type BusResult<T> = Result<T, BusError>;
