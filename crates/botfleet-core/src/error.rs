// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Botfleet bot operator.

use std::time::Duration;

use thiserror::Error;

/// Boxed error source carried by several variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The primary error type used across all Botfleet components and adapter traits.
#[derive(Debug, Error)]
pub enum FleetError {
    /// A bot with this identifier is already registered.
    #[error("bot `{id}` is already registered")]
    DuplicateBot { id: String },

    /// The bot identifier is not registered (registry operations).
    #[error("bot `{id}` not found")]
    NotFound { id: String },

    /// A send request targets a bot that is not registered.
    #[error("unknown bot `{id}`")]
    UnknownBot { id: String },

    /// No job record exists with this identifier.
    #[error("job {id} not found")]
    JobNotFound { id: i64 },

    /// Caller supplied a malformed request (empty id, empty payload, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Opening a transport session failed. Recoverable on the next reconciliation.
    #[error("connection error: {message}")]
    Connection {
        message: String,
        source: Option<BoxError>,
    },

    /// Delivery failed for a reason that may clear up (network, rate limit, timeout).
    #[error("transient delivery error: {message}")]
    Transient {
        message: String,
        /// Minimum wait requested by the platform before retrying, if any.
        retry_after: Option<Duration>,
        source: Option<BoxError>,
    },

    /// Delivery failed for a reason that retrying cannot fix (invalid recipient,
    /// revoked credential).
    #[error("permanent delivery error: {message}")]
    Permanent {
        message: String,
        source: Option<BoxError>,
    },

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage { source: BoxError },

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FleetError {
    /// Shorthand for a [`FleetError::Connection`] without a source.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a [`FleetError::Transient`] without a source or retry hint.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            retry_after: None,
            source: None,
        }
    }

    /// Shorthand for a [`FleetError::Permanent`] without a source.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps any error as a [`FleetError::Storage`].
    pub fn storage(source: impl Into<BoxError>) -> Self {
        Self::Storage {
            source: source.into(),
        }
    }

    /// Whether a failed delivery attempt with this error may be retried.
    ///
    /// Timeouts count as transient: the message may simply not have made it
    /// through in time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }

    /// Whether a failed delivery attempt with this error ends the job at once.
    pub fn is_permanent(&self) -> bool {
        !self.is_retryable()
    }

    /// Retry hint supplied by the platform, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
