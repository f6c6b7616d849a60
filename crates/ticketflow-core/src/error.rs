// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Ticketflow automation engine.

use thiserror::Error;

/// The primary error type used across all Ticketflow adapter traits and services.
///
/// Variants follow the engine's error taxonomy: validation errors are reported
/// to the caller, integration (configuration) errors degrade to "automation did
/// not run", transport errors are retried or swallowed depending on the caller,
/// and infrastructure errors abort the current cycle without crashing.
#[derive(Debug, Error)]
pub enum TicketflowError {
    /// Bad caller input (past send time, missing contact, missing recurrence end).
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity, such as `"schedule"` or `"queue"`.
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// Missing or invalid integration binding configuration.
    #[error("integration error: {message}")]
    Integration {
        /// Names the binding and what is wrong with it.
        message: String,
        /// The underlying error (usually a deserialization failure).
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Messaging send or outbound HTTP failure.
    #[error("transport error: {message}")]
    Transport {
        /// Human-readable description of the failure.
        message: String,
        /// The underlying HTTP or channel error.
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The durable work queue could not be resolved.
    #[error("work queue unavailable: {0}")]
    QueueUnavailable(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout {
        /// How long the operation was allowed to run.
        duration: std::time::Duration,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TicketflowError {
    /// Shorthand for a transport error without an underlying cause.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for an integration error without an underlying cause.
    pub fn integration(message: impl Into<String>) -> Self {
        Self::Integration {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a not-found error.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns `true` for errors caused by caller input rather than infrastructure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for TicketflowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("json: {e}"))
    }
}
