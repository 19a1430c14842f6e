//! Error types for audio-hub
//!
//! This module provides the error taxonomy for the job orchestration core:
//! - Job-level errors (invalid requests, fetch failures, conversion failures)
//! - Notification delivery errors, which never escape the dispatcher
//! - Storage, configuration and I/O errors from the ambient stack
//! - Machine-readable error codes for the presentation layer

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for audio-hub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for audio-hub
///
/// Only [`Error::InvalidRequest`] and [`Error::ShuttingDown`] are returned
/// synchronously from job submission. Everything that happens after a job is
/// queued is reported through the job's state, the history ledger and a
/// notification event instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed job request, rejected before it enters the queue
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Fetch failed with a transient (network/timeout class) error
    #[error("transient fetch error: {0}")]
    TransientFetch(String),

    /// Fetch failed permanently (resource unavailable, unsupported URL, ...)
    #[error("fetch failed: {0}")]
    PermanentFetch(String),

    /// Transcoding failed (tool exited non-zero or produced no output)
    #[error("conversion failed: {reason}")]
    Conversion {
        /// Human-readable reason reported by the transcoder
        reason: String,
    },

    /// A notification channel failed to deliver
    ///
    /// Swallowed by the dispatcher, which falls through to the next tier.
    #[error("notification delivery failed via {channel}: {reason}")]
    NotificationDelivery {
        /// Name of the channel that failed
        channel: String,
        /// The reason delivery failed
        reason: String,
    },

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "maxConcurrentJobs")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Job not found
    #[error("job not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// The operation was cancelled before it finished
    #[error("operation cancelled")]
    Cancelled,

    /// HTTP request could not be completed (connection, TLS, timeout)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool could not be executed or did not finish in time
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Output path could not be resolved
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// The offending path
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Machine-readable error code for the presentation layer
    ///
    /// Codes are stable strings the UI can switch on without parsing messages.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidRequest(_) => "invalid_request",
            Error::TransientFetch(_) => "transient_fetch_error",
            Error::PermanentFetch(_) => "permanent_fetch_error",
            Error::Conversion { .. } => "conversion_error",
            Error::NotificationDelivery { .. } => "notification_delivery_error",
            Error::Config { .. } => "config_error",
            Error::Database(_) | Error::Sqlx(_) => "database_error",
            Error::Io(_) => "io_error",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::Cancelled => "cancelled",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ExternalTool(_) => "external_tool_error",
            Error::InvalidPath { .. } => "invalid_path",
        }
    }

    /// Shorthand for a configuration error tied to a settings key
    pub(crate) fn config_key(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}
