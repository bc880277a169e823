//! Error types for feedlog.
//!
//! This module defines all error types used throughout the feedlog crate.
//! Sync failures carry enough context to be shown to the user as-is.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::backend::{AccountStatus, BackendErrorCode};

/// The main error type for feedlog operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Sync Errors ===
    /// The household account is not usable for remote operations.
    #[error("not signed in to the household account ({status}): {}", .status.guidance())]
    NotAuthenticated {
        /// The last observed account status.
        status: AccountStatus,
    },

    /// The shared zone has not been provisioned in this session.
    #[error("shared zone is not available; setup has not completed")]
    ZoneUnavailable,

    /// The remote backend reported a fault.
    #[error("backend error ({code}): {message}")]
    Backend {
        /// Classification of the fault.
        code: BackendErrorCode,
        /// Human-readable description from the backend.
        message: String,
        /// How long the backend asked us to wait before trying again.
        retry_after: Option<Duration>,
    },

    /// A single remote record could not be turned into a feeding record.
    ///
    /// Only raised per item inside batch operations, where it is logged
    /// and the item skipped.
    #[error("invalid record '{record_name}': {reason}")]
    InvalidRecord {
        /// The backend identifier of the record.
        record_name: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Caller-supplied input was rejected.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // === Storage Errors ===
    /// Failed to open or create a database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for feedlog operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a backend error without a retry hint.
    #[must_use]
    pub fn backend(code: BackendErrorCode, message: impl Into<String>) -> Self {
        Self::Backend {
            code,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Create an invalid record error.
    #[must_use]
    pub fn invalid_record(record_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            record_name: record_name.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid input error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this is a backend error with the given code.
    #[must_use]
    pub fn is_backend_code(&self, expected: BackendErrorCode) -> bool {
        matches!(self, Self::Backend { code, .. } if *code == expected)
    }

    /// Check if this error means the account is not usable.
    #[must_use]
    pub fn is_not_authenticated(&self) -> bool {
        matches!(self, Self::NotAuthenticated { .. })
            || self.is_backend_code(BackendErrorCode::NotAuthenticated)
    }

    /// The retry hint attached to a backend error, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Backend { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
