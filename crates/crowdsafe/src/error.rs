//! Error types for crowdsafe.
//!
//! This module defines all error types used throughout the crowdsafe crate,
//! grouped by the layer that raises them. The HTTP layer maps each group onto
//! a status code and a response body.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for crowdsafe operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Validation Errors ===
    /// A submission was missing fields or carried malformed values.
    #[error("{message}")]
    Validation {
        /// Caller-facing description of the problem.
        message: String,
    },

    // === Detector Errors ===
    /// The body detector could not decode or analyse an uploaded image.
    #[error("{message}")]
    UpstreamDetector {
        /// Description of what went wrong.
        message: String,
    },

    // === Storage Errors ===
    /// Failed to open or create the database.
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

    /// Failed to append to the flat export log.
    #[error("failed to write export log at {path}: {source}")]
    ExportWrite {
        /// Path to the export file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: csv::Error,
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
}

/// A specialized Result type for crowdsafe operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new detector error.
    #[must_use]
    pub fn upstream_detector(message: impl Into<String>) -> Self {
        Self::UpstreamDetector {
            message: message.into(),
        }
    }

    /// Check if this error was caused by bad caller input.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Check if this error came from the body detector.
    #[must_use]
    pub fn is_upstream_detector(&self) -> bool {
        matches!(self, Self::UpstreamDetector { .. })
    }

    /// Check if this error came from either persistence target.
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::DatabaseOpen { .. }
                | Self::DatabaseQuery(_)
                | Self::DatabaseMigration { .. }
                | Self::ExportWrite { .. }
                | Self::DirectoryCreate { .. }
                | Self::Io(_)
        )
    }
}
