//! Error types for ridelog.
//!
//! Every failure in the sampler is scoped to the operation that produced it;
//! nothing here is fatal to the process.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for ridelog operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Sampler Errors ===
    /// Access to a sensor was refused by the platform or the user.
    #[error("permission denied: {permission}")]
    PermissionDenied {
        /// Name of the refused permission.
        permission: String,
    },

    /// The operation needs a connected session.
    #[error("monitoring is not connected")]
    NotConnected,

    /// A sensor delivered a payload that could not be used.
    #[error("sensor delivery error: {message}")]
    SensorDelivery {
        /// Description of the bad payload.
        message: String,
    },

    // === Save Errors ===
    /// A save was rejected before reaching the store.
    #[error("cannot save session: {reason}")]
    SaveValidation {
        /// Why the save was rejected.
        reason: String,
    },

    /// The document store failed to write the session.
    #[error("failed to save session: {message}")]
    SaveTransport {
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

    // === Trace Errors ===
    /// A line of a sensor trace could not be parsed.
    #[error("invalid trace line {line}: {message}")]
    TraceParse {
        /// 1-based line number.
        line: usize,
        /// Description of the parse failure.
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

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for ridelog operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a permission denied error.
    #[must_use]
    pub fn permission_denied(permission: impl Into<String>) -> Self {
        Self::PermissionDenied {
            permission: permission.into(),
        }
    }

    /// Create a save validation error.
    #[must_use]
    pub fn save_validation(reason: impl Into<String>) -> Self {
        Self::SaveValidation {
            reason: reason.into(),
        }
    }

    /// Create a save transport error.
    #[must_use]
    pub fn save_transport(message: impl Into<String>) -> Self {
        Self::SaveTransport {
            message: message.into(),
        }
    }

    /// Create a sensor delivery error.
    #[must_use]
    pub fn sensor_delivery(message: impl Into<String>) -> Self {
        Self::SensorDelivery {
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error is a permission issue.
    #[must_use]
    pub fn is_permission_error(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    /// Check if this error should be shown to the rider as a blocking notice
    /// rather than only logged.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied { .. }
                | Self::NotConnected
                | Self::SaveValidation { .. }
                | Self::SaveTransport { .. }
        )
    }
}
