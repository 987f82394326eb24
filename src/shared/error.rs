//! Shared Error Types
//!
//! Error taxonomy for the sync layer. Remote failures never reach the UI as
//! hard failures: operation boundaries catch these, log them and fall back to
//! the local copy.
//!
//! # Error Categories
//!
//! - `Unavailable` - remote backend not reachable or not configured
//! - `Unauthorized` - no session, remote push skipped
//! - `PartialFailure` - some items of a batch failed, the rest went through
//! - `MalformedRecord` - a remote record is missing its value fields
//!
//! Stale remote data is not an error; see
//! [`ReconcileOutcome`](crate::client::sync::reconciliation::ReconcileOutcome).
//!
//! # Usage
//!
//! ```rust
//! use presensi_sync::shared::error::SyncError;
//!
//! let error = SyncError::validation("name", "Name cannot be empty");
//! ```
use thiserror::Error;

use crate::shared::model::Bucket;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors produced by the sync layer and its store adapters
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Remote backend is not reachable or not configured
    #[error("Remote store unavailable: {message}")]
    Unavailable {
        /// Human-readable error message
        message: String,
    },

    /// No signed-in user, remote writes are not allowed
    #[error("No user logged in")]
    Unauthorized,

    /// Some items of a batch failed
    #[error("{failed} of {total} items failed to sync")]
    PartialFailure {
        /// Number of failed items
        failed: usize,
        /// Number of attempted items
        total: usize,
    },

    /// Remote record is missing the fields its bucket needs
    #[error("Malformed {bucket} record: {reason}")]
    MalformedRecord {
        /// Bucket the record was meant for
        bucket: Bucket,
        /// What was wrong with it
        reason: String,
    },

    /// Local persistence failure
    #[error("Storage error: {message}")]
    Storage {
        /// Human-readable error message
        message: String,
    },

    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Human-readable error message
        message: String,
    },

    /// Input validation error
    #[error("Validation error in field '{field}': {message}")]
    Validation {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },

    /// Remote store rejected or failed an operation
    #[error("Remote error: {message}")]
    Remote {
        /// Human-readable error message
        message: String,
    },
}

impl SyncError {
    /// Create a new unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create a new malformed record error
    pub fn malformed(bucket: Bucket, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            bucket,
            reason: reason.into(),
        }
    }

    /// Create a new storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new remote error
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }

    /// Whether retrying later could succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Unauthorized | Self::Validation { .. } | Self::MalformedRecord { .. }
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        Self::storage(err.to_string())
    }
}

/// Authentication failures
///
/// Each variant renders as the message shown on the login form.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Email and password are required")]
    MissingCredentials,
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("This account has been disabled")]
    UserDisabled,
    #[error("No account found with this email")]
    UserNotFound,
    #[error("Incorrect password")]
    WrongPassword,
    #[error("Invalid login credentials")]
    InvalidCredentials,
    #[error("Too many failed attempts. Please try again later")]
    TooManyRequests,
    #[error("Network error. Please check your connection")]
    Network,
    #[error("Database permission denied")]
    PermissionDenied,
    #[error("Authentication service error: {0}")]
    Internal(String),
    #[error("Email not authorized")]
    NotAuthorized,
    #[error("{0}")]
    Storage(String),
}

impl AuthError {
    /// Cloud failures that should fall back to the local credential table
    pub fn allows_local_fallback(&self) -> bool {
        matches!(self, Self::Network | Self::Internal(_) | Self::PermissionDenied)
    }
}

impl From<SyncError> for AuthError {
    fn from(err: SyncError) -> Self {
        Self::Storage(err.to_string())
    }
}
