//! Error types for Concierge core.
//!
//! This module defines the errors raised below the authorization layer:
//! relational store failures, capability string parsing failures and
//! configuration failures. Authorization outcomes ("checked and denied")
//! live in `concierge-rbac`, which wraps [`StoreError`] rather than
//! flattening it into strings.
//!
//! # Examples
//!
//! ```rust
//! use concierge_core::error::{CapabilityError, StoreError};
//!
//! let conflict = StoreError::Conflict("group site exists".to_string());
//! assert!(conflict.is_conflict());
//!
//! let malformed = CapabilityError::Malformed("1x1".to_string());
//! assert_eq!(malformed.to_string(), "Malformed capability string: \"1x1\"");
//! ```

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors reported by a [`ConciergeStore`](crate::store::ConciergeStore) backend.
///
/// Every backend maps its native failures onto these variants so callers can
/// tell constraint violations apart from connectivity failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row required by a write path does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A unique constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The statement targeted a table that does not exist.
    #[error("missing table: {0}")]
    MissingTable(String),

    /// A foreign key constraint rejected the statement.
    #[error("foreign key violation: {0}")]
    ForeignKey(String),

    /// The database driver reported a failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Catch-all for other failures.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl StoreError {
    /// Whether the failure is a unique constraint violation.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Errors raised while parsing capability strings or permission labels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// The stored capability is not exactly three `0`/`1` characters.
    #[error("Malformed capability string: {0:?}")]
    Malformed(String),

    /// The requested permission label is not one of `r, w, x, rw, rx, wx`.
    #[error("Unknown permission label: {0:?}")]
    UnknownLabel(String),
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the configuration file failed.
    #[error("Configuration I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON for [`ConciergeConfig`](crate::config::ConciergeConfig).
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration parsed but violates an invariant.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
