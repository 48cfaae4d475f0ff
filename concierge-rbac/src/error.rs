//! Error types for Concierge access control

use concierge_core::error::{CapabilityError, StoreError};
use concierge_core::models::EntityKind;
use thiserror::Error;

/// Outcome of a failed resolution, verification or evaluation.
///
/// Denials ("checked and refused") and lookup failures are distinct variants
/// so a boundary layer can map them to different status codes.
#[derive(Error, Debug)]
pub enum AccessError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: EntityKind, name: String },

    #[error("{kind} name {name:?} matched {matches} rows")]
    AmbiguousResult {
        kind: EntityKind,
        name: String,
        matches: usize,
    },

    #[error("user {user} is not a member of group {group}")]
    NotMember { user: String, group: String },

    #[error("user {user} does not hold role {role} in group {group}")]
    NotInRole {
        user: String,
        group: String,
        role: String,
    },

    #[error("no grant on process {process} for role {role} in group {group}")]
    NoGrant {
        process: String,
        group: String,
        role: String,
    },

    #[error("grant {capability} on process {process} does not allow {label}")]
    InsufficientPermission {
        process: String,
        label: String,
        capability: String,
    },

    #[error("grant on process {process} is unreadable: {source}")]
    MalformedCapability {
        process: String,
        #[source]
        source: CapabilityError,
    },

    #[error("unknown permission: {0}")]
    UnknownPermission(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl AccessError {
    /// The check ran to completion and refused the caller.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            AccessError::NotMember { .. }
                | AccessError::NotInRole { .. }
                | AccessError::NoGrant { .. }
                | AccessError::InsufficientPermission { .. }
        )
    }

    /// A named entity could not be resolved to exactly one row.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(
            self,
            AccessError::NotFound { .. } | AccessError::AmbiguousResult { .. }
        )
    }

    pub(crate) fn not_found(kind: EntityKind, name: &str) -> Self {
        AccessError::NotFound {
            kind,
            name: name.to_string(),
        }
    }
}
