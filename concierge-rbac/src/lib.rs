//! Identity resolution and permission evaluation for Concierge
//!
//! This crate answers the question "may this principal exercise this
//! permission on this process, through this role in this group?" against a
//! [`ConciergeStore`](concierge_core::store::ConciergeStore).
//!
//! # Features
//!
//! - **Identity Resolution**: unique names to ids, with distinct not-found and ambiguous outcomes
//! - **Membership Verification**: group membership and role assignment checks
//! - **Permission Evaluation**: role check, grant lookup and `rwx` bitmask matching
//! - **Registry**: enrollment, process registration and grant management
//! - **Audit Logging**: every guarded decision logged with structured fields
//!
//! # Quick Start
//!
//! ```rust
//! use concierge_rbac::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let store = MemoryStore::with_schema();
//!     store.insert_group("site").await?;
//!     store.insert_role("user").await?;
//!     store.insert_role("admin").await?;
//!
//!     let registry = Registry::new(Arc::new(store.clone()));
//!     registry.enroll_user(&NewUser::new("alice", "hash")).await?;
//!
//!     let guard = AccessGuard::builder(Arc::new(store))
//!         .with_audit_logging(true)
//!         .build();
//!     guard
//!         .check_group(&GroupCheck {
//!             username: "alice".to_string(),
//!             groupname: "site".to_string(),
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod evaluator;
pub mod guard;
pub mod registry;
pub mod resolver;
pub mod verifier;

pub mod prelude {
    //! Common imports for Concierge access control

    pub use crate::error::*;
    pub use crate::evaluator::{PermissionEvaluator, PermissionRequest};
    pub use crate::guard::*;
    pub use crate::registry::{ProcessSpec, Registry};
    pub use crate::resolver::IdentityResolver;
    pub use crate::verifier::MembershipVerifier;

    pub use concierge_core::prelude::*;

    // Common Result type
    pub type Result<T> = std::result::Result<T, AccessError>;
}

// Re-export major components at crate level
pub use error::AccessError;
pub use evaluator::PermissionEvaluator;
pub use guard::AccessGuard;
pub use prelude::Result;
