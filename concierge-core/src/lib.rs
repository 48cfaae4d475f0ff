//! # Concierge Core
//!
//! Data model, capability matcher and relational store for the Concierge
//! identity and permission engine.
//!
//! This crate provides the building blocks the authorization layer
//! (`concierge-rbac`) and the schema bootstrap (`concierge-bootstrap`) sit on:
//!
//! - [`capability`]: the three-bit `rwx` grant encoding and label matcher
//! - [`models`]: entities, table names per environment and seed fixtures
//! - [`config`]: the JSON configuration loaded at startup
//! - [`store`]: the [`ConciergeStore`] trait with Postgres and in-memory backends
//!
//! ## API Stability
//!
//! **Current Status: EXPERIMENTAL (v0.x.x)**
//!
//! During the 0.x.x series minor version bumps may include breaking changes.

pub mod capability;
pub mod config;
pub mod error;
pub mod models;
pub mod store;

pub use capability::{Capability, PermissionLabel, matches};
pub use config::{ConciergeConfig, DatabaseConfig, SiteAdminConfig};
pub use error::{CapabilityError, ConfigError, StoreError, StoreResult};
pub use models::{EntityId, EntityKind, Environment, Table, TableNames};
pub use store::ConciergeStore;

/// Re-exports of commonly used types
pub mod prelude {
    pub use crate::capability::{Capability, PermissionLabel};
    pub use crate::config::ConciergeConfig;
    pub use crate::error::{StoreError, StoreResult};
    pub use crate::models::{
        ADMIN_ROLE, EntityId, EntityKind, Environment, NewProcess, NewUser, SITE_GROUP, Table,
        USER_ROLE,
    };
    pub use crate::store::ConciergeStore;
    pub use crate::store::memory::MemoryStore;
    pub use crate::store::postgres::PostgresStore;
}
