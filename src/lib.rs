//! # Concierge - Identity and Permission Resolution
//!
//! Decides whether a principal may exercise a permission on a registered
//! process, through a role held in a group.
//!
//! This crate re-exports the functionality of the constituent crates:
//! - `concierge-core`: data model, capability matcher and relational store
//! - `concierge-rbac`: identity resolution, verification, evaluation and registry
//! - `concierge-bootstrap`: staged schema drop / create / seed

pub use concierge_bootstrap as bootstrap;
pub use concierge_core as core;
pub use concierge_rbac as rbac;

use concierge_core::config::ConciergeConfig;
use concierge_core::error::StoreResult;
use concierge_core::store::ConciergeStore;
use concierge_core::store::postgres::PostgresStore;
use std::sync::Arc;

/// Open the Postgres store described by `config`.
pub async fn open_store(config: &ConciergeConfig) -> StoreResult<Arc<dyn ConciergeStore>> {
    let store = PostgresStore::connect(&config.database, config.table_names()).await?;
    Ok(Arc::new(store))
}

/// Re-export commonly used items
pub mod prelude {
    pub use crate::bootstrap::{BootstrapError, SchemaBootstrap, StageName};
    pub use crate::rbac::prelude::*;
}
