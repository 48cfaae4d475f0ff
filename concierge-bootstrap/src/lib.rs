//! # Concierge Bootstrap
//!
//! Staged drop / create / seed of the Concierge schema.
//!
//! ```rust
//! use concierge_bootstrap::{SchemaBootstrap, StageName};
//! use concierge_core::config::ConciergeConfig;
//! use concierge_core::store::memory::MemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), concierge_bootstrap::BootstrapError> {
//!     let config = ConciergeConfig::development();
//!     let bootstrap = SchemaBootstrap::from_config(Arc::new(MemoryStore::new()), &config);
//!     let stages = bootstrap.run(config.reset).await?;
//!     assert_eq!(stages.last(), Some(&StageName::Seed));
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod steps;

pub use error::BootstrapError;
pub use orchestrator::SchemaBootstrap;
pub use pipeline::{BootstrapStep, Stage, StageName};
