//! Error types for schema bootstrap

use crate::pipeline::StageName;
use concierge_core::error::StoreError;
use thiserror::Error;

/// Errors that can occur while bootstrapping the schema
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// A sub-step failed; later waves and stages did not run and nothing
    /// already applied was rolled back.
    #[error("bootstrap {stage} stage failed at {substep}: {cause}")]
    StageFailure {
        stage: StageName,
        substep: String,
        #[source]
        cause: StoreError,
    },
}

impl BootstrapError {
    /// Stage that failed.
    pub fn stage(&self) -> StageName {
        match self {
            BootstrapError::StageFailure { stage, .. } => *stage,
        }
    }

    /// Sub-step that failed.
    pub fn substep(&self) -> &str {
        match self {
            BootstrapError::StageFailure { substep, .. } => substep,
        }
    }
}
