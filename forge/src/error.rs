//! Typed errors for the generation loop.
//!
//! Every variant is fatal for the session it occurs in. A rejected verdict is
//! not an error and never shows up here. Adapters below the stage boundary use
//! `anyhow::Result`; the stage wrappers convert into [`ForgeError`] so callers
//! can tell which stage aborted.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForgeError {
    /// The policy document is missing or malformed. Raised before any model call.
    #[error("load design policy {}", path.display())]
    PolicyLoad {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The initial generation call failed or returned nothing.
    #[error("generation failed")]
    Generation {
        #[source]
        source: anyhow::Error,
    },

    /// A correction call failed or returned nothing.
    #[error("correction failed after attempt {attempt}")]
    Correction {
        attempt: u32,
        #[source]
        source: anyhow::Error,
    },

    /// The semantic check failed or produced no well-formed verdict.
    #[error("validation failed on attempt {attempt}")]
    Validation {
        attempt: u32,
        #[source]
        source: anyhow::Error,
    },

    /// The caller asked for more corrections than a session allows.
    #[error("max_retries {requested} exceeds the limit of {limit}")]
    RetryBudget { requested: u32, limit: u32 },
}

impl ForgeError {
    /// Stable label of the stage that aborted.
    pub fn stage(&self) -> &'static str {
        match self {
            ForgeError::PolicyLoad { .. } => "policy",
            ForgeError::Generation { .. } => "generate",
            ForgeError::Correction { .. } => "correct",
            ForgeError::Validation { .. } => "validate",
            ForgeError::RetryBudget { .. } => "session",
        }
    }
}
