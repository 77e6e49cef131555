use thiserror::Error;

use crate::{
    abstractive::GenerationError, config::ConfigError, pipeline::state::PipelineState,
    reconcile::ReconcileError,
};

/// Pipeline-level failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Generation failed and the policy is to fail the document.
    #[error("section {index} failed: {source}")]
    SectionFailed {
        /// Section index in the segmented document.
        index: usize,
        /// Generator error.
        #[source]
        source: GenerationError,
    },
    /// The orchestrator attempted an illegal state change.
    #[error("invalid state transition {from} -> {to}")]
    InvalidTransition {
        /// State before the attempt.
        from: PipelineState,
        /// Rejected target state.
        to: PipelineState,
    },
    /// Length reconciliation failed.
    #[error(transparent)]
    Reconciliation(#[from] ReconcileError),
    /// Configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// A section worker panicked or was cancelled.
    #[error("section worker failed: {0}")]
    Worker(String),
}
