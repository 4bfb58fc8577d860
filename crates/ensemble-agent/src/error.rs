//! Orchestrator error type.

use thiserror::Error;

/// Errors surfaced by the orchestrator's public API.
///
/// Per-task failures never appear here; they are recorded on the task
/// itself and in its stored result. Only contract violations and
/// infrastructure failures reach the caller.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A workflow was created with no steps.
    #[error("workflow '{0}' has no steps")]
    EmptyWorkflow(String),

    /// A workflow step referenced a step index that does not exist.
    #[error("step {step} depends on unknown step index {dependency}")]
    UnknownStepDependency {
        /// Index of the step carrying the bad reference.
        step: usize,
        /// The referenced index.
        dependency: usize,
    },

    /// A dependency set contains a cycle.
    #[error("cyclic dependencies: {0}")]
    CyclicDependency(String),

    /// Error bubbled up from a core operation.
    #[error(transparent)]
    Core(#[from] ensemble_core::Error),
}

/// Result alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
