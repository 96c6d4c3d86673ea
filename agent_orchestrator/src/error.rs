//! Error taxonomy for plan execution.

use thiserror::Error;

/// Fatal conditions raised by the registry, engine, and executor.
///
/// The engine propagates the first fatal condition outward immediately; the
/// executor catches it and folds it into a structured [`crate::ExecutionReport`].
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A step referenced an agent id that is not registered.
    #[error("agent '{0}' not found")]
    AgentNotFound(String),

    /// Safe registration was attempted with an id that is already taken.
    #[error("agent '{0}' is already registered")]
    DuplicateRegistration(String),

    /// An adapter reported a non-empty error string or raised while handling
    /// a step.
    #[error("step {index} ({agent_id}) failed: {message}")]
    StepFailure {
        index: usize,
        agent_id: String,
        message: String,
    },

    /// Parallel execution found no runnable step while work remained.
    #[error("deadlock detected in parallel execution")]
    Deadlock,

    /// A plan failed structural validation before execution.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
}
