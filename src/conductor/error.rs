//! Conductor error taxonomy

use thiserror::Error;

use crate::executor::ExecutorError;
use crate::retrieval::RetrievalError;
use crate::router::RouterError;
use crate::state::StateError;

/// Errors surfaced by the Conductor to the HTTP boundary, where they are
/// mapped exactly once into the user-visible JSON `Result` variants.
#[derive(Debug, Error)]
pub enum ConductorError {
    #[error("goal must not be empty")]
    EmptyGoal,

    #[error("goal exceeds the maximum accepted length")]
    GoalTooLong,

    #[error("over capacity, retry after {retry_after_secs}s")]
    Overloaded { retry_after_secs: u64 },

    #[error("task {0} not found")]
    TaskNotFound(String),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    State(#[from] StateError),
}
