//! Executor error taxonomy

use thiserror::Error;

use crate::router::RouterError;
use crate::state::StateError;

/// Errors surfaced by the Executor to its callers (Conductor, the HTTP
/// layer's board-consult route).
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("no expert available for this task")]
    NoExpertAvailable,

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error("state error: {0}")]
    State(#[from] StateError),
}
