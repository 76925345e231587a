//! Retrieval error taxonomy

use thiserror::Error;

use crate::router::RouterError;

/// Errors surfaced by Retrieval to its callers (Conductor).
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("goal is empty")]
    EmptyGoal,

    #[error("embedding failed: {0}")]
    Embed(#[from] RouterError),

    #[error("store error: {0}")]
    Store(String),
}
