//! Router error taxonomy

use std::time::Duration;
use thiserror::Error;

use crate::llm::LlmError;

/// Errors surfaced by the Router to its callers (Conductor, Executor).
///
/// Mirrors `LlmError`'s shape at one level up: Router has already tried
/// cross-family failover by the time one of these escapes.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("rate limited on {family}, retry after {retry_after:?}")]
    RateLimited { family: String, retry_after: Duration },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("no backend available for family {family}")]
    Unavailable { family: String },

    #[error("model echoed the prompt")]
    Echo,

    #[error("embedding has {actual} components, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("unknown model requested: {0}")]
    UnknownModel(String),
}

impl RouterError {
    pub fn from_llm_error(family: &str, err: LlmError) -> Self {
        match err {
            LlmError::RateLimited { retry_after } => RouterError::RateLimited {
                family: family.to_string(),
                retry_after,
            },
            LlmError::Timeout(d) => RouterError::Timeout(d),
            LlmError::Echo => RouterError::Echo,
            LlmError::DimensionMismatch { expected, actual } => RouterError::DimensionMismatch { expected, actual },
            LlmError::Unavailable { family } => RouterError::Unavailable { family },
            LlmError::Network(e) => RouterError::Transport(e.to_string()),
            LlmError::ApiError { status, message } => RouterError::Transport(format!("{status}: {message}")),
            LlmError::InvalidResponse(msg) => RouterError::Transport(msg),
            LlmError::Json(e) => RouterError::Transport(e.to_string()),
        }
    }
}
