//! Executor: assigns pending tasks to experts, runs them through the
//! Router with heartbeats and bounded retries, and escalates exhausted
//! tasks to the board.

mod assignment;
mod config;
mod error;
mod escalation;
mod host_load;
mod validator;
mod worker;

pub use config::ExecutorConfig;
pub use error::ExecutorError;
pub use host_load::{adaptive, sample, HostLoad};
pub use worker::{execute_one_task, pull, run_cycle};

use std::sync::Arc;

use tracing::debug;

use crate::router::Router;
use crate::state::StateManager;

/// Owns the Executor's tuning knobs and exposes the sub-operations
/// (assignment, pull, execute, escalation) as one cohesive API, mirroring
/// the Router's struct-with-config shape.
pub struct Executor {
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run one assignment pass over unassigned pending tasks.
    pub async fn assign(&self, state: &StateManager) -> Result<usize, ExecutorError> {
        assignment::run_assignment_pass(state, &self.config).await
    }

    /// Run one full worker-pool cycle: stuck sweep, assignment, adaptive
    /// concurrency recompute, pull and execute.
    pub async fn run_cycle(&self, state: &StateManager, router: &Arc<Router>) -> Result<usize, ExecutorError> {
        debug!("Executor::run_cycle: called");
        let n = worker::run_cycle(state, router, &self.config).await?;
        debug!(tasks_run = n, "Executor::run_cycle: returning");
        Ok(n)
    }
}
