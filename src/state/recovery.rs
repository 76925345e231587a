//! Stuck-task sweep
//!
//! Before each pull cycle the Executor resets tasks that have been
//! `in_progress` for too long back to `pending` without touching their
//! attempt count, tolerating worker crashes without a lease mechanism.

use taskstore::{Filter, IndexValue};
use tracing::{debug, info, warn};

use crate::domain::{Task, TaskStatus, now_ms};

use super::StateManager;

/// Recovery statistics from one sweep pass.
#[derive(Debug, Default)]
pub struct RecoveryStats {
    /// Number of in_progress tasks found stale and reset to pending.
    pub tasks_reclaimed: usize,
}

impl std::fmt::Display for RecoveryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tasks_reclaimed: {}", self.tasks_reclaimed)
    }
}

/// List tasks currently `in_progress` whose `updated_at` is older than
/// `stuck_minutes`, without mutating them.
pub async fn get_stuck_tasks(state: &StateManager, stuck_minutes: i64) -> eyre::Result<Vec<Task>> {
    debug!(stuck_minutes, "get_stuck_tasks: called");
    let cutoff = now_ms() - stuck_minutes * 60_000;
    let in_progress = state
        .list_tasks(vec![Filter::eq("status", IndexValue::String(TaskStatus::InProgress.to_string()))])
        .await
        .map_err(|e| eyre::eyre!("Failed to list in-progress tasks: {}", e))?;

    let stuck: Vec<Task> = in_progress.into_iter().filter(|t| t.updated_at < cutoff).collect();
    debug!(count = stuck.len(), "get_stuck_tasks: returning");
    Ok(stuck)
}

/// Scan for stuck tasks and report how many would be reclaimed, without
/// mutating anything. Used by `GET /status`.
pub async fn scan_for_recovery(state: &StateManager, stuck_minutes: i64) -> eyre::Result<RecoveryStats> {
    let stuck = get_stuck_tasks(state, stuck_minutes).await?;
    Ok(RecoveryStats {
        tasks_reclaimed: stuck.len(),
    })
}

/// Reset every stuck `in_progress` task back to `pending`, preserving
/// `attempt_count`. Called once at the top of every pull cycle.
pub async fn sweep_stuck_tasks(state: &StateManager, stuck_minutes: i64) -> eyre::Result<RecoveryStats> {
    debug!(stuck_minutes, "sweep_stuck_tasks: called");
    let stuck = get_stuck_tasks(state, stuck_minutes).await?;
    let mut stats = RecoveryStats::default();

    for mut task in stuck {
        let attempts_before = task.attempt_count;
        warn!(task_id = %task.id, attempt_count = attempts_before, "sweep_stuck_tasks: reclaiming stuck task");
        task.reclaim_stuck();
        state
            .update_task(task)
            .await
            .map_err(|e| eyre::eyre!("Failed to reclaim stuck task: {}", e))?;
        stats.tasks_reclaimed += 1;
    }

    if stats.tasks_reclaimed > 0 {
        info!(reclaimed = stats.tasks_reclaimed, "sweep_stuck_tasks: reclaimed stuck tasks");
    }
    debug!(?stats, "sweep_stuck_tasks: returning");
    Ok(stats)
}
