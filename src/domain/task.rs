//! Task - the unit of durable work owned by the Executor
//!
//! A Task is created by Conductor (direct submission) or an external ingester
//! with `assignee = None`, enriched with an assignee by Executor's assignment
//! pass, and mutated by exactly one worker at a time while `in_progress`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use taskstore::{IndexValue, Record, now_ms};

use super::id::generate_id;
use super::priority::Priority;

/// Normalized failure reason stored in `metadata.last_error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LastError {
    Timeout,
    EmptyOrShortResponse,
    ValidationFailed,
    ConnectionError,
    OomOrMetal,
    Echo,
    Other,
}

impl std::fmt::Display for LastError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::EmptyOrShortResponse => "empty_or_short_response",
            Self::ValidationFailed => "validation_failed",
            Self::ConnectionError => "connection_error",
            Self::OomOrMetal => "oom_or_metal",
            Self::Echo => "echo",
            Self::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// Backend family a task prefers, set by the assignment pass from a
/// department→family mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendFamily {
    Fast,
    Heavy,
}

impl std::fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Heavy => write!(f, "heavy"),
        }
    }
}

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    DeferredToHuman,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::DeferredToHuman => "deferred_to_human",
        };
        write!(f, "{s}")
    }
}

/// Free-form metadata carried on a Task, per the data model's named fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub last_error: Option<LastError>,
    pub batch_group: Option<String>,
    pub parent_task: Option<String>,
    pub preferred_source: Option<BackendFamily>,
    pub preferred_model: Option<String>,
    pub web_context_attached: bool,
    pub board_escalated: bool,
    pub deferred_to_human: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The durable unit of work the Executor pulls, runs, retries and escalates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub goal: String,
    pub project_context: String,
    pub assignee: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub attempt_count: u32,
    pub created_at: i64,
    pub updated_at: i64,
    pub next_retry_after: Option<i64>,
    pub metadata: TaskMetadata,
}

impl Task {
    /// Create a new pending, unassigned task.
    pub fn new(goal: impl Into<String>, project_context: impl Into<String>) -> Self {
        let goal = goal.into();
        let now = now_ms();
        Self {
            id: generate_id("task", &goal),
            goal,
            project_context: project_context.into(),
            assignee: None,
            status: TaskStatus::Pending,
            priority: Priority::Medium,
            attempt_count: 0,
            created_at: now,
            updated_at: now,
            next_retry_after: None,
            metadata: TaskMetadata::default(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Assign the task to an expert (or "direct"), and a preferred backend family.
    pub fn assign(&mut self, assignee: impl Into<String>, preferred_source: BackendFamily) {
        self.assignee = Some(assignee.into());
        self.metadata.preferred_source = Some(preferred_source);
        self.updated_at = now_ms();
    }

    /// Conditional transition to in_progress; increments attempt_count.
    /// Callers are expected to persist this only when the prior status matched
    /// what they observed (the conditional-update guarantee lives in Store/SQL).
    pub fn start_attempt(&mut self) {
        self.status = TaskStatus::InProgress;
        self.attempt_count += 1;
        self.updated_at = now_ms();
    }

    /// Heartbeat: refresh `updated_at` without changing status or attempt count.
    pub fn heartbeat(&mut self) {
        self.updated_at = now_ms();
    }

    pub fn complete(&mut self) {
        self.status = TaskStatus::Completed;
        self.updated_at = now_ms();
    }

    pub fn cancel(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.updated_at = now_ms();
    }

    /// Record a failed attempt: stash the error kind, arm the retry backoff, and
    /// revert to pending (the caller is responsible for checking MAX_ATTEMPTS and
    /// calling `escalate` instead when exhausted).
    pub fn fail_attempt(&mut self, error: LastError, retry_delay_ms: i64) {
        self.metadata.last_error = Some(error);
        self.next_retry_after = Some(now_ms() + retry_delay_ms);
        self.status = TaskStatus::Pending;
        self.updated_at = now_ms();
    }

    /// Terminal escalation outcome: the task is "completed" from the worker
    /// loop's perspective, but flagged for human review.
    pub fn escalate(&mut self) {
        self.metadata.board_escalated = true;
        self.metadata.deferred_to_human = true;
        self.status = TaskStatus::DeferredToHuman;
        self.updated_at = now_ms();
    }

    /// Stuck sweep: revert to pending without touching attempt_count.
    pub fn reclaim_stuck(&mut self) {
        self.status = TaskStatus::Pending;
        self.updated_at = now_ms();
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::DeferredToHuman
        )
    }

    /// Whether this task is eligible to be pulled right now.
    pub fn is_pullable(&self, now: i64) -> bool {
        self.status == TaskStatus::Pending
            && self.assignee.is_some()
            && self.next_retry_after.map(|t| t <= now).unwrap_or(true)
    }

    /// Seconds since the task's last heartbeat, for stuck-sweep comparisons.
    pub fn staleness_ms(&self, now: i64) -> i64 {
        now - self.updated_at
    }
}

impl Record for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "tasks"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), IndexValue::String(self.status.to_string()));
        fields.insert("priority".to_string(), IndexValue::String(self.priority.to_string()));
        fields.insert(
            "project_context".to_string(),
            IndexValue::String(self.project_context.clone()),
        );
        fields.insert("attempt_count".to_string(), IndexValue::Integer(self.attempt_count as i64));
        if let Some(assignee) = &self.assignee {
            fields.insert("assignee".to_string(), IndexValue::String(assignee.clone()));
        }
        if let Some(next_retry_after) = self.next_retry_after {
            fields.insert("next_retry_after".to_string(), IndexValue::Integer(next_retry_after));
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_is_pending_and_unassigned() {
        let task = Task::new("do the thing", "atra-web-ide");
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.assignee.is_none());
        assert_eq!(task.attempt_count, 0);
        assert!(task.id.contains("-task-"));
    }

    #[test]
    fn assign_sets_assignee_and_family() {
        let mut task = Task::new("fix the bug", "proj");
        task.assign("backend-expert", BackendFamily::Heavy);
        assert_eq!(task.assignee.as_deref(), Some("backend-expert"));
        assert_eq!(task.metadata.preferred_source, Some(BackendFamily::Heavy));
    }

    #[test]
    fn start_attempt_increments_and_transitions() {
        let mut task = Task::new("goal", "proj");
        task.start_attempt();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.attempt_count, 1);
        task.start_attempt();
        assert_eq!(task.attempt_count, 2);
    }

    #[test]
    fn fail_attempt_reverts_to_pending_with_backoff() {
        let mut task = Task::new("goal", "proj");
        task.start_attempt();
        task.fail_attempt(LastError::Timeout, 90_000);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.metadata.last_error, Some(LastError::Timeout));
        assert!(task.next_retry_after.unwrap() > task.updated_at);
    }

    #[test]
    fn escalate_is_terminal_and_flags_human_review() {
        let mut task = Task::new("goal", "proj");
        task.escalate();
        assert!(task.is_terminal());
        assert!(task.metadata.board_escalated);
        assert!(task.metadata.deferred_to_human);
    }

    #[test]
    fn reclaim_stuck_preserves_attempt_count() {
        let mut task = Task::new("goal", "proj");
        task.start_attempt();
        task.start_attempt();
        let attempts_before = task.attempt_count;
        task.reclaim_stuck();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempt_count, attempts_before);
    }

    #[test]
    fn is_pullable_respects_retry_backoff() {
        let mut task = Task::new("goal", "proj");
        task.assign("direct", BackendFamily::Fast);
        let now = now_ms();
        assert!(task.is_pullable(now));

        task.next_retry_after = Some(now + 60_000);
        assert!(!task.is_pullable(now));
        assert!(task.is_pullable(now + 60_001));
    }

    #[test]
    fn indexed_fields_cover_query_dimensions() {
        let mut task = Task::new("goal", "proj").with_priority(Priority::Urgent);
        task.assign("expert-1", BackendFamily::Fast);
        let fields = task.indexed_fields();
        assert_eq!(fields.get("status"), Some(&IndexValue::String("pending".to_string())));
        assert_eq!(fields.get("priority"), Some(&IndexValue::String("urgent".to_string())));
        assert_eq!(fields.get("assignee"), Some(&IndexValue::String("expert-1".to_string())));
    }
}
