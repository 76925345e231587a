//! Conductor configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorConfig {
    /// Concurrent `/run` sync slots before the Conductor returns 503.
    #[serde(rename = "max-concurrent-sync")]
    pub max_concurrent_sync: usize,

    /// How long a cached `UnderstandGoal` result stays valid.
    #[serde(rename = "understand-ttl-sec")]
    pub understand_ttl_sec: u64,

    /// Capacity of the in-process understanding cache.
    #[serde(rename = "understand-max")]
    pub understand_max: usize,

    /// Enable the strategy-selection heuristic; when false every goal runs
    /// the deep_analysis fan-out path.
    #[serde(rename = "strategy-enabled")]
    pub strategy_enabled: bool,

    /// Prior session summaries folded into context assembly.
    #[serde(rename = "long-term-k")]
    pub long_term_k: usize,

    /// Upper bound on subtasks run directly in parallel instead of being
    /// submitted to the Executor.
    #[serde(rename = "fanout-max")]
    pub fanout_max: usize,

    /// Plan revisions permitted when a dependency result comes back empty.
    #[serde(rename = "max-plan-revisions")]
    pub max_plan_revisions: u32,

    /// Goals longer than this are rejected before any classification work.
    #[serde(rename = "max-goal-chars")]
    pub max_goal_chars: usize,

    /// Known `project_context` values; an unrecognized one falls back to
    /// `default_project_context` rather than failing the request.
    #[serde(rename = "registered-projects")]
    pub registered_projects: Vec<String>,

    #[serde(rename = "default-project-context")]
    pub default_project_context: String,

    /// `Retry-After` value returned with a 503 once `max_concurrent_sync` is exhausted.
    #[serde(rename = "overload-retry-after-secs")]
    pub overload_retry_after_secs: u64,

    /// Directory of override templates for the canonical fast-path answers
    /// (`greeting.txt`, `capabilities.txt`, `status.txt`); falls back to the
    /// built-in text when a file is missing.
    #[serde(rename = "templates-dir")]
    pub templates_dir: Option<String>,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sync: 50,
            understand_ttl_sec: 300,
            understand_max: 200,
            strategy_enabled: true,
            long_term_k: 2,
            fanout_max: 4,
            max_plan_revisions: 1,
            max_goal_chars: 4_000,
            registered_projects: Vec::new(),
            default_project_context: "general".to_string(),
            overload_retry_after_secs: 5,
            templates_dir: None,
        }
    }
}
