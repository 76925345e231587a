//! Executor configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Hard ceiling on the worker pool; `adaptive()` can only shrink this.
    #[serde(rename = "max-concurrent")]
    pub max_concurrent: usize,

    /// Recompute `effective_N` from host load this often.
    #[serde(rename = "adaptive-concurrency")]
    pub adaptive_concurrency: bool,

    /// Interval between adaptive-concurrency recomputations.
    #[serde(rename = "adaptive-interval-sec")]
    pub adaptive_interval_sec: u64,

    /// `in_progress` age, in minutes, past which a task is considered stuck.
    #[serde(rename = "stuck-minutes")]
    pub stuck_minutes: i64,

    /// Heartbeat write interval for an in-progress attempt.
    #[serde(rename = "heartbeat-seconds")]
    pub heartbeat_seconds: u64,

    /// Attempts allowed before a task escalates to the board.
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Backoff applied to `next_retry_after` after a failed attempt.
    #[serde(rename = "retry-delay-sec")]
    pub retry_delay_sec: i64,

    /// Pending tasks pulled per cycle, before family interleaving.
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    /// Validator pass/fail threshold on the [0,1] confidence scale.
    #[serde(rename = "validator-threshold")]
    pub validator_threshold: f32,

    /// Batch same-model LLM calls within a pull cycle instead of issuing
    /// them one at a time.
    #[serde(rename = "batch-group-llm")]
    pub batch_group_llm: bool,

    /// Environment variable carrying the shared secret for
    /// `POST /api/board/consult`.
    #[serde(rename = "board-api-key-env")]
    pub board_api_key_env: String,

    /// Assignment composite-score weights: `w1*domain_fit - w2*workload + w3*success_rate`.
    #[serde(rename = "assignment-weight-domain-fit")]
    pub assignment_weight_domain_fit: f32,
    #[serde(rename = "assignment-weight-workload")]
    pub assignment_weight_workload: f32,
    #[serde(rename = "assignment-weight-success-rate")]
    pub assignment_weight_success_rate: f32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 15,
            adaptive_concurrency: true,
            adaptive_interval_sec: 15,
            stuck_minutes: 15,
            heartbeat_seconds: 15,
            max_attempts: 3,
            retry_delay_sec: 90,
            batch_size: 10,
            validator_threshold: 0.5,
            batch_group_llm: true,
            board_api_key_env: "ORCHESTRATORD_BOARD_API_KEY".to_string(),
            assignment_weight_domain_fit: 1.0,
            assignment_weight_workload: 0.5,
            assignment_weight_success_rate: 0.5,
        }
    }
}
