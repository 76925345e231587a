//! Expert - a named role that models impersonate via prompts
//!
//! Experts are seeded from a canonical source-of-truth file and mutated only
//! through `sync_from_seed`; data rows with behavior specified by prompt text,
//! not a class hierarchy.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use taskstore::{IndexValue, Record, now_ms};

/// The reserved assignee value meaning "call Router directly, no expert prompt".
pub const DIRECT_ASSIGNEE: &str = "direct";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expert {
    /// Stable, unique name (also the primary key / assignee reference)
    pub name: String,
    pub role: String,
    pub department: String,
    pub system_prompt: String,
    pub department_id: String,
    pub workload: u32,
    pub success_rate: f32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Expert {
    pub fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        department: impl Into<String>,
        department_id: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        let now = now_ms();
        Self {
            name: name.into(),
            role: role.into(),
            department: department.into(),
            system_prompt: system_prompt.into(),
            department_id: department_id.into(),
            workload: 0,
            success_rate: 1.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// `score = w1*domainFit - w2*workload + w3*successRate`, per the
    /// assignment pass's composite scoring function.
    pub fn composite_score(&self, domain_fit: f32, w1: f32, w2: f32, w3: f32) -> f32 {
        w1 * domain_fit - w2 * (self.workload as f32) + w3 * self.success_rate
    }

    pub fn increment_workload(&mut self) {
        self.workload += 1;
        self.updated_at = now_ms();
    }

    pub fn decrement_workload(&mut self) {
        self.workload = self.workload.saturating_sub(1);
        self.updated_at = now_ms();
    }

    /// Exponential-moving-average update of the rolling success rate.
    pub fn record_outcome(&mut self, succeeded: bool, alpha: f32) {
        let sample = if succeeded { 1.0 } else { 0.0 };
        self.success_rate = alpha * sample + (1.0 - alpha) * self.success_rate;
        self.updated_at = now_ms();
    }
}

/// A single line of the newline-delimited expert seed file: `{name, role, department}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpertSeed {
    pub name: String,
    pub role: String,
    pub department: String,
    #[serde(default)]
    pub department_id: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Record for Expert {
    fn id(&self) -> &str {
        &self.name
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "experts"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("department".to_string(), IndexValue::String(self.department.clone()));
        fields.insert("department_id".to_string(), IndexValue::String(self.department_id.clone()));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_score_rewards_fit_and_success_penalizes_workload() {
        let mut expert = Expert::new("ada", "Backend Expert", "engineering", "eng", "You are Ada.");
        let score_idle = expert.composite_score(1.0, 1.0, 1.0, 1.0);
        expert.increment_workload();
        expert.increment_workload();
        let score_busy = expert.composite_score(1.0, 1.0, 1.0, 1.0);
        assert!(score_busy < score_idle);
    }

    #[test]
    fn record_outcome_moves_toward_sample() {
        let mut expert = Expert::new("ada", "role", "dept", "dept-id", "prompt");
        assert_eq!(expert.success_rate, 1.0);
        expert.record_outcome(false, 0.5);
        assert_eq!(expert.success_rate, 0.5);
    }

    #[test]
    fn indexed_fields_cover_department_lookup() {
        let expert = Expert::new("ada", "role", "engineering", "eng", "prompt");
        let fields = expert.indexed_fields();
        assert_eq!(fields.get("department"), Some(&IndexValue::String("engineering".to_string())));
    }
}
