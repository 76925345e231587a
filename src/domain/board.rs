//! BoardDecision - the structured escalation artifact
//!
//! Produced by the "board synthesizer" when a task has exhausted its retry
//! budget; see DESIGN.md for the fixed schema resolving the spec's open
//! question about the arbiter's expected JSON.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use taskstore::{IndexValue, Record, now_ms};

use super::id::generate_id;

/// The structured JSON the arbiter model is asked to return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardDecision {
    pub id: String,
    pub task_id: String,
    pub decision: String,
    pub rationale: String,
    pub risks: Vec<String>,
    pub confidence: f32,
    pub recommend_human_review: bool,
    pub created_at: i64,
}

impl BoardDecision {
    pub fn new(
        task_id: impl Into<String>,
        decision: impl Into<String>,
        rationale: impl Into<String>,
        risks: Vec<String>,
        confidence: f32,
        recommend_human_review: bool,
    ) -> Self {
        let task_id = task_id.into();
        Self {
            id: generate_id("board", &task_id),
            task_id,
            decision: decision.into(),
            rationale: rationale.into(),
            risks,
            confidence: confidence.clamp(0.0, 1.0),
            recommend_human_review,
            created_at: now_ms(),
        }
    }

    /// Parse the arbiter's response body into a `BoardDecision` for `task_id`.
    /// Returns `None` on malformed JSON; callers treat this as escalation
    /// failure (the caller's rule-based fallback decision takes over).
    pub fn from_arbiter_json(task_id: &str, body: &str) -> Option<Self> {
        #[derive(Deserialize)]
        struct Raw {
            decision: String,
            rationale: String,
            #[serde(default)]
            risks: Vec<String>,
            #[serde(default)]
            confidence: f32,
            #[serde(default)]
            recommend_human_review: bool,
        }
        let raw: Raw = serde_json::from_str(body).ok()?;
        Some(Self::new(
            task_id,
            raw.decision,
            raw.rationale,
            raw.risks,
            raw.confidence,
            raw.recommend_human_review,
        ))
    }
}

impl Record for BoardDecision {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.created_at
    }

    fn collection_name() -> &'static str {
        "board_decisions"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("task_id".to_string(), IndexValue::String(self.task_id.clone()));
        fields.insert(
            "recommend_human_review".to_string(),
            IndexValue::Bool(self.recommend_human_review),
        );
        fields
    }
}
